//! Allocateur first-fit sur une arène d'octets fixe
//!
//! The arena carves blocks out of one caller-supplied region. Every block
//! starts with an 8-byte [`BlockHeader`]:
//!
//! ```text
//!   free block       : [ next free offset | size          ][ ... unused ... ]
//!   allocated block  : [ ALLOC_MAGIC      | size|ALLOCATED ][ payload ...    ]
//!                                                            ^-- pointer returned
//! ```
//!
//! Offsets are relative to the first aligned byte of the region. Free blocks
//! form a singly linked list sorted by ascending offset, so a free only has to
//! look at its two neighbours on that list to coalesce.
//!
//! The arena does no locking. It must only be used from one execution context
//! at a time (interrupts masked or a single priority level).

use core::cell::Cell;
use core::marker::PhantomData;
use core::ptr::NonNull;
use core::slice;

use static_assertions::const_assert;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use super::statistics::{ArenaStatistics, ArenaStats};

/// Alignment of every block and of every returned pointer.
pub const ALIGNMENT: usize = 8;

/// Bytes consumed in front of each allocation.
pub const HEADER_SIZE: usize = core::mem::size_of::<BlockHeader>();

/// Smallest block the arena will create: a header plus one aligned unit.
pub const MIN_BLOCK_SIZE: usize = HEADER_SIZE + ALIGNMENT;

/// Set in `BlockHeader::size` while the block belongs to a caller.
const ALLOCATED: u32 = 0x8000_0000;

/// Stored in `BlockHeader::next` of allocated blocks; never a valid offset.
const ALLOC_MAGIC: u32 = 0xA110_C8ED;

/// End of the free list.
const NIL: u32 = u32::MAX;

/// Largest pool whose block sizes keep the `ALLOCATED` bit clear.
const MAX_POOL: usize = ALLOCATED as usize - ALIGNMENT;

const_assert!(ALIGNMENT.is_power_of_two());
const_assert!(HEADER_SIZE == 8);
const_assert!(HEADER_SIZE % ALIGNMENT == 0);
const_assert!(ALLOC_MAGIC as usize > MAX_POOL);

#[repr(C)]
#[derive(Debug, Clone, Copy, FromZeroes, FromBytes, AsBytes)]
struct BlockHeader {
    next: u32,
    size: u32,
}

/// Fixed-size byte pool with split/coalesce allocation.
///
/// The lifetime `'m` ties the arena to the region it manages. `init` and
/// `deinit` take `&mut self`, which statically guarantees that no
/// [`ArenaBox`](super::ArenaBox) is alive across a reset.
pub struct MemoryArena<'m> {
    base: NonNull<u8>,
    len: usize,
    /// Padding skipped to reach `ALIGNMENT`
    start: usize,
    /// Usable pool size, multiple of `ALIGNMENT`
    total: usize,
    initialized: bool,
    free_head: Cell<u32>,
    free_bytes: Cell<usize>,
    stats: ArenaStatistics,
    _region: PhantomData<&'m mut [u8]>,
}

impl<'m> MemoryArena<'m> {
    /// Wrap `region`. Nothing is written until [`init`](Self::init).
    pub fn new(region: &'m mut [u8]) -> Self {
        let len = region.len();
        MemoryArena {
            base: NonNull::from(region).cast::<u8>(),
            len,
            start: 0,
            total: 0,
            initialized: false,
            free_head: Cell::new(NIL),
            free_bytes: Cell::new(0),
            stats: ArenaStatistics::new(),
            _region: PhantomData,
        }
    }

    /// Lay out one free block spanning the whole region.
    ///
    /// Idempotent: a second call on an initialized arena is a no-op that
    /// returns `true`. Returns `false` if the region cannot hold a single
    /// minimum-size block once aligned.
    pub fn init(&mut self) -> bool {
        if self.initialized {
            return true;
        }

        let pad = self.base.as_ptr().align_offset(ALIGNMENT);
        if pad == usize::MAX || self.len < pad.saturating_add(MIN_BLOCK_SIZE) {
            log::warn!("arena: region of {} bytes too small", self.len);
            return false;
        }

        self.start = pad;
        self.total = ((self.len - pad) & !(ALIGNMENT - 1)).min(MAX_POOL);
        self.write_header(
            0,
            BlockHeader {
                next: NIL,
                size: self.total as u32,
            },
        );
        self.free_head.set(0);
        self.free_bytes.set(self.total);
        self.stats.reset(self.total);
        self.initialized = true;

        log::debug!("arena: {} bytes ready at {:p}", self.total, self.block_ptr(0));
        true
    }

    /// Zero the whole region and return to the uninitialized state.
    pub fn deinit(&mut self) {
        // SAFETY: `base..base + len` is the region borrowed for `'m`, and
        // `&mut self` proves no allocation handed out by this arena is alive.
        unsafe { core::ptr::write_bytes(self.base.as_ptr(), 0, self.len) };

        self.start = 0;
        self.total = 0;
        self.initialized = false;
        self.free_head.set(NIL);
        self.free_bytes.set(0);
        self.stats.reset(0);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Pool size in bytes, headers included. Zero before `init`.
    pub fn capacity(&self) -> usize {
        self.total
    }

    /// First-fit allocation of at least `size` bytes, aligned to [`ALIGNMENT`].
    ///
    /// Returns `None` for a zero-size request, before `init`, or when no free
    /// block is large enough.
    pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        if !self.initialized || size == 0 {
            return None;
        }

        let wanted = size.checked_add(HEADER_SIZE + ALIGNMENT - 1)? & !(ALIGNMENT - 1);
        if wanted > self.total {
            return None;
        }
        let wanted = wanted as u32;

        let mut prev = NIL;
        let mut cur = self.free_head.get();
        while cur != NIL {
            let hdr = self.read_header(cur);
            if hdr.size >= wanted {
                let taken = if (hdr.size - wanted) as usize >= MIN_BLOCK_SIZE {
                    // Split: the tail stays on the list in place of `cur`.
                    let rest = cur + wanted;
                    self.write_header(
                        rest,
                        BlockHeader {
                            next: hdr.next,
                            size: hdr.size - wanted,
                        },
                    );
                    self.link_after(prev, rest);
                    wanted
                } else {
                    self.link_after(prev, hdr.next);
                    hdr.size
                };

                self.write_header(
                    cur,
                    BlockHeader {
                        next: ALLOC_MAGIC,
                        size: taken | ALLOCATED,
                    },
                );

                let free = self.free_bytes.get() - taken as usize;
                self.free_bytes.set(free);
                self.stats.record_alloc(free);
                return NonNull::new(self.payload_ptr(cur));
            }
            prev = cur;
            cur = hdr.next;
        }

        log::trace!("arena: no block for {} bytes ({} free)", size, self.free_bytes.get());
        None
    }

    /// Return a block to the free list, merging it with physically adjacent
    /// free neighbours.
    ///
    /// Pointers outside the pool, misaligned pointers, blocks that are not
    /// currently allocated and blocks whose extent would overlap a free
    /// neighbour are refused with `false`; the arena is left untouched.
    ///
    /// # Safety
    ///
    /// `ptr` must not be used again once this returns `true`. In particular it
    /// must not be owned by a live [`ArenaBox`](super::ArenaBox).
    pub unsafe fn free(&self, ptr: NonNull<u8>) -> bool {
        let (off, size) = match self.locate(ptr) {
            Ok(block) => block,
            Err(reason) => {
                log::warn!("arena: free({:p}) refused: {}", ptr, reason);
                return false;
            }
        };

        let mut prev = NIL;
        let mut cur = self.free_head.get();
        while cur != NIL && cur < off {
            prev = cur;
            cur = self.read_header(cur).next;
        }

        let prev_hdr = (prev != NIL).then(|| self.read_header(prev));
        if let Some(p) = prev_hdr {
            if prev + p.size > off {
                log::warn!("arena: free({:p}) refused: overlaps free block", ptr);
                return false;
            }
        }
        if cur != NIL && off + size > cur {
            log::warn!("arena: free({:p}) refused: overlaps free block", ptr);
            return false;
        }

        let mut merged = BlockHeader { next: cur, size };
        if cur != NIL && off + size == cur {
            let next_hdr = self.read_header(cur);
            merged.size += next_hdr.size;
            merged.next = next_hdr.next;
        }

        match prev_hdr {
            Some(mut p) if prev + p.size == off => {
                p.size += merged.size;
                p.next = merged.next;
                self.write_header(prev, p);
                // Absorbed block: scrub the stale allocated header.
                self.write_header(off, BlockHeader::new_zeroed());
            }
            _ => {
                self.write_header(off, merged);
                self.link_after(prev, off);
            }
        }

        self.free_bytes.set(self.free_bytes.get() + size as usize);
        self.stats.record_free();
        true
    }

    /// Usable bytes behind a live allocation, `None` if `ptr` is not one.
    pub fn block_size(&self, ptr: NonNull<u8>) -> Option<usize> {
        self.locate(ptr)
            .ok()
            .map(|(_, size)| size as usize - HEADER_SIZE)
    }

    pub fn get_free_size(&self) -> usize {
        self.free_bytes.get()
    }

    pub fn get_stats(&self) -> ArenaStats {
        self.stats.snapshot(self.total, self.free_bytes.get())
    }

    /// Walk the free list and verify its invariants.
    ///
    /// Checks ascending order, no overlap, no uncoalesced neighbours, sane
    /// block sizes, that the physical block chain tiles the pool and that
    /// the sizes add up to the free-byte counter.
    /// A failure is logged and reported, never repaired.
    pub fn check_integrity(&self) -> bool {
        if !self.initialized {
            return false;
        }

        let max_blocks = self.total / MIN_BLOCK_SIZE + 1;
        let mut sum = 0usize;
        let mut prev_end: Option<usize> = None;
        let mut cur = self.free_head.get();
        let mut seen = 0usize;

        while cur != NIL {
            seen += 1;
            if seen > max_blocks {
                return Self::defect(cur, "free list does not terminate");
            }

            let off = cur as usize;
            if off % ALIGNMENT != 0 || off + HEADER_SIZE > self.total {
                return Self::defect(cur, "free block outside pool");
            }

            let hdr = self.read_header(cur);
            let size = hdr.size as usize;
            if hdr.size & ALLOCATED != 0 {
                return Self::defect(cur, "allocated block on free list");
            }
            if size < MIN_BLOCK_SIZE || size % ALIGNMENT != 0 || off + size > self.total {
                return Self::defect(cur, "bad free block size");
            }

            if let Some(end) = prev_end {
                if off < end {
                    return Self::defect(cur, "free list unordered or overlapping");
                }
                if off == end {
                    return Self::defect(cur, "adjacent free blocks not coalesced");
                }
            }

            sum += size;
            prev_end = Some(off + size);
            cur = hdr.next;
        }

        // Physical chain: blocks must tile the pool exactly.
        let mut off = 0usize;
        let mut chained_free = 0usize;
        while off < self.total {
            let hdr = self.read_header(off as u32);
            let size = (hdr.size & !ALLOCATED) as usize;
            if size < MIN_BLOCK_SIZE || size % ALIGNMENT != 0 || off + size > self.total {
                return Self::defect(off as u32, "block chain broken");
            }
            if hdr.size & ALLOCATED == 0 {
                chained_free += size;
            } else if hdr.next != ALLOC_MAGIC {
                return Self::defect(off as u32, "allocated block without magic");
            }
            off += size;
        }
        if chained_free != sum {
            return Self::defect(self.free_head.get(), "free block missing from free list");
        }

        if sum != self.free_bytes.get() {
            log::warn!(
                "arena: integrity: free list holds {} bytes, counter says {}",
                sum,
                self.free_bytes.get()
            );
            return false;
        }
        true
    }

    fn defect(off: u32, what: &str) -> bool {
        log::warn!("arena: integrity: {} (offset {:#x})", what, off);
        false
    }

    /// Resolve `ptr` to `(offset, block size)` of an allocated block.
    fn locate(&self, ptr: NonNull<u8>) -> Result<(u32, u32), &'static str> {
        if !self.initialized {
            return Err("arena not initialized");
        }

        let addr = ptr.as_ptr() as usize;
        let pool = self.block_ptr(0) as usize;
        if addr < pool + HEADER_SIZE || addr >= pool + self.total {
            return Err("outside pool");
        }
        let user = addr - pool;
        if user % ALIGNMENT != 0 {
            return Err("misaligned");
        }

        let off = (user - HEADER_SIZE) as u32;
        let hdr = self.read_header(off);
        if hdr.size & ALLOCATED == 0 || hdr.next != ALLOC_MAGIC {
            return Err("not an allocated block");
        }

        let size = hdr.size & !ALLOCATED;
        if (size as usize) < MIN_BLOCK_SIZE
            || size as usize % ALIGNMENT != 0
            || off as usize + size as usize > self.total
        {
            return Err("corrupted block header");
        }
        // A header-shaped pattern inside a payload is not a block.
        if !self.is_block_start(off) {
            return Err("not a block boundary");
        }
        Ok((off, size))
    }

    /// Follow the physical block chain from offset 0 and tell whether a
    /// block starts exactly at `target`.
    fn is_block_start(&self, target: u32) -> bool {
        let mut off = 0u32;
        while off < target {
            let size = self.read_header(off).size & !ALLOCATED;
            if (size as usize) < MIN_BLOCK_SIZE || size as usize % ALIGNMENT != 0 {
                return false;
            }
            off += size;
        }
        off == target
    }

    /// Point `prev` (or the list head when `prev == NIL`) at `next`.
    fn link_after(&self, prev: u32, next: u32) {
        if prev == NIL {
            self.free_head.set(next);
        } else {
            let mut hdr = self.read_header(prev);
            hdr.next = next;
            self.write_header(prev, hdr);
        }
    }

    fn block_ptr(&self, off: u32) -> *mut u8 {
        self.base
            .as_ptr()
            .wrapping_add(self.start)
            .wrapping_add(off as usize)
    }

    fn payload_ptr(&self, off: u32) -> *mut u8 {
        self.block_ptr(off).wrapping_add(HEADER_SIZE)
    }

    fn read_header(&self, off: u32) -> BlockHeader {
        debug_assert!(off as usize + HEADER_SIZE <= self.total);
        // SAFETY: headers lie inside the pool and are never part of a payload
        // handed to a caller, so no outside reference aliases these bytes.
        let bytes = unsafe { slice::from_raw_parts(self.block_ptr(off), HEADER_SIZE) };
        BlockHeader::read_from(bytes).unwrap_or_else(BlockHeader::new_zeroed)
    }

    fn write_header(&self, off: u32, hdr: BlockHeader) {
        debug_assert!(off as usize + HEADER_SIZE <= self.total);
        // SAFETY: see `read_header`.
        let bytes = unsafe { slice::from_raw_parts_mut(self.block_ptr(off), HEADER_SIZE) };
        let _ = hdr.write_to(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C, align(8))]
    struct Pool<const N: usize>([u8; N]);

    impl<const N: usize> Pool<N> {
        fn new() -> Self {
            Pool([0xAA; N])
        }
    }

    #[test]
    fn test_init_idempotent() {
        let mut pool = Pool::<256>::new();
        let mut arena = MemoryArena::new(&mut pool.0);
        assert!(arena.init());
        let p = arena.allocate(16).unwrap();
        assert!(arena.init());
        // Second init did not reset the pool.
        assert_eq!(arena.block_size(p), Some(16));
        assert_eq!(arena.get_stats().alloc_count, 1);
    }

    #[test]
    fn test_region_too_small() {
        let mut pool = Pool::<8>::new();
        let mut arena = MemoryArena::new(&mut pool.0);
        assert!(!arena.init());
        assert!(arena.allocate(1).is_none());
        assert!(!arena.check_integrity());
    }

    #[test]
    fn test_unaligned_region() {
        let mut pool = Pool::<128>::new();
        let mut arena = MemoryArena::new(&mut pool.0[3..]);
        assert!(arena.init());
        assert_eq!(arena.capacity(), 120);
        let p = arena.allocate(5).unwrap();
        assert_eq!(p.as_ptr() as usize % ALIGNMENT, 0);
    }

    #[test]
    fn test_zero_size_and_uninit() {
        let mut pool = Pool::<64>::new();
        let mut arena = MemoryArena::new(&mut pool.0);
        assert!(arena.allocate(8).is_none());
        assert!(arena.init());
        assert!(arena.allocate(0).is_none());
        assert!(arena.allocate(usize::MAX).is_none());
    }

    #[test]
    fn test_split_and_coalesce() {
        let mut pool = Pool::<256>::new();
        let mut arena = MemoryArena::new(&mut pool.0);
        assert!(arena.init());

        let a = arena.allocate(16).unwrap();
        let b = arena.allocate(16).unwrap();
        let c = arena.allocate(16).unwrap();
        assert_eq!(arena.get_free_size(), 256 - 3 * 24);
        assert!(arena.check_integrity());

        unsafe {
            assert!(arena.free(b));
            assert!(arena.check_integrity());
            assert!(arena.free(a));
            assert!(arena.check_integrity());
            assert!(arena.free(c));
        }
        assert!(arena.check_integrity());
        assert_eq!(arena.get_free_size(), 256);

        // A single block again: the whole pool is allocatable at once.
        let all = arena.allocate(256 - HEADER_SIZE);
        assert!(all.is_some());
        assert_eq!(arena.get_free_size(), 0);
    }

    #[test]
    fn test_first_fit_reuses_hole() {
        let mut pool = Pool::<256>::new();
        let mut arena = MemoryArena::new(&mut pool.0);
        assert!(arena.init());

        let a = arena.allocate(32).unwrap();
        let _b = arena.allocate(32).unwrap();
        unsafe { assert!(arena.free(a)) };
        let c = arena.allocate(24).unwrap();
        assert_eq!(c, a);
    }

    #[test]
    fn test_small_leftover_not_split() {
        let mut pool = Pool::<64>::new();
        let mut arena = MemoryArena::new(&mut pool.0);
        assert!(arena.init());

        // 64 - 48 = 16 would be a minimum block: split.
        let a = arena.allocate(40).unwrap();
        assert_eq!(arena.block_size(a), Some(40));
        unsafe { assert!(arena.free(a)) };

        // 64 - 56 = 8 cannot hold a block: whole block handed out.
        let b = arena.allocate(48).unwrap();
        assert_eq!(arena.block_size(b), Some(56));
        assert_eq!(arena.get_free_size(), 0);
        assert!(arena.allocate(1).is_none());
    }

    #[test]
    fn test_double_free_rejected() {
        let mut pool = Pool::<128>::new();
        let mut arena = MemoryArena::new(&mut pool.0);
        assert!(arena.init());

        let a = arena.allocate(8).unwrap();
        let _b = arena.allocate(8).unwrap();
        unsafe {
            assert!(arena.free(a));
            assert!(!arena.free(a));
        }
        assert_eq!(arena.get_stats().free_count, 1);
        assert!(arena.check_integrity());
    }

    #[test]
    fn test_foreign_pointers_rejected() {
        let mut pool = Pool::<128>::new();
        let mut arena = MemoryArena::new(&mut pool.0);
        assert!(arena.init());
        let a = arena.allocate(16).unwrap();
        let before = arena.get_stats();

        let mut outside = 0u64;
        unsafe {
            assert!(!arena.free(NonNull::from(&mut outside).cast()));
            assert!(!arena.free(NonNull::new_unchecked(a.as_ptr().add(1))));
            assert!(!arena.free(NonNull::new_unchecked(a.as_ptr().add(8))));
        }
        assert_eq!(arena.get_stats(), before);
        assert!(arena.check_integrity());
    }

    #[test]
    fn test_forged_interior_header_rejected() {
        let mut pool = Pool::<256>::new();
        let mut arena = MemoryArena::new(&mut pool.0);
        assert!(arena.init());
        let a = arena.allocate(64).unwrap();
        let before = arena.get_stats();

        // Caller data that looks like an allocated header, 16 bytes into `a`.
        unsafe {
            a.as_ptr()
                .add(16)
                .cast::<[u32; 2]>()
                .write([ALLOC_MAGIC, 24 | ALLOCATED]);
            assert!(!arena.free(NonNull::new_unchecked(a.as_ptr().add(24))));
        }
        assert_eq!(arena.get_stats(), before);
        assert!(arena.check_integrity());

        // The next block still comes after `a`, not inside it.
        let b = arena.allocate(8).unwrap();
        assert_eq!(b.as_ptr() as usize - a.as_ptr() as usize, 72);
    }

    #[test]
    fn test_integrity_counter_drift() {
        let mut pool = Pool::<256>::new();
        let mut arena = MemoryArena::new(&mut pool.0);
        assert!(arena.init());
        let _a = arena.allocate(16).unwrap();
        assert!(arena.check_integrity());

        arena.free_bytes.set(arena.free_bytes.get() + ALIGNMENT);
        assert!(!arena.check_integrity());
    }

    #[test]
    fn test_integrity_uncoalesced_neighbours() {
        let mut pool = Pool::<256>::new();
        let mut arena = MemoryArena::new(&mut pool.0);
        assert!(arena.init());
        let a = arena.allocate(40).unwrap();
        let _b = arena.allocate(8).unwrap();
        unsafe { assert!(arena.free(a)) };
        assert!(arena.check_integrity());

        // Cut the 48-byte hole at 0 into two touching free blocks.
        let hole = arena.read_header(0);
        arena.write_header(0, BlockHeader { next: 16, size: 16 });
        arena.write_header(16, BlockHeader { next: hole.next, size: 32 });
        assert!(!arena.check_integrity());
    }

    #[test]
    fn test_integrity_overlapping_free_block() {
        let mut pool = Pool::<256>::new();
        let mut arena = MemoryArena::new(&mut pool.0);
        assert!(arena.init());
        let a = arena.allocate(8).unwrap();
        let _b = arena.allocate(8).unwrap();
        let _c = arena.allocate(8).unwrap();
        unsafe { assert!(arena.free(a)) };

        // Stretch the hole at 0 over `b`, `c` and into the tail block at 48.
        let mut hole = arena.read_header(0);
        hole.size = 56;
        arena.write_header(0, hole);
        assert!(!arena.check_integrity());
    }

    #[test]
    fn test_integrity_unordered_list() {
        let mut pool = Pool::<256>::new();
        let mut arena = MemoryArena::new(&mut pool.0);
        assert!(arena.init());
        let a = arena.allocate(8).unwrap();
        let _b = arena.allocate(8).unwrap();
        let c = arena.allocate(8).unwrap();
        let _d = arena.allocate(8).unwrap();
        unsafe {
            assert!(arena.free(a));
            assert!(arena.free(c));
        }
        assert!(arena.check_integrity());

        // 0 -> 32 -> tail becomes 32 -> 0 -> tail.
        let tail = arena.read_header(32).next;
        arena.write_header(32, BlockHeader { next: 0, size: 16 });
        arena.write_header(0, BlockHeader { next: tail, size: 16 });
        arena.free_head.set(32);
        assert!(!arena.check_integrity());
    }

    #[test]
    fn test_integrity_broken_chain() {
        let mut pool = Pool::<256>::new();
        let mut arena = MemoryArena::new(&mut pool.0);
        assert!(arena.init());
        let _a = arena.allocate(8).unwrap();
        let _b = arena.allocate(8).unwrap();
        assert!(arena.check_integrity());

        // Live block at 16 claims 8 bytes: the chain cannot reach the tail.
        arena.write_header(16, BlockHeader { next: ALLOC_MAGIC, size: 8 | ALLOCATED });
        assert!(!arena.check_integrity());
    }

    #[test]
    fn test_stats_high_water() {
        let mut pool = Pool::<256>::new();
        let mut arena = MemoryArena::new(&mut pool.0);
        assert!(arena.init());

        let a = arena.allocate(100).unwrap();
        let b = arena.allocate(50).unwrap();
        unsafe {
            assert!(arena.free(a));
            assert!(arena.free(b));
        }

        let stats = arena.get_stats();
        assert_eq!(stats.total, 256);
        assert_eq!(stats.free, 256);
        assert_eq!(stats.min_free_ever, 256 - 112 - 64);
        assert_eq!(stats.alloc_count, 2);
        assert_eq!(stats.free_count, 2);
    }

    #[test]
    fn test_deinit_zeroes_region() {
        let mut pool = Pool::<64>::new();
        {
            let mut arena = MemoryArena::new(&mut pool.0);
            assert!(arena.init());
            assert!(arena.allocate(8).is_some());
            arena.deinit();
            assert!(!arena.is_initialized());
            assert_eq!(arena.get_free_size(), 0);
            assert!(arena.allocate(8).is_none());
        }
        assert!(pool.0.iter().all(|&b| b == 0));
    }
}
