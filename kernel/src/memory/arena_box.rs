//! Owning pointer into a [`MemoryArena`]

use core::fmt;
use core::mem::{self, ManuallyDrop};
use core::ops::{Deref, DerefMut};
use core::ptr::{self, NonNull};

use ek_types::{EkError, ErrorCode, Result};

use super::arena::{MemoryArena, ALIGNMENT};

/// A `Box` whose storage comes from a [`MemoryArena`] instead of the global
/// allocator. The block goes back to the arena on drop.
pub struct ArenaBox<'a, T: ?Sized> {
    ptr: NonNull<T>,
    arena: &'a MemoryArena<'a>,
}

impl<'a, T> ArenaBox<'a, T> {
    /// Move `value` into the arena.
    pub fn new_in(value: T, arena: &'a MemoryArena<'a>) -> Result<Self> {
        let ptr = Self::raw_alloc(mem::size_of::<T>(), arena)?.cast::<T>();
        // SAFETY: fresh block, large enough and aligned for `T`.
        unsafe { ptr.as_ptr().write(value) };
        Ok(ArenaBox { ptr, arena })
    }

    /// Slice of `len` values produced by `f(index)`.
    pub fn from_fn_in<F>(len: usize, arena: &'a MemoryArena<'a>, mut f: F) -> Result<ArenaBox<'a, [T]>>
    where
        F: FnMut(usize) -> T,
    {
        let bytes = mem::size_of::<T>()
            .checked_mul(len)
            .ok_or(EkError::new(ErrorCode::InvalidParameter))?;
        let first = Self::raw_alloc(bytes, arena)?.cast::<T>();
        for i in 0..len {
            // SAFETY: `i < len`, inside the block allocated above.
            unsafe { first.as_ptr().add(i).write(f(i)) };
        }
        Ok(ArenaBox {
            ptr: NonNull::slice_from_raw_parts(first, len),
            arena,
        })
    }

    fn raw_alloc(bytes: usize, arena: &MemoryArena<'_>) -> Result<NonNull<u8>> {
        if mem::align_of::<T>() > ALIGNMENT {
            return Err(EkError::with_message(
                ErrorCode::InvalidParameter,
                "alignment above arena alignment",
            ));
        }
        // Zero-sized values still get a real block so drop can free it.
        arena
            .allocate(bytes.max(1))
            .ok_or(EkError::new(ErrorCode::AllocationFailure))
    }
}

impl<'a> ArenaBox<'a, [u8]> {
    /// Zero-filled byte buffer of `len` bytes.
    pub fn new_zeroed_slice_in(len: usize, arena: &'a MemoryArena<'a>) -> Result<Self> {
        let data = ArenaBox::<u8>::raw_alloc(len, arena)?;
        // SAFETY: fresh block of at least `len` bytes.
        unsafe { ptr::write_bytes(data.as_ptr(), 0, len) };
        Ok(ArenaBox {
            ptr: NonNull::slice_from_raw_parts(data, len),
            arena,
        })
    }
}

impl<'a, T: ?Sized> ArenaBox<'a, T> {
    /// Give up ownership without freeing. Pair with [`from_raw_in`](Self::from_raw_in).
    pub fn into_raw(this: Self) -> NonNull<T> {
        let this = ManuallyDrop::new(this);
        this.ptr
    }

    /// Rebuild a box from [`into_raw`](Self::into_raw), possibly after an
    /// unsizing coercion (`NonNull<S>` to `NonNull<dyn Trait>`).
    ///
    /// # Safety
    ///
    /// `ptr` must come from `into_raw` on a box allocated in `arena`, and must
    /// not be rebuilt twice.
    pub unsafe fn from_raw_in(ptr: NonNull<T>, arena: &'a MemoryArena<'a>) -> Self {
        ArenaBox { ptr, arena }
    }
}

impl<T: ?Sized> Deref for ArenaBox<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the box owns an initialized `T`.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: ?Sized> DerefMut for ArenaBox<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the box owns an initialized `T` and `&mut self` is unique.
        unsafe { self.ptr.as_mut() }
    }
}

impl<T: ?Sized> Drop for ArenaBox<'_, T> {
    fn drop(&mut self) {
        // SAFETY: we own the value and the block; neither is used afterwards.
        unsafe {
            ptr::drop_in_place(self.ptr.as_ptr());
            if !self.arena.free(self.ptr.cast::<u8>()) {
                log::error!("arena box: block {:p} not returned", self.ptr.cast::<u8>());
            }
        }
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for ArenaBox<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    #[repr(C, align(8))]
    struct Pool([u8; 256]);

    struct DropCounter<'c>(&'c Cell<u32>);

    impl Drop for DropCounter<'_> {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn test_box_returns_block() {
        let mut pool = Pool([0; 256]);
        let mut arena = MemoryArena::new(&mut pool.0);
        assert!(arena.init());
        {
            let mut b = ArenaBox::new_in(41u32, &arena).unwrap();
            *b += 1;
            assert_eq!(*b, 42);
            assert!(arena.get_free_size() < 256);
        }
        assert_eq!(arena.get_free_size(), 256);
        assert!(arena.check_integrity());
    }

    #[test]
    fn test_drop_runs_destructor() {
        let mut pool = Pool([0; 256]);
        let mut arena = MemoryArena::new(&mut pool.0);
        assert!(arena.init());
        let drops = Cell::new(0);
        {
            let _slice = ArenaBox::from_fn_in(3, &arena, |_| DropCounter(&drops)).unwrap();
        }
        assert_eq!(drops.get(), 3);
        assert_eq!(arena.get_free_size(), 256);
    }

    #[test]
    fn test_zeroed_slice_and_exhaustion() {
        let mut pool = Pool([0xFF; 256]);
        let mut arena = MemoryArena::new(&mut pool.0);
        assert!(arena.init());

        let buf = ArenaBox::new_zeroed_slice_in(100, &arena).unwrap();
        assert_eq!(buf.len(), 100);
        assert!(buf.iter().all(|&b| b == 0));

        let err = ArenaBox::new_zeroed_slice_in(200, &arena).unwrap_err();
        assert_eq!(err, ErrorCode::AllocationFailure);
    }

    #[test]
    fn test_unsize_through_raw() {
        let mut pool = Pool([0; 256]);
        let mut arena = MemoryArena::new(&mut pool.0);
        assert!(arena.init());

        let b = ArenaBox::new_in([1u8, 2, 3], &arena).unwrap();
        let raw: NonNull<[u8; 3]> = ArenaBox::into_raw(b);
        let raw: NonNull<[u8]> = raw;
        let b = unsafe { ArenaBox::from_raw_in(raw, &arena) };
        assert_eq!(&*b, &[1u8, 2, 3][..]);
        drop(b);
        assert_eq!(arena.get_free_size(), 256);
    }
}
