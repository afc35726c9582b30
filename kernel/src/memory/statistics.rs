//! Arena Allocator Statistics

use core::cell::Cell;

/// Running counters of one [`MemoryArena`](super::MemoryArena).
///
/// The arena is confined to a single execution context, so plain cells are
/// enough; no atomic read-modify-write is needed (and Cortex-M0 has none).
pub(crate) struct ArenaStatistics {
    alloc_count: Cell<usize>,
    free_count: Cell<usize>,
    min_free: Cell<usize>,
}

impl ArenaStatistics {
    pub const fn new() -> Self {
        Self {
            alloc_count: Cell::new(0),
            free_count: Cell::new(0),
            min_free: Cell::new(0),
        }
    }

    /// Start a fresh accounting period for a pool of `total` bytes.
    pub fn reset(&self, total: usize) {
        self.alloc_count.set(0);
        self.free_count.set(0);
        self.min_free.set(total);
    }

    pub fn record_alloc(&self, free_after: usize) {
        self.alloc_count.set(self.alloc_count.get().wrapping_add(1));
        if free_after < self.min_free.get() {
            self.min_free.set(free_after);
        }
    }

    pub fn record_free(&self) {
        self.free_count.set(self.free_count.get().wrapping_add(1));
    }

    pub fn snapshot(&self, total: usize, free: usize) -> ArenaStats {
        ArenaStats {
            total,
            free,
            min_free_ever: self.min_free.get(),
            alloc_count: self.alloc_count.get(),
            free_count: self.free_count.get(),
        }
    }
}

/// Point-in-time view of the arena counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArenaStats {
    /// Bytes managed by the pool (headers included)
    pub total: usize,
    /// Bytes currently on the free list
    pub free: usize,
    /// High-water mark: lowest `free` ever observed since `init`
    pub min_free_ever: usize,
    pub alloc_count: usize,
    pub free_count: usize,
}

impl ArenaStats {
    /// Bytes held by live allocations, headers included.
    pub fn used(&self) -> usize {
        self.total - self.free
    }

    /// Peak usage since `init`.
    pub fn peak_used(&self) -> usize {
        self.total - self.min_free_ever
    }
}
