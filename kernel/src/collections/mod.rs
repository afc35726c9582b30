//! Conteneurs intrusifs du runtime
//!
//! All containers take their storage either from caller-owned memory
//! (`create_static`) or from a [`MemoryArena`](crate::memory::MemoryArena)
//! (`create_dynamic`). None of them locks.

pub mod list;
pub mod queue;
pub mod stack;

pub use list::{Iter, ListId, NodeArena, NodeId, Placement, Slot};
pub use queue::RingQueue;
pub use stack::ByteStack;

use crate::memory::ArenaBox;

/// Backing bytes of a queue or stack.
enum ByteStorage<'a> {
    /// Caller-owned buffer, never freed by the container
    Static(&'a mut [u8]),
    /// Carved from the arena, freed on drop
    Dynamic(ArenaBox<'a, [u8]>),
}

impl<'a> ByteStorage<'a> {
    fn bytes(&self) -> &[u8] {
        match self {
            ByteStorage::Static(buf) => &buf[..],
            ByteStorage::Dynamic(buf) => &buf[..],
        }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        match self {
            ByteStorage::Static(buf) => &mut buf[..],
            ByteStorage::Dynamic(buf) => &mut buf[..],
        }
    }

    fn is_static(&self) -> bool {
        matches!(self, ByteStorage::Static(_))
    }

    /// Release the storage. A static buffer is handed back to its owner.
    fn release(self) -> Option<&'a mut [u8]> {
        match self {
            ByteStorage::Static(buf) => Some(buf),
            ByteStorage::Dynamic(_) => None,
        }
    }
}
