//! Memory management subsystem
//!
//! One fixed arena per board, carved by a first-fit allocator. Every
//! dynamically created container draws its storage from it through
//! [`ArenaBox`].

pub mod arena;
pub mod arena_box;
pub mod statistics;

// Re-exports
pub use arena::{MemoryArena, ALIGNMENT, HEADER_SIZE, MIN_BLOCK_SIZE};
pub use arena_box::ArenaBox;
pub use statistics::ArenaStats;
