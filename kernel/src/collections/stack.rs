//! Pile d'octets (LIFO)

use ek_types::{EkError, ErrorCode, Result};

use super::ByteStorage;
use crate::memory::{ArenaBox, MemoryArena};

/// Fixed-capacity LIFO of bytes. `push` of a slice followed by `pop` of the
/// same length returns the slice unchanged.
pub struct ByteStack<'a> {
    storage: ByteStorage<'a>,
    capacity: usize,
    top: usize,
}

impl<'a> ByteStack<'a> {
    pub fn create_dynamic(arena: &'a MemoryArena<'a>, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(EkError::new(ErrorCode::InvalidParameter));
        }
        let buf = ArenaBox::new_zeroed_slice_in(capacity, arena)?;
        Ok(ByteStack {
            storage: ByteStorage::Dynamic(buf),
            capacity,
            top: 0,
        })
    }

    pub fn create_static(buffer: &'a mut [u8], capacity: usize) -> Result<Self> {
        if capacity == 0 || capacity > buffer.len() {
            return Err(EkError::new(ErrorCode::InvalidParameter));
        }
        Ok(ByteStack {
            storage: ByteStorage::Static(buffer),
            capacity,
            top: 0,
        })
    }

    pub fn delete(self) -> Option<&'a mut [u8]> {
        self.storage.release()
    }

    pub fn push(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(EkError::new(ErrorCode::InvalidParameter));
        }
        if data.len() > self.remaining() {
            return Err(EkError::new(ErrorCode::InsufficientSpace));
        }
        let top = self.top;
        self.storage.bytes_mut()[top..top + data.len()].copy_from_slice(data);
        self.top += data.len();
        Ok(())
    }

    pub fn pop(&mut self, out: &mut [u8]) -> Result<()> {
        self.peek(out)?;
        self.top -= out.len();
        Ok(())
    }

    /// Copy the top `out.len()` bytes without popping them.
    pub fn peek(&self, out: &mut [u8]) -> Result<()> {
        if out.is_empty() {
            return Err(EkError::new(ErrorCode::InvalidParameter));
        }
        if self.is_empty() {
            return Err(EkError::new(ErrorCode::Empty));
        }
        if out.len() > self.top {
            return Err(EkError::new(ErrorCode::InsufficientSpace));
        }
        out.copy_from_slice(&self.storage.bytes()[self.top - out.len()..self.top]);
        Ok(())
    }

    pub fn clean(&mut self) {
        self.top = 0;
    }

    pub fn len(&self) -> usize {
        self.top
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.top
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.top == 0
    }

    pub fn is_full(&self) -> bool {
        self.top == self.capacity
    }
}
