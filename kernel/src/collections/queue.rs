//! File circulaire d'octets (ring buffer)
//!
//! `front` is the next byte to read, `rear` the next byte to write, `size`
//! the bytes in between modulo capacity. Keeping `size` explicitly lets the
//! queue use every byte of its buffer (`front == rear` is both empty and
//! full; `size` tells which).

use ek_types::{EkError, ErrorCode, Result};

use super::ByteStorage;
use crate::memory::{ArenaBox, MemoryArena};

/// Fixed-capacity FIFO of bytes.
pub struct RingQueue<'a> {
    storage: ByteStorage<'a>,
    capacity: usize,
    front: usize,
    rear: usize,
    size: usize,
}

impl<'a> RingQueue<'a> {
    /// Queue of `capacity` bytes allocated from `arena`.
    pub fn create_dynamic(arena: &'a MemoryArena<'a>, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(EkError::new(ErrorCode::InvalidParameter));
        }
        let buf = ArenaBox::new_zeroed_slice_in(capacity, arena)?;
        Ok(Self::with_storage(ByteStorage::Dynamic(buf), capacity))
    }

    /// Queue over the first `capacity` bytes of a caller-owned buffer.
    pub fn create_static(buffer: &'a mut [u8], capacity: usize) -> Result<Self> {
        if capacity == 0 || capacity > buffer.len() {
            return Err(EkError::new(ErrorCode::InvalidParameter));
        }
        Ok(Self::with_storage(ByteStorage::Static(buffer), capacity))
    }

    fn with_storage(storage: ByteStorage<'a>, capacity: usize) -> Self {
        RingQueue {
            storage,
            capacity,
            front: 0,
            rear: 0,
            size: 0,
        }
    }

    /// Destroy the queue. Arena storage is freed; a static buffer is handed
    /// back to the caller untouched.
    pub fn delete(self) -> Option<&'a mut [u8]> {
        self.storage.release()
    }

    pub fn is_static(&self) -> bool {
        self.storage.is_static()
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn is_full(&self) -> bool {
        self.size == self.capacity
    }

    /// Bytes currently queued.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append all of `data` or nothing.
    pub fn enqueue(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(EkError::new(ErrorCode::InvalidParameter));
        }
        if self.is_full() {
            return Err(EkError::new(ErrorCode::Full));
        }
        if data.len() > self.remaining() {
            return Err(EkError::new(ErrorCode::InsufficientSpace));
        }

        let cap = self.capacity;
        let rear = self.rear;
        let first = data.len().min(cap - rear);
        let buf = &mut self.storage.bytes_mut()[..cap];
        buf[rear..rear + first].copy_from_slice(&data[..first]);
        buf[..data.len() - first].copy_from_slice(&data[first..]);

        self.rear = (rear + data.len()) % cap;
        self.size += data.len();
        Ok(())
    }

    /// Remove `out.len()` bytes from the front into `out`.
    pub fn dequeue(&mut self, out: &mut [u8]) -> Result<()> {
        self.peek_front(out)?;
        self.advance(out.len());
        Ok(())
    }

    /// Copy `out.len()` bytes from the front without consuming them.
    pub fn peek_front(&self, out: &mut [u8]) -> Result<()> {
        if out.is_empty() {
            return Err(EkError::new(ErrorCode::InvalidParameter));
        }
        if self.is_empty() {
            return Err(EkError::new(ErrorCode::Empty));
        }
        if out.len() > self.size {
            return Err(EkError::new(ErrorCode::InsufficientSpace));
        }

        let cap = self.capacity;
        let front = self.front;
        let first = out.len().min(cap - front);
        let buf = &self.storage.bytes()[..cap];
        let (head, wrapped) = out.split_at_mut(first);
        head.copy_from_slice(&buf[front..front + first]);
        wrapped.copy_from_slice(&buf[..wrapped.len()]);
        Ok(())
    }

    /// Drop `count` bytes from the front without copying them out.
    pub fn discard(&mut self, count: usize) -> Result<()> {
        if count == 0 {
            return Err(EkError::new(ErrorCode::InvalidParameter));
        }
        if self.is_empty() {
            return Err(EkError::new(ErrorCode::Empty));
        }
        if count > self.size {
            return Err(EkError::new(ErrorCode::InsufficientSpace));
        }
        self.advance(count);
        Ok(())
    }

    /// Reset to empty. The backing buffer is kept.
    pub fn clean(&mut self) {
        self.front = 0;
        self.rear = 0;
        self.size = 0;
    }

    fn advance(&mut self, count: usize) {
        self.front = (self.front + count) % self.capacity;
        self.size -= count;
    }
}
