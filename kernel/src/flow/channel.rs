//! Canal de sortie : file + sink + minuterie de regroupement

use ek_types::{EkError, ErrorCode, Result, Ticks};

use crate::collections::{NodeId, RingQueue, Slot};
use crate::memory::ArenaBox;

/// Raw byte output of a channel (UART TX, USB CDC endpoint, ...).
///
/// `send` is synchronous: the chunk is only valid for the duration of the
/// call. A DMA-driven transmitter must copy it before returning.
pub trait Sink {
    fn send(&mut self, chunk: &[u8]);
}

impl<F> Sink for F
where
    F: FnMut(&[u8]),
{
    fn send(&mut self, chunk: &[u8]) {
        self(chunk)
    }
}

/// Handle to a registered channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub(crate) NodeId);

/// How the channel storage was provided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationMode {
    /// Caller-owned queue buffer and sink
    Static,
    /// Queue buffer and sink carved from the arena
    Dynamic,
}

/// Per-channel counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Bytes accepted into the queue
    pub bytes_written: usize,
    /// Bytes handed to the sink
    pub bytes_sent: usize,
    /// Queued bytes dropped to make room (`EvictOld`)
    pub bytes_evicted: usize,
    /// Payload or backlog bytes lost (rejected writes, failed drains)
    pub bytes_dropped: usize,
    pub drains: usize,
}

pub(crate) enum SinkSlot<'a> {
    Borrowed(&'a mut dyn Sink),
    Pooled(ArenaBox<'a, dyn Sink + 'a>),
}

impl SinkSlot<'_> {
    fn send(&mut self, chunk: &[u8]) {
        match self {
            SinkSlot::Borrowed(sink) => sink.send(chunk),
            SinkSlot::Pooled(sink) => sink.send(chunk),
        }
    }
}

/// One registry entry. Only reachable through a
/// [`FlowController`](super::FlowController); exposed so callers can size a
/// static [`ChannelSlot`] table.
pub struct Channel<'a> {
    pub(crate) queue: RingQueue<'a>,
    pub(crate) countdown: Ticks,
    pub(crate) sink: SinkSlot<'a>,
    pub(crate) mode: CreationMode,
    pub(crate) stats: ChannelStats,
}

/// Registry slot for [`FlowController::init_static`](super::FlowController::init_static).
pub type ChannelSlot<'a> = Slot<Channel<'a>>;

impl<'a> Channel<'a> {
    pub(crate) fn new(queue: RingQueue<'a>, sink: SinkSlot<'a>, mode: CreationMode) -> Self {
        Channel {
            queue,
            countdown: 0,
            sink,
            mode,
            stats: ChannelStats::default(),
        }
    }

    /// Free at least `needed` bytes by discarding the oldest data in steps
    /// of `step`. Empties the queue and fails if `needed` exceeds capacity.
    pub(crate) fn make_room(&mut self, needed: usize, step: usize) -> Result<()> {
        let mut missing = needed.saturating_sub(self.queue.remaining());
        while missing > 0 && !self.queue.is_empty() {
            let n = missing.min(step).min(self.queue.len());
            self.queue.discard(n)?;
            self.stats.bytes_evicted += n;
            missing -= n;
        }

        if needed > self.queue.remaining() {
            self.stats.bytes_dropped += self.queue.len();
            self.queue.clean();
            return Err(EkError::new(ErrorCode::InsufficientSpace));
        }
        Ok(())
    }

    /// Hand `chunk` to the sink and account for it.
    pub(crate) fn emit(&mut self, chunk: &[u8]) {
        self.sink.send(chunk);
        self.stats.bytes_sent += chunk.len();
        self.stats.drains += 1;
    }

    /// Drop the backlog after a failed drain.
    pub(crate) fn drop_backlog(&mut self) {
        self.stats.bytes_dropped += self.queue.len();
        self.queue.clean();
    }
}
