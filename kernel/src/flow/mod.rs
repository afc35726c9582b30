//! Contrôleur de flux multi-canaux
//!
//! Several byte outputs share one periodic drain pass. Producers `write`
//! into a channel's [`RingQueue`]; `poll` walks the registry in priority
//! order and hands at most `max_chunk` bytes per due channel to its [`Sink`].
//!
//! Countdown per channel:
//!
//! ```text
//!   empty queue receives data   -> countdown = quiescent_interval
//!   poll, countdown > 0         -> countdown -= poll_interval
//!   poll, countdown == 0        -> drain one chunk, then
//!                                  countdown = poll_interval      (data left)
//!                                  countdown = quiescent_interval (queue empty)
//! ```
//!
//! No locking: writers and `poll` must run at the same priority or with the
//! relevant interrupts masked.

pub mod channel;
pub mod config;

use core::fmt;
use core::ptr::NonNull;

use ek_types::{EkError, ErrorCode, Result, Ticks};

use crate::collections::{Iter, ListId, NodeArena, RingQueue};
use crate::logger::BufferWriter;
use crate::memory::{ArenaBox, MemoryArena};

pub use channel::{Channel, ChannelId, ChannelSlot, ChannelStats, CreationMode, Sink};
pub use config::{FlowConfig, OverflowPolicy};

use channel::SinkSlot;

/// Registry of output channels plus their drain scheduler.
///
/// `'a` is the lifetime of everything a channel holds (arena blocks, static
/// queue buffers, borrowed sinks). `'r` only covers the registry table, so a
/// caller-owned table may be declared after the buffers it ends up holding.
pub struct FlowController<'r, 'a: 'r> {
    arena: &'a MemoryArena<'a>,
    registry: NodeArena<'r, Channel<'a>>,
    channels: ListId,
    config: FlowConfig,
    last_poll: Ticks,
}

impl<'r, 'a: 'r> FlowController<'r, 'a> {
    /// Controller whose registry table (`max_channels` entries) comes from
    /// `arena`. Scratch and chunk buffers are always taken from `arena`.
    pub fn init_dynamic(
        arena: &'a MemoryArena<'a>,
        max_channels: usize,
        config: FlowConfig,
    ) -> Result<Self> {
        config.validate()?;
        if max_channels == 0 {
            return Err(EkError::new(ErrorCode::InvalidParameter));
        }
        // One extra slot for the registry sentinel.
        let registry = NodeArena::create_dynamic(arena, max_channels + 1)?;
        Self::with_registry(arena, registry, config)
    }

    /// Controller over a caller-owned registry table. One slot is used by
    /// the registry itself, so `slots.len() - 1` channels fit.
    pub fn init_static(
        arena: &'a MemoryArena<'a>,
        slots: &'r mut [ChannelSlot<'a>],
        config: FlowConfig,
    ) -> Result<Self> {
        config.validate()?;
        if slots.len() < 2 {
            return Err(EkError::new(ErrorCode::InvalidParameter));
        }
        let registry = NodeArena::create_static(slots)?;
        Self::with_registry(arena, registry, config)
    }

    fn with_registry(
        arena: &'a MemoryArena<'a>,
        mut registry: NodeArena<'r, Channel<'a>>,
        config: FlowConfig,
    ) -> Result<Self> {
        if !arena.is_initialized() {
            return Err(EkError::new(ErrorCode::NotInitialized));
        }
        let channels = registry.create_list()?;
        log::debug!(
            "flow: registry ready, {} channel slots",
            registry.capacity() - 1
        );
        Ok(FlowController {
            arena,
            registry,
            channels,
            config,
            last_poll: 0,
        })
    }

    /// Register a channel whose queue and sink live in the arena.
    ///
    /// Transactional: if any step fails, everything allocated so far is
    /// released before the error is returned.
    pub fn create_channel_dynamic<S>(
        &mut self,
        sink: S,
        priority: u16,
        capacity: usize,
    ) -> Result<ChannelId>
    where
        S: Sink + 'a,
    {
        let queue = RingQueue::create_dynamic(self.arena, capacity)?;
        let sink = ArenaBox::into_raw(ArenaBox::new_in(sink, self.arena)?);
        let sink: NonNull<dyn Sink + 'a> = sink;
        // SAFETY: `sink` was just released by `into_raw` on an arena box.
        let sink = unsafe { ArenaBox::from_raw_in(sink, self.arena) };

        self.register(
            Channel::new(queue, SinkSlot::Pooled(sink), CreationMode::Dynamic),
            priority,
        )
    }

    /// Register a channel over a caller-owned buffer and sink.
    pub fn create_channel_static(
        &mut self,
        buffer: &'a mut [u8],
        sink: &'a mut dyn Sink,
        priority: u16,
        capacity: usize,
    ) -> Result<ChannelId> {
        let queue = RingQueue::create_static(buffer, capacity)?;
        self.register(
            Channel::new(queue, SinkSlot::Borrowed(sink), CreationMode::Static),
            priority,
        )
    }

    fn register(&mut self, mut channel: Channel<'a>, priority: u16) -> Result<ChannelId> {
        channel.countdown = self.config.quiescent_interval;
        // On failure `channel` is dropped here, freeing its queue and sink.
        let node = self.registry.create_node(channel, priority)?;
        if let Err(err) = self.registry.insert_ordered(self.channels, node) {
            if let Err(cleanup) = self.registry.delete_node(node) {
                log::warn!("flow: rollback of {:?} failed: {}", node, cleanup);
            }
            return Err(err);
        }
        log::debug!("flow: channel {:?} registered, priority {}", node, priority);
        Ok(ChannelId(node))
    }

    /// Unregister a channel and release its queue and sink.
    pub fn delete_channel(&mut self, id: ChannelId) -> Result<()> {
        self.channel(id)?;
        self.registry.remove(self.channels, id.0)?;
        let Channel {
            queue, sink, mode, ..
        } = self.registry.delete_node(id.0)?;
        let _ = queue.delete();
        drop(sink);
        log::debug!("flow: channel {:?} ({:?}) deleted", id.0, mode);
        Ok(())
    }

    /// Format `args` and queue the result on `id`.
    ///
    /// The text is rendered into a `scratch_size` buffer from the arena and
    /// cut at `scratch_size - 1` bytes. Overflow follows the configured
    /// [`OverflowPolicy`].
    pub fn write(&mut self, id: ChannelId, args: fmt::Arguments<'_>) -> Result<()> {
        self.channel(id)?;
        let size = self.config.scratch_size;
        let mut scratch = ArenaBox::new_zeroed_slice_in(size, self.arena)?;

        let len = {
            let mut writer = BufferWriter::new(&mut scratch[..size - 1]);
            let _ = fmt::write(&mut writer, args);
            if writer.is_truncated() {
                log::trace!("flow: message truncated to {} bytes", size - 1);
            }
            writer.len()
        };
        self.enqueue_payload(id, &scratch[..len])
    }

    /// Queue raw bytes on `id`, cut at `scratch_size - 1` like [`write`](Self::write).
    pub fn write_bytes(&mut self, id: ChannelId, data: &[u8]) -> Result<()> {
        let len = data.len().min(self.config.scratch_size - 1);
        self.enqueue_payload(id, &data[..len])
    }

    fn enqueue_payload(&mut self, id: ChannelId, payload: &[u8]) -> Result<()> {
        let config = self.config;
        let channel = self.channel_mut(id)?;
        if payload.is_empty() {
            return Err(EkError::new(ErrorCode::InvalidParameter));
        }

        if payload.len() > channel.queue.remaining() {
            match config.policy {
                OverflowPolicy::RejectNew => {
                    channel.stats.bytes_dropped += payload.len();
                    return Err(EkError::new(ErrorCode::InsufficientSpace));
                }
                OverflowPolicy::EvictOld => {
                    if let Err(err) = channel.make_room(payload.len(), config.evict_chunk) {
                        channel.stats.bytes_dropped += payload.len();
                        return Err(err);
                    }
                }
            }
        }

        let was_empty = channel.queue.is_empty();
        channel.queue.enqueue(payload)?;
        channel.stats.bytes_written += payload.len();
        if was_empty {
            channel.countdown = config.quiescent_interval;
        }
        Ok(())
    }

    /// Drain pass. Does nothing until more than `poll_interval` ticks have
    /// elapsed since the previous pass.
    ///
    /// Every registered channel is visited at most once. A chunk buffer that
    /// cannot be allocated costs that channel its backlog; the pass goes on.
    pub fn poll<F>(&mut self, mut tick: F) -> Result<()>
    where
        F: FnMut() -> Ticks,
    {
        let count = self.registry.len(self.channels)?;
        if count == 0 {
            return Err(EkError::new(ErrorCode::Empty));
        }
        if tick().wrapping_sub(self.last_poll) <= self.config.poll_interval {
            return Ok(());
        }

        let mut cursor = self.registry.head(self.channels)?;
        let mut visited = 0;
        while let Some(node) = cursor {
            if visited == count {
                break;
            }
            visited += 1;
            cursor = self.registry.next(node);

            if let Some(channel) = self.registry.get_mut(node) {
                Self::service(channel, self.arena, &self.config);
            }
        }

        self.last_poll = tick();
        Ok(())
    }

    fn service(channel: &mut Channel<'a>, arena: &'a MemoryArena<'a>, config: &FlowConfig) {
        if channel.queue.is_empty() {
            return;
        }
        if channel.countdown > 0 {
            channel.countdown = channel.countdown.saturating_sub(config.poll_interval);
            return;
        }

        let send = channel.queue.len().min(config.max_chunk);
        let mut chunk = match ArenaBox::new_zeroed_slice_in(send, arena) {
            Ok(chunk) => chunk,
            Err(_) => {
                log::warn!(
                    "flow: no {}-byte chunk available, dropping {} queued bytes",
                    send,
                    channel.queue.len()
                );
                channel.drop_backlog();
                channel.countdown = config.quiescent_interval;
                return;
            }
        };

        if channel.queue.dequeue(&mut chunk).is_err() {
            channel.drop_backlog();
            channel.countdown = config.quiescent_interval;
            return;
        }
        channel.emit(&chunk);
        drop(chunk);

        channel.countdown = if channel.queue.is_empty() {
            config.quiescent_interval
        } else {
            config.poll_interval
        };
    }

    /// Bytes waiting in the queue of `id`.
    pub fn pending(&self, id: ChannelId) -> Result<usize> {
        Ok(self.channel(id)?.queue.len())
    }

    pub fn stats(&self, id: ChannelId) -> Result<ChannelStats> {
        Ok(self.channel(id)?.stats)
    }

    pub fn mode(&self, id: ChannelId) -> Result<CreationMode> {
        Ok(self.channel(id)?.mode)
    }

    /// Ticks left before `id` is drained.
    pub fn countdown(&self, id: ChannelId) -> Result<Ticks> {
        Ok(self.channel(id)?.countdown)
    }

    pub fn channel_count(&self) -> usize {
        self.registry.len(self.channels).unwrap_or(0)
    }

    /// Registered channels in drain order (ascending priority value).
    pub fn channel_ids(&self) -> ChannelIds<'_, 'a> {
        ChannelIds {
            inner: self.registry.iter(self.channels),
        }
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    fn channel(&self, id: ChannelId) -> Result<&Channel<'a>> {
        self.registry
            .get(id.0)
            .ok_or(EkError::new(ErrorCode::NotFound))
    }

    fn channel_mut(&mut self, id: ChannelId) -> Result<&mut Channel<'a>> {
        self.registry
            .get_mut(id.0)
            .ok_or(EkError::new(ErrorCode::NotFound))
    }
}

/// Iterator returned by [`FlowController::channel_ids`].
pub struct ChannelIds<'c, 'a> {
    inner: Iter<'c, Channel<'a>>,
}

impl Iterator for ChannelIds<'_, '_> {
    type Item = ChannelId;

    fn next(&mut self) -> Option<ChannelId> {
        self.inner.next().map(|(node, _)| ChannelId(node))
    }
}
