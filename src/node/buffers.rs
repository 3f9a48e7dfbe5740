//! Per-input bounded FIFO buffers
//!
//! Bus workers append on delivery; `process` implementations consume.
//! Each input is backed by a lock-free bounded ring
//! (`crossbeam::queue::ArrayQueue`), so buffering proceeds while the
//! owning node is mid-process and a full ring rejects the incoming
//! packet natively.

use crossbeam::queue::ArrayQueue;
use std::sync::Arc;

use crate::data::DataPacket;

/// Default per-input buffer capacity
pub const DEFAULT_BUFFER_CAPACITY: usize = 100;

struct Buffer {
    channel: String,
    queue: ArrayQueue<DataPacket>,
}

/// Fixed set of input buffers, one per subscribed input channel
#[derive(Clone)]
pub struct InputBuffers {
    capacity: usize,
    buffers: Arc<Vec<Buffer>>,
}

impl InputBuffers {
    pub fn new<S: AsRef<str>>(channels: &[S], capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            buffers: Arc::new(
                channels
                    .iter()
                    .map(|c| Buffer {
                        channel: c.as_ref().to_string(),
                        queue: ArrayQueue::new(capacity),
                    })
                    .collect(),
            ),
        }
    }

    fn buffer(&self, channel: &str) -> Option<&Buffer> {
        self.buffers.iter().find(|b| b.channel == channel)
    }

    /// Append a packet; returns `false` when the buffer is full (the
    /// packet is dropped) or the channel is not a declared input.
    pub fn push(&self, channel: &str, packet: DataPacket) -> bool {
        match self.buffer(channel) {
            Some(buffer) => buffer.queue.push(packet).is_ok(),
            None => false,
        }
    }

    /// Pop the oldest packet buffered for `channel`
    pub fn pop(&self, channel: &str) -> Option<DataPacket> {
        self.buffer(channel)?.queue.pop()
    }

    /// Buffered packet count for one channel
    pub fn len(&self, channel: &str) -> usize {
        self.buffer(channel).map_or(0, |b| b.queue.len())
    }

    pub fn is_empty(&self) -> bool {
        self.total_len() == 0
    }

    /// Number of input channels with at least one buffered packet
    pub fn non_empty_count(&self) -> usize {
        self.buffers.iter().filter(|b| !b.queue.is_empty()).count()
    }

    /// Total packets buffered across all inputs
    pub fn total_len(&self) -> usize {
        self.buffers.iter().map(|b| b.queue.len()).sum()
    }

    /// Declared input channels, in subscription order
    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.buffers.iter().map(|b| b.channel.as_str())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop everything buffered
    pub fn clear(&self) {
        for buffer in self.buffers.iter() {
            while buffer.queue.pop().is_some() {}
        }
    }
}
