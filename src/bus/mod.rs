//! Pub/sub data bus
//!
//! Named channels with callback subscribers and asynchronous fan-out
//! delivery. Publishing never blocks: payloads are queued onto a pool of
//! worker tasks. Channels are pinned to workers by name hash, which keeps
//! per-channel delivery in publish order while distinct channels fan out
//! in parallel.
//!
//! Every delivery passes through a binary codec round-trip (bincode): each
//! subscriber receives its own deserialized copy, so one subscriber's
//! mutations are never observed by another.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, warn};

use crate::data::{Content, DataPacket};
use crate::Result;

/// Bound on waiting for a worker task to exit during shutdown
const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Payload carried on a channel: a typed packet or an opaque value.
///
/// The serialization round-trip preserves which of the two it was, so
/// packet-shaped payloads are reconstituted as packets on delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BusPayload {
    Packet(DataPacket),
    Value(Content),
}

impl From<DataPacket> for BusPayload {
    fn from(packet: DataPacket) -> Self {
        BusPayload::Packet(packet)
    }
}

impl From<Content> for BusPayload {
    fn from(value: Content) -> Self {
        BusPayload::Value(value)
    }
}

/// Receiving end of a subscription.
///
/// Delivery carries the originating channel so a subscriber listening on
/// several channels can disambiguate.
#[async_trait]
pub trait BusSubscriber: Send + Sync {
    async fn deliver(&self, payload: BusPayload, channel: &str) -> Result<()>;
}

enum Job {
    Deliver { channel: String, payload: BusPayload },
    Shutdown,
}

#[derive(Default)]
struct ChannelState {
    subscribers: Vec<Arc<dyn BusSubscriber>>,
}

type ChannelTable = Arc<RwLock<HashMap<String, ChannelState>>>;

struct BusInner {
    channels: ChannelTable,
    shards: Vec<UnboundedSender<Job>>,
    enabled: AtomicBool,
}

/// Named channels, subscriptions, and a fan-out worker pool
#[derive(Clone)]
pub struct DataBus {
    inner: Arc<BusInner>,
    workers: Arc<Mutex<Vec<tokio::task::JoinHandle<()>>>>,
}

impl DataBus {
    /// Worker pool width used by [`DataBus::new`]
    pub fn default_worker_count() -> usize {
        num_cpus::get().clamp(10, 20)
    }

    /// Create a bus with the default worker pool width.
    ///
    /// Must be called within a Tokio runtime; the workers are spawned
    /// immediately.
    pub fn new() -> Self {
        Self::with_workers(Self::default_worker_count())
    }

    /// Create a bus with an explicit worker pool width
    pub fn with_workers(count: usize) -> Self {
        let count = count.max(1);
        let channels: ChannelTable = Arc::new(RwLock::new(HashMap::new()));
        let mut shards = Vec::with_capacity(count);
        let mut handles = Vec::with_capacity(count);

        for _ in 0..count {
            let (tx, rx) = mpsc::unbounded_channel();
            shards.push(tx);
            let table = Arc::clone(&channels);
            handles.push(tokio::spawn(worker_loop(table, rx)));
        }

        Self {
            inner: Arc::new(BusInner {
                channels,
                shards,
                enabled: AtomicBool::new(true),
            }),
            workers: Arc::new(Mutex::new(handles)),
        }
    }

    /// Create a channel if it does not exist yet. Idempotent: repeated
    /// registration keeps existing subscriptions intact.
    pub fn register_channel(&self, channel: &str) {
        self.inner
            .channels
            .write()
            .entry(channel.to_string())
            .or_default();
    }

    /// Append a subscriber to a channel, creating the channel if needed
    pub fn subscribe(&self, channel: &str, subscriber: Arc<dyn BusSubscriber>) {
        self.inner
            .channels
            .write()
            .entry(channel.to_string())
            .or_default()
            .subscribers
            .push(subscriber);
    }

    /// Queue a payload for delivery and return immediately.
    ///
    /// Dropped silently when the bus is disabled; nothing is scheduled
    /// when the channel has no subscribers.
    pub fn publish(&self, channel: &str, payload: impl Into<BusPayload>) {
        if !self.inner.enabled.load(Ordering::Acquire) {
            return;
        }
        {
            let channels = self.inner.channels.read();
            match channels.get(channel) {
                Some(state) if !state.subscribers.is_empty() => {}
                _ => return,
            }
        }

        let shard = &self.inner.shards[shard_index(channel, self.inner.shards.len())];
        let _ = shard.send(Job::Deliver {
            channel: channel.to_string(),
            payload: payload.into(),
        });
    }

    /// Gate delivery on or off without touching subscriptions
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    /// Drop all channels and subscriptions
    pub fn flush(&self) {
        self.inner.channels.write().clear();
    }

    /// Subscriber count per channel
    pub fn channel_stats(&self) -> HashMap<String, usize> {
        self.inner
            .channels
            .read()
            .iter()
            .map(|(name, state)| (name.clone(), state.subscribers.len()))
            .collect()
    }

    /// Disable, drain queued deliveries, and wait for workers to quit.
    /// Safe to call more than once; later calls are no-ops.
    pub async fn shutdown(&self) {
        self.set_enabled(false);
        for shard in &self.inner.shards {
            let _ = shard.send(Job::Shutdown);
        }

        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in handles {
            if tokio::time::timeout(WORKER_JOIN_TIMEOUT, handle).await.is_err() {
                warn!("bus worker did not exit within {WORKER_JOIN_TIMEOUT:?}");
            }
        }
        debug!("data bus shut down");
    }
}

impl Default for DataBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BusInner {
    fn drop(&mut self) {
        for shard in &self.shards {
            let _ = shard.send(Job::Shutdown);
        }
    }
}

fn shard_index(channel: &str, shard_count: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    channel.hash(&mut hasher);
    (hasher.finish() as usize) % shard_count
}

async fn worker_loop(table: ChannelTable, mut rx: UnboundedReceiver<Job>) {
    while let Some(job) = rx.recv().await {
        let (channel, payload) = match job {
            Job::Deliver { channel, payload } => (channel, payload),
            Job::Shutdown => break,
        };

        let subscribers: Vec<Arc<dyn BusSubscriber>> = {
            let channels = table.read();
            match channels.get(&channel) {
                Some(state) => state.subscribers.clone(),
                None => continue,
            }
        };
        if subscribers.is_empty() {
            continue;
        }

        // One encode per publish, one decode per subscriber: the codec
        // boundary that gives every callback its own copy.
        let bytes = match bincode::serialize(&payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(%channel, error = %e, "failed to encode payload; dropping");
                continue;
            }
        };

        for subscriber in subscribers {
            let copy: BusPayload = match bincode::deserialize(&bytes) {
                Ok(copy) => copy,
                Err(e) => {
                    error!(%channel, error = %e, "failed to decode payload copy");
                    continue;
                }
            };
            if let Err(e) = subscriber.deliver(copy, &channel).await {
                // Subscriber failures are isolated from the rest of the fan-out
                error!(%channel, error = %e, "subscriber delivery failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Content, DataPacket};
    use std::sync::Mutex as StdMutex;
    use tokio::time::{sleep, Duration};

    struct Collector {
        seen: StdMutex<Vec<BusPayload>>,
    }

    impl Collector {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: StdMutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl BusSubscriber for Collector {
        async fn deliver(&self, payload: BusPayload, _channel: &str) -> Result<()> {
            self.seen.lock().unwrap().push(payload);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_publish_fans_out_in_order() {
        let bus = DataBus::with_workers(4);
        let a = Collector::new();
        let b = Collector::new();
        bus.register_channel("numbers_out");
        bus.subscribe("numbers_out", a.clone());
        bus.subscribe("numbers_out", b.clone());

        for i in 0..20i64 {
            bus.publish("numbers_out", Content::Integer(i));
        }
        sleep(Duration::from_millis(200)).await;

        for collector in [&a, &b] {
            let seen = collector.seen.lock().unwrap();
            let values: Vec<i64> = seen
                .iter()
                .filter_map(|p| match p {
                    BusPayload::Value(Content::Integer(i)) => Some(*i),
                    _ => None,
                })
                .collect();
            assert_eq!(values, (0..20).collect::<Vec<_>>());
        }
        bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_disabled_bus_drops_payloads() {
        let bus = DataBus::with_workers(2);
        let sink = Collector::new();
        bus.subscribe("ch", sink.clone());

        bus.set_enabled(false);
        bus.publish("ch", Content::Integer(1));
        sleep(Duration::from_millis(100)).await;
        assert!(sink.seen.lock().unwrap().is_empty());

        bus.set_enabled(true);
        bus.publish("ch", Content::Integer(2));
        sleep(Duration::from_millis(100)).await;
        assert_eq!(sink.seen.lock().unwrap().len(), 1);
        bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_packet_payload_reconstituted() {
        let bus = DataBus::with_workers(2);
        let sink = Collector::new();
        bus.subscribe("ch", sink.clone());

        let packet = DataPacket::builder(Content::Float(1.5))
            .touched_by("gen_00aa11bb")
            .build();
        bus.publish("ch", packet.clone());
        sleep(Duration::from_millis(100)).await;

        let seen = sink.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        match &seen[0] {
            BusPayload::Packet(received) => assert_eq!(received, &packet),
            other => panic!("expected a packet, got {other:?}"),
        }
        bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_register_channel_idempotent() {
        let bus = DataBus::with_workers(1);
        let sink = Collector::new();
        bus.register_channel("ch");
        bus.subscribe("ch", sink);
        for _ in 0..5 {
            bus.register_channel("ch");
        }
        assert_eq!(bus.channel_stats()["ch"], 1);
        bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_twice_is_noop() {
        let bus = DataBus::with_workers(2);
        bus.shutdown().await;
        bus.shutdown().await;
    }
}
