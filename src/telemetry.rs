//! Telemetry bridge
//!
//! A process-wide bridge between synchronous producers (node handlers,
//! bus workers, the frame loop) and attached observers. Producers call
//! [`TelemetryBridge::emit`], which is non-blocking and best-effort; a
//! broadcaster thread drains the bounded queue and fans each record out
//! to the attached [`TelemetrySink`]s. Sinks that fail to deliver are
//! dropped from the set.

use chrono::{DateTime, Utc};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, warn};

/// Queue capacity; emits beyond this are dropped rather than blocking
const QUEUE_CAPACITY: usize = 1024;

/// Poll interval for the broadcaster's shutdown check
const DRAIN_POLL: Duration = Duration::from_millis(250);

/// One telemetry datum
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// Owning pipeline
    pub pipeline_id: String,
    /// Emitting node; `None` for pipeline-level events
    pub node_id: Option<String>,
    /// Metric name (e.g. "execution_time", "current_fps")
    pub metric: String,
    /// Metric payload
    pub value: serde_json::Value,
    /// Emission instant
    pub timestamp: DateTime<Utc>,
}

impl TelemetryRecord {
    pub fn new(
        pipeline_id: impl Into<String>,
        node_id: Option<String>,
        metric: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            node_id,
            metric: metric.into(),
            value,
            timestamp: Utc::now(),
        }
    }
}

/// Push observer attached to the bridge
pub trait TelemetrySink: Send {
    /// Deliver one record. An `Err` removes the sink from the set.
    fn deliver(&mut self, record: &TelemetryRecord) -> std::result::Result<(), String>;
}

/// Blanket adapter so closures can be attached directly
impl<F> TelemetrySink for F
where
    F: FnMut(&TelemetryRecord) -> std::result::Result<(), String> + Send,
{
    fn deliver(&mut self, record: &TelemetryRecord) -> std::result::Result<(), String> {
        self(record)
    }
}

struct SinkEntry {
    id: u64,
    sink: Box<dyn TelemetrySink>,
}

struct Shared {
    tx: Sender<TelemetryRecord>,
    rx: Receiver<TelemetryRecord>,
    sinks: Mutex<Vec<SinkEntry>>,
    next_sink_id: AtomicU64,
    broadcaster_started: AtomicBool,
    running: AtomicBool,
    dropped: AtomicU64,
}

/// Queue plus broadcaster plus subscriber set
#[derive(Clone)]
pub struct TelemetryBridge {
    shared: Arc<Shared>,
}

impl TelemetryBridge {
    pub fn new() -> Self {
        let (tx, rx) = channel::bounded(QUEUE_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                tx,
                rx,
                sinks: Mutex::new(Vec::new()),
                next_sink_id: AtomicU64::new(1),
                broadcaster_started: AtomicBool::new(false),
                running: AtomicBool::new(true),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Queue a record. Never blocks; with no sinks attached it is a
    /// no-op, and on a full queue the record is dropped and counted.
    pub fn emit(&self, record: TelemetryRecord) {
        let shared = &self.shared;
        if shared.sinks.lock().is_empty() {
            return;
        }
        match shared.tx.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                shared.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Attach a sink; returns an id usable with [`detach`](Self::detach).
    /// The broadcaster thread starts lazily with the first sink.
    pub fn attach(&self, sink: impl TelemetrySink + 'static) -> u64 {
        let shared = &self.shared;
        let id = shared.next_sink_id.fetch_add(1, Ordering::Relaxed);
        shared.sinks.lock().push(SinkEntry {
            id,
            sink: Box::new(sink),
        });
        self.ensure_broadcaster();
        id
    }

    /// Remove a sink by id; returns whether it was present.
    pub fn detach(&self, id: u64) -> bool {
        let mut sinks = self.shared.sinks.lock();
        let before = sinks.len();
        sinks.retain(|entry| entry.id != id);
        sinks.len() != before
    }

    /// Records dropped due to a full queue since startup
    pub fn dropped_count(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Stop the broadcaster thread (tests tearing the process down).
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);
    }

    fn ensure_broadcaster(&self) {
        let shared = &self.shared;
        if shared
            .broadcaster_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let worker = Arc::clone(shared);
        std::thread::Builder::new()
            .name("telemetry-broadcaster".into())
            .spawn(move || drain_loop(&worker))
            .expect("failed to spawn telemetry broadcaster");
    }
}

fn drain_loop(shared: &Shared) {
    debug!("telemetry broadcaster started");
    while shared.running.load(Ordering::Acquire) {
        let record = match shared.rx.recv_timeout(DRAIN_POLL) {
            Ok(record) => record,
            Err(channel::RecvTimeoutError::Timeout) => continue,
            Err(channel::RecvTimeoutError::Disconnected) => break,
        };

        let mut sinks = shared.sinks.lock();
        sinks.retain_mut(|entry| match entry.sink.deliver(&record) {
            Ok(()) => true,
            Err(reason) => {
                warn!(sink = entry.id, %reason, "removing failed telemetry sink");
                false
            }
        });
    }
    debug!("telemetry broadcaster stopped");
}

impl Default for TelemetryBridge {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide bridge instance
pub fn telemetry() -> &'static TelemetryBridge {
    static BRIDGE: OnceLock<TelemetryBridge> = OnceLock::new();
    BRIDGE.get_or_init(TelemetryBridge::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_records_reach_attached_sink() {
        let bridge = TelemetryBridge::new();
        let (tx, rx) = mpsc::channel();
        let id = bridge.attach(move |record: &TelemetryRecord| {
            tx.send(record.metric.clone()).map_err(|e| e.to_string())
        });

        bridge.emit(TelemetryRecord::new(
            "pipe-1",
            Some("node-1".into()),
            "execution_time",
            serde_json::json!(0.004),
        ));

        let metric = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(metric, "execution_time");
        assert!(bridge.detach(id));
        bridge.stop();
    }

    #[test]
    fn test_failing_sink_is_removed() {
        let bridge = TelemetryBridge::new();
        let (tx, rx) = mpsc::channel();
        let _probe = bridge.attach(move |record: &TelemetryRecord| {
            let _ = tx.send(record.metric.clone());
            Ok(())
        });
        let failing = bridge.attach(|_: &TelemetryRecord| Err("sink closed".to_string()));

        bridge.emit(TelemetryRecord::new(
            "pipe-2",
            None,
            "current_fps",
            serde_json::json!(60),
        ));
        rx.recv_timeout(Duration::from_secs(2)).unwrap();

        // The failing sink was dropped during fan-out; detach now misses.
        assert!(!bridge.detach(failing));
        bridge.stop();
    }

    #[test]
    fn test_emit_without_sinks_is_noop() {
        let bridge = TelemetryBridge::new();
        for _ in 0..(QUEUE_CAPACITY * 2) {
            bridge.emit(TelemetryRecord::new("p", None, "m", serde_json::json!(1)));
        }
        assert_eq!(bridge.dropped_count(), 0);
    }
}
