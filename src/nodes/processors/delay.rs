//! Fixed-delay forwarder
//!
//! `process` enqueues inbound packets with their arrival instant; an
//! internal worker re-publishes each one once the configured delay has
//! elapsed. The delay is shared atomically so live parameter updates
//! apply to packets already queued.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::data::DataPacket;
use crate::node::{parse_params, ConfiguredNode, Emitter, NodeContext, NodeHandler, NodeProfile};
use crate::Result;

const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(default)]
pub struct DelayParams {
    /// Forwarding delay in milliseconds
    pub delay_ms: u64,
    /// Internal queue bound
    pub max_queue_size: usize,
    /// Drop on a full queue instead of exerting backpressure
    pub drop_on_overflow: bool,
}

impl Default for DelayParams {
    fn default() -> Self {
        Self {
            delay_ms: 1000,
            max_queue_size: 1000,
            drop_on_overflow: false,
        }
    }
}

/// Forwards packets unchanged after a fixed delay
pub struct DelayNode {
    params: DelayParams,
    delay_ms: Arc<AtomicU64>,
    queue: Option<mpsc::Sender<(Instant, DataPacket)>>,
    stop_tx: Option<watch::Sender<bool>>,
    worker: Option<tokio::task::JoinHandle<()>>,
}

impl DelayNode {
    async fn drain_queue(
        mut rx: mpsc::Receiver<(Instant, DataPacket)>,
        delay_ms: Arc<AtomicU64>,
        emitter: Emitter,
        mut stop_rx: watch::Receiver<bool>,
    ) {
        loop {
            let item = tokio::select! {
                _ = stop_rx.changed() => break,
                item = rx.recv() => item,
            };
            let Some((enqueued, packet)) = item else { break };

            let delay = Duration::from_millis(delay_ms.load(Ordering::Relaxed));
            let elapsed = enqueued.elapsed();
            if elapsed < delay {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = tokio::time::sleep(delay - elapsed) => {}
                }
            }

            emitter.publish(&packet);
            emitter.emit("processed_packets", json!(1));
        }
        debug!(node = %emitter.node_name(), "delay worker exited");
    }
}

#[async_trait]
impl NodeHandler for DelayNode {
    async fn start(&mut self, ctx: &mut NodeContext) -> Result<()> {
        let (tx, rx) = mpsc::channel(self.params.max_queue_size.max(1));
        let (stop_tx, stop_rx) = watch::channel(false);
        self.queue = Some(tx);
        self.stop_tx = Some(stop_tx);
        self.worker = Some(tokio::spawn(Self::drain_queue(
            rx,
            Arc::clone(&self.delay_ms),
            ctx.emitter(),
            stop_rx,
        )));
        Ok(())
    }

    async fn process(&mut self, ctx: &mut NodeContext) -> Result<()> {
        let Some(packet) = ctx.pop_first_input() else {
            return Ok(());
        };
        let Some(queue) = &self.queue else {
            warn!(node = %ctx.node_name(), "delay worker not started; dropping packet");
            return Ok(());
        };

        let item = (Instant::now(), packet);
        if self.params.drop_on_overflow {
            if queue.try_send(item).is_err() {
                warn!(node = %ctx.node_name(), "delay queue full; packet dropped");
                ctx.emit("dropped_packets", json!(1));
            }
        } else if queue.send(item).await.is_err() {
            warn!(node = %ctx.node_name(), "delay worker gone; packet dropped");
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.queue = None;
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        if let Some(worker) = self.worker.take() {
            let _ = tokio::time::timeout(WORKER_JOIN_TIMEOUT, worker).await;
        }
        Ok(())
    }

    fn apply_params(&mut self, params: &serde_json::Value) -> Result<()> {
        self.params = parse_params(params)?;
        self.delay_ms.store(self.params.delay_ms, Ordering::Relaxed);
        Ok(())
    }
}

impl ConfiguredNode for DelayNode {
    type Params = DelayParams;

    fn from_params(params: &serde_json::Value) -> Result<Self> {
        let params: DelayParams = parse_params(params)?;
        Ok(Self {
            delay_ms: Arc::new(AtomicU64::new(params.delay_ms)),
            params,
            queue: None,
            stop_tx: None,
            worker: None,
        })
    }

    fn profile() -> NodeProfile {
        NodeProfile::processor()
    }
}

crate::register_node!("delay", DelayNode);
