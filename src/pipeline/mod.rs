//! Pipeline: graph construction and execution
//!
//! A pipeline owns a data bus and a set of nodes built from declarative
//! configuration. Construction is a four-pass procedure (instantiate,
//! wire channels, seed buffers, bind parameter references) that commits
//! atomically. Execution runs one frame-paced loop task per pipeline;
//! event-driven nodes additionally fire on bus deliveries.

pub mod manager;

pub use manager::PipelineManager;

use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::bus::DataBus;
use crate::config::{output_channel, PipelineConfig};
use crate::node::binding::{self, REF_PREFIX};
use crate::node::registry::NodeRegistry;
use crate::node::NodeCell;
use crate::telemetry::{telemetry, TelemetryRecord};
use crate::{Error, Result};

/// Bound on waiting for a node's `stop` hook
const NODE_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Bound on joining the run loop during shutdown
const LOOP_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Minimal sleep when `fps_limit <= 0`, so the loop always yields
const UNPACED_FRAME_SLEEP: Duration = Duration::from_millis(1);

/// Node summary returned by [`Pipeline::nodes`]
#[derive(Debug, Clone, serde::Serialize)]
pub struct NodeDescription {
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub params: serde_json::Value,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

struct PipelineState {
    config: PipelineConfig,
    cells: Vec<Arc<NodeCell>>,
    node_map: HashMap<String, usize>,
    bus: DataBus,
}

/// A built, runnable dataflow graph
pub struct Pipeline {
    id: String,
    /// Config lock: guards config, graph state, and live param updates
    state: tokio::sync::Mutex<PipelineState>,
    /// Build lock: serializes full rebuilds and hot reconfiguration
    build_lock: tokio::sync::Mutex<()>,
    running: Arc<AtomicBool>,
    in_frame: Arc<AtomicBool>,
    frame_count: Arc<AtomicU64>,
    current_fps: Arc<parking_lot::Mutex<f64>>,
    loop_handle: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
    /// Set once shutdown has drained the bus; the next build or run
    /// starts from a fresh bus and graph
    bus_retired: AtomicBool,
}

impl Pipeline {
    /// Create an unbuilt pipeline. Must be called within a Tokio runtime
    /// (the owned bus spawns its workers immediately).
    pub fn new(id: impl Into<String>, config: PipelineConfig) -> Self {
        Self {
            id: id.into(),
            state: tokio::sync::Mutex::new(PipelineState {
                config,
                cells: Vec::new(),
                node_map: HashMap::new(),
                bus: DataBus::new(),
            }),
            build_lock: tokio::sync::Mutex::new(()),
            running: Arc::new(AtomicBool::new(false)),
            in_frame: Arc::new(AtomicBool::new(false)),
            frame_count: Arc::new(AtomicU64::new(0)),
            current_fps: Arc::new(parking_lot::Mutex::new(0.0)),
            loop_handle: tokio::sync::Mutex::new(None),
            bus_retired: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Frames completed since the last start
    pub fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::Relaxed)
    }

    /// Most recent one-second frame rate measurement
    pub fn current_fps(&self) -> f64 {
        *self.current_fps.lock()
    }

    /// True while the loop task is inside a frame body
    pub fn in_frame(&self) -> bool {
        self.in_frame.load(Ordering::Acquire)
    }

    /// Handle to the owned bus (tests and embedding hosts)
    pub async fn bus(&self) -> DataBus {
        self.state.lock().await.bus.clone()
    }

    /// Look up a node cell by configured name
    pub async fn node(&self, name: &str) -> Option<Arc<NodeCell>> {
        let state = self.state.lock().await;
        state.node_map.get(name).map(|&i| state.cells[i].clone())
    }

    /// Summaries of every node in declared order
    pub async fn nodes(&self) -> Vec<NodeDescription> {
        let state = self.state.lock().await;
        let mut out = Vec::with_capacity(state.cells.len());
        for cell in &state.cells {
            out.push(NodeDescription {
                name: cell.name().to_string(),
                node_type: cell.node_type().to_string(),
                params: cell.params().await,
                inputs: cell.input_channels().to_vec(),
                outputs: vec![output_channel(cell.name())],
            });
        }
        out
    }

    /// Construct the graph from the current config.
    ///
    /// Prior graph state is cleared first; configuration errors leave the
    /// pipeline empty rather than partially built.
    pub async fn build(&self) -> Result<()> {
        let _build = self.build_lock.lock().await;
        let mut state = self.state.lock().await;
        if self.bus_retired.swap(false, Ordering::SeqCst) {
            state.bus = DataBus::new();
        }
        build_graph(&self.id, &mut state)
    }

    /// Start dataflow: enable the bus, run node `start` hooks, spawn the
    /// frame loop. Idempotent while running.
    ///
    /// After a full shutdown the graph is rebuilt from the stored config
    /// on a fresh bus before starting.
    pub async fn run(&self) -> Result<()> {
        if self.bus_retired.load(Ordering::SeqCst) {
            self.build().await?;
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let state = self.state.lock().await;
        state.bus.set_enabled(true);
        self.frame_count.store(0, Ordering::Relaxed);
        *self.current_fps.lock() = 0.0;

        for cell in &state.cells {
            if let Err(e) = cell.start().await {
                // Resource failures are per-node; the rest of the graph
                // still comes up
                error!(node = %cell.name(), error = %e, "node start failed");
            }
        }

        let worker = LoopWorker {
            pipeline_id: self.id.clone(),
            cells: state.cells.clone(),
            fps_limit: state.config.settings.fps_limit,
            running: Arc::clone(&self.running),
            in_frame: Arc::clone(&self.in_frame),
            frame_count: Arc::clone(&self.frame_count),
            current_fps: Arc::clone(&self.current_fps),
        };
        drop(state);

        *self.loop_handle.lock().await = Some(tokio::spawn(worker.run()));
        info!(pipeline = %self.id, "pipeline started");
        Ok(())
    }

    /// Stop dataflow. Idempotent; per-node failures are swallowed, a
    /// straggling loop task is logged and abandoned.
    ///
    /// Safe to call from any task except a node's own `process`.
    pub async fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let state = self.state.lock().await;
        state.bus.set_enabled(false);

        for cell in &state.cells {
            match timeout(NODE_STOP_TIMEOUT, cell.stop()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(node = %cell.name(), error = %e, "node stop failed"),
                Err(_) => warn!(
                    node = %cell.name(),
                    "node did not stop within {NODE_STOP_TIMEOUT:?}; continuing shutdown"
                ),
            }
        }
        let bus = state.bus.clone();
        drop(state);

        if let Some(handle) = self.loop_handle.lock().await.take() {
            if timeout(LOOP_JOIN_TIMEOUT, handle).await.is_err() {
                warn!(pipeline = %self.id, "run loop did not exit within {LOOP_JOIN_TIMEOUT:?}");
            }
        }

        bus.shutdown().await;
        self.bus_retired.store(true, Ordering::SeqCst);
        info!(pipeline = %self.id, "pipeline stopped");
    }

    /// Hot reconfiguration: tear the graph down, rebuild from the new
    /// config, carry node state across by name, and resume if the
    /// pipeline was running.
    pub async fn update_config(&self, new_config: PipelineConfig) -> Result<()> {
        let _build = self.build_lock.lock().await;
        let was_running = self.is_running();

        let snapshots: HashMap<String, (String, serde_json::Value)> = {
            let state = self.state.lock().await;
            let mut snapshots = HashMap::new();
            for cell in &state.cells {
                if let Some(snapshot) = cell.save_state().await {
                    snapshots.insert(
                        cell.name().to_string(),
                        (cell.node_type().to_string(), snapshot),
                    );
                }
            }
            snapshots
        };

        self.shutdown().await;

        {
            let mut state = self.state.lock().await;
            let old_bus = std::mem::replace(&mut state.bus, DataBus::new());
            old_bus.flush();
            self.bus_retired.store(false, Ordering::SeqCst);
            state.config = new_config;
            build_graph(&self.id, &mut state)?;

            for cell in &state.cells {
                if let Some((node_type, snapshot)) = snapshots.get(cell.name()) {
                    if node_type == cell.node_type() {
                        cell.restore_state(snapshot.clone()).await;
                    }
                }
            }
        }

        if was_running {
            self.run().await?;
        }
        Ok(())
    }

    /// Replace one node's parameters without rebuilding.
    ///
    /// The proposed object is validated against the node type's schema;
    /// on failure the prior parameters stay in force. On success the new
    /// object is applied live and persisted into the stored config so a
    /// later rebuild preserves it (existing `@ref:` entries survive).
    pub async fn update_node_params(
        &self,
        node_name: &str,
        params: serde_json::Value,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let cell = state
            .node_map
            .get(node_name)
            .map(|&i| state.cells[i].clone())
            .ok_or_else(|| Error::Config(format!("unknown node '{node_name}'")))?;

        // Live rebinding is not supported; reference entries are dropped
        // from the proposal and the existing bindings stay active.
        let mut cleaned = params;
        if let Some(map) = cleaned.as_object_mut() {
            map.retain(|key, value| {
                let is_ref = value.as_str().is_some_and(|s| s.starts_with(REF_PREFIX));
                if is_ref {
                    warn!(node = %node_name, param = %key, "ignoring reference entry in live update");
                }
                !is_ref
            });
        }

        NodeRegistry::global().validate_params(cell.node_type(), &cleaned)?;
        cell.replace_params(cleaned.clone()).await?;

        if let Some(spec) = state.config.nodes.iter_mut().find(|s| s.name == node_name) {
            let mut persisted = cleaned;
            if let (Some(new_map), Some(old_map)) =
                (persisted.as_object_mut(), spec.params.as_object())
            {
                for (key, value) in old_map {
                    let is_ref = value.as_str().is_some_and(|s| s.starts_with(REF_PREFIX));
                    if is_ref && !new_map.contains_key(key) {
                        new_map.insert(key.clone(), value.clone());
                    }
                }
            }
            spec.params = persisted;
        }

        debug!(node = %node_name, "node params updated");
        Ok(())
    }
}

/// Four-pass graph construction. Fallible work happens against
/// temporaries; the graph is committed only when every pass succeeded.
fn build_graph(pipeline_id: &str, state: &mut PipelineState) -> Result<()> {
    state.cells.clear();
    state.node_map.clear();

    let config = state.config.clone();
    config.validate()?;
    let registry = NodeRegistry::global();

    // Pass 1: instantiate every node
    let mut cells: Vec<Arc<NodeCell>> = Vec::with_capacity(config.nodes.len());
    let mut node_map = HashMap::with_capacity(config.nodes.len());

    for spec in &config.nodes {
        let profile = registry.profile(&spec.node_type)?;

        if spec.inputs.len() < profile.min_inputs {
            return Err(Error::Config(format!(
                "node '{}' requires at least {} input(s), {} declared",
                spec.name,
                profile.min_inputs,
                spec.inputs.len()
            )));
        }
        if let Some(max) = profile.max_inputs {
            if spec.inputs.len() > max {
                return Err(Error::Config(format!(
                    "node '{}' takes at most {} input(s), {} declared",
                    spec.name,
                    max,
                    spec.inputs.len()
                )));
            }
        }

        let schema = registry.params_schema(&spec.node_type)?;
        let mut params = spec.params.clone();
        let bindings = binding::extract_bindings(&mut params, &schema)?;
        for bound in &bindings {
            if !config.nodes.iter().any(|n| n.name == bound.upstream) {
                return Err(Error::Config(format!(
                    "node '{}' references unknown node '{}' in param '{}'",
                    spec.name, bound.upstream, bound.param
                )));
            }
        }

        registry
            .validate_params(&spec.node_type, &params)
            .map_err(|e| Error::InvalidParams {
                node: spec.name.clone(),
                reason: e.to_string(),
            })?;
        let handler = registry
            .create(&spec.node_type, &params)
            .map_err(|e| match e {
                Error::InvalidParams { reason, .. } => Error::InvalidParams {
                    node: spec.name.clone(),
                    reason,
                },
                other => other,
            })?;

        let input_channels: Vec<String> = spec.inputs.iter().map(|n| output_channel(n)).collect();
        let outputs = vec![output_channel(&spec.name)];

        node_map.insert(spec.name.clone(), cells.len());
        cells.push(Arc::new(NodeCell::new(
            spec.name.clone(),
            spec.node_type.clone(),
            pipeline_id.to_string(),
            profile,
            handler,
            input_channels,
            outputs,
            bindings,
            params,
            state.bus.clone(),
        )));
    }

    // Pass 2: register output channels, then subscribe inputs
    for cell in &cells {
        state.bus.register_channel(&output_channel(cell.name()));
    }
    for cell in &cells {
        for channel in cell.input_channels() {
            state
                .bus
                .subscribe(channel, cell.clone() as Arc<dyn crate::bus::BusSubscriber>);
        }
    }

    // Pass 3: input buffers were seeded empty at cell construction

    // Pass 4: subscribe reference channels not already covered by inputs
    for cell in &cells {
        for channel in cell.binding_channels() {
            if !cell.input_channels().contains(&channel) {
                state
                    .bus
                    .subscribe(&channel, cell.clone() as Arc<dyn crate::bus::BusSubscriber>);
            }
        }
    }

    info!(pipeline = %pipeline_id, nodes = cells.len(), "pipeline built");
    state.cells = cells;
    state.node_map = node_map;
    Ok(())
}

struct LoopWorker {
    pipeline_id: String,
    cells: Vec<Arc<NodeCell>>,
    fps_limit: f64,
    running: Arc<AtomicBool>,
    in_frame: Arc<AtomicBool>,
    frame_count: Arc<AtomicU64>,
    current_fps: Arc<parking_lot::Mutex<f64>>,
}

impl LoopWorker {
    async fn run(self) {
        let frame_duration = if self.fps_limit > 0.0 {
            Duration::from_secs_f64(1.0 / self.fps_limit)
        } else {
            Duration::ZERO
        };
        let mut fps_mark = Instant::now();
        let mut frames_since_mark = 0u64;

        debug!(pipeline = %self.pipeline_id, fps = self.fps_limit, "run loop started");
        while self.running.load(Ordering::Acquire) {
            self.in_frame.store(true, Ordering::Release);
            let frame_start = Instant::now();
            let frame = self.frame_count.load(Ordering::Relaxed);

            for cell in &self.cells {
                if let Err(e) = cell.tick(frame).await {
                    // Processing failures never take the loop down
                    error!(node = %cell.name(), error = %e, "process failed");
                }
            }

            self.in_frame.store(false, Ordering::Release);
            self.frame_count.fetch_add(1, Ordering::Relaxed);
            frames_since_mark += 1;

            let mark_elapsed = fps_mark.elapsed();
            if mark_elapsed >= Duration::from_secs(1) {
                let fps = frames_since_mark as f64 / mark_elapsed.as_secs_f64();
                *self.current_fps.lock() = fps;
                telemetry().emit(TelemetryRecord::new(
                    self.pipeline_id.clone(),
                    None,
                    "current_fps",
                    json!(fps),
                ));
                fps_mark = Instant::now();
                frames_since_mark = 0;
            }

            if self.fps_limit <= 0.0 {
                sleep(UNPACED_FRAME_SLEEP).await;
            } else {
                let elapsed = frame_start.elapsed();
                if elapsed < frame_duration {
                    sleep(frame_duration - elapsed).await;
                } else {
                    tokio::task::yield_now().await;
                }
            }
        }
        debug!(pipeline = %self.pipeline_id, "run loop exited");
    }
}
