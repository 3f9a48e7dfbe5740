//! Node substrate
//!
//! Everything a node type builds on: the [`NodeHandler`] lifecycle trait,
//! the [`NodeContext`] handed to hooks (packet builders, input buffers,
//! publishing, telemetry), the [`NodeCell`] runtime wrapper that receives
//! bus deliveries (validation, buffering, reference updates, dispatch),
//! and the registration machinery in [`registry`].

pub mod binding;
pub mod buffers;
pub mod registry;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::bus::{BusPayload, BusSubscriber, DataBus};
use crate::data::{AcceptedKinds, Content, DataFormat, DataPacket, DataType, PacketBuilder};
use crate::telemetry::{telemetry, TelemetryRecord};
use crate::{Error, Result};

pub use binding::{DeclaredType, ParamBinding};
pub use buffers::{InputBuffers, DEFAULT_BUFFER_CAPACITY};

/// Static execution profile of a node type
#[derive(Debug, Clone)]
pub struct NodeProfile {
    /// Emits on the frame tick instead of reacting to deliveries
    pub is_generator: bool,
    /// Owns an internal worker; excluded from the frame-tick sweep
    pub is_async_capable: bool,
    /// Non-empty input buffers required before `process` runs
    pub min_inputs: usize,
    /// Upper bound on declared inputs, if any
    pub max_inputs: Option<usize>,
    /// Membership sets inbound packets are validated against
    pub accepts: AcceptedKinds,
}

impl NodeProfile {
    /// Event-driven node with one required input, accepting everything
    pub fn processor() -> Self {
        Self {
            is_generator: false,
            is_async_capable: false,
            min_inputs: 1,
            max_inputs: None,
            accepts: AcceptedKinds::all(),
        }
    }

    /// Frame-ticked source with no inputs
    pub fn generator() -> Self {
        Self {
            is_generator: true,
            is_async_capable: false,
            min_inputs: 0,
            max_inputs: Some(0),
            accepts: AcceptedKinds::none(),
        }
    }

    pub fn async_capable(mut self) -> Self {
        self.is_async_capable = true;
        self
    }

    pub fn with_min_inputs(mut self, min: usize) -> Self {
        self.min_inputs = min;
        self
    }

    pub fn with_max_inputs(mut self, max: usize) -> Self {
        self.max_inputs = Some(max);
        self
    }

    pub fn with_accepts(mut self, accepts: AcceptedKinds) -> Self {
        self.accepts = accepts;
        self
    }
}

/// Node lifecycle trait
///
/// `process` is the only place a node emits packets; implementations
/// consume from the context's input buffers and build new packets with
/// the context's helpers. Received packets are never mutated.
#[async_trait]
pub trait NodeHandler: Send {
    /// Called once when the pipeline starts. Async-capable nodes spawn
    /// their internal workers here; resource acquisition failures are
    /// reported, logged by the pipeline, and do not abort the start of
    /// other nodes.
    async fn start(&mut self, _ctx: &mut NodeContext) -> Result<()> {
        Ok(())
    }

    /// Whether the node has work to do right now. The default gates
    /// generators on the frame tick and processors on buffer readiness.
    fn should_process(&self, ctx: &NodeContext) -> bool {
        if ctx.profile().is_generator {
            true
        } else {
            ctx.ready()
        }
    }

    /// Produce output. Default behavior passes the first input through.
    async fn process(&mut self, ctx: &mut NodeContext) -> Result<()> {
        if let Some(packet) = ctx.pop_first_input() {
            ctx.publish(&packet);
        }
        Ok(())
    }

    /// Called once during shutdown; long-running nodes cancel their
    /// internal workers here and must return promptly.
    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    /// Re-apply a full params object (live updates and reference-bound
    /// values). Implementations re-deserialize into their typed params;
    /// an `Err` leaves the prior parameters in force.
    fn apply_params(&mut self, _params: &serde_json::Value) -> Result<()> {
        Ok(())
    }

    /// Snapshot internal state ahead of a hot reconfiguration
    fn save_state(&self) -> Option<serde_json::Value> {
        None
    }

    /// Restore a snapshot taken by [`save_state`](Self::save_state)
    fn restore_state(&mut self, _state: serde_json::Value) {}
}

/// Construction contract tying a node type to its typed params struct.
/// The [`register_node!`](crate::register_node) macro registers
/// implementations with the global registry.
pub trait ConfiguredNode: NodeHandler + Sized {
    /// Typed parameter struct; its schema is served to control surfaces
    type Params: for<'de> Deserialize<'de> + JsonSchema;

    /// Build an instance from a cleaned params object (reference entries
    /// already stripped)
    fn from_params(params: &serde_json::Value) -> Result<Self>;

    /// Static execution profile for this type
    fn profile() -> NodeProfile;

    /// Draft-7 JSON schema of [`Params`](Self::Params)
    fn params_schema() -> serde_json::Value {
        let schema = schemars::gen::SchemaSettings::draft07()
            .into_generator()
            .into_root_schema_for::<Self::Params>();
        serde_json::to_value(schema).unwrap_or_else(|_| json!({ "type": "object" }))
    }
}

/// Params struct for nodes that take no configuration
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct NoParams {}

/// Deserialize a params object, treating `null` as empty
pub fn parse_params<P: for<'de> Deserialize<'de>>(params: &serde_json::Value) -> Result<P> {
    let value = if params.is_null() {
        json!({})
    } else {
        params.clone()
    };
    serde_json::from_value(value).map_err(|e| Error::InvalidParams {
        node: String::new(),
        reason: e.to_string(),
    })
}

/// Default field values a node stamps onto packets it creates
#[derive(Debug, Clone)]
struct PacketDefaults {
    data_type: DataType,
    format: DataFormat,
    category: crate::data::DataCategory,
}

impl PacketDefaults {
    fn for_profile(profile: &NodeProfile) -> Self {
        let fallback_type = if profile.is_generator {
            DataType::Stream
        } else {
            DataType::Static
        };
        Self {
            data_type: profile.accepts.first_data_type().unwrap_or(fallback_type),
            format: profile
                .accepts
                .first_format()
                .unwrap_or(DataFormat::Numerical),
            category: profile
                .accepts
                .first_category()
                .unwrap_or(crate::data::DataCategory::Generic),
        }
    }
}

/// Detachable publishing handle.
///
/// Cloneable and independent of the node lock, so internal workers (a
/// delay queue drainer, a socket listener) can build and publish packets
/// after `process` has returned.
#[derive(Clone)]
pub struct Emitter {
    node_id: String,
    node_name: String,
    pipeline_id: String,
    outputs: Vec<String>,
    bus: DataBus,
    defaults: PacketDefaults,
}

impl Emitter {
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Start a packet with this node's defaults, already stamped into the
    /// processing chain
    pub fn create_packet(&self, content: Content) -> PacketBuilder {
        DataPacket::builder(content)
            .data_type(self.defaults.data_type)
            .format(self.defaults.format)
            .category(self.defaults.category)
            .touched_by(&self.node_id)
    }

    /// Derive from a received packet: content replaced, DERIVED data type,
    /// this node appended to the processing chain
    pub fn modify_packet(&self, original: &DataPacket, content: Content) -> PacketBuilder {
        original.derive(content).touched_by(&self.node_id)
    }

    /// Publish a packet to every declared output channel
    pub fn publish(&self, packet: &DataPacket) {
        for output in &self.outputs {
            self.bus.publish(output, packet.clone());
        }
    }

    /// Publish an opaque non-packet value
    pub fn publish_value(&self, value: Content) {
        for output in &self.outputs {
            self.bus.publish(output, value.clone());
        }
    }

    /// Emit a node-scoped telemetry record
    pub fn emit(&self, metric: &str, value: serde_json::Value) {
        telemetry().emit(TelemetryRecord::new(
            self.pipeline_id.clone(),
            Some(self.node_id.clone()),
            metric,
            value,
        ));
    }
}

/// Runtime state handed to every handler hook
pub struct NodeContext {
    emitter: Emitter,
    profile: NodeProfile,
    inputs: Vec<String>,
    buffers: InputBuffers,
    pub(crate) params: serde_json::Value,
    sequence: u64,
    last_output: Option<DataPacket>,
    pub(crate) current_frame: Option<u64>,
}

impl NodeContext {
    pub fn node_id(&self) -> &str {
        self.emitter.node_id()
    }

    pub fn node_name(&self) -> &str {
        self.emitter.node_name()
    }

    pub fn profile(&self) -> &NodeProfile {
        &self.profile
    }

    /// Resolved input channel names, in declared order
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        self.emitter.outputs()
    }

    /// Effective params object (literals plus the latest bound values)
    pub fn params(&self) -> &serde_json::Value {
        &self.params
    }

    /// Frame number when invoked from the tick loop; `None` on the
    /// event-driven path
    pub fn current_frame(&self) -> Option<u64> {
        self.current_frame
    }

    /// Whether enough input buffers are non-empty for `process`
    pub fn ready(&self) -> bool {
        self.buffers.non_empty_count() >= self.profile.min_inputs
    }

    /// Oldest packet buffered for the given input channel
    pub fn pop_input(&mut self, channel: &str) -> Option<DataPacket> {
        self.buffers.pop(channel)
    }

    /// Oldest packet buffered for the first declared input
    pub fn pop_first_input(&mut self) -> Option<DataPacket> {
        let channel = self.inputs.first()?.clone();
        self.buffers.pop(&channel)
    }

    /// Buffered packet count for one input channel
    pub fn input_len(&self, channel: &str) -> usize {
        self.buffers.len(channel)
    }

    /// Next value of this node's monotonic sequence counter
    pub fn next_sequence(&mut self) -> u64 {
        let current = self.sequence;
        self.sequence += 1;
        current
    }

    pub fn create_packet(&self, content: Content) -> PacketBuilder {
        self.emitter.create_packet(content)
    }

    pub fn modify_packet(&self, original: &DataPacket, content: Content) -> PacketBuilder {
        self.emitter.modify_packet(original, content)
    }

    /// Publish to every output and remember the packet as `last_output`
    pub fn publish(&mut self, packet: &DataPacket) {
        self.emitter.publish(packet);
        self.last_output = Some(packet.clone());
    }

    pub fn publish_value(&self, value: Content) {
        self.emitter.publish_value(value);
    }

    /// Most recent packet emitted by this node
    pub fn last_output(&self) -> Option<&DataPacket> {
        self.last_output.as_ref()
    }

    pub fn emit(&self, metric: &str, value: serde_json::Value) {
        self.emitter.emit(metric, value);
    }

    /// Cloneable handle for internal workers
    pub fn emitter(&self) -> Emitter {
        self.emitter.clone()
    }
}

struct NodeState {
    handler: Box<dyn NodeHandler>,
    ctx: NodeContext,
}

/// Pipeline-side wrapper around one node instance.
///
/// Owns the delivery path (reference updates, validation, buffering,
/// event-driven dispatch) and the telemetry instrumentation around every
/// handler invocation.
pub struct NodeCell {
    name: String,
    node_id: String,
    node_type: String,
    pipeline_id: String,
    profile: NodeProfile,
    input_channels: Vec<String>,
    bindings: Vec<ParamBinding>,
    buffers: InputBuffers,
    rejected: AtomicU64,
    state: Mutex<NodeState>,
}

impl NodeCell {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        node_type: String,
        pipeline_id: String,
        profile: NodeProfile,
        handler: Box<dyn NodeHandler>,
        input_channels: Vec<String>,
        outputs: Vec<String>,
        bindings: Vec<ParamBinding>,
        params: serde_json::Value,
        bus: DataBus,
    ) -> Self {
        let node_id = format!("{}_{}", node_type, short_suffix());
        let buffers = InputBuffers::new(&input_channels, DEFAULT_BUFFER_CAPACITY);
        let emitter = Emitter {
            node_id: node_id.clone(),
            node_name: name.clone(),
            pipeline_id: pipeline_id.clone(),
            outputs,
            bus,
            defaults: PacketDefaults::for_profile(&profile),
        };
        let ctx = NodeContext {
            emitter,
            profile: profile.clone(),
            inputs: input_channels.clone(),
            buffers: buffers.clone(),
            params,
            sequence: 0,
            last_output: None,
            current_frame: None,
        };

        Self {
            name,
            node_id,
            node_type,
            pipeline_id,
            profile,
            input_channels,
            bindings,
            buffers,
            rejected: AtomicU64::new(0),
            state: Mutex::new(NodeState { handler, ctx }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    pub fn profile(&self) -> &NodeProfile {
        &self.profile
    }

    /// Channels this node's inputs are subscribed to
    pub fn input_channels(&self) -> &[String] {
        &self.input_channels
    }

    /// Channels carrying reference-bound parameters into this node
    pub fn binding_channels(&self) -> Vec<String> {
        self.bindings.iter().map(|b| b.channel.clone()).collect()
    }

    /// Packets rejected by validation or buffer overflow
    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Current effective params object
    pub async fn params(&self) -> serde_json::Value {
        self.state.lock().await.ctx.params.clone()
    }

    /// Most recent packet emitted by this node
    pub async fn last_output(&self) -> Option<DataPacket> {
        self.state.lock().await.ctx.last_output.clone()
    }

    /// Run the node's `start` hook
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let NodeState { handler, ctx } = &mut *state;
        handler.start(ctx).await
    }

    /// Run the node's `stop` hook
    pub async fn stop(&self) -> Result<()> {
        self.state.lock().await.handler.stop().await
    }

    /// Snapshot handler state for hot reconfiguration
    pub async fn save_state(&self) -> Option<serde_json::Value> {
        self.state.lock().await.handler.save_state()
    }

    /// Restore a snapshot into the handler
    pub async fn restore_state(&self, snapshot: serde_json::Value) {
        self.state.lock().await.handler.restore_state(snapshot);
    }

    /// Replace the node's params object (live update path). The new
    /// object is applied through the handler; on failure the prior
    /// params remain in force.
    pub async fn replace_params(&self, params: serde_json::Value) -> Result<()> {
        let mut state = self.state.lock().await;
        state.handler.apply_params(&params).map_err(|e| Error::InvalidParams {
            node: self.name.clone(),
            reason: e.to_string(),
        })?;
        state.ctx.params = params;
        Ok(())
    }

    /// One frame-tick visit from the run loop
    pub async fn tick(&self, frame: u64) -> Result<()> {
        if self.profile.is_async_capable {
            return Ok(());
        }
        let mut state = self.state.lock().await;
        state.ctx.current_frame = Some(frame);
        let result = if state.handler.should_process(&state.ctx) {
            self.run_process(&mut state).await
        } else {
            Ok(())
        };
        state.ctx.current_frame = None;
        result
    }

    fn emit_metric(&self, metric: &str, value: serde_json::Value) {
        telemetry().emit(TelemetryRecord::new(
            self.pipeline_id.clone(),
            Some(self.node_id.clone()),
            metric,
            value,
        ));
    }

    fn record_rejection(&self, channel: &str, reason: &str) {
        let count = self.rejected.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(node = %self.name, %channel, reason, "packet rejected");
        self.emit_metric("packets_rejected", json!(count));
    }

    /// Invoke `process` wrapped in the telemetry instrumentation. The
    /// wrapper never swallows failures; the error is re-returned after
    /// the `processing_error` record is emitted.
    async fn run_process(&self, state: &mut NodeState) -> Result<()> {
        self.emit_metric("processing_start", json!(epoch_seconds()));
        let started = Instant::now();
        let NodeState { handler, ctx } = &mut *state;
        let result = handler.process(ctx).await;
        self.emit_metric("processing_end", json!(epoch_seconds()));
        self.emit_metric(
            "execution_time",
            json!(started.elapsed().as_secs_f64()),
        );
        if let Err(e) = &result {
            self.emit_metric("processing_error", json!(e.to_string()));
        }
        result
    }

    /// Keep invoking `process` while the node stays ready and keeps
    /// consuming; the progress check stops handlers that emit without
    /// draining their buffers.
    async fn drain(&self, state: &mut NodeState) -> Result<()> {
        loop {
            if !state.handler.should_process(&state.ctx) {
                break;
            }
            let before = self.buffers.total_len();
            self.run_process(state).await?;
            if self.buffers.total_len() >= before {
                break;
            }
        }
        Ok(())
    }

    async fn handle_packet(&self, packet: DataPacket, channel: &str) -> Result<()> {
        // Reference updates land before the packet's own input handling
        let matching: Vec<&ParamBinding> = self
            .bindings
            .iter()
            .filter(|b| b.channel == channel)
            .collect();
        if !matching.is_empty() {
            let mut state = self.state.lock().await;
            for bound in matching {
                self.apply_binding(&mut state, bound, &packet);
            }
        }

        if !self.input_channels.iter().any(|c| c == channel) {
            return Ok(());
        }

        if !self.profile.accepts.accepts(&packet) {
            self.record_rejection(channel, "incompatible packet");
            return Ok(());
        }
        if !self.buffers.push(channel, packet) {
            self.record_rejection(channel, "input buffer full");
            return Ok(());
        }

        // Event-driven dispatch on the delivering worker. A node already
        // mid-process keeps its lock; the frame sweep picks the backlog
        // up instead of stalling this worker.
        if !self.profile.is_generator && !self.profile.is_async_capable {
            if let Ok(mut state) = self.state.try_lock() {
                self.drain(&mut state).await?;
            }
        }
        Ok(())
    }

    fn apply_binding(&self, state: &mut NodeState, bound: &ParamBinding, packet: &DataPacket) {
        let Some(params) = binding::resolve_update(bound, packet, &state.ctx.params) else {
            return;
        };
        match state.handler.apply_params(&params) {
            Ok(()) => state.ctx.params = params,
            Err(e) => warn!(
                node = %self.name,
                param = %bound.param,
                error = %e,
                "reference update rejected; retaining prior value"
            ),
        }
    }
}

#[async_trait]
impl BusSubscriber for NodeCell {
    async fn deliver(&self, payload: BusPayload, channel: &str) -> Result<()> {
        self.emit_metric("processing_start", json!(epoch_seconds()));
        let started = Instant::now();

        let result = match payload {
            BusPayload::Packet(packet) => self.handle_packet(packet, channel).await,
            BusPayload::Value(value) => {
                debug!(node = %self.name, %channel, ?value, "ignoring non-packet payload");
                Ok(())
            }
        };

        self.emit_metric("processing_end", json!(epoch_seconds()));
        self.emit_metric(
            "execution_time",
            json!(started.elapsed().as_secs_f64()),
        );
        if let Err(e) = &result {
            self.emit_metric("processing_error", json!(e.to_string()));
        }
        result
    }
}

fn short_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn epoch_seconds() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
