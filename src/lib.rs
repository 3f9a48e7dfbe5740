//! Packetflow - dataflow pipeline runtime
//!
//! This crate provides a configurable dataflow engine: directed graphs of
//! processing nodes that exchange typed data packets over a pub/sub bus.
//!
//! # Architecture
//!
//! - [`data`] defines the immutable [`DataPacket`](data::DataPacket)
//!   envelope and its type vocabularies
//! - [`bus`] carries packets between nodes on named channels with a
//!   value-semantics serialization boundary
//! - [`node`] is the substrate every node builds on: lifecycle, input
//!   buffers, validation, reference-bound parameters, telemetry hooks
//! - [`pipeline`] builds graphs from declarative configuration, runs them
//!   on a frame-paced loop, and supports live reconfiguration
//! - [`telemetry`] streams runtime metrics to attached observers
//! - [`nodes`] is the built-in node library (generators, math, routing,
//!   export)
//!
//! Pipelines are driven from a Tokio runtime; the bus fan-out, the frame
//! loop, and node-internal workers all run as tasks on it.
//!
//! # Example
//!
//! ```no_run
//! use packetflow::config::PipelineConfig;
//! use packetflow::pipeline::PipelineManager;
//! use serde_json::json;
//!
//! # async fn demo() -> packetflow::Result<()> {
//! let config = PipelineConfig::from_value(json!({
//!     "settings": { "fps_limit": 60 },
//!     "nodes": [
//!         { "type": "number_generator", "name": "numbers", "params": { "start": 0, "step": 1 } },
//!         { "type": "console_logger", "name": "log", "inputs": ["numbers"] }
//!     ]
//! }))?;
//!
//! let manager = PipelineManager::global();
//! let id = manager.create(config).await?;
//! manager.start(&id).await?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod bus;
pub mod config;
pub mod data;
pub mod error;
pub mod node;
pub mod nodes;
pub mod pipeline;
pub mod telemetry;

pub use bus::{BusPayload, BusSubscriber, DataBus};
pub use config::{NodeSpec, PipelineConfig};
pub use data::{
    AcceptedKinds, Content, DataCategory, DataFormat, DataPacket, DataSource, DataType,
    LifecycleState, SensitivityLevel,
};
pub use error::{Error, Result};
pub use node::registry::NodeRegistry;
pub use node::{NodeCell, NodeContext, NodeHandler, NodeProfile};
pub use pipeline::{Pipeline, PipelineManager};
pub use telemetry::{telemetry, TelemetryRecord, TelemetrySink};

/// Initialize tracing with an env-filter (`RUST_LOG`) and sane defaults.
///
/// Convenience for hosts and examples; safe to call more than once (later
/// calls are ignored).
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
