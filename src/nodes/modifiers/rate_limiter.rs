//! Minimum-interval throttle

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use std::time::Instant;
use tracing::debug;

use crate::data::{AcceptedKinds, DataFormat, DataType};
use crate::node::{parse_params, ConfiguredNode, NodeContext, NodeHandler, NodeProfile};
use crate::Result;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RateLimiterParams {
    /// Minimum seconds between forwarded packets
    pub interval: f64,
}

impl Default for RateLimiterParams {
    fn default() -> Self {
        Self { interval: 1.0 }
    }
}

/// Forwards at most one packet per interval; the rest are discarded
pub struct RateLimiterNode {
    params: RateLimiterParams,
    last_emit: Option<Instant>,
}

#[async_trait]
impl NodeHandler for RateLimiterNode {
    async fn process(&mut self, ctx: &mut NodeContext) -> Result<()> {
        let Some(packet) = ctx.pop_first_input() else {
            return Ok(());
        };

        let due = self
            .last_emit
            .map_or(true, |t| t.elapsed().as_secs_f64() >= self.params.interval);
        if due {
            self.last_emit = Some(Instant::now());
            ctx.publish(&packet);
        } else {
            debug!(node = %ctx.node_name(), "packet skipped: too soon");
        }
        Ok(())
    }

    fn apply_params(&mut self, params: &serde_json::Value) -> Result<()> {
        self.params = parse_params(params)?;
        Ok(())
    }
}

impl ConfiguredNode for RateLimiterNode {
    type Params = RateLimiterParams;

    fn from_params(params: &serde_json::Value) -> Result<Self> {
        Ok(Self {
            params: parse_params(params)?,
            last_emit: None,
        })
    }

    fn profile() -> NodeProfile {
        NodeProfile::processor().with_accepts(
            AcceptedKinds::all()
                .with_data_types([DataType::Stream, DataType::Event, DataType::Derived])
                .with_formats([
                    DataFormat::Numerical,
                    DataFormat::Textual,
                    DataFormat::Binary,
                ]),
        )
    }
}

crate::register_node!("rate_limiter", RateLimiterNode);
