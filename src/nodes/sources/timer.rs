//! Interval timer source

use async_trait::async_trait;
use chrono::Local;
use schemars::JsonSchema;
use serde::Deserialize;
use std::time::Instant;
use tracing::info;

use crate::data::{DataFormat, DataType};
use crate::node::{parse_params, ConfiguredNode, NodeContext, NodeHandler, NodeProfile};
use crate::{Content, Result};

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TimerParams {
    /// Seconds between events
    pub interval: f64,
    /// Emit a formatted local timestamp instead of epoch seconds
    pub use_textual: bool,
}

impl Default for TimerParams {
    fn default() -> Self {
        Self {
            interval: 1.0,
            use_textual: false,
        }
    }
}

/// Emits an EVENT packet every `interval` seconds of wall time
pub struct TimerNode {
    params: TimerParams,
    last_fired: Option<Instant>,
}

#[async_trait]
impl NodeHandler for TimerNode {
    async fn start(&mut self, _ctx: &mut NodeContext) -> Result<()> {
        self.last_fired = Some(Instant::now());
        Ok(())
    }

    fn should_process(&self, _ctx: &NodeContext) -> bool {
        match self.last_fired {
            Some(fired) => fired.elapsed().as_secs_f64() >= self.params.interval,
            None => true,
        }
    }

    async fn process(&mut self, ctx: &mut NodeContext) -> Result<()> {
        let (content, format) = if self.params.use_textual {
            (
                Content::Text(Local::now().format("%Y-%m-%d %H:%M:%S").to_string()),
                DataFormat::Textual,
            )
        } else {
            let epoch = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0);
            (Content::Float(epoch), DataFormat::Numerical)
        };

        let packet = ctx
            .create_packet(content)
            .data_type(DataType::Event)
            .format(format)
            .build();
        ctx.publish(&packet);
        self.last_fired = Some(Instant::now());
        Ok(())
    }

    fn apply_params(&mut self, params: &serde_json::Value) -> Result<()> {
        let previous = self.params.interval;
        self.params = parse_params(params)?;
        if (self.params.interval - previous).abs() > f64::EPSILON {
            info!(interval = self.params.interval, "timer interval updated; resetting");
            self.last_fired = Some(Instant::now());
        }
        Ok(())
    }
}

impl ConfiguredNode for TimerNode {
    type Params = TimerParams;

    fn from_params(params: &serde_json::Value) -> Result<Self> {
        Ok(Self {
            params: parse_params(params)?,
            last_fired: None,
        })
    }

    fn profile() -> NodeProfile {
        NodeProfile::generator()
    }
}

crate::register_node!("timer", TimerNode);
