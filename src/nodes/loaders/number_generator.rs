//! Frame-paced number sequence generator

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use crate::node::{parse_params, ConfiguredNode, NodeContext, NodeHandler, NodeProfile};
use crate::{Content, Result};

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(default)]
pub struct NumberGeneratorParams {
    /// First emitted value
    pub start: f64,
    /// Increment applied after each emission
    pub step: f64,
    /// Clamp or wrap boundary; unbounded when absent
    pub max_value: Option<f64>,
    /// Jump back to `start` instead of clamping at `max_value`
    pub wrap_around: bool,
}

impl Default for NumberGeneratorParams {
    fn default() -> Self {
        Self {
            start: 0.0,
            step: 1.0,
            max_value: None,
            wrap_around: false,
        }
    }
}

/// Emits an arithmetic sequence, one value per frame
pub struct NumberGeneratorNode {
    params: NumberGeneratorParams,
    current: f64,
}

#[async_trait]
impl NodeHandler for NumberGeneratorNode {
    async fn process(&mut self, ctx: &mut NodeContext) -> Result<()> {
        // Frame-ticked only; ignore any stray event-path invocation
        if ctx.current_frame().is_none() {
            return Ok(());
        }

        let sequence = ctx.next_sequence();
        let packet = ctx
            .create_packet(Content::Float(self.current))
            .sequence_id(sequence)
            .build();
        ctx.publish(&packet);

        self.current += self.params.step;
        if let Some(max) = self.params.max_value {
            if self.current > max {
                self.current = if self.params.wrap_around {
                    self.params.start
                } else {
                    max
                };
            }
        }
        Ok(())
    }

    fn apply_params(&mut self, params: &serde_json::Value) -> Result<()> {
        self.params = parse_params(params)?;
        Ok(())
    }

    fn save_state(&self) -> Option<serde_json::Value> {
        Some(json!({ "current": self.current }))
    }

    fn restore_state(&mut self, state: serde_json::Value) {
        if let Some(current) = state.get("current").and_then(|v| v.as_f64()) {
            self.current = current;
        }
    }
}

impl ConfiguredNode for NumberGeneratorNode {
    type Params = NumberGeneratorParams;

    fn from_params(params: &serde_json::Value) -> Result<Self> {
        let params: NumberGeneratorParams = parse_params(params)?;
        Ok(Self {
            current: params.start,
            params,
        })
    }

    fn profile() -> NodeProfile {
        NodeProfile::generator()
    }
}

crate::register_node!("number_generator", NumberGeneratorNode);
