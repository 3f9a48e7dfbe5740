//! Sliding-window mean

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use std::collections::VecDeque;
use tracing::warn;

use crate::data::{AcceptedKinds, DataFormat, DataType, LifecycleState};
use crate::node::{parse_params, ConfiguredNode, NodeContext, NodeHandler, NodeProfile};
use crate::{Content, Result};

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AverageParams {
    /// Window length in packets
    pub window_size: usize,
}

impl Default for AverageParams {
    fn default() -> Self {
        Self { window_size: 10 }
    }
}

/// Emits the mean of the last `window_size` numeric values
pub struct AverageNode {
    params: AverageParams,
    window: VecDeque<f64>,
}

#[async_trait]
impl NodeHandler for AverageNode {
    async fn process(&mut self, ctx: &mut NodeContext) -> Result<()> {
        let Some(packet) = ctx.pop_first_input() else {
            return Ok(());
        };
        let Some(value) = packet.content.as_f64() else {
            warn!(node = %ctx.node_name(), content = %packet.content, "non-numeric input");
            return Ok(());
        };

        self.window.push_back(value);
        while self.window.len() > self.params.window_size.max(1) {
            self.window.pop_front();
        }
        let mean = self.window.iter().sum::<f64>() / self.window.len() as f64;

        let out = ctx
            .modify_packet(&packet, Content::Float(mean))
            .data_type(DataType::Derived)
            .format(DataFormat::Numerical)
            .lifecycle_state(LifecycleState::Processed)
            .build();
        ctx.publish(&out);
        Ok(())
    }

    fn apply_params(&mut self, params: &serde_json::Value) -> Result<()> {
        self.params = parse_params(params)?;
        Ok(())
    }

    fn save_state(&self) -> Option<serde_json::Value> {
        Some(json!({ "window": self.window.iter().copied().collect::<Vec<f64>>() }))
    }

    fn restore_state(&mut self, state: serde_json::Value) {
        if let Some(values) = state.get("window").and_then(|v| v.as_array()) {
            self.window = values.iter().filter_map(|v| v.as_f64()).collect();
        }
    }
}

impl ConfiguredNode for AverageNode {
    type Params = AverageParams;

    fn from_params(params: &serde_json::Value) -> Result<Self> {
        Ok(Self {
            params: parse_params(params)?,
            window: VecDeque::new(),
        })
    }

    fn profile() -> NodeProfile {
        NodeProfile::processor().with_accepts(
            AcceptedKinds::all()
                .with_data_types([DataType::Stream, DataType::Event, DataType::Derived])
                .with_formats([DataFormat::Numerical]),
        )
    }
}

crate::register_node!("average", AverageNode);
