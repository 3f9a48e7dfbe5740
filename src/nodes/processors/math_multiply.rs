//! Scalar multiplication

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::warn;

use crate::data::{AcceptedKinds, DataFormat, DataType};
use crate::node::{parse_params, ConfiguredNode, NodeContext, NodeHandler, NodeProfile};
use crate::{Content, Result};

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(default)]
pub struct MathMultiplyParams {
    pub multiplier: i64,
}

impl Default for MathMultiplyParams {
    fn default() -> Self {
        Self { multiplier: 1 }
    }
}

/// Multiplies numerical content by a fixed (or reference-bound) factor
pub struct MathMultiplyNode {
    params: MathMultiplyParams,
}

#[async_trait]
impl NodeHandler for MathMultiplyNode {
    async fn process(&mut self, ctx: &mut NodeContext) -> Result<()> {
        let Some(packet) = ctx.pop_first_input() else {
            return Ok(());
        };

        let Some(value) = packet.content.as_f64() else {
            warn!(node = %ctx.node_name(), content = %packet.content, "non-numeric content");
            return Ok(());
        };

        let result = value * self.params.multiplier as f64;
        let out = ctx.modify_packet(&packet, Content::Float(result)).build();
        ctx.publish(&out);
        Ok(())
    }

    fn apply_params(&mut self, params: &serde_json::Value) -> Result<()> {
        self.params = parse_params(params)?;
        Ok(())
    }
}

impl ConfiguredNode for MathMultiplyNode {
    type Params = MathMultiplyParams;

    fn from_params(params: &serde_json::Value) -> Result<Self> {
        Ok(Self {
            params: parse_params(params)?,
        })
    }

    fn profile() -> NodeProfile {
        NodeProfile::processor().with_accepts(
            AcceptedKinds::all()
                .with_data_types([DataType::Stream, DataType::Derived])
                .with_formats([DataFormat::Numerical]),
        )
    }
}

crate::register_node!("math_multiply", MathMultiplyNode);
