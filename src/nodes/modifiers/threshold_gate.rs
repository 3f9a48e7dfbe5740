//! Comparison gate

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::warn;

use crate::data::{AcceptedKinds, DataFormat, DataType};
use crate::node::{parse_params, ConfiguredNode, NodeContext, NodeHandler, NodeProfile};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum GateMode {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ThresholdGateParams {
    pub threshold: f64,
    pub mode: GateMode,
}

impl Default for ThresholdGateParams {
    fn default() -> Self {
        Self {
            threshold: 0.0,
            mode: GateMode::Gt,
        }
    }
}

/// Forwards packets whose numeric content passes the comparison
pub struct ThresholdGateNode {
    params: ThresholdGateParams,
}

impl ThresholdGateNode {
    fn passes(&self, value: f64) -> bool {
        let threshold = self.params.threshold;
        match self.params.mode {
            GateMode::Gt => value > threshold,
            GateMode::Lt => value < threshold,
            GateMode::Ge => value >= threshold,
            GateMode::Le => value <= threshold,
            GateMode::Eq => value == threshold,
            GateMode::Ne => value != threshold,
        }
    }
}

#[async_trait]
impl NodeHandler for ThresholdGateNode {
    async fn process(&mut self, ctx: &mut NodeContext) -> Result<()> {
        let Some(packet) = ctx.pop_first_input() else {
            return Ok(());
        };
        let Some(value) = packet.content.as_f64() else {
            warn!(node = %ctx.node_name(), content = %packet.content, "non-numeric content ignored");
            return Ok(());
        };

        if self.passes(value) {
            ctx.publish(&packet);
        }
        Ok(())
    }

    fn apply_params(&mut self, params: &serde_json::Value) -> Result<()> {
        self.params = parse_params(params)?;
        Ok(())
    }
}

impl ConfiguredNode for ThresholdGateNode {
    type Params = ThresholdGateParams;

    fn from_params(params: &serde_json::Value) -> Result<Self> {
        Ok(Self {
            params: parse_params(params)?,
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

crate::register_node!("threshold_gate", ThresholdGateNode);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_modes() {
        let mut node = ThresholdGateNode::from_params(&json!({ "threshold": 5, "mode": "ge" }))
            .unwrap();
        assert!(node.passes(5.0));
        assert!(node.passes(6.0));
        assert!(!node.passes(4.9));

        node.apply_params(&json!({ "threshold": 5, "mode": "ne" })).unwrap();
        assert!(node.passes(4.0));
        assert!(!node.passes(5.0));
    }
}
