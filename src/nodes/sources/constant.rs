//! Single-shot constant value source

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{debug, info};

use crate::data::{DataFormat, DataType};
use crate::node::{parse_params, ConfiguredNode, NodeContext, NodeHandler, NodeProfile};
use crate::{Content, Result};

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ConstantParams {
    /// Value to emit; `null` suppresses emission
    pub value: serde_json::Value,
    /// Re-emit whenever the (possibly reference-bound) value changes
    pub send_on_update: bool,
}

impl Default for ConstantParams {
    fn default() -> Self {
        Self {
            value: serde_json::Value::Null,
            send_on_update: false,
        }
    }
}

/// Emits its configured value once, and again on updates when asked to
pub struct ConstantNode {
    params: ConstantParams,
    emitted: bool,
    last_value: serde_json::Value,
}

#[async_trait]
impl NodeHandler for ConstantNode {
    fn should_process(&self, _ctx: &NodeContext) -> bool {
        if self.emitted {
            return false;
        }
        if self.params.send_on_update {
            return !self.params.value.is_null();
        }
        true
    }

    async fn process(&mut self, ctx: &mut NodeContext) -> Result<()> {
        if self.params.value.is_null() {
            debug!(node = %ctx.node_name(), "constant value unset; skipping emission");
            return Ok(());
        }

        let format = if self.params.value.is_number() {
            DataFormat::Numerical
        } else {
            DataFormat::Textual
        };
        let packet = ctx
            .create_packet(Content::from_json(&self.params.value))
            .data_type(DataType::Derived)
            .format(format)
            .build();
        ctx.publish(&packet);

        self.emitted = true;
        self.last_value = self.params.value.clone();
        Ok(())
    }

    fn apply_params(&mut self, params: &serde_json::Value) -> Result<()> {
        self.params = parse_params(params)?;
        // A changed value re-arms the emitter
        if self.params.send_on_update
            && !self.params.value.is_null()
            && self.params.value != self.last_value
        {
            info!(
                previous = %self.last_value,
                current = %self.params.value,
                "constant value updated; re-arming emitter"
            );
            self.emitted = false;
        }
        Ok(())
    }
}

impl ConfiguredNode for ConstantNode {
    type Params = ConstantParams;

    fn from_params(params: &serde_json::Value) -> Result<Self> {
        Ok(Self {
            params: parse_params(params)?,
            emitted: false,
            last_value: serde_json::Value::Null,
        })
    }

    fn profile() -> NodeProfile {
        NodeProfile::generator()
    }
}

crate::register_node!("constant", ConstantNode);
