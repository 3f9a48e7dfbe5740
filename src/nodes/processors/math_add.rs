//! Two-input addition
//!
//! A latest-value join: each input's freshest packet is held, and a sum
//! is emitted whenever an input updates while both sides are present. A
//! slow input (a constant emitted once) keeps contributing its last value
//! as the other side streams.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::warn;

use crate::data::{AcceptedKinds, DataFormat, DataPacket};
use crate::node::{parse_params, ConfiguredNode, NodeContext, NodeHandler, NodeProfile};
use crate::{Content, Result};

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(default)]
pub struct MathAddParams {
    /// Reject non-numeric operands instead of attempting concatenation
    pub strict_types: bool,
}

impl Default for MathAddParams {
    fn default() -> Self {
        Self { strict_types: true }
    }
}

/// Adds the freshest values from its two inputs
pub struct MathAddNode {
    params: MathAddParams,
    held: HashMap<String, DataPacket>,
}

#[async_trait]
impl NodeHandler for MathAddNode {
    fn should_process(&self, ctx: &NodeContext) -> bool {
        // Any buffered input is worth a look; held values cover the other
        // side of the join
        ctx.inputs().iter().any(|c| ctx.input_len(c) > 0)
    }

    async fn process(&mut self, ctx: &mut NodeContext) -> Result<()> {
        let inputs = ctx.inputs().to_vec();
        let mut updated = false;
        for channel in &inputs {
            while let Some(packet) = ctx.pop_input(channel) {
                self.held.insert(channel.clone(), packet);
                updated = true;
            }
        }
        if !updated || inputs.iter().any(|c| !self.held.contains_key(c)) {
            return Ok(());
        }

        let first = &self.held[&inputs[0]];
        let second = &self.held[&inputs[1]];
        let sum = match (first.content.as_f64(), second.content.as_f64()) {
            (Some(a), Some(b)) => Content::Float(a + b),
            _ if !self.params.strict_types => match (&first.content, &second.content) {
                (Content::Text(a), Content::Text(b)) => Content::Text(format!("{a}{b}")),
                _ => {
                    warn!(node = %ctx.node_name(), "operands not addable");
                    return Ok(());
                }
            },
            _ => {
                warn!(node = %ctx.node_name(), "non-numeric operands");
                return Ok(());
            }
        };

        let out = ctx.modify_packet(first, sum).build();
        ctx.publish(&out);
        Ok(())
    }

    fn apply_params(&mut self, params: &serde_json::Value) -> Result<()> {
        self.params = parse_params(params)?;
        Ok(())
    }
}

impl ConfiguredNode for MathAddNode {
    type Params = MathAddParams;

    fn from_params(params: &serde_json::Value) -> Result<Self> {
        Ok(Self {
            params: parse_params(params)?,
            held: HashMap::new(),
        })
    }

    fn profile() -> NodeProfile {
        NodeProfile::processor()
            .with_min_inputs(2)
            .with_max_inputs(2)
            .with_accepts(AcceptedKinds::all().with_formats([DataFormat::Numerical]))
    }
}

crate::register_node!("math_add", MathAddNode);
