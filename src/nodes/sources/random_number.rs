//! Event-triggered random number source

use async_trait::async_trait;
use rand::Rng;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::warn;

use crate::data::{AcceptedKinds, DataFormat, DataType};
use crate::node::{parse_params, ConfiguredNode, NodeContext, NodeHandler, NodeProfile};
use crate::{Content, Result};

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RandomNumberParams {
    /// Inclusive lower bound
    pub min_value: f64,
    /// Inclusive upper bound
    pub max_value: f64,
}

impl Default for RandomNumberParams {
    fn default() -> Self {
        Self {
            min_value: 0.0,
            max_value: 1.0,
        }
    }
}

/// Emits one random integer per trigger EVENT on its input
pub struct RandomNumberNode {
    params: RandomNumberParams,
}

#[async_trait]
impl NodeHandler for RandomNumberNode {
    async fn process(&mut self, ctx: &mut NodeContext) -> Result<()> {
        let Some(trigger) = ctx.pop_first_input() else {
            return Ok(());
        };

        if self.params.max_value < self.params.min_value {
            warn!(
                min = self.params.min_value,
                max = self.params.max_value,
                "invalid random range; skipping trigger"
            );
            return Ok(());
        }
        let value = rand::thread_rng().gen_range(self.params.min_value..=self.params.max_value);

        let packet = ctx
            .modify_packet(&trigger, Content::Integer(value as i64))
            .data_type(DataType::Derived)
            .format(DataFormat::Numerical)
            .build();
        ctx.publish(&packet);
        Ok(())
    }

    fn apply_params(&mut self, params: &serde_json::Value) -> Result<()> {
        self.params = parse_params(params)?;
        Ok(())
    }
}

impl ConfiguredNode for RandomNumberNode {
    type Params = RandomNumberParams;

    fn from_params(params: &serde_json::Value) -> Result<Self> {
        Ok(Self {
            params: parse_params(params)?,
        })
    }

    fn profile() -> NodeProfile {
        // Triggered by EVENT packets only
        NodeProfile::processor()
            .with_min_inputs(1)
            .with_max_inputs(1)
            .with_accepts(AcceptedKinds::all().with_data_types([DataType::Event]))
    }
}

crate::register_node!("random_number", RandomNumberNode);
