//! List and string fan-out

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::warn;

use crate::data::{AcceptedKinds, DataFormat, DataType, LifecycleState};
use crate::node::{parse_params, ConfiguredNode, NodeContext, NodeHandler, NodeProfile};
use crate::{Content, Result};

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SplitterParams {
    /// Split strings into one packet per character
    pub flatten_strings: bool,
}

/// Emits one DERIVED packet per element of the inbound content
pub struct SplitterNode {
    params: SplitterParams,
}

fn infer_format(value: &Content) -> DataFormat {
    match value {
        Content::Integer(_) | Content::Float(_) => DataFormat::Numerical,
        Content::Text(_) => DataFormat::Textual,
        Content::Bytes(_) => DataFormat::Binary,
        _ => DataFormat::Json,
    }
}

#[async_trait]
impl NodeHandler for SplitterNode {
    async fn process(&mut self, ctx: &mut NodeContext) -> Result<()> {
        let Some(packet) = ctx.pop_first_input() else {
            return Ok(());
        };

        let items: Vec<Content> = match &packet.content {
            Content::List(items) => items.clone(),
            Content::Text(text) if self.params.flatten_strings => {
                text.chars().map(|c| Content::Text(c.to_string())).collect()
            }
            Content::Text(text) => vec![Content::Text(text.clone())],
            other => {
                warn!(node = %ctx.node_name(), content = %other, "content is not splittable");
                return Ok(());
            }
        };

        for item in items {
            let format = infer_format(&item);
            let out = ctx
                .modify_packet(&packet, item)
                .data_type(DataType::Derived)
                .format(format)
                .lifecycle_state(LifecycleState::Processed)
                .build();
            ctx.publish(&out);
        }
        Ok(())
    }

    fn apply_params(&mut self, params: &serde_json::Value) -> Result<()> {
        self.params = parse_params(params)?;
        Ok(())
    }
}

impl ConfiguredNode for SplitterNode {
    type Params = SplitterParams;

    fn from_params(params: &serde_json::Value) -> Result<Self> {
        Ok(Self {
            params: parse_params(params)?,
        })
    }

    fn profile() -> NodeProfile {
        NodeProfile::processor().with_accepts(
            AcceptedKinds::all().with_formats([
                DataFormat::Numerical,
                DataFormat::Textual,
                DataFormat::Binary,
                DataFormat::Json,
            ]),
        )
    }
}

crate::register_node!("splitter", SplitterNode);
