//! Change-detection filter

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::debug;

use crate::data::{AcceptedKinds, DataFormat, DataType};
use crate::node::{parse_params, ConfiguredNode, NodeContext, NodeHandler, NodeProfile};
use crate::{Content, Result};

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PassOnChangeParams {
    /// Forward only when the watched value differs from the last seen
    pub on_change_only: bool,
    /// Dotted path into map content selecting the value to watch
    pub key_path: Option<String>,
}

impl Default for PassOnChangeParams {
    fn default() -> Self {
        Self {
            on_change_only: true,
            key_path: None,
        }
    }
}

/// Forwards packets whose (possibly nested) value changed
pub struct PassOnChangeNode {
    params: PassOnChangeParams,
    last_value: Option<Content>,
}

impl PassOnChangeNode {
    fn watched_value(&self, content: &Content) -> Content {
        if let (Some(path), Content::Map(_)) = (&self.params.key_path, content) {
            let segments: Vec<&str> = path.split('.').collect();
            if let Some(found) = content.at_path(&segments) {
                return found.clone();
            }
            debug!(key_path = %path, "watched path missing; comparing whole content");
        }
        content.clone()
    }
}

#[async_trait]
impl NodeHandler for PassOnChangeNode {
    async fn process(&mut self, ctx: &mut NodeContext) -> Result<()> {
        let Some(packet) = ctx.pop_first_input() else {
            return Ok(());
        };

        let value = self.watched_value(&packet.content);
        let changed = self.last_value.as_ref() != Some(&value);
        if self.params.on_change_only && !changed {
            return Ok(());
        }

        self.last_value = Some(value);
        ctx.publish(&packet);
        Ok(())
    }

    fn apply_params(&mut self, params: &serde_json::Value) -> Result<()> {
        self.params = parse_params(params)?;
        Ok(())
    }
}

impl ConfiguredNode for PassOnChangeNode {
    type Params = PassOnChangeParams;

    fn from_params(params: &serde_json::Value) -> Result<Self> {
        Ok(Self {
            params: parse_params(params)?,
            last_value: None,
        })
    }

    fn profile() -> NodeProfile {
        NodeProfile::processor()
            .with_min_inputs(1)
            .with_max_inputs(1)
            .with_accepts(
                AcceptedKinds::all()
                    .with_data_types([DataType::Stream, DataType::Event, DataType::Derived])
                    .with_formats([
                        DataFormat::Numerical,
                        DataFormat::Textual,
                        DataFormat::Json,
                    ]),
            )
    }
}

crate::register_node!("pass_on_change", PassOnChangeNode);
