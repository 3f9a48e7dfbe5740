//! Console sink for debugging pipelines

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::info;

use crate::node::{parse_params, ConfiguredNode, NodeContext, NodeHandler, NodeProfile};
use crate::{Content, Result};

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ConsoleLoggerParams {
    /// Text prepended to every logged line
    pub prefix: String,
}

impl Default for ConsoleLoggerParams {
    fn default() -> Self {
        Self {
            prefix: "[LOG]".to_string(),
        }
    }
}

/// Logs every inbound packet's content
pub struct ConsoleLoggerNode {
    params: ConsoleLoggerParams,
    last_received: Option<Content>,
}

impl ConsoleLoggerNode {
    /// Most recent content seen, for host inspection
    pub fn last_received(&self) -> Option<&Content> {
        self.last_received.as_ref()
    }
}

#[async_trait]
impl NodeHandler for ConsoleLoggerNode {
    async fn process(&mut self, ctx: &mut NodeContext) -> Result<()> {
        let Some(packet) = ctx.pop_first_input() else {
            return Ok(());
        };

        let channel = ctx.inputs().first().map(String::as_str).unwrap_or("?");
        info!("{} {}: {}", self.params.prefix, channel, packet.content);
        self.last_received = Some(packet.content.clone());
        Ok(())
    }

    fn apply_params(&mut self, params: &serde_json::Value) -> Result<()> {
        self.params = parse_params(params)?;
        Ok(())
    }
}

impl ConfiguredNode for ConsoleLoggerNode {
    type Params = ConsoleLoggerParams;

    fn from_params(params: &serde_json::Value) -> Result<Self> {
        Ok(Self {
            params: parse_params(params)?,
            last_received: None,
        })
    }

    fn profile() -> NodeProfile {
        NodeProfile::processor()
    }
}

crate::register_node!("console_logger", ConsoleLoggerNode);
