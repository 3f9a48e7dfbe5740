//! Pipeline configuration parsing and validation
//!
//! This module handles the declarative graph description: deserialization
//! from JSON/YAML, structural validation, and conversion helpers for the
//! manager's map-form inputs. Graph-level checks that need the node
//! registry (unknown types, arity) happen in the pipeline builder.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Default frame rate for the generator tick loop
pub const DEFAULT_FPS_LIMIT: f64 = 60.0;

/// Declarative pipeline description
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Runtime settings
    #[serde(default)]
    pub settings: PipelineSettings,

    /// Ordered list of node specs; order is tick order
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
}

/// Pipeline-wide runtime settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Target frames per second for the generator tick loop.
    /// Zero or negative means "tick as fast as a minimal yield allows".
    #[serde(default = "default_fps_limit")]
    pub fps_limit: f64,
}

fn default_fps_limit() -> f64 {
    DEFAULT_FPS_LIMIT
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            fps_limit: DEFAULT_FPS_LIMIT,
        }
    }
}

/// One node in the graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Registry tag (e.g. "number_generator")
    #[serde(rename = "type")]
    pub node_type: String,

    /// User-given name, unique within the pipeline
    #[serde(default)]
    pub name: String,

    /// Names of upstream nodes whose output channels feed this node
    #[serde(default)]
    pub inputs: Vec<String>,

    /// Node-specific parameters. String values of the form
    /// `@ref:<node>.<path>` are reference bindings, not literals.
    #[serde(default = "empty_params")]
    pub params: serde_json::Value,
}

fn empty_params() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl PipelineConfig {
    /// Build a config from a JSON value (the manager's map-form input)
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a `.json`, `.yaml`, or `.yml` file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: PipelineConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&text)
                .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))?,
            Some("json") => serde_json::from_str(&text)?,
            other => {
                return Err(Error::Config(format!(
                    "unsupported config format: {:?}",
                    other.unwrap_or("<none>")
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Structural validation: names present and unique, inputs reference
    /// nodes declared in this graph.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for spec in &self.nodes {
            if spec.name.is_empty() {
                return Err(Error::Config(format!(
                    "node of type '{}' is missing a name",
                    spec.node_type
                )));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(Error::Config(format!("duplicate node name: {}", spec.name)));
            }
        }

        for spec in &self.nodes {
            for input in &spec.inputs {
                if !seen.contains(input.as_str()) {
                    return Err(Error::Config(format!(
                        "node '{}' references unknown input node '{input}'",
                        spec.name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Index of a node spec by name
    pub fn node_index(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name == name)
    }
}

/// Canonical output channel name for a node
pub fn output_channel(node_name: &str) -> String {
    format!("{node_name}_out")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_simple_config() {
        let config = PipelineConfig::from_value(json!({
            "settings": { "fps_limit": 30 },
            "nodes": [
                { "type": "number_generator", "name": "numbers", "params": { "start": 0, "step": 1 } },
                { "type": "console_logger", "name": "log", "inputs": ["numbers"] }
            ]
        }))
        .unwrap();

        assert_eq!(config.settings.fps_limit, 30.0);
        assert_eq!(config.nodes.len(), 2);
        assert_eq!(config.nodes[1].inputs, vec!["numbers".to_string()]);
    }

    #[test]
    fn test_fps_limit_defaults_to_60() {
        let config = PipelineConfig::from_value(json!({ "nodes": [] })).unwrap();
        assert_eq!(config.settings.fps_limit, DEFAULT_FPS_LIMIT);
    }

    #[test]
    fn test_missing_name_rejected() {
        let err = PipelineConfig::from_value(json!({
            "nodes": [ { "type": "console_logger" } ]
        }))
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let err = PipelineConfig::from_value(json!({
            "nodes": [
                { "type": "timer", "name": "x" },
                { "type": "timer", "name": "x" }
            ]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_unknown_input_rejected() {
        let err = PipelineConfig::from_value(json!({
            "nodes": [
                { "type": "console_logger", "name": "log", "inputs": ["ghost"] }
            ]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_yaml_file_loading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.yaml");
        std::fs::write(
            &path,
            "settings:\n  fps_limit: 24\nnodes:\n  - type: timer\n    name: tick\n",
        )
        .unwrap();

        let config = PipelineConfig::from_path(&path).unwrap();
        assert_eq!(config.settings.fps_limit, 24.0);
        assert_eq!(config.nodes[0].name, "tick");
    }
}
