//! Node type registry
//!
//! Process-wide mapping from type tag to factory, with parameter-schema
//! introspection for control surfaces. Node types contribute themselves
//! at link time through [`inventory`]; the [`register_node!`] macro in
//! each node module generates the submission. Tests may also register
//! types at runtime.
//!
//! A node's category is derived from its defining module path by
//! convention: `nodes::processors::math_multiply` registers under the
//! `processors` category.

use parking_lot::RwLock;
use serde_json::json;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::error;

use super::{NodeHandler, NodeProfile};
use crate::{Error, Result};

/// Factory function building a handler from cleaned params
pub type FactoryFn = fn(&serde_json::Value) -> Result<Box<dyn NodeHandler>>;

/// Link-time registration record submitted by [`register_node!`]
pub struct NodeRegistration {
    /// Type tag used in configuration (`"number_generator"`)
    pub tag: &'static str,
    /// `module_path!()` at the registration site; the category is its
    /// second-to-last segment
    pub module_path: &'static str,
    pub factory: FactoryFn,
    pub profile: fn() -> NodeProfile,
    pub params_schema: fn() -> serde_json::Value,
}

inventory::collect!(NodeRegistration);

struct Entry {
    category: String,
    factory: FactoryFn,
    profile: fn() -> NodeProfile,
    schema: serde_json::Value,
    validator: Option<jsonschema::Validator>,
}

/// Tag-to-factory mapping with schema introspection
pub struct NodeRegistry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl NodeRegistry {
    /// Empty registry (tests)
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Process-wide registry, populated from the link-time submissions on
    /// first use
    pub fn global() -> &'static NodeRegistry {
        static REGISTRY: OnceLock<NodeRegistry> = OnceLock::new();
        REGISTRY.get_or_init(|| {
            let registry = NodeRegistry::new();
            for registration in inventory::iter::<NodeRegistration> {
                if let Err(e) = registry.register(registration) {
                    error!(tag = registration.tag, error = %e, "node registration skipped");
                }
            }
            registry
        })
    }

    /// Register a node type; duplicate tags are rejected.
    pub fn register(&self, registration: &NodeRegistration) -> Result<()> {
        let mut entries = self.entries.write();
        if entries.contains_key(registration.tag) {
            return Err(Error::Config(format!(
                "node type '{}' already registered",
                registration.tag
            )));
        }

        let schema = (registration.params_schema)();
        let validator = match jsonschema::draft7::new(&schema) {
            Ok(validator) => Some(validator),
            Err(e) => {
                // An uncompilable schema disables validation for the type
                // rather than blocking startup
                error!(tag = registration.tag, error = %e, "failed to compile params schema");
                None
            }
        };

        entries.insert(
            registration.tag.to_string(),
            Entry {
                category: category_of(registration.module_path),
                factory: registration.factory,
                profile: registration.profile,
                schema,
                validator,
            },
        );
        Ok(())
    }

    /// Instantiate a handler for `tag` from a cleaned params object
    pub fn create(&self, tag: &str, params: &serde_json::Value) -> Result<Box<dyn NodeHandler>> {
        let entries = self.entries.read();
        let entry = entries
            .get(tag)
            .ok_or_else(|| Error::UnknownNodeType(tag.to_string()))?;
        (entry.factory)(params)
    }

    /// Execution profile for `tag`
    pub fn profile(&self, tag: &str) -> Result<NodeProfile> {
        let entries = self.entries.read();
        let entry = entries
            .get(tag)
            .ok_or_else(|| Error::UnknownNodeType(tag.to_string()))?;
        Ok((entry.profile)())
    }

    /// All registered tags, sorted
    pub fn list_available(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.entries.read().keys().cloned().collect();
        tags.sort();
        tags
    }

    /// Category for `tag`, derived from the defining module path
    pub fn category(&self, tag: &str) -> Option<String> {
        self.entries.read().get(tag).map(|e| e.category.clone())
    }

    /// Parameter schema for `tag`; `{"type": "object"}` when the type
    /// declares no parameters
    pub fn params_schema(&self, tag: &str) -> Result<serde_json::Value> {
        let entries = self.entries.read();
        let entry = entries
            .get(tag)
            .ok_or_else(|| Error::UnknownNodeType(tag.to_string()))?;
        if entry.schema.is_null() {
            return Ok(json!({ "type": "object" }));
        }
        Ok(entry.schema.clone())
    }

    /// Validate a params object against the type's schema
    pub fn validate_params(&self, tag: &str, params: &serde_json::Value) -> Result<()> {
        let entries = self.entries.read();
        let entry = entries
            .get(tag)
            .ok_or_else(|| Error::UnknownNodeType(tag.to_string()))?;
        let Some(validator) = &entry.validator else {
            return Ok(());
        };

        let failures: Vec<String> = validator
            .iter_errors(params)
            .map(|e| format!("{} at /{}", e, e.instance_path))
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidParams {
                node: tag.to_string(),
                reason: failures.join("; "),
            })
        }
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.entries.read().contains_key(tag)
    }

    /// Tag, category, and params schema for every registered type, in the
    /// shape control surfaces list node types in
    pub fn describe_all(&self) -> Vec<serde_json::Value> {
        self.list_available()
            .into_iter()
            .map(|tag| {
                json!({
                    "tag": tag,
                    "category": self.category(&tag),
                    "params_schema": self.params_schema(&tag).ok(),
                })
            })
            .collect()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn category_of(module_path: &str) -> String {
    let mut segments = module_path.rsplit("::");
    let _leaf = segments.next();
    segments.next().unwrap_or("uncategorized").to_string()
}

/// Register a node type with the global registry.
///
/// Written at the bottom of the node's defining module:
///
/// ```ignore
/// register_node!("math_multiply", MathMultiplyNode);
/// ```
#[macro_export]
macro_rules! register_node {
    ($tag:literal, $ty:ty) => {
        inventory::submit! {
            $crate::node::registry::NodeRegistration {
                tag: $tag,
                module_path: module_path!(),
                factory: |params| {
                    let handler = <$ty as $crate::node::ConfiguredNode>::from_params(params)?;
                    Ok(Box::new(handler) as Box<dyn $crate::node::NodeHandler>)
                },
                profile: <$ty as $crate::node::ConfiguredNode>::profile,
                params_schema: <$ty as $crate::node::ConfiguredNode>::params_schema,
            }
        }
    };
}
