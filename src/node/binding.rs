//! Reference-bound parameters
//!
//! A parameter whose configured value is the string form
//! `@ref:<node>.<segment>...` is a binding, not a literal: the parameter
//! tracks a live value extracted from the upstream node's latest packet.
//! Bindings are parsed into structured descriptors at build time and
//! applied on delivery, before the packet's normal input handling.

use serde_json::Value;
use tracing::warn;

use crate::data::Content;
use crate::{Error, Result};

/// Marker prefix for reference parameters
pub const REF_PREFIX: &str = "@ref:";

/// Parameter type declared by the node's JSON schema; bound values are
/// coerced to it before being applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    /// No usable type in the schema; values pass through unconverted
    Any,
}

/// Structured descriptor for one `@ref:` parameter
#[derive(Debug, Clone)]
pub struct ParamBinding {
    /// Parameter name the binding feeds
    pub param: String,
    /// Upstream node name
    pub upstream: String,
    /// Channel the bound value arrives on (`<upstream>_out`)
    pub channel: String,
    /// Path segments walked on the upstream packet; the first selects
    /// `content`, `metadata`, or a top-level field
    pub path: Vec<String>,
    /// Target type for coercion
    pub declared_type: DeclaredType,
}

/// Parse a raw `@ref:` string into `(upstream, path)`.
///
/// Returns `None` for values that are not references at all; `Err` for
/// malformed references.
pub fn parse_ref(raw: &str) -> Result<Option<(String, Vec<String>)>> {
    let Some(path) = raw.strip_prefix(REF_PREFIX) else {
        return Ok(None);
    };
    if path.is_empty()
        || !path
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
    {
        return Err(Error::Reference(format!("malformed reference '{raw}'")));
    }

    let mut segments = path.split('.').map(str::to_string);
    let upstream = segments.next().filter(|s| !s.is_empty()).ok_or_else(|| {
        Error::Reference(format!("reference '{raw}' is missing the upstream node name"))
    })?;
    let mut rest: Vec<String> = segments.collect();
    if rest.iter().any(String::is_empty) {
        return Err(Error::Reference(format!("reference '{raw}' has an empty segment")));
    }
    // A bare node reference tracks the packet content
    if rest.is_empty() {
        rest.push("content".to_string());
    }
    Ok(Some((upstream, rest)))
}

/// Split `@ref:` entries out of a params object.
///
/// Reference-valued entries are removed from `params` (so typed
/// deserialization sees the declared defaults) and returned as structured
/// bindings, with each target type read from the node's schema.
pub fn extract_bindings(params: &mut Value, schema: &Value) -> Result<Vec<ParamBinding>> {
    let Some(map) = params.as_object_mut() else {
        return Ok(Vec::new());
    };

    let mut bindings = Vec::new();
    let ref_keys: Vec<String> = map
        .iter()
        .filter(|(_, v)| v.as_str().is_some_and(|s| s.starts_with(REF_PREFIX)))
        .map(|(k, _)| k.clone())
        .collect();

    for key in ref_keys {
        let raw = map
            .remove(&key)
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        let (upstream, path) = parse_ref(&raw)?
            .ok_or_else(|| Error::Reference(format!("malformed reference '{raw}'")))?;
        bindings.push(ParamBinding {
            channel: crate::config::output_channel(&upstream),
            declared_type: declared_type_of(schema, &key),
            param: key,
            upstream,
            path,
        });
    }

    Ok(bindings)
}

/// Read a parameter's declared type out of a JSON schema
pub fn declared_type_of(schema: &Value, param: &str) -> DeclaredType {
    let type_value = schema
        .get("properties")
        .and_then(|props| props.get(param))
        .and_then(|prop| prop.get("type"));

    let name = match type_value {
        Some(Value::String(name)) => Some(name.as_str()),
        // Optional fields come out as ["integer", "null"]; take the real one
        Some(Value::Array(names)) => names
            .iter()
            .filter_map(Value::as_str)
            .find(|n| *n != "null"),
        _ => None,
    };

    match name {
        Some("string") => DeclaredType::String,
        Some("integer") => DeclaredType::Integer,
        Some("number") => DeclaredType::Number,
        Some("boolean") => DeclaredType::Boolean,
        Some("array") => DeclaredType::Array,
        Some("object") => DeclaredType::Object,
        _ => DeclaredType::Any,
    }
}

/// Coerce an extracted value to the declared parameter type.
///
/// Returns `None` when no sensible conversion exists; the caller keeps
/// the prior parameter value in that case.
pub fn coerce(value: &Content, declared: DeclaredType) -> Option<Value> {
    match declared {
        DeclaredType::Any => Some(value.to_json()),
        DeclaredType::String => match value {
            Content::Text(s) => Some(Value::String(s.clone())),
            Content::Integer(_) | Content::Float(_) | Content::Bool(_) => {
                Some(Value::String(value.to_string()))
            }
            _ => None,
        },
        DeclaredType::Integer => match value {
            Content::Integer(i) => Some(Value::from(*i)),
            Content::Float(f) if f.fract() == 0.0 => Some(Value::from(*f as i64)),
            Content::Bool(b) => Some(Value::from(*b as i64)),
            Content::Text(s) => s.trim().parse::<i64>().ok().map(Value::from),
            _ => None,
        },
        DeclaredType::Number => match value {
            Content::Integer(i) => Some(Value::from(*i)),
            Content::Float(f) => serde_json::Number::from_f64(*f).map(Value::Number),
            Content::Text(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            _ => None,
        },
        DeclaredType::Boolean => match value {
            Content::Bool(b) => Some(Value::Bool(*b)),
            Content::Integer(0) => Some(Value::Bool(false)),
            Content::Integer(1) => Some(Value::Bool(true)),
            Content::Text(s) => match s.trim() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        },
        DeclaredType::Array => match value {
            Content::List(_) => Some(value.to_json()),
            _ => None,
        },
        DeclaredType::Object => match value {
            Content::Map(_) => Some(value.to_json()),
            _ => None,
        },
    }
}

/// Apply one binding against a freshly delivered upstream packet.
///
/// Returns the updated params object when the walk, the coercion, and the
/// merge all succeed; `None` (with a warning) otherwise.
pub fn resolve_update(
    binding: &ParamBinding,
    packet: &crate::data::DataPacket,
    current_params: &Value,
) -> Option<Value> {
    let Some(value) = packet.value_at_path(&binding.path) else {
        warn!(
            param = %binding.param,
            upstream = %binding.upstream,
            path = %binding.path.join("."),
            "reference path did not resolve; retaining prior value"
        );
        return None;
    };

    let Some(coerced) = coerce(&value, binding.declared_type) else {
        warn!(
            param = %binding.param,
            upstream = %binding.upstream,
            ?value,
            "reference value failed coercion; retaining prior value"
        );
        return None;
    };

    let mut params = current_params.clone();
    if !params.is_object() {
        params = Value::Object(serde_json::Map::new());
    }
    params[binding.param.as_str()] = coerced;
    Some(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_ref_forms() {
        assert_eq!(parse_ref("plain string").unwrap(), None);
        assert_eq!(
            parse_ref("@ref:ctrl.content").unwrap(),
            Some(("ctrl".to_string(), vec!["content".to_string()]))
        );
        assert_eq!(
            parse_ref("@ref:ctrl.content.level.0").unwrap(),
            Some((
                "ctrl".to_string(),
                vec!["content".to_string(), "level".to_string(), "0".to_string()]
            ))
        );
        // Bare node name defaults to tracking content
        assert_eq!(
            parse_ref("@ref:ctrl").unwrap(),
            Some(("ctrl".to_string(), vec!["content".to_string()]))
        );
        assert!(parse_ref("@ref:").is_err());
        assert!(parse_ref("@ref:bad name").is_err());
    }

    #[test]
    fn test_extract_bindings_strips_refs() {
        let schema = json!({
            "type": "object",
            "properties": {
                "multiplier": { "type": "integer" },
                "label": { "type": "string" }
            }
        });
        let mut params = json!({
            "multiplier": "@ref:ctrl.content",
            "label": "fixed"
        });

        let bindings = extract_bindings(&mut params, &schema).unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].param, "multiplier");
        assert_eq!(bindings[0].upstream, "ctrl");
        assert_eq!(bindings[0].channel, "ctrl_out");
        assert_eq!(bindings[0].declared_type, DeclaredType::Integer);
        // The ref entry is gone, the literal stays
        assert_eq!(params, json!({ "label": "fixed" }));
    }

    #[test]
    fn test_coercions() {
        assert_eq!(
            coerce(&Content::Float(4.0), DeclaredType::Integer),
            Some(json!(4))
        );
        assert_eq!(coerce(&Content::Float(4.5), DeclaredType::Integer), None);
        assert_eq!(
            coerce(&Content::Text("12".into()), DeclaredType::Number),
            Some(json!(12.0))
        );
        assert_eq!(
            coerce(&Content::Integer(3), DeclaredType::String),
            Some(json!("3"))
        );
        assert_eq!(
            coerce(&Content::Text("nope".into()), DeclaredType::Integer),
            None
        );
        assert_eq!(
            coerce(&Content::List(vec![Content::Integer(1)]), DeclaredType::Array),
            Some(json!([1]))
        );
    }

    #[test]
    fn test_resolve_update_failure_keeps_prior() {
        let binding = ParamBinding {
            param: "multiplier".into(),
            upstream: "ctrl".into(),
            channel: "ctrl_out".into(),
            path: vec!["content".into()],
            declared_type: DeclaredType::Integer,
        };
        let packet = crate::data::DataPacket::builder(Content::Text("not a number".into())).build();
        let prior = json!({ "multiplier": 3 });

        assert!(resolve_update(&binding, &packet, &prior).is_none());
    }
}
