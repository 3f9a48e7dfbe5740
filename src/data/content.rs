//! Packet payload value model
//!
//! [`Content`] is the owned, self-describing value carried by a packet:
//! scalars, text, raw bytes, and nested lists/maps of the same. It
//! round-trips through the bus codec without loss (unlike
//! `serde_json::Value`, raw bytes stay bytes) and supports the dotted-path
//! traversal used by reference-bound parameters.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque typed value carried in a packet's `content` and `metadata`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Content {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<Content>),
    Map(BTreeMap<String, Content>),
}

impl Content {
    /// Numeric view: integers and floats widen to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Content::Integer(i) => Some(*i as f64),
            Content::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Integer view; floats with no fractional part convert
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Content::Integer(i) => Some(*i),
            Content::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Content::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Content::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Map lookup by key
    pub fn get(&self, key: &str) -> Option<&Content> {
        match self {
            Content::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// List lookup by index
    pub fn index(&self, idx: usize) -> Option<&Content> {
        match self {
            Content::List(items) => items.get(idx),
            _ => None,
        }
    }

    /// Walk a dotted path: map keys by name, list elements by numeric
    /// segment. Returns `None` on the first segment that does not resolve.
    pub fn at_path<S: AsRef<str>>(&self, segments: &[S]) -> Option<&Content> {
        let mut current = self;
        for segment in segments {
            let segment = segment.as_ref();
            current = match current {
                Content::Map(map) => map.get(segment)?,
                Content::List(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Lossy conversion from JSON (config values, telemetry payloads)
    pub fn from_json(value: &serde_json::Value) -> Content {
        match value {
            serde_json::Value::Null => Content::Null,
            serde_json::Value::Bool(b) => Content::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Content::Integer(i)
                } else {
                    Content::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Content::Text(s.clone()),
            serde_json::Value::Array(items) => {
                Content::List(items.iter().map(Content::from_json).collect())
            }
            serde_json::Value::Object(map) => Content::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Content::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Conversion to JSON; bytes degrade to arrays of numbers
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Content::Null => serde_json::Value::Null,
            Content::Bool(b) => serde_json::Value::Bool(*b),
            Content::Integer(i) => serde_json::Value::from(*i),
            Content::Float(f) => {
                serde_json::Number::from_f64(*f).map_or(serde_json::Value::Null, Into::into)
            }
            Content::Text(s) => serde_json::Value::String(s.clone()),
            Content::Bytes(b) => serde_json::Value::Array(
                b.iter().map(|byte| serde_json::Value::from(*byte)).collect(),
            ),
            Content::List(items) => {
                serde_json::Value::Array(items.iter().map(Content::to_json).collect())
            }
            Content::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl fmt::Display for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Content::Null => write!(f, "null"),
            Content::Bool(b) => write!(f, "{b}"),
            Content::Integer(i) => write!(f, "{i}"),
            Content::Float(v) => write!(f, "{v}"),
            Content::Text(s) => write!(f, "{s}"),
            Content::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Content::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Content::Map(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl From<f64> for Content {
    fn from(value: f64) -> Self {
        Content::Float(value)
    }
}

impl From<i64> for Content {
    fn from(value: i64) -> Self {
        Content::Integer(value)
    }
}

impl From<bool> for Content {
    fn from(value: bool) -> Self {
        Content::Bool(value)
    }
}

impl From<&str> for Content {
    fn from(value: &str) -> Self {
        Content::Text(value.to_string())
    }
}

impl From<String> for Content {
    fn from(value: String) -> Self {
        Content::Text(value)
    }
}

impl From<Vec<u8>> for Content {
    fn from(value: Vec<u8>) -> Self {
        Content::Bytes(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_path_walk_maps_and_lists() {
        let value = Content::from_json(&json!({
            "readings": [ { "celsius": 21.5 }, { "celsius": 19.0 } ],
            "station": "north"
        }));

        assert_eq!(
            value.at_path(&["readings", "1", "celsius"]),
            Some(&Content::Float(19.0))
        );
        assert_eq!(value.at_path(&["station"]), Some(&Content::Text("north".into())));
        assert_eq!(value.at_path(&["missing"]), None);
        assert_eq!(value.at_path(&["readings", "nope"]), None);
    }

    #[test]
    fn test_json_round_trip_without_bytes() {
        let original = json!({ "a": [1, 2.5, "x", true, null] });
        let content = Content::from_json(&original);
        assert_eq!(content.to_json(), original);
    }

    #[test]
    fn test_bytes_survive_bincode() {
        let content = Content::Map(BTreeMap::from([(
            "blob".to_string(),
            Content::Bytes(vec![0, 159, 146, 150]),
        )]));
        let bytes = bincode::serialize(&content).unwrap();
        let back: Content = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, content);
    }

    #[test]
    fn test_numeric_views() {
        assert_eq!(Content::Integer(3).as_f64(), Some(3.0));
        assert_eq!(Content::Float(4.0).as_i64(), Some(4));
        assert_eq!(Content::Float(4.5).as_i64(), None);
        assert_eq!(Content::Text("3".into()).as_f64(), None);
    }
}
