//! Typed packet envelope
//!
//! Packets are immutable once emitted: nodes never modify a packet they
//! received, they derive new ones through [`PacketBuilder`]. The builder
//! is also where a producing node stamps itself into the
//! `processing_chain`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::content::Content;
use super::types::{
    DataCategory, DataFormat, DataSource, DataType, LifecycleState, SensitivityLevel,
};

/// Typed envelope exchanged on channels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPacket {
    pub data_type: DataType,
    pub format: DataFormat,
    pub category: DataCategory,
    pub lifecycle_state: LifecycleState,
    pub sensitivity: SensitivityLevel,
    pub source: DataSource,
    pub content: Content,
    /// Creation instant
    pub timestamp: DateTime<Utc>,
    /// Monotonic per-producer counter, when the producer keeps one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_id: Option<u64>,
    /// Node ids that have touched this packet, oldest first
    #[serde(default)]
    pub processing_chain: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, Content>>,
}

impl DataPacket {
    /// Start a fresh packet. Defaults: STATIC / NUMERICAL / GENERIC,
    /// lifecycle RAW, sensitivity PUBLIC, source INTERNAL.
    pub fn builder(content: Content) -> PacketBuilder {
        PacketBuilder {
            packet: DataPacket {
                data_type: DataType::Static,
                format: DataFormat::Numerical,
                category: DataCategory::Generic,
                lifecycle_state: LifecycleState::Raw,
                sensitivity: SensitivityLevel::Public,
                source: DataSource::Internal,
                content,
                timestamp: Utc::now(),
                sequence_id: None,
                processing_chain: Vec::new(),
                metadata: None,
            },
        }
    }

    /// Start a derivative packet: every field copied from `self`, content
    /// replaced, data type defaulting to DERIVED, timestamp refreshed.
    /// The producing node is appended via [`PacketBuilder::touched_by`].
    pub fn derive(&self, content: Content) -> PacketBuilder {
        let mut packet = self.clone();
        packet.content = content;
        packet.data_type = DataType::Derived;
        packet.timestamp = Utc::now();
        PacketBuilder { packet }
    }

    /// Resolve a dotted reference path against this packet.
    ///
    /// The first segment selects `content`, `metadata`, or a top-level
    /// field; remaining segments descend map keys and numeric list
    /// indices.
    pub fn value_at_path<S: AsRef<str>>(&self, segments: &[S]) -> Option<Content> {
        let (head, rest) = segments.split_first()?;
        match head.as_ref() {
            "content" => self.content.at_path(rest).cloned(),
            "metadata" => {
                let map = self.metadata.as_ref()?;
                let (key, rest) = rest.split_first()?;
                map.get(key.as_ref())?.at_path(rest).cloned()
            }
            field if rest.is_empty() => self.top_level_field(field),
            _ => None,
        }
    }

    fn top_level_field(&self, field: &str) -> Option<Content> {
        match field {
            "data_type" => Some(enum_text(&self.data_type)),
            "format" => Some(enum_text(&self.format)),
            "category" => Some(enum_text(&self.category)),
            "lifecycle_state" => Some(enum_text(&self.lifecycle_state)),
            "sensitivity" => Some(enum_text(&self.sensitivity)),
            "source" => Some(enum_text(&self.source)),
            "timestamp" => Some(Content::Float(
                self.timestamp.timestamp_micros() as f64 / 1_000_000.0,
            )),
            "sequence_id" => Some(
                self.sequence_id
                    .map_or(Content::Null, |id| Content::Integer(id as i64)),
            ),
            "processing_chain" => Some(Content::List(
                self.processing_chain
                    .iter()
                    .map(|id| Content::Text(id.clone()))
                    .collect(),
            )),
            _ => None,
        }
    }
}

/// Serde-backed snake_case name of a vocabulary enum value, used when a
/// reference path targets a top-level packet field.
fn enum_text<T: serde::Serialize>(value: &T) -> Content {
    Content::Text(
        serde_json::to_value(value)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default(),
    )
}

/// Field-by-field packet construction
pub struct PacketBuilder {
    packet: DataPacket,
}

impl PacketBuilder {
    pub fn data_type(mut self, data_type: DataType) -> Self {
        self.packet.data_type = data_type;
        self
    }

    pub fn format(mut self, format: DataFormat) -> Self {
        self.packet.format = format;
        self
    }

    pub fn category(mut self, category: DataCategory) -> Self {
        self.packet.category = category;
        self
    }

    pub fn lifecycle_state(mut self, state: LifecycleState) -> Self {
        self.packet.lifecycle_state = state;
        self
    }

    pub fn sensitivity(mut self, sensitivity: SensitivityLevel) -> Self {
        self.packet.sensitivity = sensitivity;
        self
    }

    pub fn source(mut self, source: DataSource) -> Self {
        self.packet.source = source;
        self
    }

    pub fn sequence_id(mut self, id: u64) -> Self {
        self.packet.sequence_id = Some(id);
        self
    }

    pub fn metadata(mut self, metadata: BTreeMap<String, Content>) -> Self {
        self.packet.metadata = Some(metadata);
        self
    }

    /// Append `node_id` to the processing chain. Called once per emitting
    /// node; the packet helpers on `NodeContext` take care of it.
    pub fn touched_by(mut self, node_id: &str) -> Self {
        self.packet.processing_chain.push(node_id.to_string());
        self
    }

    pub fn build(self) -> DataPacket {
        self.packet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataPacket {
        DataPacket::builder(Content::Float(21.5))
            .data_type(DataType::Stream)
            .category(DataCategory::Environmental)
            .sequence_id(7)
            .touched_by("sensor_ab12cd34")
            .build()
    }

    #[test]
    fn test_codec_round_trip_identity() {
        let packet = sample();
        let bytes = bincode::serialize(&packet).unwrap();
        let back: DataPacket = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, packet);
    }

    #[test]
    fn test_derive_appends_chain_once() {
        let original = sample();
        let derived = original
            .derive(Content::Float(43.0))
            .touched_by("scale_ff00aa11")
            .build();

        assert_eq!(derived.data_type, DataType::Derived);
        assert_eq!(derived.content, Content::Float(43.0));
        assert_eq!(
            derived.processing_chain,
            vec!["sensor_ab12cd34".to_string(), "scale_ff00aa11".to_string()]
        );
        // The original is untouched
        assert_eq!(original.processing_chain.len(), 1);
        assert_eq!(original.content, Content::Float(21.5));
    }

    #[test]
    fn test_value_at_path_content_and_fields() {
        let mut packet = sample();
        packet.content = Content::Map(
            [("inner".to_string(), Content::Integer(5))]
                .into_iter()
                .collect(),
        );
        packet.metadata = Some(
            [("origin".to_string(), Content::Text("udp".into()))]
                .into_iter()
                .collect(),
        );

        assert_eq!(
            packet.value_at_path(&["content", "inner"]),
            Some(Content::Integer(5))
        );
        assert_eq!(
            packet.value_at_path(&["metadata", "origin"]),
            Some(Content::Text("udp".into()))
        );
        assert_eq!(
            packet.value_at_path(&["data_type"]),
            Some(Content::Text("stream".into()))
        );
        assert_eq!(
            packet.value_at_path(&["sequence_id"]),
            Some(Content::Integer(7))
        );
        assert_eq!(packet.value_at_path(&["nonexistent"]), None);
    }
}
