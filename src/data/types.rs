//! Packet classification vocabularies
//!
//! Every packet carries one value from each of these enumerations; nodes
//! declare membership sets over the first three to validate their inputs.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// High-level kind of data a packet carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Real-time triggers
    Event,
    /// Immutable datasets
    Static,
    /// Continuous feeds
    Stream,
    /// Processed outputs
    Derived,
    /// User interactions
    Transactional,
}

/// Physical shape of the packet content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFormat {
    /// Scalars, vectors, tensors
    Numerical,
    /// Plain text
    Textual,
    /// Images, audio, video
    Media,
    /// GPS / GeoJSON
    Geospatial,
    /// Serialized blobs
    Binary,
    /// Structured JSON documents
    Json,
}

/// Domain the data belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataCategory {
    Geospatial,
    Media,
    UserActivity,
    Environmental,
    Social,
    Network,
    Generic,
}

/// Processing stage a packet has reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Raw,
    Processed,
    Enriched,
    Archived,
}

/// Handling classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensitivityLevel {
    Public,
    Confidential,
    Restricted,
}

/// Origin of the data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Internal,
    External,
    UserGenerated,
}

impl DataType {
    /// All variants, in declaration order
    pub fn all() -> &'static [DataType] {
        &[
            DataType::Event,
            DataType::Static,
            DataType::Stream,
            DataType::Derived,
            DataType::Transactional,
        ]
    }
}

impl DataFormat {
    /// All variants, in declaration order
    pub fn all() -> &'static [DataFormat] {
        &[
            DataFormat::Numerical,
            DataFormat::Textual,
            DataFormat::Media,
            DataFormat::Geospatial,
            DataFormat::Binary,
            DataFormat::Json,
        ]
    }
}

impl DataCategory {
    /// All variants, in declaration order
    pub fn all() -> &'static [DataCategory] {
        &[
            DataCategory::Geospatial,
            DataCategory::Media,
            DataCategory::UserActivity,
            DataCategory::Environmental,
            DataCategory::Social,
            DataCategory::Network,
            DataCategory::Generic,
        ]
    }
}

/// Membership sets a node validates inbound packets against.
///
/// A packet passes only when its `(data_type, format, category)` triple is
/// a member of all three sets.
#[derive(Debug, Clone)]
pub struct AcceptedKinds {
    pub data_types: HashSet<DataType>,
    pub formats: HashSet<DataFormat>,
    pub categories: HashSet<DataCategory>,
}

impl AcceptedKinds {
    /// Accept every combination
    pub fn all() -> Self {
        Self {
            data_types: DataType::all().iter().copied().collect(),
            formats: DataFormat::all().iter().copied().collect(),
            categories: DataCategory::all().iter().copied().collect(),
        }
    }

    /// Accept nothing (generators with no inputs)
    pub fn none() -> Self {
        Self {
            data_types: HashSet::new(),
            formats: HashSet::new(),
            categories: HashSet::new(),
        }
    }

    /// Builder-style narrowing of the data-type set
    pub fn with_data_types(mut self, data_types: impl IntoIterator<Item = DataType>) -> Self {
        self.data_types = data_types.into_iter().collect();
        self
    }

    /// Builder-style narrowing of the format set
    pub fn with_formats(mut self, formats: impl IntoIterator<Item = DataFormat>) -> Self {
        self.formats = formats.into_iter().collect();
        self
    }

    /// Builder-style narrowing of the category set
    pub fn with_categories(mut self, categories: impl IntoIterator<Item = DataCategory>) -> Self {
        self.categories = categories.into_iter().collect();
        self
    }

    /// Whether the packet's classification triple is accepted
    pub fn accepts(&self, packet: &super::DataPacket) -> bool {
        self.data_types.contains(&packet.data_type)
            && self.formats.contains(&packet.format)
            && self.categories.contains(&packet.category)
    }

    /// First accepted data type, in declaration order
    pub fn first_data_type(&self) -> Option<DataType> {
        DataType::all()
            .iter()
            .copied()
            .find(|t| self.data_types.contains(t))
    }

    /// First accepted format, in declaration order
    pub fn first_format(&self) -> Option<DataFormat> {
        DataFormat::all()
            .iter()
            .copied()
            .find(|f| self.formats.contains(f))
    }

    /// First accepted category, in declaration order
    pub fn first_category(&self) -> Option<DataCategory> {
        DataCategory::all()
            .iter()
            .copied()
            .find(|c| self.categories.contains(c))
    }
}

impl Default for AcceptedKinds {
    fn default() -> Self {
        Self::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&DataType::Stream).unwrap();
        assert_eq!(json, "\"stream\"");
        let back: DataType = serde_json::from_str("\"derived\"").unwrap();
        assert_eq!(back, DataType::Derived);
    }

    #[test]
    fn test_accepted_all_contains_everything() {
        let kinds = AcceptedKinds::all();
        assert_eq!(kinds.data_types.len(), DataType::all().len());
        assert_eq!(kinds.formats.len(), DataFormat::all().len());
        assert_eq!(kinds.categories.len(), DataCategory::all().len());
    }

    #[test]
    fn test_first_accepted_respects_declaration_order() {
        let kinds = AcceptedKinds::all()
            .with_data_types([DataType::Derived, DataType::Stream])
            .with_formats([DataFormat::Numerical]);
        // Stream precedes Derived in the declaration order
        assert_eq!(kinds.first_data_type(), Some(DataType::Stream));
        assert_eq!(kinds.first_format(), Some(DataFormat::Numerical));
    }
}
