//! Dataset references and data coordinates.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::dimension::DimensionRecord;

/// Globally unique identifier of one dataset reference.
///
/// Encoded in snapshot files as 16-byte fixed-width binary, never as text.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct DatasetId(Uuid);

impl DatasetId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Build an identifier from its 16-byte binary form.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// The 16-byte binary form written to snapshot files.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for DatasetId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// A dimension key value inside a data coordinate.
///
/// Key columns are restricted to integers and strings; the total ordering is
/// used for batch sorting and dimension-file deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyValue {
    /// Integer key (e.g. detector number, visit id).
    Int(i64),
    /// String key (e.g. instrument name, band).
    String(String),
}

impl From<i64> for KeyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for KeyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// An ordered mapping of dimension name to key value, used as the composite
/// key of a dataset reference.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataCoordinate {
    values: BTreeMap<String, KeyValue>,
}

impl DataCoordinate {
    /// Empty coordinate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion of one dimension value.
    #[must_use]
    pub fn with(mut self, dimension: impl Into<String>, value: impl Into<KeyValue>) -> Self {
        self.values.insert(dimension.into(), value.into());
        self
    }

    /// Insert one dimension value.
    pub fn insert(&mut self, dimension: impl Into<String>, value: impl Into<KeyValue>) {
        self.values.insert(dimension.into(), value.into());
    }

    /// Look up the value for one dimension.
    #[must_use]
    pub fn get(&self, dimension: &str) -> Option<&KeyValue> {
        self.values.get(dimension)
    }

    /// Iterate over (dimension, value) pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &KeyValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of dimensions assigned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no dimensions are assigned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sort key over the given dimension order. Missing dimensions sort
    /// first; writers reject them when building rows.
    #[must_use]
    pub fn sort_key(&self, dimensions: &[String]) -> Vec<Option<KeyValue>> {
        dimensions
            .iter()
            .map(|d| self.values.get(d).cloned())
            .collect()
    }
}

impl FromIterator<(String, KeyValue)> for DataCoordinate {
    fn from_iter<T: IntoIterator<Item = (String, KeyValue)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// One logical data product instance: identifier + data coordinate +
/// producing run collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRef {
    /// Globally unique dataset identifier.
    pub id: DatasetId,
    /// Name of the dataset type this reference instantiates.
    pub dataset_type: String,
    /// Name of the run collection that produced this dataset.
    pub run: String,
    /// Required-dimension key values.
    pub data_id: DataCoordinate,
}

/// A dataset reference together with the dimension records attached to its
/// data coordinate by the catalog query.
///
/// A `None` record means the catalog had no value for that dimension; the
/// exporter skips those.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedRef {
    /// The plain dataset reference.
    pub reference: DatasetRef,
    /// Attached dimension records, keyed by dimension element name.
    pub records: BTreeMap<String, Option<DimensionRecord>>,
}

impl ExpandedRef {
    /// Wrap a reference with no attached records.
    #[must_use]
    pub fn bare(reference: DatasetRef) -> Self {
        Self {
            reference,
            records: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_value_ordering() {
        assert!(KeyValue::Int(1) < KeyValue::Int(2));
        assert!(KeyValue::from("a") < KeyValue::from("b"));
        // Variant order puts all integers before all strings.
        assert!(KeyValue::Int(i64::MAX) < KeyValue::from(""));
    }

    #[test]
    fn test_sort_key_follows_dimension_order() {
        let coord = DataCoordinate::new()
            .with("visit", 42)
            .with("instrument", "LSSTComCam");
        let dims = vec!["instrument".to_string(), "visit".to_string()];
        assert_eq!(
            coord.sort_key(&dims),
            vec![Some(KeyValue::from("LSSTComCam")), Some(KeyValue::Int(42))]
        );
    }

    #[test]
    fn test_sort_key_missing_dimension_sorts_first() {
        let full = DataCoordinate::new().with("visit", 1);
        let empty = DataCoordinate::new();
        let dims = vec!["visit".to_string()];
        assert!(empty.sort_key(&dims) < full.sort_key(&dims));
    }

    #[test]
    fn test_dataset_id_round_trips_bytes() {
        let id = DatasetId::generate();
        assert_eq!(DatasetId::from_bytes(*id.as_bytes()), id);
    }

    #[test]
    fn test_dataset_id_serializes_as_plain_uuid_text() {
        let id = DatasetId::from_bytes([0xab; 16]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abababab-abab-abab-abab-abababababab\"");
        let back: DatasetId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
