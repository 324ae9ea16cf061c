//! Dimension elements, records, and the dimension universe.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::dataset::KeyValue;
use crate::{Error, Result};

/// Column data types supported by dimension record schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// 64-bit integer.
    Int,
    /// 64-bit float.
    Float,
    /// UTF-8 string.
    String,
    /// Boolean.
    Bool,
}

/// One column of a dimension element's record schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name.
    pub name: String,
    /// Column data type.
    pub column_type: ColumnType,
    /// Whether the column may hold nulls. Key columns never do.
    pub nullable: bool,
}

/// A named axis of metadata with its own record schema.
///
/// `required` lists the key column names that uniquely identify a record
/// within this element, ordered low-to-high cardinality as declared by the
/// catalog. Elements without their own table are derived from other
/// dimensions and carry no insertable rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionElement {
    /// Element name (e.g. "visit", "detector").
    pub name: String,
    /// Data type of this dimension's own primary key as it appears inside a
    /// data coordinate.
    pub key_type: ColumnType,
    /// Full record schema, key columns included.
    pub columns: Vec<ColumnSpec>,
    /// Key column names, in declared (low-to-high cardinality) order.
    pub required: Vec<String>,
    /// Whether this element owns physical storage. Derived elements (e.g. a
    /// band derived from a physical filter) do not, and are skipped on import.
    pub has_own_table: bool,
}

impl DimensionElement {
    /// New element with the given primary-key type; owns its table by default.
    #[must_use]
    pub fn new(name: impl Into<String>, key_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            key_type,
            columns: Vec::new(),
            required: Vec::new(),
            has_own_table: true,
        }
    }

    /// Builder-style column addition.
    #[must_use]
    pub fn with_column(
        mut self,
        name: impl Into<String>,
        column_type: ColumnType,
        nullable: bool,
    ) -> Self {
        self.columns.push(ColumnSpec {
            name: name.into(),
            column_type,
            nullable,
        });
        self
    }

    /// Builder-style declaration of the key column names.
    #[must_use]
    pub fn with_required(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.required = names.into_iter().map(Into::into).collect();
        self
    }

    /// Builder-style flag for derived elements with no physical storage.
    #[must_use]
    pub const fn without_own_table(mut self) -> Self {
        self.has_own_table = false;
        self
    }

    /// Look up one column spec by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// A general record cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnValue {
    /// Integer cell.
    Int(i64),
    /// Float cell.
    Float(f64),
    /// String cell.
    String(String),
    /// Boolean cell.
    Bool(bool),
}

impl From<KeyValue> for ColumnValue {
    fn from(value: KeyValue) -> Self {
        match value {
            KeyValue::Int(v) => Self::Int(v),
            KeyValue::String(v) => Self::String(v),
        }
    }
}

impl ColumnValue {
    /// Convert to an ordered key value; `None` for floats and booleans,
    /// which are not valid key column types.
    #[must_use]
    pub fn as_key(&self) -> Option<KeyValue> {
        match self {
            Self::Int(v) => Some(KeyValue::Int(*v)),
            Self::String(v) => Some(KeyValue::String(v.clone())),
            Self::Float(_) | Self::Bool(_) => None,
        }
    }
}

/// A row of descriptive metadata belonging to one dimension element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionRecord {
    /// Name of the owning dimension element.
    pub element: String,
    /// Cell values keyed by column name. `None` is a null cell.
    pub values: BTreeMap<String, Option<ColumnValue>>,
}

impl DimensionRecord {
    /// New empty record for an element.
    #[must_use]
    pub fn new(element: impl Into<String>) -> Self {
        Self {
            element: element.into(),
            values: BTreeMap::new(),
        }
    }

    /// Builder-style cell assignment.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<ColumnValue>) -> Self {
        self.values.insert(column.into(), Some(value.into()));
        self
    }

    /// Builder-style null cell.
    #[must_use]
    pub fn with_null(mut self, column: impl Into<String>) -> Self {
        self.values.insert(column.into(), None);
        self
    }

    /// The record's identity within its element: the values of the element's
    /// key columns, in declared order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Snapshot`] if a key column is missing or null, or
    /// holds a non-key data type.
    pub fn key(&self, element: &DimensionElement) -> Result<Vec<KeyValue>> {
        element
            .required
            .iter()
            .map(|column| {
                self.values
                    .get(column)
                    .and_then(Option::as_ref)
                    .and_then(ColumnValue::as_key)
                    .ok_or_else(|| {
                        Error::Snapshot(format!(
                            "dimension record for '{}' is missing key column '{column}'",
                            self.element
                        ))
                    })
            })
            .collect()
    }
}

impl From<i64> for ColumnValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for ColumnValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for ColumnValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ColumnValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for ColumnValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Registry of dimension elements in topological dependency order.
///
/// Insertion order is the topological order: an element must be inserted
/// after every element it depends on. [`DimensionUniverse::sorted`] relies on
/// this to produce a valid import order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionUniverse {
    elements: Vec<DimensionElement>,
}

impl DimensionUniverse {
    /// Empty universe.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style element registration, in topological order.
    #[must_use]
    pub fn with_element(mut self, element: DimensionElement) -> Self {
        self.elements.push(element);
        self
    }

    /// Look up one element by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&DimensionElement> {
        self.elements.iter().find(|e| e.name == name)
    }

    /// Iterate over all elements in topological order.
    pub fn iter(&self) -> impl Iterator<Item = &DimensionElement> {
        self.elements.iter()
    }

    /// Filter a set of element names down to known elements, returned in
    /// topological order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if any requested name is unknown.
    pub fn sorted<'a>(&self, names: &[&'a str]) -> Result<Vec<&DimensionElement>> {
        for name in names {
            if self.get(name).is_none() {
                return Err(Error::Config(format!(
                    "dimension '{name}' is not part of the dimension universe"
                )));
            }
        }
        Ok(self
            .elements
            .iter()
            .filter(|e| names.contains(&e.name.as_str()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> DimensionElement {
        DimensionElement::new("detector", ColumnType::Int)
            .with_column("instrument", ColumnType::String, false)
            .with_column("id", ColumnType::Int, false)
            .with_column("full_name", ColumnType::String, true)
            .with_required(["instrument", "id"])
    }

    #[test]
    fn test_record_key_in_declared_order() {
        let record = DimensionRecord::new("detector")
            .with("id", 42)
            .with("instrument", "LSSTComCam");
        let key = record.key(&detector()).unwrap();
        assert_eq!(key, vec![KeyValue::from("LSSTComCam"), KeyValue::Int(42)]);
    }

    #[test]
    fn test_record_key_rejects_missing_column() {
        let record = DimensionRecord::new("detector").with("instrument", "LSSTComCam");
        assert!(record.key(&detector()).is_err());
    }

    #[test]
    fn test_universe_sorted_preserves_topological_order() {
        let universe = DimensionUniverse::new()
            .with_element(DimensionElement::new("instrument", ColumnType::String))
            .with_element(detector())
            .with_element(DimensionElement::new("visit", ColumnType::Int));

        let sorted = universe.sorted(&["visit", "instrument"]).unwrap();
        let names: Vec<_> = sorted.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["instrument", "visit"]);
    }

    #[test]
    fn test_universe_sorted_rejects_unknown_name() {
        let universe = DimensionUniverse::new();
        assert!(universe.sorted(&["nope"]).is_err());
    }
}
