//! Collections and dataset associations.

use serde::{Deserialize, Serialize};

use super::dataset::DatasetRef;
use super::timespan::Timespan;

/// The kinds of collection the catalog distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionType {
    /// One production/write event; a dataset belongs to exactly one run.
    Run,
    /// Timeless membership of arbitrary datasets.
    Tagged,
    /// Time-ranged membership (calibration validity).
    Calibration,
    /// A chain referencing other collections, forming a DAG.
    Chained,
}

/// A named collection and, for chains, the collections it references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    /// Collection name.
    pub name: String,
    /// Collection kind.
    pub collection_type: CollectionType,
    /// Child collection names, in search order. Only chains have children.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
}

impl CollectionInfo {
    /// New non-chained collection.
    #[must_use]
    pub fn new(name: impl Into<String>, collection_type: CollectionType) -> Self {
        Self {
            name: name.into(),
            collection_type,
            children: Vec::new(),
        }
    }

    /// New chained collection with the given children in search order.
    #[must_use]
    pub fn chain(
        name: impl Into<String>,
        children: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            collection_type: CollectionType::Chained,
            children: children.into_iter().map(Into::into).collect(),
        }
    }
}

/// Membership of a dataset in a non-run collection.
///
/// Tagged memberships are timeless; calibration memberships carry a validity
/// timespan that may overlap with ranges of other datasets.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetAssociation {
    /// The member dataset.
    pub reference: DatasetRef,
    /// The collection the dataset is associated with.
    pub collection: String,
    /// Validity range; present exactly for calibration collections.
    pub timespan: Option<Timespan>,
}
