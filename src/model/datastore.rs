//! Datastore location records.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::dataset::DatasetId;

/// Opaque location/metadata record describing where the bytes for one
/// dataset (or one of its components) physically live inside a file-backed
/// datastore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFileInfo {
    /// Location relative to the datastore root, or an absolute `scheme://`
    /// URI. May carry a trailing `#fragment` with special load behavior.
    pub path: String,
    /// Formatter used to read the file back.
    pub formatter: String,
    /// Storage class of the stored payload.
    pub storage_class: String,
    /// Component name when the file holds one component of a composite.
    pub component: Option<String>,
    /// Optional content checksum.
    pub checksum: Option<String>,
    /// File size in bytes; -1 when unknown.
    pub file_size: i64,
}

impl StoredFileInfo {
    /// Minimal record for a plain file.
    #[must_use]
    pub fn new(
        path: impl Into<String>,
        formatter: impl Into<String>,
        storage_class: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            formatter: formatter.into(),
            storage_class: storage_class.into(),
            component: None,
            checksum: None,
            file_size: -1,
        }
    }

    /// Copy of this record with the path replaced (used by path remapping).
    #[must_use]
    pub fn with_path(&self, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..self.clone()
        }
    }
}

/// The nested record structure one datastore exports and imports:
/// dataset id -> opaque table name -> location records.
///
/// Current store implementations use exactly one table; more than one is a
/// fatal configuration error at merge/import time, never silent data loss.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatastoreRecordData {
    /// Per-dataset records keyed by opaque table name.
    pub records: HashMap<DatasetId, HashMap<String, Vec<StoredFileInfo>>>,
}

impl DatastoreRecordData {
    /// Empty record set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one location record under the given dataset and table.
    pub fn insert(&mut self, id: DatasetId, table: impl Into<String>, info: StoredFileInfo) {
        self.records
            .entry(id)
            .or_default()
            .entry(table.into())
            .or_default()
            .push(info);
    }

    /// Whether no records are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
