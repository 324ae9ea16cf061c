//! Snapshot directory layout.

use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{Error, Result};

const DIMENSIONS_SUBDIRECTORY: &str = "dimensions";
const DATASETS_SUBDIRECTORY: &str = "datasets";
const ASSOCIATIONS_SUBDIRECTORY: &str = "associations";
const DATASTORE_FILE: &str = "datastore";
const COLLECTIONS_FILE: &str = "collections.yaml";
const DATASET_TYPES_FILE: &str = "dataset_types.json";
const INDEX_FILE: &str = "index.json";

// A poisoned dataset type or dimension name must not be able to escape the
// snapshot directory.
static SAFE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w+$").unwrap());

/// Resolves file locations inside one snapshot directory.
#[derive(Debug, Clone)]
pub struct ExportPaths {
    dir: PathBuf,
}

impl ExportPaths {
    /// Layout rooted at the given directory.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            dir: directory.into(),
        }
    }

    /// The snapshot root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.dir
    }

    /// Create the root and all subdirectories.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub fn create_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        for sub in [
            DIMENSIONS_SUBDIRECTORY,
            DATASETS_SUBDIRECTORY,
            ASSOCIATIONS_SUBDIRECTORY,
        ] {
            fs::create_dir_all(self.dir.join(sub))?;
        }
        Ok(())
    }

    fn join(&self, subdirectory: &str, fragment: &str) -> Result<PathBuf> {
        if !SAFE_NAME.is_match(fragment) {
            return Err(Error::UnsafePathSegment(fragment.to_string()));
        }
        Ok(self.dir.join(subdirectory).join(fragment))
    }

    /// Parquet file holding the records of one dimension element.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsafePathSegment`] for names that are not plain
    /// word characters.
    pub fn dimension_file(&self, dimension: &str) -> Result<PathBuf> {
        self.join(DIMENSIONS_SUBDIRECTORY, dimension)
    }

    /// Parquet file holding the datasets of one dataset type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsafePathSegment`] for names that are not plain
    /// word characters.
    pub fn dataset_file(&self, dataset_type: &str) -> Result<PathBuf> {
        self.join(DATASETS_SUBDIRECTORY, dataset_type)
    }

    /// Parquet file holding the associations of one dataset type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsafePathSegment`] for names that are not plain
    /// word characters.
    pub fn association_file(&self, dataset_type: &str) -> Result<PathBuf> {
        self.join(ASSOCIATIONS_SUBDIRECTORY, dataset_type)
    }

    /// Parquet file holding the merged datastore records. Absent when the
    /// export produced none.
    #[must_use]
    pub fn datastore_file(&self) -> PathBuf {
        self.dir.join(DATASTORE_FILE)
    }

    /// YAML sidecar describing the collection structure.
    #[must_use]
    pub fn collections_file(&self) -> PathBuf {
        self.dir.join(COLLECTIONS_FILE)
    }

    /// JSON sidecar holding the exported dataset type definitions.
    #[must_use]
    pub fn dataset_types_file(&self) -> PathBuf {
        self.dir.join(DATASET_TYPES_FILE)
    }

    /// JSON index listing everything the snapshot contains. Written last.
    #[must_use]
    pub fn index_file(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_traversal_fragments() {
        let paths = ExportPaths::new("/tmp/snapshot");
        for bad in ["../evil", "a/b", "", "a b", "a.b"] {
            assert!(
                matches!(paths.dataset_file(bad), Err(Error::UnsafePathSegment(_))),
                "fragment {bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_accepts_word_fragments() {
        let paths = ExportPaths::new("/tmp/snapshot");
        let path = paths.dimension_file("physical_filter").unwrap();
        assert!(path.ends_with("dimensions/physical_filter"));
    }
}
