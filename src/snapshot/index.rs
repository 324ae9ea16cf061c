//! The `index.json` sidecar.

use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Top-level description of a snapshot's contents. Written last, so its
/// presence marks the export as complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportIndex {
    /// Names of the dimension elements with a `dimensions/<name>` file.
    pub dimensions: Vec<String>,
    /// Names of the exported dataset types.
    pub dataset_types: Vec<String>,
    /// The collection the export was rooted at.
    pub root_collection: String,
}

/// Write the index.
///
/// # Errors
///
/// Returns an error if the file cannot be written or serialized.
pub fn write_index(path: &Path, index: &ExportIndex) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, index)?;
    Ok(())
}

/// Read the index. A missing index means the directory is not a complete
/// snapshot and is reported as such rather than as a bare I/O error.
///
/// # Errors
///
/// Returns [`Error::Snapshot`] if the index file does not exist, or other
/// errors if it cannot be read or parsed.
pub fn read_index(path: &Path) -> Result<ExportIndex> {
    let file = File::open(path).map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            Error::Snapshot(format!(
                "no snapshot index at {}; the directory does not hold a complete export",
                path.display()
            ))
        } else {
            Error::Io(e)
        }
    })?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_index_is_a_snapshot_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_index(&dir.path().join("index.json")).unwrap_err();
        assert!(matches!(err, Error::Snapshot(_)));
    }

    #[test]
    fn test_index_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        let index = ExportIndex {
            dimensions: vec!["instrument".to_string(), "detector".to_string()],
            dataset_types: vec!["raw".to_string()],
            root_collection: "LSSTComCam/DP1".to_string(),
        };
        write_index(&path, &index).unwrap();
        assert_eq!(read_index(&path).unwrap(), index);
    }
}
