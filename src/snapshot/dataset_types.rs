//! The `dataset_types.json` sidecar.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::model::DatasetType;
use crate::Result;

/// Write the exported dataset type definitions.
///
/// # Errors
///
/// Returns an error if the file cannot be written or serialized.
pub fn write_dataset_types(path: &Path, dataset_types: &[DatasetType]) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, dataset_types)?;
    Ok(())
}

/// Read the dataset type definitions back.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn read_dataset_types(path: &Path) -> Result<Vec<DatasetType>> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}
