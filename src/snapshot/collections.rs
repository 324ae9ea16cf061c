//! The `collections.yaml` sidecar.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::model::{CollectionInfo, CollectionType};
use crate::Result;

/// Write the collection structure.
///
/// Non-chained collections are written before chains so a sequential import
/// registers children before the chains referencing them; within each group
/// the order is by name.
///
/// # Errors
///
/// Returns an error if the file cannot be written or serialized.
pub fn write_collections(path: &Path, collections: &[CollectionInfo]) -> Result<()> {
    let mut ordered: Vec<&CollectionInfo> = collections.iter().collect();
    ordered.sort_by_key(|c| (c.collection_type == CollectionType::Chained, c.name.clone()));
    let file = File::create(path)?;
    serde_yaml_ng::to_writer(file, &ordered)?;
    Ok(())
}

/// Read the collection structure back, in file order.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn read_collections(path: &Path) -> Result<Vec<CollectionInfo>> {
    let file = File::open(path)?;
    Ok(serde_yaml_ng::from_reader(BufReader::new(file))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chains_written_after_members() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collections.yaml");
        let collections = vec![
            CollectionInfo::chain("a_chain", ["z_run"]),
            CollectionInfo::new("z_run", CollectionType::Run),
        ];
        write_collections(&path, &collections).unwrap();
        let read = read_collections(&path).unwrap();
        assert_eq!(read[0].name, "z_run");
        assert_eq!(read[1].name, "a_chain");
        assert_eq!(read[1].children, vec!["z_run"]);
    }
}
