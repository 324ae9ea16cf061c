//! Chained-datastore record merging.

use std::collections::{BTreeSet, HashMap};

use super::datastore::DatastoreRow;
use crate::model::{DatasetId, DatastoreRecordData};
use crate::{Error, Result};

/// Flatten per-store record exports into rows, resolving datasets present in
/// more than one store.
///
/// `priority` lists the store names in chain search order; for a dataset
/// held by several stores, only the records of the first store in the list
/// are kept. This matches the read behavior of a chained store, where a hit
/// in an earlier child shadows later ones.
///
/// Output is deterministic: stores in priority order, dataset ids sorted
/// within each store.
///
/// # Errors
///
/// Returns [`Error::Config`] if the priority list and the record keys are
/// not the same set of names, or if any record entry spans more than one
/// opaque table.
pub(crate) fn resolve(
    records: &HashMap<String, DatastoreRecordData>,
    priority: &[String],
) -> Result<Vec<DatastoreRow>> {
    let priority_set: BTreeSet<&str> = priority.iter().map(String::as_str).collect();
    let record_set: BTreeSet<&str> = records.keys().map(String::as_str).collect();
    if priority_set != record_set {
        return Err(Error::Config(format!(
            "datastore priority list {priority_set:?} does not match exported stores {record_set:?}"
        )));
    }

    let mut seen: BTreeSet<DatasetId> = BTreeSet::new();
    let mut out = Vec::new();
    for store in priority {
        let data = &records[store];
        let mut ids: Vec<DatasetId> = data.records.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            if !seen.insert(id) {
                // Shadowed by a higher-priority store.
                continue;
            }
            let tables = &data.records[&id];
            if tables.len() > 1 {
                return Err(Error::Config(format!(
                    "datastore '{store}' exported records for dataset {id} spanning {} opaque tables",
                    tables.len()
                )));
            }
            for infos in tables.values() {
                for info in infos {
                    out.push(DatastoreRow {
                        datastore_name: store.clone(),
                        dataset_id: id,
                        info: info.clone(),
                    });
                }
            }
        }
    }
    Ok(out)
}
