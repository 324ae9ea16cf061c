//! Snapshot import.
//!
//! [`Importer`] replays a snapshot directory into a catalog in dependency
//! order: collections, then dimension records (topologically sorted), then
//! datasets, then associations, then datastore records. Everything except
//! dataset type registration happens inside a single transaction, so a
//! failed import leaves the catalog untouched.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::mapping::PathMapper;
use crate::model::{
    CollectionType, DatasetId, DatasetRef, DatasetType, DatastoreRecordData,
};
use crate::snapshot::{self, AssociationRow, ExportIndex, ExportPaths};
use crate::{Error, Result};

/// Optional knobs for one import run.
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// When set, the snapshot's root collection is added as a child of this
    /// chained collection after the import commits.
    pub chain_parent: Option<String>,
}

/// Replays one snapshot directory into a catalog.
pub struct Importer<'a, C: Catalog> {
    catalog: &'a mut C,
    paths: ExportPaths,
}

impl<'a, C: Catalog> Importer<'a, C> {
    /// New importer reading from `input_directory`.
    pub fn new(input_directory: impl Into<PathBuf>, catalog: &'a mut C) -> Self {
        Self {
            catalog,
            paths: ExportPaths::new(input_directory),
        }
    }

    /// Import the whole snapshot.
    ///
    /// Dataset types are registered first, outside the transaction, because
    /// registration may create backing tables that cannot be rolled back.
    /// Every other write happens inside one transaction that is rolled back
    /// on the first error. Datastore record paths are rewritten through
    /// `mapping` before registration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Snapshot`] if the directory has no index, or any
    /// error from reading the snapshot or writing to the catalog. On error
    /// the transaction is rolled back.
    pub fn import_all(
        &mut self,
        mapping: &PathMapper,
        options: &ImportOptions,
    ) -> Result<ExportIndex> {
        let index = snapshot::read_index(&self.paths.index_file())?;
        info!(
            root_collection = %index.root_collection,
            dataset_types = index.dataset_types.len(),
            "importing snapshot"
        );

        let dataset_types = snapshot::read_dataset_types(&self.paths.dataset_types_file())?;
        for dataset_type in &dataset_types {
            self.catalog.register_dataset_type(dataset_type)?;
        }

        self.catalog.begin_transaction()?;
        match self.run_transaction(&index, &dataset_types, mapping) {
            Ok(()) => self.catalog.commit_transaction()?,
            Err(e) => {
                self.catalog.rollback_transaction()?;
                return Err(e);
            }
        }

        if let Some(parent) = &options.chain_parent {
            self.catalog
                .register_chain(parent, std::slice::from_ref(&index.root_collection))?;
        }
        Ok(index)
    }

    fn run_transaction(
        &mut self,
        index: &ExportIndex,
        dataset_types: &[DatasetType],
        mapping: &PathMapper,
    ) -> Result<()> {
        self.import_collections()?;
        self.import_dimension_records(&index.dimensions)?;
        let refs_by_id = self.import_datasets(dataset_types)?;
        self.import_associations(dataset_types, &refs_by_id)?;
        self.import_datastore(mapping)?;
        Ok(())
    }

    fn import_collections(&mut self) -> Result<()> {
        let collections = snapshot::read_collections(&self.paths.collections_file())?;
        info!(count = collections.len(), "registering collections");
        for info in &collections {
            self.catalog.register_collection(info)?;
        }
        Ok(())
    }

    fn import_dimension_records(&mut self, dimensions: &[String]) -> Result<()> {
        let names: Vec<&str> = dimensions.iter().map(String::as_str).collect();
        let elements: Vec<_> = self
            .catalog
            .universe()
            .sorted(&names)?
            .into_iter()
            .cloned()
            .collect();
        for element in elements {
            // Elements without their own table are derived from other
            // dimensions and have no insertable rows.
            if !element.has_own_table {
                continue;
            }
            let path = self.paths.dimension_file(&element.name)?;
            let records = snapshot::read_dimension_records(&path, &element)?;
            info!(
                dimension = %element.name,
                records = records.len(),
                "inserting dimension records"
            );
            // skip_existing: the target may already hold overlapping records
            // from a previous import or its own operations.
            self.catalog
                .insert_dimension_records(&element, &records, true)?;
        }
        Ok(())
    }

    fn import_datasets(
        &mut self,
        dataset_types: &[DatasetType],
    ) -> Result<HashMap<DatasetId, DatasetRef>> {
        let mut refs_by_id = HashMap::new();
        for dataset_type in dataset_types {
            let path = self.paths.dataset_file(&dataset_type.name)?;
            let refs = snapshot::read_datasets(&path, dataset_type, self.catalog.universe())?;
            info!(
                dataset_type = %dataset_type.name,
                datasets = refs.len(),
                "importing datasets"
            );

            // The catalog imports one run at a time.
            let mut by_run: BTreeMap<&str, Vec<&DatasetRef>> = BTreeMap::new();
            for reference in &refs {
                by_run.entry(&reference.run).or_default().push(reference);
            }
            for (run, group) in by_run {
                let group: Vec<DatasetRef> = group.into_iter().cloned().collect();
                self.catalog.import_datasets(run, &group)?;
            }
            for reference in refs {
                refs_by_id.insert(reference.id, reference);
            }
        }
        Ok(refs_by_id)
    }

    fn import_associations(
        &mut self,
        dataset_types: &[DatasetType],
        refs_by_id: &HashMap<DatasetId, DatasetRef>,
    ) -> Result<()> {
        for dataset_type in dataset_types {
            let path = self.paths.association_file(&dataset_type.name)?;
            let rows = snapshot::read_associations(&path)?;

            let mut by_collection: BTreeMap<&str, Vec<&AssociationRow>> = BTreeMap::new();
            for row in &rows {
                by_collection.entry(&row.collection).or_default().push(row);
            }

            for (collection, rows) in by_collection {
                let info = self.catalog.collection_info(collection)?;
                match info.collection_type {
                    CollectionType::Tagged => {
                        let refs: Vec<DatasetRef> = rows
                            .iter()
                            .map(|row| Self::resolve_ref(refs_by_id, row))
                            .collect::<Result<_>>()?;
                        self.catalog.associate(collection, &refs)?;
                    }
                    CollectionType::Calibration => {
                        for row in rows {
                            let reference = Self::resolve_ref(refs_by_id, row)?;
                            self.catalog.certify(collection, &reference, row.timespan)?;
                        }
                    }
                    other => {
                        return Err(Error::Config(format!(
                            "unexpected collection type '{other:?}' when importing associations \
                             for dataset type '{}'",
                            dataset_type.name
                        )))
                    }
                }
            }
        }
        Ok(())
    }

    fn resolve_ref(
        refs_by_id: &HashMap<DatasetId, DatasetRef>,
        row: &AssociationRow,
    ) -> Result<DatasetRef> {
        let reference = refs_by_id.get(&row.id).cloned().ok_or_else(|| {
            Error::Snapshot(format!(
                "association references dataset {}, which is not in the snapshot",
                row.id
            ))
        })?;
        if reference.run != row.run {
            return Err(Error::Snapshot(format!(
                "association row for dataset {} names run '{}', but the dataset file says '{}'",
                row.id, row.run, reference.run
            )));
        }
        Ok(reference)
    }

    fn import_datastore(&mut self, mapping: &PathMapper) -> Result<()> {
        let path = self.paths.datastore_file();
        if !path.exists() {
            // An export with no file-backed records writes no datastore file.
            warn!("snapshot has no datastore file; skipping datastore import");
            return Ok(());
        }
        let rows = snapshot::read_datastore_rows(&path)?;
        info!(records = rows.len(), "importing datastore records");

        // Target store name -> its single opaque table name, resolved once.
        let mut table_names: HashMap<String, String> = HashMap::new();
        let mut grouped: HashMap<String, DatastoreRecordData> = HashMap::new();
        for row in rows {
            let mapped = mapping.map(&row.datastore_name, &row.info.path)?;
            let table = match table_names.get(&mapped.datastore_name) {
                Some(table) => table.clone(),
                None => {
                    let table = Self::single_table_name(self.catalog, &mapped.datastore_name)?;
                    table_names.insert(mapped.datastore_name.clone(), table.clone());
                    table
                }
            };
            grouped
                .entry(mapped.datastore_name)
                .or_default()
                .insert(row.dataset_id, table, row.info.with_path(mapped.path));
        }
        self.catalog.import_datastore_records(grouped)
    }

    fn single_table_name(catalog: &C, store: &str) -> Result<String> {
        let mut tables = catalog.datastore_table_names(store)?;
        if tables.len() > 1 {
            return Err(Error::Config(format!(
                "datastore '{store}' unexpectedly has more than one opaque table"
            )));
        }
        tables
            .pop()
            .ok_or_else(|| Error::Config(format!("datastore '{store}' has no table defined")))
    }
}
