//! Snapshot export.
//!
//! [`Exporter`] walks a catalog one dataset type at a time and writes a
//! snapshot directory. Dimension records arrive attached to the streamed
//! dataset references and fan out into per-element files; datastore records
//! are merged across backing stores into a single file. The index sidecar is
//! written last so an interrupted export is never mistaken for a complete
//! one.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::model::{DatasetType, DimensionRecord, ExpandedRef};
use crate::snapshot::{
    self, AssociationWriter, DatasetWriter, DatastoreWriter, DimensionRecordWriter, ExportIndex,
    ExportPaths, MAX_ROWS_PER_WRITE,
};
use crate::{Error, Result};

/// Streams catalog contents into a snapshot directory.
///
/// Each dataset type is dumped exactly once with [`Exporter::dump_refs`];
/// [`Exporter::finish`] consumes the exporter, writes the sidecars, and
/// returns the index.
pub struct Exporter<'a, C: Catalog> {
    catalog: &'a C,
    paths: ExportPaths,
    root_collection: String,
    dimensions: BTreeMap<String, DimensionRecordWriter>,
    dataset_types_written: Vec<String>,
    collections_seen: BTreeSet<String>,
    datastore_writer: DatastoreWriter,
    skip_datastore: bool,
    skip_associations: bool,
}

impl<'a, C: Catalog> Exporter<'a, C> {
    /// Start an export into `output_directory`, creating the snapshot
    /// directory structure.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created.
    pub fn new(
        output_directory: impl Into<PathBuf>,
        catalog: &'a C,
        root_collection: impl Into<String>,
    ) -> Result<Self> {
        let paths = ExportPaths::new(output_directory);
        paths.create_directories()?;
        let datastore_writer = DatastoreWriter::new(paths.datastore_file());
        Ok(Self {
            catalog,
            paths,
            root_collection: root_collection.into(),
            dimensions: BTreeMap::new(),
            dataset_types_written: Vec::new(),
            collections_seen: BTreeSet::new(),
            datastore_writer,
            skip_datastore: false,
            skip_associations: false,
        })
    }

    /// Builder-style switch to omit the datastore file, for registry-only
    /// exports.
    #[must_use]
    pub const fn skip_datastore(mut self, skip: bool) -> Self {
        self.skip_datastore = skip;
        self
    }

    /// Builder-style switch to omit association files.
    #[must_use]
    pub const fn skip_associations(mut self, skip: bool) -> Self {
        self.skip_associations = skip;
        self
    }

    /// Dump every dataset of one type reachable from the given collections,
    /// along with its memberships, dimension records, and file locations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateDump`] when called twice for the same
    /// dataset type, or any error from the catalog or the writers.
    pub fn dump_refs(&mut self, dataset_type_name: &str, collections: &[String]) -> Result<()> {
        if self
            .dataset_types_written
            .iter()
            .any(|n| n == dataset_type_name)
        {
            return Err(Error::DuplicateDump(dataset_type_name.to_string()));
        }
        self.dataset_types_written
            .push(dataset_type_name.to_string());
        self.collections_seen.extend(collections.iter().cloned());

        let dataset_type = self.catalog.dataset_type(dataset_type_name)?;
        info!(dataset_type = dataset_type_name, "exporting dataset type");
        if !self.skip_associations {
            self.generate_association_output(&dataset_type, collections)?;
        }
        self.generate_dataset_output(&dataset_type, collections)?;
        Ok(())
    }

    /// Dump dimension records that are not attached to any dataset's data
    /// coordinate.
    ///
    /// # Errors
    ///
    /// Returns an error for records of unknown elements or records added
    /// after the element's file was closed.
    pub fn dump_dimension_records(
        &mut self,
        records: impl IntoIterator<Item = DimensionRecord>,
    ) -> Result<()> {
        for record in records {
            self.add_dimension_record(record)?;
        }
        Ok(())
    }

    /// Whether any records were collected for the given dimension element.
    #[must_use]
    pub fn did_export_dimension_records(&self, dimension: &str) -> bool {
        self.dimensions.contains_key(dimension)
    }

    /// Close the file of one dimension element early and return its path,
    /// for callers that need to read it back mid-export. No more records may
    /// be added for that element.
    ///
    /// # Errors
    ///
    /// Returns an error if no records were collected for the element or the
    /// write fails.
    pub fn close_dimension_writer(&mut self, dimension: &str) -> Result<PathBuf> {
        let writer = self.dimensions.get_mut(dimension).ok_or_else(|| {
            Error::Snapshot(format!(
                "no dimension records were exported for '{dimension}'"
            ))
        })?;
        writer.finish()?;
        self.paths.dimension_file(dimension)
    }

    fn generate_dataset_output(
        &mut self,
        dataset_type: &DatasetType,
        collections: &[String],
    ) -> Result<()> {
        let catalog = self.catalog;
        let path = self.paths.dataset_file(&dataset_type.name)?;
        let mut writer = DatasetWriter::create(&path, dataset_type, catalog.universe())?;

        let mut batch: Vec<ExpandedRef> = Vec::new();
        for expanded in catalog.query_datasets(dataset_type, collections)? {
            batch.push(expanded?);
            if batch.len() >= MAX_ROWS_PER_WRITE {
                self.process_dataset_batch(&mut writer, std::mem::take(&mut batch))?;
            }
        }
        if !batch.is_empty() {
            self.process_dataset_batch(&mut writer, batch)?;
        }
        writer.finish()
    }

    fn process_dataset_batch(
        &mut self,
        writer: &mut DatasetWriter,
        batch: Vec<ExpandedRef>,
    ) -> Result<()> {
        debug!(rows = batch.len(), "flushing dataset batch");
        let mut refs = Vec::with_capacity(batch.len());
        for expanded in batch {
            self.collections_seen.insert(expanded.reference.run.clone());
            for record in expanded.records.into_values().flatten() {
                self.add_dimension_record(record)?;
            }
            refs.push(expanded.reference);
        }
        if !self.skip_datastore {
            let records = self.catalog.export_datastore_records(&refs)?;
            self.datastore_writer
                .write_records(&records, &self.catalog.datastore_names())?;
        }
        writer.add_refs(refs)
    }

    fn generate_association_output(
        &mut self,
        dataset_type: &DatasetType,
        collections: &[String],
    ) -> Result<()> {
        let path = self.paths.association_file(&dataset_type.name)?;
        let mut writer = AssociationWriter::create(&path, dataset_type, self.catalog.universe())?;
        let associations = self.catalog.query_associations(dataset_type, collections)?;
        writer.add_associations(associations)?;
        writer.finish()
    }

    fn add_dimension_record(&mut self, record: DimensionRecord) -> Result<()> {
        if !self.dimensions.contains_key(&record.element) {
            let element = self
                .catalog
                .universe()
                .get(&record.element)
                .ok_or_else(|| {
                    Error::Config(format!(
                        "dimension element '{}' is not part of the dimension universe",
                        record.element
                    ))
                })?
                .clone();
            let path = self.paths.dimension_file(&record.element)?;
            self.dimensions
                .insert(record.element.clone(), DimensionRecordWriter::new(path, element));
        }
        // Just inserted above when absent.
        if let Some(writer) = self.dimensions.get_mut(&record.element) {
            writer.add_record(record)?;
        }
        Ok(())
    }

    /// Close all remaining files, write the sidecars, and write the index
    /// last.
    ///
    /// # Errors
    ///
    /// Returns an error if any file cannot be finished or written.
    pub fn finish(mut self) -> Result<ExportIndex> {
        for (dimension, writer) in &mut self.dimensions {
            debug!(dimension, records = writer.len(), "closing dimension file");
            writer.finish()?;
        }
        self.datastore_writer.finish()?;

        let seen: Vec<String> = self.collections_seen.iter().cloned().collect();
        let collections = self.catalog.query_collections(&seen, None, true)?;
        snapshot::write_collections(&self.paths.collections_file(), &collections)?;

        let dataset_types: Vec<DatasetType> = self
            .dataset_types_written
            .iter()
            .map(|name| self.catalog.dataset_type(name))
            .collect::<Result<_>>()?;
        snapshot::write_dataset_types(&self.paths.dataset_types_file(), &dataset_types)?;

        let index = ExportIndex {
            dimensions: self.dimensions.keys().cloned().collect(),
            dataset_types: self.dataset_types_written.clone(),
            root_collection: self.root_collection.clone(),
        };
        snapshot::write_index(&self.paths.index_file(), &index)?;
        info!(
            dataset_types = index.dataset_types.len(),
            dimensions = index.dimensions.len(),
            "export finished"
        );
        Ok(index)
    }
}

/// Names of the provenance dataset types (task metadata, logs, and configs)
/// present in a collection. These are exported alongside the science data
/// products so processing history survives the transfer.
///
/// # Errors
///
/// Returns an error if the collection summary cannot be queried.
pub fn provenance_dataset_types<C: Catalog>(catalog: &C, collection: &str) -> Result<Vec<String>> {
    let names = catalog.dataset_type_names(collection)?;
    Ok(names
        .into_iter()
        .filter(|name| {
            name.ends_with("_metadata") || name.ends_with("_log") || name.ends_with("_config")
        })
        .collect())
}
