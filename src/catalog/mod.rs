//! The capability boundary to the external data-management framework.
//!
//! Every core operation of the exporter and importer ultimately calls into an
//! uncontrolled catalog framework for schema registration, query execution,
//! and transactional insert. [`Catalog`] defines that boundary as a narrow
//! trait; everything behind it is a black box. [`MemoryCatalog`] is a
//! self-contained transactional implementation used by the test suite.

mod memory;

pub use memory::MemoryCatalog;

use std::collections::HashMap;

use crate::model::{
    CollectionInfo, CollectionType, DatasetAssociation, DatasetRef, DatastoreRecordData,
    DatasetType, DimensionElement, DimensionRecord, DimensionUniverse, ExpandedRef, Timespan,
};
use crate::Result;

/// Lazy, finite stream of expanded dataset references.
pub type ExpandedRefStream<'a> = Box<dyn Iterator<Item = Result<ExpandedRef>> + 'a>;

/// Narrow interface to the external catalog framework.
///
/// Read-side methods drive the export; write-side methods drive the import.
/// Implementations own the semantics of overridden-dataset resolution inside
/// [`Catalog::query_datasets`]: a dataset shadowed in every searched
/// collection must not be double counted.
pub trait Catalog {
    /// Look up one dataset type by name.
    fn dataset_type(&self, name: &str) -> Result<DatasetType>;

    /// Names of all dataset types with datasets in the given collection
    /// (the collection summary).
    fn dataset_type_names(&self, collection: &str) -> Result<Vec<String>>;

    /// The dimension universe of this catalog.
    fn universe(&self) -> &DimensionUniverse;

    /// Stream all dataset references of one type reachable from the given
    /// collections, with dimension records attached.
    fn query_datasets(
        &self,
        dataset_type: &DatasetType,
        collections: &[String],
    ) -> Result<ExpandedRefStream<'_>>;

    /// All tagged/calibration memberships of datasets of one type within the
    /// given collections.
    fn query_associations(
        &self,
        dataset_type: &DatasetType,
        collections: &[String],
    ) -> Result<Vec<DatasetAssociation>>;

    /// Resolve collections transitively from the given roots, flattening
    /// chains. Chains themselves are included only when `include_chains` is
    /// set; `types` filters the result.
    fn query_collections(
        &self,
        roots: &[String],
        types: Option<&[CollectionType]>,
        include_chains: bool,
    ) -> Result<Vec<CollectionInfo>>;

    /// Look up one collection.
    fn collection_info(&self, name: &str) -> Result<CollectionInfo>;

    /// Export the raw datastore records for a batch of references, keyed by
    /// backing-store name. Every configured store appears as a key, even when
    /// it holds nothing for the batch.
    fn export_datastore_records(
        &self,
        refs: &[DatasetRef],
    ) -> Result<HashMap<String, DatastoreRecordData>>;

    /// Backing-store names in chain priority order (first store wins).
    fn datastore_names(&self) -> Vec<String>;

    /// Opaque table names of one backing store.
    fn datastore_table_names(&self, store: &str) -> Result<Vec<String>>;

    /// Register a dataset type. May create backing tables; cannot be rolled
    /// back, so the importer calls this outside any transaction.
    fn register_dataset_type(&mut self, dataset_type: &DatasetType) -> Result<()>;

    /// Register one collection (idempotent for an identical existing one).
    fn register_collection(&mut self, info: &CollectionInfo) -> Result<()>;

    /// Insert dimension records for one element. With `skip_existing`,
    /// records whose key is already present are silently skipped.
    fn insert_dimension_records(
        &mut self,
        element: &DimensionElement,
        records: &[DimensionRecord],
        skip_existing: bool,
    ) -> Result<()>;

    /// Bulk-insert dataset references belonging to one run.
    fn import_datasets(&mut self, run: &str, refs: &[DatasetRef]) -> Result<()>;

    /// Associate datasets with a tagged collection.
    fn associate(&mut self, collection: &str, refs: &[DatasetRef]) -> Result<()>;

    /// Certify one dataset into a calibration collection with its validity
    /// range. Cannot be batched; each certification carries a distinct range.
    fn certify(&mut self, collection: &str, reference: &DatasetRef, timespan: Timespan)
        -> Result<()>;

    /// Bulk-import datastore records keyed by target store name.
    fn import_datastore_records(
        &mut self,
        records: HashMap<String, DatastoreRecordData>,
    ) -> Result<()>;

    /// Register (or extend) a chained collection pointing at the given
    /// children.
    fn register_chain(&mut self, name: &str, children: &[String]) -> Result<()>;

    /// Begin the single import transaction.
    fn begin_transaction(&mut self) -> Result<()>;

    /// Commit the open transaction.
    fn commit_transaction(&mut self) -> Result<()>;

    /// Abort the open transaction, restoring the pre-transaction state.
    fn rollback_transaction(&mut self) -> Result<()>;
}
