//! Domain entities shared by the export and import sides.
//!
//! These types mirror the shapes the external catalog hands across the
//! [`crate::catalog::Catalog`] boundary: dataset references with their data
//! coordinates, dimension records keyed by declared key columns, dataset type
//! schemas, collection structure, and opaque datastore location records.

mod collection;
mod dataset;
mod dataset_type;
mod datastore;
mod dimension;
mod timespan;

pub use collection::{CollectionInfo, CollectionType, DatasetAssociation};
pub use dataset::{DataCoordinate, DatasetId, DatasetRef, ExpandedRef, KeyValue};
pub use dataset_type::DatasetType;
pub use datastore::{DatastoreRecordData, StoredFileInfo};
pub use dimension::{
    ColumnSpec, ColumnType, ColumnValue, DimensionElement, DimensionRecord, DimensionUniverse,
};
pub use timespan::Timespan;
