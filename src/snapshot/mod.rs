//! Columnar snapshot files.
//!
//! A snapshot is a self-describing directory of Parquet files plus small
//! sidecar documents:
//!
//! - `datasets/<type>` - one file per dataset type, one row per dataset
//! - `associations/<type>` - tagged/calibration memberships per dataset type
//! - `dimensions/<element>` - deduplicated dimension records per element
//! - `datastore` - merged file-location records across backing stores
//! - `collections.yaml`, `dataset_types.json`, `index.json` - sidecars
//!
//! Writers buffer rows and flush them as sorted record batches; readers
//! stream record batches back with a fixed batch size. String columns with
//! low cardinality (run names, collection names, dimension string keys) are
//! dictionary encoded.

mod associations;
mod collections;
mod dataset_types;
mod datasets;
mod datastore;
mod dimensions;
mod index;
mod merge;
mod paths;
mod schema;

pub use associations::{read_associations, AssociationRow, AssociationWriter};
pub use collections::{read_collections, write_collections};
pub use dataset_types::{read_dataset_types, write_dataset_types};
pub use datasets::{read_datasets, DatasetWriter};
pub use datastore::{read_datastore_rows, DatastoreRow, DatastoreWriter};
pub use dimensions::{read_dimension_keys, read_dimension_records, DimensionRecordWriter};
pub use index::{read_index, write_index, ExportIndex};
pub use paths::ExportPaths;

use std::fs::File;
use std::path::Path;

use arrow::array::{
    Array, ArrayRef, BooleanArray, BooleanBuilder, FixedSizeBinaryArray, FixedSizeBinaryBuilder,
    Float64Array, Float64Builder, Int64Array, Int64Builder, StringArray, StringBuilder,
    StringDictionaryBuilder,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Int32Type};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use std::sync::Arc;

use crate::model::{ColumnType, ColumnValue, DatasetId, KeyValue};
use crate::{Error, Result};

/// Maximum number of buffered rows a writer accumulates before flushing one
/// sorted record batch.
pub const MAX_ROWS_PER_WRITE: usize = 50_000;

/// Record batch size used when streaming snapshot files back in.
pub const READ_BATCH_SIZE: usize = 10_000;

/// Open a streaming Parquet reader over a snapshot file.
fn open_reader(path: &Path) -> Result<ParquetRecordBatchReader> {
    let file = File::open(path)?;
    Ok(ParquetRecordBatchReaderBuilder::try_new(file)?
        .with_batch_size(READ_BATCH_SIZE)
        .build()?)
}

fn column(batch: &RecordBatch, name: &str) -> Result<ArrayRef> {
    let idx = batch
        .schema()
        .index_of(name)
        .map_err(|_| Error::Snapshot(format!("missing column '{name}'")))?;
    Ok(Arc::clone(batch.column(idx)))
}

/// Decode a string column, transparently undoing dictionary encoding.
fn col_string(batch: &RecordBatch, name: &str) -> Result<StringArray> {
    let array = column(batch, name)?;
    let array = cast(&array, &DataType::Utf8)?;
    array
        .as_any()
        .downcast_ref::<StringArray>()
        .cloned()
        .ok_or_else(|| Error::Snapshot(format!("column '{name}' is not a string column")))
}

fn col_i64(batch: &RecordBatch, name: &str) -> Result<Int64Array> {
    let array = column(batch, name)?;
    array
        .as_any()
        .downcast_ref::<Int64Array>()
        .cloned()
        .ok_or_else(|| Error::Snapshot(format!("column '{name}' is not an integer column")))
}

fn col_f64(batch: &RecordBatch, name: &str) -> Result<Float64Array> {
    let array = column(batch, name)?;
    array
        .as_any()
        .downcast_ref::<Float64Array>()
        .cloned()
        .ok_or_else(|| Error::Snapshot(format!("column '{name}' is not a float column")))
}

fn col_bool(batch: &RecordBatch, name: &str) -> Result<BooleanArray> {
    let array = column(batch, name)?;
    array
        .as_any()
        .downcast_ref::<BooleanArray>()
        .cloned()
        .ok_or_else(|| Error::Snapshot(format!("column '{name}' is not a boolean column")))
}

/// Decode the 16-byte dataset id column.
fn col_id(batch: &RecordBatch, name: &str) -> Result<FixedSizeBinaryArray> {
    let array = column(batch, name)?;
    array
        .as_any()
        .downcast_ref::<FixedSizeBinaryArray>()
        .cloned()
        .ok_or_else(|| Error::Snapshot(format!("column '{name}' is not a fixed-size binary column")))
}

fn id_at(ids: &FixedSizeBinaryArray, row: usize) -> Result<DatasetId> {
    let bytes: [u8; 16] = ids
        .value(row)
        .try_into()
        .map_err(|_| Error::Snapshot("dataset id column is not 16 bytes wide".to_string()))?;
    Ok(DatasetId::from_bytes(bytes))
}

/// A decoded key column of either valid key data type.
enum KeyColumn {
    Int(Int64Array),
    Str(StringArray),
}

impl KeyColumn {
    fn open(batch: &RecordBatch, name: &str, key_type: ColumnType) -> Result<Self> {
        match key_type {
            ColumnType::Int => Ok(Self::Int(col_i64(batch, name)?)),
            ColumnType::String => Ok(Self::Str(col_string(batch, name)?)),
            ColumnType::Float | ColumnType::Bool => Err(Error::Config(format!(
                "column '{name}' has a non-key data type"
            ))),
        }
    }

    fn get(&self, row: usize, name: &str) -> Result<KeyValue> {
        let null = match self {
            Self::Int(a) => a.is_null(row),
            Self::Str(a) => a.is_null(row),
        };
        if null {
            return Err(Error::Snapshot(format!(
                "null value in key column '{name}'"
            )));
        }
        Ok(match self {
            Self::Int(a) => KeyValue::Int(a.value(row)),
            Self::Str(a) => KeyValue::String(a.value(row).to_string()),
        })
    }
}

/// A decoded general-purpose value column.
enum ValueColumn {
    Int(Int64Array),
    Float(Float64Array),
    Str(StringArray),
    Bool(BooleanArray),
}

impl ValueColumn {
    fn open(batch: &RecordBatch, name: &str, column_type: ColumnType) -> Result<Self> {
        Ok(match column_type {
            ColumnType::Int => Self::Int(col_i64(batch, name)?),
            ColumnType::Float => Self::Float(col_f64(batch, name)?),
            ColumnType::String => Self::Str(col_string(batch, name)?),
            ColumnType::Bool => Self::Bool(col_bool(batch, name)?),
        })
    }

    fn get(&self, row: usize) -> Option<ColumnValue> {
        let null = match self {
            Self::Int(a) => a.is_null(row),
            Self::Float(a) => a.is_null(row),
            Self::Str(a) => a.is_null(row),
            Self::Bool(a) => a.is_null(row),
        };
        if null {
            return None;
        }
        Some(match self {
            Self::Int(a) => ColumnValue::Int(a.value(row)),
            Self::Float(a) => ColumnValue::Float(a.value(row)),
            Self::Str(a) => ColumnValue::String(a.value(row).to_string()),
            Self::Bool(a) => ColumnValue::Bool(a.value(row)),
        })
    }
}

/// Column builder dispatching on the snapshot data types.
enum ColumnBuilder {
    Int(Int64Builder),
    Float(Float64Builder),
    Str(StringBuilder),
    StrDict(StringDictionaryBuilder<Int32Type>),
    Bool(BooleanBuilder),
    Id(FixedSizeBinaryBuilder),
}

impl ColumnBuilder {
    /// Builder for a data coordinate key column. String keys are dictionary
    /// encoded.
    fn for_key(key_type: ColumnType, name: &str) -> Result<Self> {
        match key_type {
            ColumnType::Int => Ok(Self::Int(Int64Builder::new())),
            ColumnType::String => Ok(Self::StrDict(StringDictionaryBuilder::new())),
            ColumnType::Float | ColumnType::Bool => Err(Error::Config(format!(
                "column '{name}' has a non-key data type"
            ))),
        }
    }

    /// Builder for a general value column.
    fn for_value(column_type: ColumnType, dictionary: bool) -> Self {
        match column_type {
            ColumnType::Int => Self::Int(Int64Builder::new()),
            ColumnType::Float => Self::Float(Float64Builder::new()),
            ColumnType::String if dictionary => Self::StrDict(StringDictionaryBuilder::new()),
            ColumnType::String => Self::Str(StringBuilder::new()),
            ColumnType::Bool => Self::Bool(BooleanBuilder::new()),
        }
    }

    fn new_id() -> Self {
        Self::Id(FixedSizeBinaryBuilder::new(16))
    }

    fn append_key(&mut self, value: &KeyValue, name: &str) -> Result<()> {
        match (self, value) {
            (Self::Int(b), KeyValue::Int(v)) => b.append_value(*v),
            (Self::StrDict(b), KeyValue::String(v)) => {
                b.append(v)?;
            }
            _ => {
                return Err(Error::Snapshot(format!(
                    "value for key column '{name}' has the wrong data type"
                )))
            }
        }
        Ok(())
    }

    fn append_value(&mut self, value: Option<&ColumnValue>, name: &str) -> Result<()> {
        match (self, value) {
            (Self::Int(b), Some(ColumnValue::Int(v))) => b.append_value(*v),
            (Self::Int(b), None) => b.append_null(),
            (Self::Float(b), Some(ColumnValue::Float(v))) => b.append_value(*v),
            (Self::Float(b), None) => b.append_null(),
            (Self::Str(b), Some(ColumnValue::String(v))) => b.append_value(v),
            (Self::Str(b), None) => b.append_null(),
            (Self::StrDict(b), Some(ColumnValue::String(v))) => {
                b.append(v)?;
            }
            (Self::StrDict(b), None) => b.append_null(),
            (Self::Bool(b), Some(ColumnValue::Bool(v))) => b.append_value(*v),
            (Self::Bool(b), None) => b.append_null(),
            _ => {
                return Err(Error::Snapshot(format!(
                    "value for column '{name}' has the wrong data type"
                )))
            }
        }
        Ok(())
    }

    fn append_id(&mut self, id: DatasetId) -> Result<()> {
        match self {
            Self::Id(b) => {
                b.append_value(id.as_bytes())?;
                Ok(())
            }
            _ => Err(Error::Snapshot(
                "dataset id appended to a non-id column".to_string(),
            )),
        }
    }

    fn finish(&mut self) -> ArrayRef {
        match self {
            Self::Int(b) => Arc::new(b.finish()),
            Self::Float(b) => Arc::new(b.finish()),
            Self::Str(b) => Arc::new(b.finish()),
            Self::StrDict(b) => Arc::new(b.finish()),
            Self::Bool(b) => Arc::new(b.finish()),
            Self::Id(b) => Arc::new(b.finish()),
        }
    }
}
