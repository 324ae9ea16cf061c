//! Dataset reference files.

use std::fs::File;
use std::path::Path;

use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use super::schema::{self, DimKey, DATASET_ID_COLUMN, RUN_COLUMN};
use super::{col_id, col_string, id_at, open_reader, ColumnBuilder, KeyColumn, MAX_ROWS_PER_WRITE};
use crate::model::{ColumnType, ColumnValue, DataCoordinate, DatasetRef, DatasetType, DimensionUniverse};
use crate::{Error, Result};

/// Batched writer for one `datasets/<type>` file.
///
/// Rows are buffered and flushed as record batches sorted by data
/// coordinate, which groups related rows for better compression.
pub struct DatasetWriter {
    dataset_type: String,
    dimensions: Vec<DimKey>,
    dimension_names: Vec<String>,
    schema: arrow::datatypes::SchemaRef,
    writer: ArrowWriter<File>,
    buffer: Vec<DatasetRef>,
    batch_size: usize,
}

impl DatasetWriter {
    /// Create the output file and its writer.
    ///
    /// # Errors
    ///
    /// Returns an error if a required dimension is unknown or has a non-key
    /// data type, or if the file cannot be created.
    pub fn create(
        path: &Path,
        dataset_type: &DatasetType,
        universe: &DimensionUniverse,
    ) -> Result<Self> {
        let dimensions = schema::dataset_dimensions(dataset_type, universe)?;
        let schema = schema::dataset_schema(&dimensions);
        let file = File::create(path)?;
        let writer = ArrowWriter::try_new(file, schema.clone(), None)?;
        Ok(Self {
            dataset_type: dataset_type.name.clone(),
            dimension_names: dimensions.iter().map(|d| d.name.clone()).collect(),
            dimensions,
            schema,
            writer,
            buffer: Vec::new(),
            batch_size: MAX_ROWS_PER_WRITE,
        })
    }

    /// Builder-style override of the flush threshold. Crossing the threshold
    /// changes the batch layout of the file, never its logical rows.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Buffer references, flushing full batches as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if a reference belongs to a different dataset type,
    /// its data coordinate is incomplete, or a flush fails.
    pub fn add_refs(&mut self, refs: impl IntoIterator<Item = DatasetRef>) -> Result<()> {
        for reference in refs {
            if reference.dataset_type != self.dataset_type {
                return Err(Error::Snapshot(format!(
                    "dataset {} has type '{}', expected '{}'",
                    reference.id, reference.dataset_type, self.dataset_type
                )));
            }
            self.buffer.push(reference);
            if self.buffer.len() >= self.batch_size {
                self.flush()?;
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.buffer
            .sort_by_cached_key(|r| r.data_id.sort_key(&self.dimension_names));

        let mut ids = ColumnBuilder::new_id();
        let mut runs = ColumnBuilder::for_value(ColumnType::String, true);
        let mut keys: Vec<ColumnBuilder> = self
            .dimensions
            .iter()
            .map(|d| ColumnBuilder::for_key(d.key_type, &d.name))
            .collect::<Result<_>>()?;

        for reference in self.buffer.drain(..) {
            ids.append_id(reference.id)?;
            runs.append_value(Some(&ColumnValue::String(reference.run)), RUN_COLUMN)?;
            for (dim, builder) in self.dimensions.iter().zip(&mut keys) {
                let value = reference.data_id.get(&dim.name).ok_or_else(|| {
                    Error::Snapshot(format!(
                        "dataset {} is missing dimension '{}'",
                        reference.id, dim.name
                    ))
                })?;
                builder.append_key(value, &dim.name)?;
            }
        }

        let mut columns = vec![ids.finish(), runs.finish()];
        columns.extend(keys.iter_mut().map(ColumnBuilder::finish));
        let batch = RecordBatch::try_new(self.schema.clone(), columns)?;
        self.writer.write(&batch)?;
        Ok(())
    }

    /// Flush remaining rows and close the file. A file is written even when
    /// no rows were added, so readers can distinguish "empty" from "absent".
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush or close fails.
    pub fn finish(mut self) -> Result<()> {
        self.flush()?;
        self.writer.close()?;
        Ok(())
    }
}

/// Read a `datasets/<type>` file back into plain dataset references.
///
/// # Errors
///
/// Returns an error if the file cannot be read or its columns do not match
/// the dataset type's dimensions.
pub fn read_datasets(
    path: &Path,
    dataset_type: &DatasetType,
    universe: &DimensionUniverse,
) -> Result<Vec<DatasetRef>> {
    let dimensions = schema::dataset_dimensions(dataset_type, universe)?;
    let mut out = Vec::new();
    for batch in open_reader(path)? {
        let batch = batch?;
        let ids = col_id(&batch, DATASET_ID_COLUMN)?;
        let runs = col_string(&batch, RUN_COLUMN)?;
        let keys: Vec<KeyColumn> = dimensions
            .iter()
            .map(|d| KeyColumn::open(&batch, &d.name, d.key_type))
            .collect::<Result<_>>()?;

        for row in 0..batch.num_rows() {
            let mut data_id = DataCoordinate::new();
            for (dim, column) in dimensions.iter().zip(&keys) {
                data_id.insert(dim.name.clone(), column.get(row, &dim.name)?);
            }
            out.push(DatasetRef {
                id: id_at(&ids, row)?,
                dataset_type: dataset_type.name.clone(),
                run: runs.value(row).to_string(),
                data_id,
            });
        }
    }
    Ok(out)
}
