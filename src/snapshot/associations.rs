//! Tagged and calibration membership files.

use std::fs::File;
use std::path::Path;

use arrow::array::Array;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use super::schema::{
    self, DimKey, COLLECTION_COLUMN, DATASET_ID_COLUMN, RUN_COLUMN, TIMESPAN_BEGIN_COLUMN,
    TIMESPAN_END_COLUMN,
};
use super::{col_i64, col_id, col_string, id_at, open_reader, ColumnBuilder, MAX_ROWS_PER_WRITE};
use crate::model::{
    ColumnType, ColumnValue, DatasetAssociation, DatasetId, DatasetType, DimensionUniverse,
    Timespan,
};
use crate::{Error, Result};

/// One decoded membership row. The owning collection's type decides whether
/// the timespan is meaningful.
#[derive(Debug, Clone, PartialEq)]
pub struct AssociationRow {
    /// The member dataset.
    pub id: DatasetId,
    /// The run collection that produced the member dataset.
    pub run: String,
    /// The collection the dataset is associated with.
    pub collection: String,
    /// Validity bounds; both unbounded for tagged memberships.
    pub timespan: Timespan,
}

/// Batched writer for one `associations/<type>` file.
///
/// Batches are sorted by collection first so the importer can group rows
/// into one catalog call per collection, then by data coordinate.
pub struct AssociationWriter {
    dimensions: Vec<DimKey>,
    dimension_names: Vec<String>,
    schema: SchemaRef,
    writer: ArrowWriter<File>,
    buffer: Vec<DatasetAssociation>,
    batch_size: usize,
}

impl AssociationWriter {
    /// Create the output file and its writer. The file is always created,
    /// even when the dataset type ends up with no memberships.
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
        let schema = schema::association_schema(&dimensions);
        let file = File::create(path)?;
        let writer = ArrowWriter::try_new(file, schema.clone(), None)?;
        Ok(Self {
            dimension_names: dimensions.iter().map(|d| d.name.clone()).collect(),
            dimensions,
            schema,
            writer,
            buffer: Vec::new(),
            batch_size: MAX_ROWS_PER_WRITE,
        })
    }

    /// Builder-style override of the flush threshold.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Buffer memberships, flushing full batches as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if a data coordinate is incomplete or a flush fails.
    pub fn add_associations(
        &mut self,
        associations: impl IntoIterator<Item = DatasetAssociation>,
    ) -> Result<()> {
        for association in associations {
            self.buffer.push(association);
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
        self.buffer.sort_by_cached_key(|a| {
            (
                a.collection.clone(),
                a.reference.data_id.sort_key(&self.dimension_names),
            )
        });

        let mut ids = ColumnBuilder::new_id();
        let mut runs = ColumnBuilder::for_value(ColumnType::String, true);
        let mut collections = ColumnBuilder::for_value(ColumnType::String, true);
        let mut begins = ColumnBuilder::for_value(ColumnType::Int, false);
        let mut ends = ColumnBuilder::for_value(ColumnType::Int, false);
        let mut keys: Vec<ColumnBuilder> = self
            .dimensions
            .iter()
            .map(|d| ColumnBuilder::for_key(d.key_type, &d.name))
            .collect::<Result<_>>()?;

        for association in self.buffer.drain(..) {
            ids.append_id(association.reference.id)?;
            runs.append_value(
                Some(&ColumnValue::String(association.reference.run)),
                RUN_COLUMN,
            )?;
            collections.append_value(
                Some(&ColumnValue::String(association.collection)),
                COLLECTION_COLUMN,
            )?;
            let timespan = association.timespan.unwrap_or_default();
            begins.append_value(
                timespan.begin_nsec.map(ColumnValue::Int).as_ref(),
                TIMESPAN_BEGIN_COLUMN,
            )?;
            ends.append_value(
                timespan.end_nsec.map(ColumnValue::Int).as_ref(),
                TIMESPAN_END_COLUMN,
            )?;
            for (dim, builder) in self.dimensions.iter().zip(&mut keys) {
                let value = association.reference.data_id.get(&dim.name).ok_or_else(|| {
                    Error::Snapshot(format!(
                        "dataset {} is missing dimension '{}'",
                        association.reference.id, dim.name
                    ))
                })?;
                builder.append_key(value, &dim.name)?;
            }
        }

        let mut columns = vec![
            ids.finish(),
            runs.finish(),
            collections.finish(),
            begins.finish(),
            ends.finish(),
        ];
        columns.extend(keys.iter_mut().map(ColumnBuilder::finish));
        let batch = RecordBatch::try_new(self.schema.clone(), columns)?;
        self.writer.write(&batch)?;
        Ok(())
    }

    /// Flush remaining rows and close the file.
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

/// Read an `associations/<type>` file back. The data coordinate columns are
/// not decoded; the importer resolves members by dataset id.
///
/// # Errors
///
/// Returns an error if the file cannot be read or required columns are
/// missing.
pub fn read_associations(path: &Path) -> Result<Vec<AssociationRow>> {
    let mut out = Vec::new();
    for batch in open_reader(path)? {
        let batch = batch?;
        let ids = col_id(&batch, DATASET_ID_COLUMN)?;
        let runs = col_string(&batch, RUN_COLUMN)?;
        let collections = col_string(&batch, COLLECTION_COLUMN)?;
        let begins = col_i64(&batch, TIMESPAN_BEGIN_COLUMN)?;
        let ends = col_i64(&batch, TIMESPAN_END_COLUMN)?;

        for row in 0..batch.num_rows() {
            let begin = (!begins.is_null(row)).then(|| begins.value(row));
            let end = (!ends.is_null(row)).then(|| ends.value(row));
            out.push(AssociationRow {
                id: id_at(&ids, row)?,
                run: runs.value(row).to_string(),
                collection: collections.value(row).to_string(),
                timespan: Timespan::new(begin, end),
            });
        }
    }
    Ok(out)
}
