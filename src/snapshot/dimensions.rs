//! Dimension record files.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use super::schema;
use super::{open_reader, ColumnBuilder, KeyColumn, ValueColumn, MAX_ROWS_PER_WRITE};
use crate::model::{ColumnType, DimensionElement, DimensionRecord, KeyValue};
use crate::{Error, Result};

/// Writer for one `dimensions/<element>` file.
///
/// Records arrive attached to dataset references of many dataset types, so
/// the same record is typically added many times. Records are collected
/// keyed by their key-column values (first one wins) and the file is written
/// once on finish, deduplicated and sorted. Key columns are ordered from low
/// to high cardinality by the catalog, so the sort also groups rows for
/// better compression.
///
/// Unlike the batched dataset writers, memory here is bounded by the number
/// of distinct records for the element, not by one batch. Dimension tables
/// are small relative to their dataset files (a handful of rows per element
/// shared across every dataset), so the whole-table map stays cheap.
pub struct DimensionRecordWriter {
    element: DimensionElement,
    path: PathBuf,
    schema: SchemaRef,
    records: BTreeMap<Vec<KeyValue>, DimensionRecord>,
    finished: bool,
}

impl DimensionRecordWriter {
    /// New writer for one element. The file is created on finish.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, element: DimensionElement) -> Self {
        let schema = schema::dimension_schema(&element);
        Self {
            element,
            path: path.into(),
            schema,
            records: BTreeMap::new(),
            finished: false,
        }
    }

    /// Collect one record, dropping duplicates of an already-seen key.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer is already finished, the record
    /// belongs to a different element, or its key columns are incomplete.
    pub fn add_record(&mut self, record: DimensionRecord) -> Result<()> {
        if self.finished {
            return Err(Error::Snapshot(format!(
                "cannot add records for dimension '{}' after its file was closed",
                self.element.name
            )));
        }
        if record.element != self.element.name {
            return Err(Error::Snapshot(format!(
                "record for '{}' added to writer for '{}'",
                record.element, self.element.name
            )));
        }
        let key = record.key(&self.element)?;
        self.records.entry(key).or_insert(record);
        Ok(())
    }

    /// Number of distinct records collected so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no records were collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write the deduplicated, key-sorted file. Idempotent; no records may
    /// be added afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if a record does not match the element schema or the
    /// write fails.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        let file = File::create(&self.path)?;
        let mut writer = ArrowWriter::try_new(file, self.schema.clone(), None)?;

        let records: Vec<&DimensionRecord> = self.records.values().collect();
        for chunk in records.chunks(MAX_ROWS_PER_WRITE) {
            let batch = self.build_batch(chunk)?;
            writer.write(&batch)?;
        }
        writer.close()?;
        self.records.clear();
        self.finished = true;
        Ok(())
    }

    fn build_batch(&self, records: &[&DimensionRecord]) -> Result<RecordBatch> {
        let mut builders: Vec<ColumnBuilder> = self
            .element
            .columns
            .iter()
            .map(|spec| {
                ColumnBuilder::for_value(spec.column_type, spec.column_type == ColumnType::String)
            })
            .collect();

        for record in records {
            for (spec, builder) in self.element.columns.iter().zip(&mut builders) {
                let value = record.values.get(&spec.name).and_then(Option::as_ref);
                if value.is_none() && !spec.nullable {
                    return Err(Error::Snapshot(format!(
                        "dimension record for '{}' is missing non-nullable column '{}'",
                        self.element.name, spec.name
                    )));
                }
                builder.append_value(value, &spec.name)?;
            }
        }

        let columns = builders.iter_mut().map(ColumnBuilder::finish).collect();
        Ok(RecordBatch::try_new(self.schema.clone(), columns)?)
    }
}

/// Read only the key columns of a `dimensions/<element>` file, one key tuple
/// per record. Used to drive follow-on queries for dimensions that are
/// populated per record of another element rather than per dataset.
///
/// # Errors
///
/// Returns an error if the file cannot be read, a key column is missing, or
/// a key cell is null.
pub fn read_dimension_keys(path: &Path, element: &DimensionElement) -> Result<Vec<Vec<KeyValue>>> {
    let key_types: Vec<ColumnType> = element
        .required
        .iter()
        .map(|name| {
            element
                .column(name)
                .map(|spec| spec.column_type)
                .ok_or_else(|| {
                    Error::Config(format!(
                        "element '{}' declares unknown key column '{name}'",
                        element.name
                    ))
                })
        })
        .collect::<Result<_>>()?;

    let mut out = Vec::new();
    for batch in open_reader(path)? {
        let batch = batch?;
        let columns: Vec<KeyColumn> = element
            .required
            .iter()
            .zip(&key_types)
            .map(|(name, key_type)| KeyColumn::open(&batch, name, *key_type))
            .collect::<Result<_>>()?;
        for row in 0..batch.num_rows() {
            let key = element
                .required
                .iter()
                .zip(&columns)
                .map(|(name, column)| column.get(row, name))
                .collect::<Result<Vec<KeyValue>>>()?;
            out.push(key);
        }
    }
    Ok(out)
}

/// Read a `dimensions/<element>` file back.
///
/// # Errors
///
/// Returns an error if the file cannot be read or its columns do not match
/// the element schema.
pub fn read_dimension_records(
    path: &Path,
    element: &DimensionElement,
) -> Result<Vec<DimensionRecord>> {
    let mut out = Vec::new();
    for batch in open_reader(path)? {
        let batch = batch?;
        let columns: Vec<ValueColumn> = element
            .columns
            .iter()
            .map(|spec| ValueColumn::open(&batch, &spec.name, spec.column_type))
            .collect::<Result<_>>()?;

        for row in 0..batch.num_rows() {
            let mut record = DimensionRecord::new(&element.name);
            for (spec, column) in element.columns.iter().zip(&columns) {
                record.values.insert(spec.name.clone(), column.get(row));
            }
            out.push(record);
        }
    }
    Ok(out)
}
