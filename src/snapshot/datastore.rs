//! The merged datastore record file.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::array::Array;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use super::schema::{self, DATASET_ID_COLUMN};
use super::{
    col_i64, col_id, col_string, id_at, merge, open_reader, ColumnBuilder, MAX_ROWS_PER_WRITE,
};
use crate::model::{ColumnType, ColumnValue, DatasetId, DatastoreRecordData, StoredFileInfo};
use crate::Result;

/// One flat row of the `datastore` file: which store holds which file of
/// which dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct DatastoreRow {
    /// Name of the backing store holding the file.
    pub datastore_name: String,
    /// The dataset the file belongs to.
    pub dataset_id: DatasetId,
    /// Location and metadata of the file.
    pub info: StoredFileInfo,
}

/// Batched writer for the snapshot's single `datastore` file.
///
/// The file is created lazily on the first non-empty write; an export with
/// no datastore records produces no file at all, and the importer treats the
/// absence as "nothing to do".
pub struct DatastoreWriter {
    path: PathBuf,
    schema: SchemaRef,
    writer: Option<ArrowWriter<File>>,
    buffer: Vec<DatastoreRow>,
}

impl DatastoreWriter {
    /// New writer; no file is touched yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            schema: schema::datastore_schema(),
            writer: None,
            buffer: Vec::new(),
        }
    }

    /// Merge one batch of per-store record exports and buffer the resolved
    /// rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the merge fails (priority/store mismatch,
    /// multi-table records) or a flush fails.
    pub fn write_records(
        &mut self,
        records: &HashMap<String, DatastoreRecordData>,
        priority: &[String],
    ) -> Result<()> {
        let rows = merge::resolve(records, priority)?;
        for row in rows {
            self.buffer.push(row);
            if self.buffer.len() >= MAX_ROWS_PER_WRITE {
                self.flush()?;
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        if self.writer.is_none() {
            let file = File::create(&self.path)?;
            self.writer = Some(ArrowWriter::try_new(file, self.schema.clone(), None)?);
        }

        let mut stores = ColumnBuilder::for_value(ColumnType::String, true);
        let mut ids = ColumnBuilder::new_id();
        let mut paths = ColumnBuilder::for_value(ColumnType::String, false);
        let mut formatters = ColumnBuilder::for_value(ColumnType::String, true);
        let mut storage_classes = ColumnBuilder::for_value(ColumnType::String, true);
        let mut components = ColumnBuilder::for_value(ColumnType::String, true);
        let mut checksums = ColumnBuilder::for_value(ColumnType::String, false);
        let mut file_sizes = ColumnBuilder::for_value(ColumnType::Int, false);

        for row in self.buffer.drain(..) {
            let info = row.info;
            stores.append_value(
                Some(&ColumnValue::String(row.datastore_name)),
                "datastore_name",
            )?;
            ids.append_id(row.dataset_id)?;
            paths.append_value(Some(&ColumnValue::String(info.path)), "path")?;
            formatters.append_value(Some(&ColumnValue::String(info.formatter)), "formatter")?;
            storage_classes.append_value(
                Some(&ColumnValue::String(info.storage_class)),
                "storage_class",
            )?;
            components.append_value(
                info.component.map(ColumnValue::String).as_ref(),
                "component",
            )?;
            checksums.append_value(info.checksum.map(ColumnValue::String).as_ref(), "checksum")?;
            file_sizes.append_value(Some(&ColumnValue::Int(info.file_size)), "file_size")?;
        }

        let columns = vec![
            stores.finish(),
            ids.finish(),
            paths.finish(),
            formatters.finish(),
            storage_classes.finish(),
            components.finish(),
            checksums.finish(),
            file_sizes.finish(),
        ];
        let batch = RecordBatch::try_new(self.schema.clone(), columns)?;
        if let Some(writer) = self.writer.as_mut() {
            writer.write(&batch)?;
        }
        Ok(())
    }

    /// Flush remaining rows and close the file, if one was ever opened.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush or close fails.
    pub fn finish(mut self) -> Result<()> {
        self.flush()?;
        if let Some(writer) = self.writer.take() {
            writer.close()?;
        }
        Ok(())
    }
}

/// Read the `datastore` file back into flat rows.
///
/// # Errors
///
/// Returns an error if the file cannot be read or required columns are
/// missing.
pub fn read_datastore_rows(path: &Path) -> Result<Vec<DatastoreRow>> {
    let mut out = Vec::new();
    for batch in open_reader(path)? {
        let batch = batch?;
        let stores = col_string(&batch, "datastore_name")?;
        let ids = col_id(&batch, DATASET_ID_COLUMN)?;
        let paths = col_string(&batch, "path")?;
        let formatters = col_string(&batch, "formatter")?;
        let storage_classes = col_string(&batch, "storage_class")?;
        let components = col_string(&batch, "component")?;
        let checksums = col_string(&batch, "checksum")?;
        let file_sizes = col_i64(&batch, "file_size")?;

        for row in 0..batch.num_rows() {
            out.push(DatastoreRow {
                datastore_name: stores.value(row).to_string(),
                dataset_id: id_at(&ids, row)?,
                info: StoredFileInfo {
                    path: paths.value(row).to_string(),
                    formatter: formatters.value(row).to_string(),
                    storage_class: storage_classes.value(row).to_string(),
                    component: (!components.is_null(row))
                        .then(|| components.value(row).to_string()),
                    checksum: (!checksums.is_null(row)).then(|| checksums.value(row).to_string()),
                    file_size: file_sizes.value(row),
                },
            });
        }
    }
    Ok(out)
}
