//! Arrow schema derivation for snapshot files.

use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};

use crate::model::{ColumnType, DatasetType, DimensionElement, DimensionUniverse};
use crate::{Error, Result};

pub(crate) const DATASET_ID_COLUMN: &str = "dataset_id";
pub(crate) const RUN_COLUMN: &str = "run";
pub(crate) const COLLECTION_COLUMN: &str = "collection";
pub(crate) const TIMESPAN_BEGIN_COLUMN: &str = "timespan_begin_nsec";
pub(crate) const TIMESPAN_END_COLUMN: &str = "timespan_end_nsec";

/// One data coordinate column of a dataset or association file.
#[derive(Debug, Clone)]
pub(crate) struct DimKey {
    pub name: String,
    pub key_type: ColumnType,
}

/// The required dimensions of a dataset type, in the universe's topological
/// order, with their key data types.
pub(crate) fn dataset_dimensions(
    dataset_type: &DatasetType,
    universe: &DimensionUniverse,
) -> Result<Vec<DimKey>> {
    let names: Vec<&str> = dataset_type.dimensions.iter().map(String::as_str).collect();
    universe
        .sorted(&names)?
        .into_iter()
        .map(|element| {
            check_key_type(element.key_type, &element.name)?;
            Ok(DimKey {
                name: element.name.clone(),
                key_type: element.key_type,
            })
        })
        .collect()
}

fn check_key_type(key_type: ColumnType, name: &str) -> Result<()> {
    match key_type {
        ColumnType::Int | ColumnType::String => Ok(()),
        ColumnType::Float | ColumnType::Bool => Err(Error::Config(format!(
            "dimension '{name}' has a non-key data type"
        ))),
    }
}

fn dictionary_utf8() -> DataType {
    DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8))
}

fn key_field(key: &DimKey) -> Field {
    let data_type = match key.key_type {
        ColumnType::Int => DataType::Int64,
        // check_key_type rejects everything else up front.
        _ => dictionary_utf8(),
    };
    Field::new(&key.name, data_type, false)
}

fn id_field() -> Field {
    Field::new(DATASET_ID_COLUMN, DataType::FixedSizeBinary(16), false)
}

/// Schema of a `datasets/<type>` file.
pub(crate) fn dataset_schema(dimensions: &[DimKey]) -> SchemaRef {
    let mut fields = vec![id_field(), Field::new(RUN_COLUMN, dictionary_utf8(), false)];
    fields.extend(dimensions.iter().map(key_field));
    Arc::new(Schema::new(fields))
}

/// Schema of an `associations/<type>` file: the dataset columns plus the
/// owning collection and the validity bounds. Timespan bounds are null for
/// tagged memberships and for unbounded calibration ranges.
pub(crate) fn association_schema(dimensions: &[DimKey]) -> SchemaRef {
    let mut fields = vec![
        id_field(),
        Field::new(RUN_COLUMN, dictionary_utf8(), false),
        Field::new(COLLECTION_COLUMN, dictionary_utf8(), false),
        Field::new(TIMESPAN_BEGIN_COLUMN, DataType::Int64, true),
        Field::new(TIMESPAN_END_COLUMN, DataType::Int64, true),
    ];
    fields.extend(dimensions.iter().map(key_field));
    Arc::new(Schema::new(fields))
}

/// Schema of a `dimensions/<element>` file: the element's full record
/// schema, with string columns dictionary encoded.
pub(crate) fn dimension_schema(element: &DimensionElement) -> SchemaRef {
    let fields: Vec<Field> = element
        .columns
        .iter()
        .map(|spec| {
            let data_type = match spec.column_type {
                ColumnType::Int => DataType::Int64,
                ColumnType::Float => DataType::Float64,
                ColumnType::String => dictionary_utf8(),
                ColumnType::Bool => DataType::Boolean,
            };
            Field::new(&spec.name, data_type, spec.nullable)
        })
        .collect();
    Arc::new(Schema::new(fields))
}

/// Schema of the merged `datastore` file, mirroring the flat record form of
/// a file-backed store.
pub(crate) fn datastore_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("datastore_name", dictionary_utf8(), false),
        id_field(),
        Field::new("path", DataType::Utf8, false),
        Field::new("formatter", dictionary_utf8(), false),
        Field::new("storage_class", dictionary_utf8(), false),
        Field::new("component", dictionary_utf8(), true),
        Field::new("checksum", DataType::Utf8, true),
        Field::new("file_size", DataType::Int64, false),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_dimensions_follow_universe_order() {
        let universe = DimensionUniverse::new()
            .with_element(DimensionElement::new("instrument", ColumnType::String))
            .with_element(DimensionElement::new("detector", ColumnType::Int));
        let dt = DatasetType::new("raw", ["detector", "instrument"], "Exposure");
        let dims = dataset_dimensions(&dt, &universe).unwrap();
        let names: Vec<_> = dims.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["instrument", "detector"]);
    }

    #[test]
    fn test_float_keyed_dimension_rejected() {
        let universe = DimensionUniverse::new()
            .with_element(DimensionElement::new("depth", ColumnType::Float));
        let dt = DatasetType::new("deep", ["depth"], "Exposure");
        assert!(dataset_dimensions(&dt, &universe).is_err());
    }

    #[test]
    fn test_association_schema_includes_dataset_columns() {
        let dims = vec![DimKey {
            name: "detector".to_string(),
            key_type: ColumnType::Int,
        }];
        let schema = association_schema(&dims);
        let names: Vec<_> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(
            names,
            vec![
                "dataset_id",
                "run",
                "collection",
                "timespan_begin_nsec",
                "timespan_end_nsec",
                "detector",
            ]
        );
    }

    #[test]
    fn test_dataset_schema_shape() {
        let dims = vec![
            DimKey {
                name: "instrument".to_string(),
                key_type: ColumnType::String,
            },
            DimKey {
                name: "detector".to_string(),
                key_type: ColumnType::Int,
            },
        ];
        let schema = dataset_schema(&dims);
        assert_eq!(schema.field(0).name(), "dataset_id");
        assert_eq!(schema.field(0).data_type(), &DataType::FixedSizeBinary(16));
        assert_eq!(schema.field(1).name(), "run");
        assert_eq!(schema.field(3).data_type(), &DataType::Int64);
    }
}
