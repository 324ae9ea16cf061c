//! Behavior of the individual snapshot file writers and readers.

use std::collections::BTreeSet;

use proptest::prelude::*;

use dataferry::catalog::{Catalog, MemoryCatalog};
use dataferry::export::Exporter;
use dataferry::model::{
    ColumnType, DataCoordinate, DatasetAssociation, DatasetId, DatasetRef, DatasetType,
    DimensionElement, DimensionRecord, DimensionUniverse, KeyValue,
};
use dataferry::snapshot::{
    read_associations, read_datasets, read_dimension_keys, read_dimension_records,
    AssociationWriter, DatasetWriter, DimensionRecordWriter,
};
use dataferry::Error;

fn universe() -> DimensionUniverse {
    DimensionUniverse::new()
        .with_element(
            DimensionElement::new("instrument", ColumnType::String)
                .with_column("name", ColumnType::String, false)
                .with_required(["name"]),
        )
        .with_element(
            DimensionElement::new("detector", ColumnType::Int)
                .with_column("instrument", ColumnType::String, false)
                .with_column("id", ColumnType::Int, false)
                .with_column("full_name", ColumnType::String, true)
                .with_required(["instrument", "id"]),
        )
}

fn raw_type() -> DatasetType {
    DatasetType::new("raw", ["instrument", "detector"], "Exposure")
}

fn raw_ref(instrument: &str, detector: i64) -> DatasetRef {
    DatasetRef {
        id: DatasetId::generate(),
        dataset_type: "raw".to_string(),
        run: "runs/1".to_string(),
        data_id: DataCoordinate::new()
            .with("instrument", instrument)
            .with("detector", detector),
    }
}

#[test]
fn test_dataset_batches_are_sorted_by_data_coordinate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("raw");
    let universe = universe();
    let mut writer = DatasetWriter::create(&path, &raw_type(), &universe).unwrap();
    writer
        .add_refs(vec![
            raw_ref("LSSTComCam", 3),
            raw_ref("LATISS", 1),
            raw_ref("LSSTComCam", 0),
        ])
        .unwrap();
    writer.finish().unwrap();

    let refs = read_datasets(&path, &raw_type(), &universe).unwrap();
    let coords: Vec<(KeyValue, KeyValue)> = refs
        .iter()
        .map(|r| {
            (
                r.data_id.get("instrument").unwrap().clone(),
                r.data_id.get("detector").unwrap().clone(),
            )
        })
        .collect();
    let mut sorted = coords.clone();
    sorted.sort();
    assert_eq!(coords, sorted);
    assert_eq!(refs.len(), 3);
}

#[test]
fn test_dataset_writer_rejects_foreign_type() {
    let dir = tempfile::tempdir().unwrap();
    let universe = universe();
    let mut writer =
        DatasetWriter::create(&dir.path().join("raw"), &raw_type(), &universe).unwrap();
    let mut stray = raw_ref("LSSTComCam", 0);
    stray.dataset_type = "bias".to_string();
    assert!(writer.add_refs(vec![stray]).is_err());
}

#[test]
fn test_dataset_writer_rejects_incomplete_data_coordinate() {
    let dir = tempfile::tempdir().unwrap();
    let universe = universe();
    let mut writer =
        DatasetWriter::create(&dir.path().join("raw"), &raw_type(), &universe).unwrap();
    let mut incomplete = raw_ref("LSSTComCam", 0);
    incomplete.data_id = DataCoordinate::new().with("instrument", "LSSTComCam");
    writer.add_refs(vec![incomplete]).unwrap();
    // The missing dimension surfaces when the buffered batch is flushed.
    assert!(writer.finish().is_err());
}

#[test]
fn test_flush_threshold_does_not_change_logical_rows() {
    // One run exactly at the threshold, one crossing it.
    for rows in [8i64, 9] {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw");
        let universe = universe();

        let refs: Vec<DatasetRef> = (0..rows).map(|d| raw_ref("LSSTComCam", d)).collect();
        let mut writer = DatasetWriter::create(&path, &raw_type(), &universe)
            .unwrap()
            .with_batch_size(8);
        writer.add_refs(refs.clone()).unwrap();
        writer.finish().unwrap();

        let read: BTreeSet<DatasetId> = read_datasets(&path, &raw_type(), &universe)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        let written: BTreeSet<DatasetId> = refs.into_iter().map(|r| r.id).collect();
        assert_eq!(read, written);
    }
}

#[test]
fn test_association_rows_carry_the_producing_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("raw");
    let universe = universe();

    let member = raw_ref("LSSTComCam", 0);
    let mut writer = AssociationWriter::create(&path, &raw_type(), &universe).unwrap();
    writer
        .add_associations(vec![DatasetAssociation {
            reference: member.clone(),
            collection: "tags/best".to_string(),
            timespan: None,
        }])
        .unwrap();
    writer.finish().unwrap();

    let rows = read_associations(&path).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, member.id);
    assert_eq!(rows[0].run, "runs/1");
    assert_eq!(rows[0].collection, "tags/best");
}

fn detector_record(instrument: &str, id: i64, full_name: &str) -> DimensionRecord {
    DimensionRecord::new("detector")
        .with("instrument", instrument)
        .with("id", id)
        .with("full_name", full_name)
}

#[test]
fn test_dimension_records_are_deduplicated_first_wins_and_sorted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("detector");
    let element = universe().get("detector").unwrap().clone();

    let mut writer = DimensionRecordWriter::new(path.clone(), element.clone());
    writer
        .add_record(detector_record("LSSTComCam", 2, "first"))
        .unwrap();
    writer
        .add_record(detector_record("LSSTComCam", 0, "zero"))
        .unwrap();
    // Same key as the first record; must be dropped.
    writer
        .add_record(detector_record("LSSTComCam", 2, "second"))
        .unwrap();
    assert_eq!(writer.len(), 2);
    writer.finish().unwrap();

    let records = read_dimension_records(&path, &element).unwrap();
    let keys: Vec<_> = records.iter().map(|r| r.key(&element).unwrap()).collect();
    assert_eq!(
        keys,
        vec![
            vec![KeyValue::from("LSSTComCam"), KeyValue::Int(0)],
            vec![KeyValue::from("LSSTComCam"), KeyValue::Int(2)],
        ]
    );
    assert_eq!(records[1], detector_record("LSSTComCam", 2, "first"));
}

#[test]
fn test_dimension_writer_rejects_records_after_finish() {
    let dir = tempfile::tempdir().unwrap();
    let element = universe().get("detector").unwrap().clone();
    let mut writer = DimensionRecordWriter::new(dir.path().join("detector"), element);
    writer
        .add_record(detector_record("LSSTComCam", 0, "zero"))
        .unwrap();
    writer.finish().unwrap();
    // Finishing again is a no-op.
    writer.finish().unwrap();
    let err = writer
        .add_record(detector_record("LSSTComCam", 1, "one"))
        .unwrap_err();
    assert!(matches!(err, Error::Snapshot(_)));
}

#[test]
fn test_dimension_writer_rejects_foreign_element() {
    let dir = tempfile::tempdir().unwrap();
    let element = universe().get("detector").unwrap().clone();
    let mut writer = DimensionRecordWriter::new(dir.path().join("detector"), element);
    let stray = DimensionRecord::new("instrument").with("name", "LATISS");
    assert!(writer.add_record(stray).is_err());
}

#[test]
fn test_each_dataset_type_dumps_only_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut catalog = MemoryCatalog::new(universe());
    catalog.register_dataset_type(&raw_type()).unwrap();
    catalog
        .insert_expanded(dataferry::model::ExpandedRef::bare(raw_ref("LSSTComCam", 0)))
        .unwrap();

    let mut exporter = Exporter::new(dir.path(), &catalog, "runs/1").unwrap();
    let collections = vec!["runs/1".to_string()];
    exporter.dump_refs("raw", &collections).unwrap();
    let err = exporter.dump_refs("raw", &collections).unwrap_err();
    assert!(matches!(err, Error::DuplicateDump(_)));
}

#[test]
fn test_association_file_exists_even_without_memberships() {
    let dir = tempfile::tempdir().unwrap();
    let mut catalog = MemoryCatalog::new(universe());
    catalog.register_dataset_type(&raw_type()).unwrap();
    catalog
        .insert_expanded(dataferry::model::ExpandedRef::bare(raw_ref("LSSTComCam", 0)))
        .unwrap();

    let mut exporter = Exporter::new(dir.path(), &catalog, "runs/1").unwrap();
    exporter
        .dump_refs("raw", &["runs/1".to_string()])
        .unwrap();
    exporter.finish().unwrap();

    let rows = dataferry::snapshot::read_associations(&dir.path().join("associations/raw")).unwrap();
    assert!(rows.is_empty());
}

#[test]
fn test_standalone_dimension_records_can_be_dumped_and_closed_early() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = MemoryCatalog::new(universe());
    let mut exporter = Exporter::new(dir.path(), &catalog, "runs/1").unwrap();

    assert!(!exporter.did_export_dimension_records("detector"));
    exporter
        .dump_dimension_records(vec![
            detector_record("LSSTComCam", 0, "zero"),
            detector_record("LSSTComCam", 1, "one"),
        ])
        .unwrap();
    assert!(exporter.did_export_dimension_records("detector"));

    // Closing early hands back the file path for mid-export reads.
    let path = exporter.close_dimension_writer("detector").unwrap();
    let element = universe().get("detector").unwrap().clone();
    assert_eq!(read_dimension_records(&path, &element).unwrap().len(), 2);

    // The closed file's keys can drive a follow-on dimension query.
    let keys = read_dimension_keys(&path, &element).unwrap();
    assert_eq!(
        keys,
        vec![
            vec![KeyValue::from("LSSTComCam"), KeyValue::Int(0)],
            vec![KeyValue::from("LSSTComCam"), KeyValue::Int(1)],
        ]
    );

    // The element's file is closed; further records are an error.
    let err = exporter
        .dump_dimension_records(vec![detector_record("LSSTComCam", 2, "two")])
        .unwrap_err();
    assert!(matches!(err, Error::Snapshot(_)));

    let index = exporter.finish().unwrap();
    assert_eq!(index.dimensions, vec!["detector"]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Writing and reading back preserves the full set of references, for
    /// arbitrary mixes of string and integer key values.
    #[test]
    fn prop_dataset_file_preserves_reference_set(
        rows in proptest::collection::vec(("[a-z]{1,8}", 0i64..10_000), 1..200)
    ) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw");
        let universe = universe();

        let refs: Vec<DatasetRef> = rows
            .into_iter()
            .map(|(instrument, detector)| raw_ref(&instrument, detector))
            .collect();
        let mut writer = DatasetWriter::create(&path, &raw_type(), &universe).unwrap();
        writer.add_refs(refs.clone()).unwrap();
        writer.finish().unwrap();

        let read: BTreeSet<(DatasetId, String)> = read_datasets(&path, &raw_type(), &universe)
            .unwrap()
            .into_iter()
            .map(|r| (r.id, format!("{:?}", r.data_id)))
            .collect();
        let written: BTreeSet<(DatasetId, String)> = refs
            .into_iter()
            .map(|r| (r.id, format!("{:?}", r.data_id)))
            .collect();
        prop_assert_eq!(read, written);
    }
}
