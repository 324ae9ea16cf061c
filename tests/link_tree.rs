//! Symlink tree materialization over an exported snapshot.

use dataferry::catalog::{Catalog, MemoryCatalog};
use dataferry::export::Exporter;
use dataferry::linktree::{materialize_link_tree, LinkTreeOptions};
use dataferry::mapping::PathMapper;
use dataferry::model::{
    ColumnType, DataCoordinate, DatasetId, DatasetRef, DatasetType, DimensionElement,
    DimensionUniverse, ExpandedRef, StoredFileInfo,
};

const STORE: &str = "FileDatastore@main";

fn universe() -> DimensionUniverse {
    DimensionUniverse::new().with_element(
        DimensionElement::new("detector", ColumnType::Int)
            .with_column("id", ColumnType::Int, false)
            .with_required(["id"]),
    )
}

fn export_with_paths(dir: &std::path::Path, paths: &[&str]) {
    let mut catalog = MemoryCatalog::new(universe());
    catalog.add_datastore(STORE, "file_datastore_records");
    catalog
        .register_dataset_type(&DatasetType::new("raw", ["detector"], "Exposure"))
        .unwrap();
    for (detector, path) in paths.iter().enumerate() {
        let reference = DatasetRef {
            id: DatasetId::generate(),
            dataset_type: "raw".to_string(),
            run: "runs/1".to_string(),
            data_id: DataCoordinate::new().with("detector", detector as i64),
        };
        let id = reference.id;
        catalog.insert_expanded(ExpandedRef::bare(reference)).unwrap();
        catalog
            .add_datastore_record(
                STORE,
                id,
                StoredFileInfo::new(*path, "lsst.FitsFormatter", "Exposure"),
            )
            .unwrap();
    }

    let mut exporter = Exporter::new(dir, &catalog, "runs/1").unwrap();
    exporter.dump_refs("raw", &["runs/1".to_string()]).unwrap();
    exporter.finish().unwrap();
}

#[test]
fn test_links_point_back_into_the_source_datastore() {
    let snapshot = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    export_with_paths(
        snapshot.path(),
        &[
            "file:///sdf/data/rubin/raw/a.fits",
            "relative/b.fits",
            // Fragments are reader directives and must not leak into names.
            "relative/c.fits#unzip=1",
        ],
    );

    let mapper = PathMapper::new().with_rule("file:///sdf/data/rubin/", "external/rubin/");
    let options = LinkTreeOptions::new("/repo/main", output.path().join("tree")).with_workers(4);
    let created = materialize_link_tree(snapshot.path(), &mapper, &options).unwrap();
    assert_eq!(created, 3);

    let tree = output.path().join("tree");
    let absolute = std::fs::read_link(tree.join("external/rubin/raw/a.fits")).unwrap();
    assert_eq!(absolute, std::path::PathBuf::from("/sdf/data/rubin/raw/a.fits"));

    let relative = std::fs::read_link(tree.join("relative/b.fits")).unwrap();
    assert_eq!(relative, std::path::PathBuf::from("/repo/main/relative/b.fits"));

    assert!(tree.join("relative/c.fits").symlink_metadata().is_ok());
}

#[test]
fn test_rerun_tolerates_existing_links() {
    let snapshot = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    export_with_paths(snapshot.path(), &["relative/b.fits"]);

    let mapper = PathMapper::identity();
    let options = LinkTreeOptions::new("/repo/main", output.path().join("tree"));
    assert_eq!(
        materialize_link_tree(snapshot.path(), &mapper, &options).unwrap(),
        1
    );
    // Second run finds every link in place and creates nothing.
    assert_eq!(
        materialize_link_tree(snapshot.path(), &mapper, &options).unwrap(),
        0
    );
}

#[test]
fn test_unmapped_absolute_path_is_rejected() {
    let snapshot = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    export_with_paths(snapshot.path(), &["s3://bucket/file.fits"]);

    let mapper = PathMapper::new().with_rule("file:///sdf/", "sdf/");
    let options = LinkTreeOptions::new("/repo/main", output.path().join("tree"));
    let err = materialize_link_tree(snapshot.path(), &mapper, &options).unwrap_err();
    assert!(err
        .to_string()
        .contains("unhandled absolute path to datastore file"));
}
