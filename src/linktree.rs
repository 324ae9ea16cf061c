//! Symlink tree materialization.
//!
//! Builds a file tree mirroring the target repository layout where every
//! file is a symlink back into the source datastore. This lets the rewritten
//! datastore records of a snapshot be validated (and served) without copying
//! any bytes.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;
use tracing::info;

use crate::mapping::{split_fragment, PathMapper};
use crate::snapshot::{self, DatastoreRow, ExportPaths};
use crate::{Error, Result};

const DEFAULT_WORKERS: usize = 16;
const PROGRESS_INTERVAL: u64 = 10_000;

/// Where the tree goes and where the real files live.
#[derive(Debug, Clone)]
pub struct LinkTreeOptions {
    /// Root directory of the source datastore; relative record paths are
    /// resolved against it.
    pub datastore_root: PathBuf,
    /// Directory the symlink tree is created under.
    pub output_directory: PathBuf,
    /// Number of worker threads creating links.
    pub workers: usize,
}

impl LinkTreeOptions {
    /// Options with the default worker count.
    #[must_use]
    pub fn new(datastore_root: impl Into<PathBuf>, output_directory: impl Into<PathBuf>) -> Self {
        Self {
            datastore_root: datastore_root.into(),
            output_directory: output_directory.into(),
            workers: DEFAULT_WORKERS,
        }
    }

    /// Builder-style worker count override.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

/// Create a symlink for every datastore record of a snapshot, with link
/// locations derived from `mapping`. Returns the number of links created.
///
/// Records whose link already exists are skipped, so several rows pointing
/// at the same file (composite components) are harmless and the operation
/// can be re-run after a partial failure.
///
/// # Errors
///
/// Returns an error if the snapshot's datastore file cannot be read, a
/// record's path cannot be mapped or maps to an absolute location, or link
/// creation fails.
pub fn materialize_link_tree(
    snapshot_directory: &Path,
    mapping: &PathMapper,
    options: &LinkTreeOptions,
) -> Result<u64> {
    let rows = snapshot::read_datastore_rows(&ExportPaths::new(snapshot_directory).datastore_file())?;
    info!(records = rows.len(), "materializing link tree");
    fs::create_dir_all(&options.output_directory)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.workers)
        .build()
        .map_err(|e| Error::Other(e.to_string()))?;

    let created = AtomicU64::new(0);
    pool.install(|| {
        rows.into_par_iter().try_for_each(|row| {
            if link_one(&row, mapping, options)? {
                let count = created.fetch_add(1, Ordering::Relaxed) + 1;
                if count % PROGRESS_INTERVAL == 0 {
                    info!(links = count, "link tree progress");
                }
            }
            Ok::<(), Error>(())
        })
    })?;
    Ok(created.load(Ordering::Relaxed))
}

/// Create one link; `Ok(false)` when it already existed.
fn link_one(row: &DatastoreRow, mapping: &PathMapper, options: &LinkTreeOptions) -> Result<bool> {
    // Fragments are reader directives, not part of the file location.
    let (bare, _) = split_fragment(&row.info.path);
    let mapped = mapping.map(&row.datastore_name, bare)?;
    if Path::new(&mapped.path).is_absolute() {
        return Err(Error::UnrelocatablePath(row.info.path.clone()));
    }

    let link = options.output_directory.join(&mapped.path);
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent)?;
    }
    let source = bare.strip_prefix("file://").map_or_else(
        || options.datastore_root.join(bare),
        PathBuf::from,
    );
    match std::os::unix::fs::symlink(&source, &link) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.into()),
    }
}
