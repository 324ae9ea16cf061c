//! Error types for dataferry
//!
//! Clear error messages with actionable guidance: configuration
//! inconsistencies are fatal and abort immediately, partial-data conditions
//! are logged by callers and tolerated.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// dataferry error types
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration inconsistency (datastore priority mismatch, unexpected
    /// collection type, multi-table datastore record). Always fatal.
    #[error("configuration error: {0}")]
    Config(String),

    /// A datastore path still looks like an absolute URI after applying all
    /// rewrite rules, so it cannot be relocated to the target environment.
    #[error("unhandled absolute path to datastore file: {0}")]
    UnrelocatablePath(String),

    /// A dataset type was dumped more than once in one export session.
    #[error("dataset type '{0}' was already dumped in this export session")]
    DuplicateDump(String),

    /// A name fragment failed the filename-safety check and could have
    /// escaped the snapshot directory.
    #[error("path segment is in unexpected format: {0}")]
    UnsafePathSegment(String),

    /// Missing or corrupt snapshot data (absent manifest, decode mismatch).
    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// Failure reported by the external catalog (constraint violation,
    /// connectivity loss). Rolls back the surrounding import transaction.
    #[error("catalog error: {0}")]
    Catalog(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Manifest / dataset type schema serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Collection snapshot serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
