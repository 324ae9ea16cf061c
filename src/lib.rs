//! # dataferry: portable snapshots for scientific data catalogs
//!
//! dataferry exports the contents of a data catalog — dataset references,
//! their metadata dimension records, storage locations, and collection
//! structure — into a directory of columnar (Parquet) and manifest files, and
//! re-imports that snapshot into a fresh catalog instance.
//!
//! The catalog itself is an external system reached through the narrow
//! [`catalog::Catalog`] capability trait; everything on the other side of that
//! boundary is treated as a black box. [`catalog::MemoryCatalog`] is a
//! reference implementation used for testing.
//!
//! ## Example
//!
//! ```rust,no_run
//! use dataferry::catalog::MemoryCatalog;
//! use dataferry::export::Exporter;
//! use dataferry::model::DimensionUniverse;
//!
//! let catalog = MemoryCatalog::new(DimensionUniverse::new());
//! let mut exporter = Exporter::new("dump", &catalog, "runs/prod")?;
//! exporter.dump_refs("raw", &["runs/prod".to_string()])?;
//! let index = exporter.finish()?;
//! println!("exported dataset types: {:?}", index.dataset_types);
//! # Ok::<(), dataferry::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod catalog;
pub mod error;
pub mod export;
pub mod import;
pub mod linktree;
pub mod mapping;
pub mod model;
pub mod snapshot;

pub use error::{Error, Result};
