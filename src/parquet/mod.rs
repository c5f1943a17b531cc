//! Parquet output.
//!
//! Writes the batches produced by repository builds to one Parquet file per
//! schema, plus a `manifest.json` listing the files.

pub mod writer;

pub use writer::{ManifestEntry, StreamingParquetWriter, MANIFEST_FILE};
