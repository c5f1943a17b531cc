//! Streaming Parquet writer for built record batches.
//!
//! Every effective schema id gets its own file. Writers are created lazily on
//! the first batch of a schema and kept open across builds, so each flush
//! window becomes one more row group of the same file. When a schema's Arrow
//! layout changes between builds (for example a string column switching to
//! dictionary encoding) the current file is closed and a new one is started.
//!
//! # Thread Safety
//!
//! `StreamingParquetWriter` is NOT thread-safe. Use from a single thread.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const MANIFEST_FILE: &str = "manifest.json";

/// One output file as listed in `manifest.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub file: String,
    pub schema_id: String,
    pub rows: usize,
}

struct OpenFile {
    entry: usize,
    schema: SchemaRef,
    writer: ArrowWriter<File>,
}

pub struct StreamingParquetWriter {
    output_dir: PathBuf,
    writer_props: WriterProperties,
    // Open writers, keyed by effective schema id.
    writers: BTreeMap<String, OpenFile>,
    entries: Vec<ManifestEntry>,
    total_rows: usize,
}

impl StreamingParquetWriter {
    /// Create a new streaming Parquet writer.
    ///
    /// The output directory will be created if it doesn't exist.
    pub fn new(output_dir: &Path) -> Result<Self> {
        if !output_dir.exists() {
            fs::create_dir_all(output_dir).with_context(|| {
                format!(
                    "Failed to create output directory: {}",
                    output_dir.display()
                )
            })?;
        } else if !output_dir.is_dir() {
            anyhow::bail!(
                "Output path exists but is not a directory: {}",
                output_dir.display()
            );
        }

        let writer_props = WriterProperties::builder()
            .set_compression(Compression::ZSTD(Default::default()))
            .set_max_row_group_size(1_000_000)
            .build();

        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            writer_props,
            writers: BTreeMap::new(),
            entries: Vec::new(),
            total_rows: 0,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Get the total number of rows written.
    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    /// Files written so far, including the ones still open.
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    // Helper to create or get the writer of a schema id, rotating the file
    // when the batch layout no longer matches.
    fn get_or_create_writer(
        &mut self,
        schema_id: &str,
        schema: &SchemaRef,
    ) -> Result<&mut OpenFile> {
        let stale = self
            .writers
            .get(schema_id)
            .is_some_and(|open| open.schema != *schema);
        if stale {
            if let Some(open) = self.writers.remove(schema_id) {
                debug!(schema_id, "Batch layout changed, starting a new file");
                open.writer
                    .close()
                    .with_context(|| format!("Failed to close Parquet file for: {schema_id}"))?;
            }
        }

        if !self.writers.contains_key(schema_id) {
            let file_name = format!("schema_{:04}.parquet", self.entries.len());
            let path = self.output_dir.join(&file_name);
            let file = File::create(&path)
                .with_context(|| format!("Failed to create file: {}", path.display()))?;
            let writer = ArrowWriter::try_new(file, schema.clone(), Some(self.writer_props.clone()))
                .with_context(|| {
                    format!("Failed to create Parquet writer for: {}", path.display())
                })?;
            self.entries.push(ManifestEntry {
                file: file_name,
                schema_id: schema_id.to_string(),
                rows: 0,
            });
            self.writers.insert(
                schema_id.to_string(),
                OpenFile {
                    entry: self.entries.len() - 1,
                    schema: schema.clone(),
                    writer,
                },
            );
        }

        self.writers
            .get_mut(schema_id)
            .context("Parquet writer missing after creation")
    }

    /// Write one batch to the file of `schema_id`.
    pub fn write(&mut self, schema_id: &str, batch: &RecordBatch) -> Result<()> {
        if batch.num_rows() == 0 {
            return Ok(());
        }
        let open = self.get_or_create_writer(schema_id, &batch.schema())?;
        open.writer
            .write(batch)
            .with_context(|| format!("Failed to write batch for: {schema_id}"))?;
        let entry = open.entry;
        self.entries[entry].rows += batch.num_rows();
        self.total_rows += batch.num_rows();
        Ok(())
    }

    /// Write the output of one repository build.
    pub fn write_batches(&mut self, batches: &BTreeMap<String, RecordBatch>) -> Result<()> {
        for (schema_id, batch) in batches {
            self.write(schema_id, batch)?;
        }
        Ok(())
    }

    // Close all writers, attempting to close all even if some fail
    fn close_writers(&mut self) -> Result<()> {
        let mut first_error: Option<anyhow::Error> = None;
        for (schema_id, open) in std::mem::take(&mut self.writers) {
            if let Err(e) = open.writer.close() {
                if first_error.is_none() {
                    first_error = Some(
                        anyhow::Error::new(e)
                            .context(format!("Failed to close Parquet file for: {schema_id}")),
                    );
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Close every file and write `manifest.json`.
    pub fn finish(mut self) -> Result<Vec<ManifestEntry>> {
        self.close_writers()?;

        let path = self.output_dir.join(MANIFEST_FILE);
        let file = File::create(&path)
            .with_context(|| format!("Failed to create file: {}", path.display()))?;
        serde_json::to_writer_pretty(file, &self.entries)
            .with_context(|| format!("Failed to write manifest: {}", path.display()))?;

        info!(
            files = self.entries.len(),
            rows = self.total_rows,
            dir = %self.output_dir.display(),
            "Finished writing Parquet files"
        );
        Ok(std::mem::take(&mut self.entries))
    }
}

impl Drop for StreamingParquetWriter {
    fn drop(&mut self) {
        if !self.writers.is_empty() {
            warn!(
                dir = %self.output_dir.display(),
                "StreamingParquetWriter dropped without calling finish(), Parquet files may be incomplete"
            );
            // Attempt to close writers to at least flush pending data
            if let Err(e) = self.close_writers() {
                warn!("Error closing writers during drop: {e:#}");
            }
        }
    }
}
