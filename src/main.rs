//! recolumn: turn JSON Lines telemetry into per-schema Parquet files.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use recolumn::parquet::StreamingParquetWriter;
use recolumn::{json, Config, RecordRepository};
use tracing::info;

#[derive(Parser)]
#[command(name = "recolumn")]
#[command(about = "Compile hierarchical telemetry records into columnar batches")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a JSON Lines file into Parquet files, one per schema
    Convert {
        /// JSON Lines input, one object per line
        #[arg(short, long)]
        input: PathBuf,

        /// Directory receiving the Parquet files and manifest.json
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Repository configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of records per build
        #[arg(short, long, default_value = "100000")]
        batch_size: usize,

        /// Sort rows by the configured keys before each build
        #[arg(long)]
        optimize: bool,
    },
    /// Print the per-schema column layout of a JSON Lines file
    Describe {
        /// JSON Lines input, one object per line
        #[arg(short, long)]
        input: PathBuf,

        /// Repository configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path),
        None => Ok(Config::default()),
    }
}

/// Feed every non-empty line of `input` to `on_record`.
fn for_each_record(
    input: &Path,
    mut on_record: impl FnMut(recolumn::Record) -> Result<()>,
) -> Result<usize> {
    let file =
        File::open(input).with_context(|| format!("Failed to open input: {}", input.display()))?;
    let mut count = 0;
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", input.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let line_no = index + 1;
        let document: serde_json::Value = serde_json::from_str(&line)
            .with_context(|| format!("{}:{line_no}: invalid JSON", input.display()))?;
        let record = json::record_from_json(&document)
            .with_context(|| format!("{}:{line_no}: invalid record", input.display()))?;
        on_record(record).with_context(|| format!("{}:{line_no}", input.display()))?;
        count += 1;
    }
    Ok(count)
}

fn flush(
    repository: &mut RecordRepository,
    writer: &mut StreamingParquetWriter,
    optimize: bool,
) -> Result<()> {
    if optimize {
        repository.optimize();
    }
    let batches = repository.build().context("Failed to build record batches")?;
    writer.write_batches(&batches)
}

fn run_convert(
    input: PathBuf,
    output_dir: PathBuf,
    config: Option<PathBuf>,
    batch_size: usize,
    optimize: bool,
) -> Result<()> {
    if batch_size == 0 {
        bail!("--batch-size must be at least 1");
    }

    let mut repository = RecordRepository::new(load_config(config.as_deref())?);
    let mut writer = StreamingParquetWriter::new(&output_dir)?;

    let mut pending = 0;
    let records = for_each_record(&input, |record| {
        repository.add_record(record)?;
        pending += 1;
        if pending >= batch_size {
            flush(&mut repository, &mut writer, optimize)?;
            pending = 0;
        }
        Ok(())
    })?;
    flush(&mut repository, &mut writer, optimize)?;

    let entries = writer.finish()?;
    info!(
        records,
        files = entries.len(),
        output_dir = %output_dir.display(),
        "Conversion complete"
    );
    Ok(())
}

fn run_describe(input: PathBuf, config: Option<PathBuf>) -> Result<()> {
    let mut repository = RecordRepository::new(load_config(config.as_deref())?);
    for_each_record(&input, |record| Ok(repository.add_record(record)?))?;

    let stdout = io::stdout();
    serde_json::to_writer_pretty(stdout.lock(), &repository.metadata())?;
    println!();
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Convert {
            input,
            output_dir,
            config,
            batch_size,
            optimize,
        } => run_convert(input, output_dir, config, batch_size, optimize),
        Commands::Describe { input, config } => run_describe(input, config),
    }
}
