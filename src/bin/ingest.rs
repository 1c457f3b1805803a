//! Ingest binary entry point.
//!
//! This binary runs the offline merge phase: it reads enriched record
//! batches from JSONL files, merges them into the durable corpus with
//! last-write-wins deduplication, and rewrites the corpus file atomically.
//! Embedding and index construction happen later, in `build-index`.
//!
//! # Examples
//!
//! Merge one batch into the default corpus:
//! ```bash
//! ingest --input batch-01.jsonl
//! ```
//!
//! Merge several batches in order:
//! ```bash
//! ingest --input week-30.jsonl --input week-31.jsonl --corpus data/corpus.jsonl
//! ```

use std::path::PathBuf;
use std::time::Instant;

use abstract_search::corpus::merge::merge;
use abstract_search::corpus::Corpus;
use abstract_search::provider::{JsonlRecordSource, RecordSource};
use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Ingest CLI for merging enriched record batches into the corpus
#[derive(Parser, Debug)]
#[command(
    name = "ingest",
    version,
    about = "Merge enriched record batches into the search corpus",
    long_about = "Offline merge phase for the abstract search pipeline. Reads enriched JSONL \
                  batch files, deduplicates records by id (later batches win), and rewrites \
                  the corpus atomically.

EXAMPLES:
  Merge one batch into the default corpus:
    ingest --input batch-01.jsonl

  Merge several batches in order:
    ingest --input week-30.jsonl --input week-31.jsonl --corpus data/corpus.jsonl

  Verbose logging:
    ingest --input batch-01.jsonl --log-level debug"
)]
struct IngestArgs {
    /// Input JSONL batch file (repeatable; merged in the order given)
    #[arg(short, long, value_name = "FILE", required = true)]
    input: Vec<PathBuf>,

    /// Corpus file path
    #[arg(long, value_name = "PATH", default_value = "corpus.jsonl")]
    corpus: PathBuf,

    /// Logging verbosity level
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

/// Initialize logging subsystem with the specified level
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

/// Create a progress bar for tracking batch reads
fn create_progress_bar(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} batches | Records: {msg}")
            .expect("Invalid progress bar template")
            .progress_chars("##-"),
    );
    pb
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = IngestArgs::parse();

    init_logging(&args.log_level).context("Failed to initialize logging")?;

    info!("Starting record ingest");
    debug!("CLI arguments: {:?}", args);

    let start_time = Instant::now();

    // Validate input files exist before touching the corpus
    for input in &args.input {
        if !input.exists() {
            anyhow::bail!("Input file not found: {}", input.display());
        }
    }

    let corpus = Corpus::load_or_empty(&args.corpus)
        .with_context(|| format!("Failed to load corpus from {}", args.corpus.display()))?;
    info!(
        "Loaded corpus with {} records from {}",
        corpus.len(),
        args.corpus.display()
    );

    // Read every batch file up front, in the order given; arrival order
    // decides which duplicate wins.
    let progress = create_progress_bar(args.input.len());
    progress.set_message("0");

    let mut batches = Vec::with_capacity(args.input.len());
    let mut records_read = 0usize;
    for input in &args.input {
        let source = JsonlRecordSource::new(input);
        let batch = source
            .fetch_records()
            .await
            .with_context(|| format!("Failed to read batch file {}", input.display()))?;
        records_read += batch.len();
        batches.push(batch);
        progress.inc(1);
        progress.set_message(format!("{}", records_read));
    }
    progress.finish_with_message(format!("{}", records_read));

    let (merged, report) = merge(corpus, batches);

    merged
        .save(&args.corpus)
        .with_context(|| format!("Failed to write corpus to {}", args.corpus.display()))?;

    let elapsed = start_time.elapsed();
    println!("\n╔════════════════════════════════════════╗");
    println!("║      Ingest Completed                  ║");
    println!("╠════════════════════════════════════════╣");
    println!("║ Records processed:    {:>16} ║", report.processed());
    println!("║ Accepted (new):       {:>16} ║", report.accepted);
    println!("║ Replaced:             {:>16} ║", report.replaced);
    println!("║ Skipped (no id):      {:>16} ║", report.skipped_missing_id);
    println!("║ Skipped (no abstract):{:>16} ║", report.skipped_empty_abstract);
    println!("║ Corpus size:          {:>16} ║", merged.len());
    println!("║ Elapsed time:         {:>13.2?} ║", elapsed);
    println!("╚════════════════════════════════════════╝");

    if report.skipped() > 0 {
        warn!(
            "{} records were skipped as invalid - check logs for details",
            report.skipped()
        );
    }

    info!("Ingest completed successfully");

    Ok(())
}
