//! Record source module.
//!
//! This module defines the interface for sourcing enriched record batches
//! and includes the JSONL file implementation the ingest pipeline reads.
//!
//! The `RecordSource` trait abstracts where record batches come from,
//! allowing the merge phase to work with different backends (local JSONL
//! files today, harvesting APIs later) without coupling to specific
//! implementations.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::Record;

/// Errors that can occur when fetching records from a source.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Failed to read from the data source
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse the data format
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Other source-specific errors
    #[error("Provider error: {0}")]
    Other(String),
}

/// Result type for record source operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Trait for sourcing enriched record batches.
///
/// Implementations handle the specifics of fetching and parsing record
/// metadata from a single upstream batch (a file, an API page, a dump).
///
/// # Design Notes
///
/// - Sources return records in upstream order; the merge phase depends on
///   arrival order for its replacement semantics
/// - Sources do not validate or deduplicate; both are merge-phase concerns
/// - Sources are responsible for their own pagination and error recovery
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetch all available records from this source.
    ///
    /// # Returns
    /// The records in upstream order
    ///
    /// # Errors
    /// Returns `ProviderError` if records cannot be fetched
    async fn fetch_records(&self) -> ProviderResult<Vec<Record>>;

    /// Fetch at most `limit` records, useful for smoke tests and sampling.
    ///
    /// # Errors
    /// Returns `ProviderError` if records cannot be fetched
    async fn fetch_records_limit(&self, limit: usize) -> ProviderResult<Vec<Record>> {
        let records = self.fetch_records().await?;
        Ok(records.into_iter().take(limit).collect())
    }

    /// A human-readable name for this source, for logging.
    fn name(&self) -> &str;
}

/// Record source backed by a JSONL file, one record object per line.
///
/// Enrichment pipelines hand over batch files in this shape. Lines that do
/// not parse as a record are skipped with a warning rather than failing the
/// batch; a half-good file from a flaky enrichment run still ingests its
/// good half. Blank lines are ignored.
pub struct JsonlRecordSource {
    path: PathBuf,
    display_name: String,
}

impl JsonlRecordSource {
    /// Create a source over a JSONL batch file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let display_name = format!("jsonl:{}", path.display());
        Self { path, display_name }
    }

    /// The file this source reads.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RecordSource for JsonlRecordSource {
    async fn fetch_records(&self) -> ProviderResult<Vec<Record>> {
        let contents = tokio::fs::read_to_string(&self.path).await?;

        let mut records = Vec::new();
        let mut malformed = 0usize;
        for (number, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Record>(line) {
                Ok(record) => records.push(record),
                Err(error) => {
                    malformed += 1;
                    warn!(
                        source = %self.display_name,
                        line = number + 1,
                        %error,
                        "skipping malformed batch line"
                    );
                }
            }
        }

        debug!(
            source = %self.display_name,
            records = records.len(),
            malformed,
            "read batch file"
        );
        Ok(records)
    }

    fn name(&self) -> &str {
        &self.display_name
    }
}
