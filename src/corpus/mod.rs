//! Canonical corpus storage.
//!
//! This module owns the deduplicated, ordered record collection that the
//! rest of the system treats as the source of truth: the merge engine
//! updates it, the index builder embeds it in order, and the query engine
//! resolves result ids against it.
//!
//! The durable form is JSONL (one self-describing record per line), which
//! keeps the corpus append-friendly and greppable when debugging upstream
//! enrichment output.

pub mod merge;

use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::models::Record;

/// Errors that can occur while loading or saving the corpus.
#[derive(Debug, Error)]
pub enum CorpusError {
    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A corpus line that is not a valid record
    #[error("Malformed record on line {line}: {source}")]
    Malformed {
        line: usize,
        source: serde_json::Error,
    },

    /// Record serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Two records with the same id in a supposedly deduplicated corpus
    #[error("Duplicate id in corpus: {0}")]
    DuplicateId(String),
}

/// Result type for corpus operations.
pub type CorpusResult<T> = Result<T, CorpusError>;

/// The canonical, deduplicated record collection.
///
/// Holds records in a stable order (the order the index builder will embed
/// them in) alongside an id-to-position map for O(1) lookup. A `Corpus` is
/// valid by construction: every way to create one enforces id uniqueness,
/// so downstream consumers never re-check it.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    /// Records in canonical order
    records: Vec<Record>,

    /// id -> position in `records`
    positions: HashMap<String, usize>,
}

impl Corpus {
    /// Create an empty corpus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a corpus from records already believed to be deduplicated.
    ///
    /// # Errors
    /// Returns `CorpusError::DuplicateId` if two records share an id; a
    /// store in that state is structurally invalid and must not be merged
    /// into or indexed.
    pub fn from_records(records: Vec<Record>) -> CorpusResult<Self> {
        let mut positions = HashMap::with_capacity(records.len());
        for (pos, record) in records.iter().enumerate() {
            if positions.insert(record.id.clone(), pos).is_some() {
                return Err(CorpusError::DuplicateId(record.id.clone()));
            }
        }
        Ok(Self { records, positions })
    }

    /// Records in canonical order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the corpus holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look up a record by id.
    pub fn get(&self, id: &str) -> Option<&Record> {
        self.positions.get(id).map(|&pos| &self.records[pos])
    }

    /// Whether a record with this id exists.
    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    /// Load a corpus from a JSONL file.
    ///
    /// Strict on content: the corpus file is produced by this system, so a
    /// malformed line or a duplicate id means corruption and fails the load
    /// rather than being papered over.
    ///
    /// # Errors
    /// Returns `CorpusError::Io` if the file cannot be read,
    /// `CorpusError::Malformed` for an unparseable line, or
    /// `CorpusError::DuplicateId` for a structurally invalid store.
    pub fn load(path: &Path) -> CorpusResult<Self> {
        let file = fs::File::open(path)?;
        let reader = BufReader::new(file);

        let mut records = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: Record = serde_json::from_str(&line).map_err(|source| {
                CorpusError::Malformed {
                    line: idx + 1,
                    source,
                }
            })?;
            records.push(record);
        }

        debug!(records = records.len(), path = %path.display(), "loaded corpus");
        Self::from_records(records)
    }

    /// Load a corpus, treating a missing file as an empty corpus.
    ///
    /// This is the path the merge phase takes on a fresh deployment, before
    /// any corpus file exists.
    ///
    /// # Errors
    /// Same as [`Corpus::load`], except a missing file is not an error.
    pub fn load_or_empty(path: &Path) -> CorpusResult<Self> {
        match fs::File::open(path) {
            Ok(_) => Self::load(path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the corpus to a JSONL file.
    ///
    /// Writes to a sibling temp file and renames it into place so readers
    /// never observe a half-written corpus.
    ///
    /// # Errors
    /// Returns `CorpusError::Io` on filesystem failures.
    pub fn save(&self, path: &Path) -> CorpusResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = sibling_tmp_path(path);
        {
            let file = fs::File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            for record in &self.records {
                let line = serde_json::to_string(record)?;
                writer.write_all(line.as_bytes())?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp_path, path)?;

        debug!(records = self.records.len(), path = %path.display(), "saved corpus");
        Ok(())
    }
}

fn sibling_tmp_path(path: &Path) -> std::path::PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "corpus.jsonl".to_string());
    path.with_file_name(format!("{}.tmp", file_name))
}
