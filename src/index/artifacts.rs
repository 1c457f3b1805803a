//! Persisted index artifacts.
//!
//! A completed build writes four files into one directory:
//!
//! - `manifest.json` — schema version, model identity, row shape
//! - `index.bin` — the normalized vector matrix the index serves from
//! - `embeddings.bin` — the raw provider output, kept for rebuild/debugging
//!   without re-embedding the corpus
//! - `corpus.jsonl` — the deduplicated records, positionally aligned with
//!   both matrices
//!
//! The matrices are headerless little-endian f32; the manifest is the
//! single source of truth for their shape. The set is only ever valid as a
//! whole: loading cross-validates counts and dimensions across all files
//! and refuses anything that disagrees, so a torn publish surfaces as a
//! load error instead of silently serving mismatched positions. Writes
//! stage to sibling temp files and rename into place, manifest last.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::{AlignmentTable, IndexBuild, IndexError, Snapshot, VectorIndex};
use crate::corpus::{Corpus, CorpusError};
use crate::models::EmbeddingConfig;

/// Current artifact schema version.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Manifest file name inside an artifact directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Normalized index matrix file name.
pub const INDEX_FILE: &str = "index.bin";

/// Raw embedding matrix file name.
pub const EMBEDDINGS_FILE: &str = "embeddings.bin";

/// Aligned corpus file name.
pub const CORPUS_FILE: &str = "corpus.jsonl";

/// Errors that can occur while persisting or loading artifacts.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest that does not parse
    #[error("Malformed manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    /// Corpus artifact failure
    #[error(transparent)]
    Corpus(#[from] CorpusError),

    /// Index reconstruction failure
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Artifact written by an unsupported schema version
    #[error("Incompatible artifact schema: found v{found}, supported v{expected}")]
    Incompatible { found: u32, expected: u32 },

    /// Artifacts that disagree on shape; the set must be rebuilt
    #[error("Artifacts disagree: {0}")]
    Misaligned(String),
}

/// Result type for artifact operations.
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Build metadata persisted beside the matrices.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexManifest {
    /// Artifact schema version
    pub schema_version: u32,

    /// Embedding model the vectors were produced with
    pub model_name: String,

    /// Vector width of both matrices
    pub dimension: usize,

    /// Row count of both matrices and the corpus
    pub record_count: usize,

    /// Build time, seconds since the Unix epoch
    pub created_at: u64,
}

impl IndexManifest {
    /// Whether this crate can load artifacts with this manifest.
    pub fn is_compatible(&self) -> bool {
        self.schema_version == CURRENT_SCHEMA_VERSION
    }
}

/// Persist a completed build into `dir`.
///
/// # Errors
/// Returns `SnapshotError::Io` on filesystem failures or
/// `SnapshotError::Manifest` if the manifest cannot be serialized.
pub fn save(build: &IndexBuild, dir: &Path) -> SnapshotResult<()> {
    fs::create_dir_all(dir)?;

    let snapshot = &build.snapshot;
    snapshot.corpus.save(&dir.join(CORPUS_FILE))?;
    write_matrix(&dir.join(INDEX_FILE), snapshot.index.rows())?;
    write_matrix(&dir.join(EMBEDDINGS_FILE), &build.embeddings)?;

    let manifest = IndexManifest {
        schema_version: CURRENT_SCHEMA_VERSION,
        model_name: snapshot.config.model_name.clone(),
        dimension: snapshot.config.dimension,
        record_count: snapshot.corpus.len(),
        created_at: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
    };
    let manifest_path = dir.join(MANIFEST_FILE);
    let tmp = tmp_path(&manifest_path);
    fs::write(&tmp, serde_json::to_vec_pretty(&manifest)?)?;
    fs::rename(&tmp, &manifest_path)?;

    info!(
        records = manifest.record_count,
        dimension = manifest.dimension,
        dir = %dir.display(),
        "index artifacts written"
    );
    Ok(())
}

/// Load the manifest alone.
///
/// Used to discover the embedding model before constructing a provider.
///
/// # Errors
/// Returns `SnapshotError::Io` if the manifest is missing,
/// `SnapshotError::Manifest` if it does not parse, or
/// `SnapshotError::Incompatible` for an unsupported schema version.
pub fn load_manifest(dir: &Path) -> SnapshotResult<IndexManifest> {
    let raw = fs::read_to_string(dir.join(MANIFEST_FILE))?;
    let manifest: IndexManifest = serde_json::from_str(&raw)?;
    if !manifest.is_compatible() {
        return Err(SnapshotError::Incompatible {
            found: manifest.schema_version,
            expected: CURRENT_SCHEMA_VERSION,
        });
    }
    Ok(manifest)
}

/// Load the full artifact set as a serving snapshot.
///
/// All four files are read and validated as one unit; any disagreement in
/// counts or dimensions fails the load. The alignment table is derived here
/// from the aligned corpus — this loader and the builder are the only
/// places that construction is allowed to happen.
///
/// # Errors
/// Returns `SnapshotError::Misaligned` if the artifacts disagree on shape,
/// plus the manifest/corpus/io errors of the individual files.
pub fn load(dir: &Path) -> SnapshotResult<Snapshot> {
    let manifest = load_manifest(dir)?;
    let corpus = Corpus::load(&dir.join(CORPUS_FILE))?;
    if corpus.len() != manifest.record_count {
        return Err(SnapshotError::Misaligned(format!(
            "corpus has {} records, manifest says {}",
            corpus.len(),
            manifest.record_count
        )));
    }

    let rows = read_matrix(
        &dir.join(INDEX_FILE),
        manifest.record_count,
        manifest.dimension,
    )?;
    verify_matrix_size(
        &dir.join(EMBEDDINGS_FILE),
        manifest.record_count,
        manifest.dimension,
    )?;

    let index = VectorIndex::from_normalized(manifest.dimension, rows)?;
    let alignment = AlignmentTable::new(corpus.records().iter().map(|r| r.id.clone()).collect());
    let config = EmbeddingConfig {
        model_name: manifest.model_name.clone(),
        dimension: manifest.dimension,
    };

    debug!(
        records = corpus.len(),
        dimension = manifest.dimension,
        dir = %dir.display(),
        "index artifacts loaded"
    );
    Ok(Snapshot {
        index,
        alignment,
        corpus,
        config,
    })
}

/// Load the raw (pre-normalization) embedding matrix.
///
/// For rebuild and debugging workflows that want provider output without
/// re-embedding the corpus.
///
/// # Errors
/// Same validation as [`load`], restricted to the manifest and the raw
/// matrix.
pub fn load_raw_embeddings(dir: &Path) -> SnapshotResult<Vec<Vec<f32>>> {
    let manifest = load_manifest(dir)?;
    read_matrix(
        &dir.join(EMBEDDINGS_FILE),
        manifest.record_count,
        manifest.dimension,
    )
}

fn tmp_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    path.with_file_name(format!("{}.tmp", file_name))
}

fn write_matrix(path: &Path, rows: &[Vec<f32>]) -> SnapshotResult<()> {
    let tmp = tmp_path(path);
    {
        let file = fs::File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        for row in rows {
            for value in row {
                writer.write_all(&value.to_le_bytes())?;
            }
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_matrix(path: &Path, count: usize, dimension: usize) -> SnapshotResult<Vec<Vec<f32>>> {
    let bytes = fs::read(path)?;
    check_matrix_len(path, bytes.len() as u64, count, dimension)?;
    if dimension == 0 {
        // A zero-width manifest never comes out of a build; refuse it
        // rather than reconstruct rows no query could ever match.
        return Err(SnapshotError::Misaligned(format!(
            "{} declared with zero dimension",
            path.display()
        )));
    }

    let mut rows = Vec::with_capacity(count);
    for row_bytes in bytes.chunks(dimension * 4) {
        let row: Vec<f32> = row_bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

fn verify_matrix_size(path: &Path, count: usize, dimension: usize) -> SnapshotResult<()> {
    let len = fs::metadata(path)?.len();
    check_matrix_len(path, len, count, dimension)
}

fn check_matrix_len(
    path: &Path,
    actual: u64,
    count: usize,
    dimension: usize,
) -> SnapshotResult<()> {
    let expected = (count as u64) * (dimension as u64) * 4;
    if actual != expected {
        return Err(SnapshotError::Misaligned(format!(
            "{} holds {} bytes, expected {} ({} rows x {} dims)",
            path.display(),
            actual,
            expected,
            count,
            dimension
        )));
    }
    Ok(())
}
