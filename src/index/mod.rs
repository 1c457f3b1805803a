//! Vector index construction and the serving snapshot.
//!
//! The index is a flat inner-product index over L2-normalized vectors, so
//! a dot product is exactly cosine similarity. Every build is a full
//! rebuild: records are embedded in corpus order and the id sequence is
//! recorded as the alignment table, which is the only sanctioned mapping
//! from index positions back to records. Index, alignment table, and the
//! corpus they were built from travel together as one immutable
//! [`Snapshot`], swapped by reference so concurrent readers are never
//! exposed to a half-updated pair.

pub mod artifacts;

use std::cmp::Ordering;
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::{debug, info};

use crate::corpus::Corpus;
use crate::embedding::{normalize_text, EmbeddingError, EmbeddingProvider};
use crate::models::EmbeddingConfig;

/// Errors that can occur while building or searching the index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The embedding provider failed; the whole build is abandoned
    #[error("Embedding provider failed: {0}")]
    Provider(#[from] EmbeddingError),

    /// A vector's width disagrees with the index dimension
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The provider returned the wrong number of vectors for a batch
    #[error("Provider returned {actual} vectors for {expected} texts")]
    BatchShape { expected: usize, actual: usize },
}

/// Result type for index operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// One ranked position out of the index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexMatch {
    /// Row position in the index (and in the alignment table)
    pub position: usize,

    /// Cosine similarity against the query vector
    pub score: f32,
}

/// Flat nearest-neighbor index over L2-normalized vectors.
///
/// Exact brute-force scoring: every query computes a dot product against
/// every row. At corpus scale (tens of thousands of abstracts) this stays
/// comfortably fast and sidesteps approximate-index recall tuning.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    /// Width every row must have
    dimension: usize,

    /// Normalized vectors, one row per record, in corpus order
    rows: Vec<Vec<f32>>,
}

impl VectorIndex {
    /// Build an index from raw vectors, normalizing each row.
    ///
    /// # Errors
    /// Returns `IndexError::DimensionMismatch` if any row's width disagrees
    /// with `dimension`.
    pub fn from_vectors(dimension: usize, mut rows: Vec<Vec<f32>>) -> IndexResult<Self> {
        for row in &mut rows {
            if row.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: dimension,
                    actual: row.len(),
                });
            }
            l2_normalize(row);
        }
        Ok(Self { dimension, rows })
    }

    /// Reassemble an index from rows that are already normalized.
    ///
    /// Used by the artifact loader, which persists the normalized matrix
    /// verbatim; re-normalizing on load would perturb stored scores.
    pub(crate) fn from_normalized(dimension: usize, rows: Vec<Vec<f32>>) -> IndexResult<Self> {
        for row in &rows {
            if row.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: dimension,
                    actual: row.len(),
                });
            }
        }
        Ok(Self { dimension, rows })
    }

    /// Number of indexed vectors.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the index holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Configured vector width.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Normalized rows in position order.
    pub(crate) fn rows(&self) -> &[Vec<f32>] {
        &self.rows
    }

    /// Rank the `k` nearest rows to the query vector.
    ///
    /// The query is normalized before scoring, so callers can pass raw
    /// provider output. Ordering is similarity descending with ascending
    /// position as the tie-break, which keeps equal-score results stable
    /// across runs. An empty index returns an empty list.
    ///
    /// # Errors
    /// Returns `IndexError::DimensionMismatch` if the query width disagrees
    /// with the index dimension.
    pub fn search(&self, query: &[f32], k: usize) -> IndexResult<Vec<IndexMatch>> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        Ok(self.ranked_matches(query, k))
    }

    /// Scan without the dimension check, for callers that validated already.
    pub(crate) fn ranked_matches(&self, query: &[f32], k: usize) -> Vec<IndexMatch> {
        debug_assert_eq!(query.len(), self.dimension);
        if self.rows.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut normalized = query.to_vec();
        l2_normalize(&mut normalized);

        let mut matches: Vec<IndexMatch> = self
            .rows
            .iter()
            .enumerate()
            .map(|(position, row)| IndexMatch {
                position,
                score: dot(&normalized, row),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.position.cmp(&b.position))
        });
        matches.truncate(k);
        matches
    }
}

/// Positional mapping from index row to record id.
///
/// Owned by the build pipeline: it is only ever created together with the
/// index it describes and never mutated afterwards. Consumers resolve
/// positions through it instead of assuming the corpus order matches the
/// index order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlignmentTable {
    ids: Vec<String>,
}

impl AlignmentTable {
    pub(crate) fn new(ids: Vec<String>) -> Self {
        Self { ids }
    }

    /// Number of aligned positions.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Record id at an index position.
    pub fn id_at(&self, position: usize) -> Option<&str> {
        self.ids.get(position).map(String::as_str)
    }

    /// All ids in position order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }
}

/// The immutable unit served to queries.
///
/// Index, alignment table, and corpus are built together and replaced
/// together; handing any of the three out separately is how positional
/// desynchronization bugs start folding stale metadata into results.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Flat vector index over the corpus
    pub index: VectorIndex,

    /// Position-to-id mapping for `index`
    pub alignment: AlignmentTable,

    /// The corpus the index was built from
    pub corpus: Corpus,

    /// Model identity the vectors were produced with
    pub config: EmbeddingConfig,
}

/// Shared handle that swaps whole snapshots atomically.
///
/// Readers clone out an `Arc<Snapshot>` and keep serving from it for as
/// long as they like; `install` replaces the reference in one motion, so
/// no reader ever observes an index from one build and a corpus from
/// another.
#[derive(Debug, Clone, Default)]
pub struct SnapshotHandle {
    inner: Arc<RwLock<Option<Arc<Snapshot>>>>,
}

impl SnapshotHandle {
    /// Create a handle with no snapshot installed yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a handle serving the given snapshot.
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        let handle = Self::new();
        handle.install(snapshot);
        handle
    }

    /// The currently installed snapshot, if any.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        // Snapshots are immutable once installed, so even a lock poisoned by
        // a panicking writer still guards a coherent value.
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        guard.clone()
    }

    /// Atomically replace the served snapshot.
    pub fn install(&self, snapshot: Snapshot) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(Arc::new(snapshot));
    }
}

/// Everything a completed build produces.
///
/// The snapshot is what serving needs; the raw embedding matrix (provider
/// output before normalization) is kept so artifacts can be persisted for
/// rebuild and debugging without re-embedding the corpus.
#[derive(Debug, Clone)]
pub struct IndexBuild {
    /// The serving unit
    pub snapshot: Snapshot,

    /// Raw provider vectors in corpus order
    pub embeddings: Vec<Vec<f32>>,
}

/// Embed the corpus and build a fresh snapshot.
///
/// Always a full rebuild: abstracts are normalized and embedded in corpus
/// order, `batch_size` texts per provider call, and the id sequence becomes
/// the alignment table. Any provider failure, batch shape drift, or
/// dimension drift abandons the build with no partial output — the caller's
/// previously installed snapshot stays authoritative.
///
/// # Errors
/// Returns `IndexError::Provider` if embedding fails,
/// `IndexError::BatchShape` if the provider returns the wrong vector count,
/// or `IndexError::DimensionMismatch` if a vector's width drifts.
pub async fn build<P>(corpus: Corpus, provider: &P, batch_size: usize) -> IndexResult<IndexBuild>
where
    P: EmbeddingProvider + ?Sized,
{
    let dimension = provider.dimension();
    let batch_size = batch_size.max(1);

    let mut embeddings: Vec<Vec<f32>> = Vec::with_capacity(corpus.len());
    for chunk in corpus.records().chunks(batch_size) {
        let texts: Vec<String> = chunk
            .iter()
            .map(|r| normalize_text(&r.abstract_text))
            .collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();

        let vectors = provider.embed_batch(&refs).await?;
        if vectors.len() != refs.len() {
            return Err(IndexError::BatchShape {
                expected: refs.len(),
                actual: vectors.len(),
            });
        }
        for vector in &vectors {
            if vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
        }

        embeddings.extend(vectors);
        debug!(embedded = embeddings.len(), total = corpus.len(), "build progress");
    }

    let index = VectorIndex::from_vectors(dimension, embeddings.clone())?;
    let alignment = AlignmentTable::new(corpus.records().iter().map(|r| r.id.clone()).collect());
    let config = EmbeddingConfig {
        model_name: provider.model_name().to_string(),
        dimension,
    };

    info!(
        records = corpus.len(),
        dimension,
        model = %config.model_name,
        "index build complete"
    );

    Ok(IndexBuild {
        snapshot: Snapshot {
            index,
            alignment,
            corpus,
            config,
        },
        embeddings,
    })
}

fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
