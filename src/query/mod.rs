//! Query engine: filtered similarity search over a snapshot.
//!
//! The core contract is [`query`]: given the index, its alignment table,
//! and the corpus they were built from, rank the nearest records to a
//! query vector, apply the structured filter, and return at most `k` hits.
//! Because filtering happens after the vector scan, the engine over-fetches
//! candidates before filtering; `max(k * 10, 100)` has proven a comfortable
//! pool for the filter selectivities this corpus sees.
//!
//! [`SearchEngine`] wraps the same contract for free-text callers: it
//! normalizes and embeds the query through the configured provider, then
//! delegates to [`query`] against the currently installed snapshot.
//!
//! # Usage
//!
//! ```rust,no_run
//! use abstract_search::embedding::fastembed::FastEmbedProvider;
//! use abstract_search::index::SnapshotHandle;
//! use abstract_search::query::{SearchEngine, SearchQuery, SnapshotSearchEngine};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = FastEmbedProvider::with_defaults()?;
//! let handle = SnapshotHandle::new();
//! let engine = SnapshotSearchEngine::new(provider, handle);
//!
//! let request = SearchQuery::new("contrastive sentence embeddings").with_k(5);
//! for hit in engine.search(&request).await? {
//!     println!("{:.3}  {}", hit.score, hit.record.title);
//! }
//! # Ok(())
//! # }
//! ```

use std::cmp::Ordering;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::corpus::Corpus;
use crate::embedding::{normalize_text, EmbeddingError, EmbeddingProvider};
use crate::index::{AlignmentTable, SnapshotHandle, VectorIndex};
use crate::models::{Record, SearchHit};

/// Errors that can occur during query processing.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Malformed query parameters (zero `k`, blank query text)
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Query vector width disagrees with the index
    #[error("Dimension mismatch: query has {actual} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Query text embedding failed
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
}

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Publication year range, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearRange {
    /// Start year (inclusive)
    pub start: i32,

    /// End year (inclusive)
    pub end: i32,
}

impl YearRange {
    /// Create a new year range.
    pub fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    /// Check whether a year falls within this range.
    pub fn contains(&self, year: i32) -> bool {
        year >= self.start && year <= self.end
    }
}

/// Structured filter over record metadata.
///
/// Clauses combine conjunctively; within a list clause, matching any listed
/// value suffices and an empty list constrains nothing. Values compare by
/// exact string equality. A record with an unknown year passes any year
/// range: upstream publication dates are patchy enough that dropping
/// unknown-year records from every year-filtered query would hide real
/// results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    /// Keep records with any of these authors
    pub authors: Vec<String>,

    /// Keep records with any of these categories
    pub categories: Vec<String>,

    /// Keep records with any of these affiliations
    pub affiliations: Vec<String>,

    /// Keep records with exactly this language code
    pub language: Option<String>,

    /// Keep records published within this range
    pub years: Option<YearRange>,
}

impl RecordFilter {
    /// Whether the filter constrains anything at all.
    pub fn is_empty(&self) -> bool {
        self.authors.is_empty()
            && self.categories.is_empty()
            && self.affiliations.is_empty()
            && self.language.is_none()
            && self.years.is_none()
    }

    /// Whether a record satisfies every clause.
    pub fn matches(&self, record: &Record) -> bool {
        if !self.authors.is_empty() && !contains_any(record.authors.iter(), &self.authors) {
            return false;
        }
        if !self.categories.is_empty() && !contains_any(record.categories.iter(), &self.categories)
        {
            return false;
        }
        if !self.affiliations.is_empty()
            && !contains_any(record.affiliations.iter(), &self.affiliations)
        {
            return false;
        }
        if let Some(language) = &self.language {
            if record.language != *language {
                return false;
            }
        }
        if let (Some(range), Some(year)) = (self.years, record.year) {
            if !range.contains(year) {
                return false;
            }
        }
        true
    }
}

fn contains_any<'a>(values: impl IntoIterator<Item = &'a String>, wanted: &[String]) -> bool {
    values.into_iter().any(|v| wanted.iter().any(|w| w == v))
}

/// A free-text search request.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// Query text, normalized and embedded by the engine's provider
    pub text: String,

    /// Maximum number of results to return
    pub k: usize,

    /// Structured filter applied after the vector scan
    pub filter: RecordFilter,

    /// Drop candidates scoring below this floor, if set
    pub min_score: Option<f32>,
}

impl SearchQuery {
    /// Create a query with the default result count and no filter.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            k: crate::DEFAULT_TOP_K,
            filter: RecordFilter::default(),
            min_score: None,
        }
    }

    /// Set the maximum number of results.
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    /// Set the structured filter.
    pub fn with_filter(mut self, filter: RecordFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Set a similarity floor.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }
}

/// Rank the nearest records to a query vector, post-filtered and truncated.
///
/// Candidate positions come from the index, resolve to ids through the
/// alignment table, and to records through the corpus. An aligned id that is
/// no longer in the corpus is a stale reference from a not-yet-rebuilt
/// index: it is excluded silently and counted in a debug log, never treated
/// as an error. Survivors are ordered by similarity descending, then
/// original index rank, then id ascending; the result holds at most `k`
/// hits, and fewer survivors than `k` is a normal outcome. An empty index
/// yields an empty result for any `k`.
///
/// # Errors
/// Returns `QueryError::InvalidQuery` if `k` is zero, or
/// `QueryError::DimensionMismatch` if the vector width disagrees with the
/// index
pub fn query(
    index: &VectorIndex,
    alignment: &AlignmentTable,
    corpus: &Corpus,
    query_vector: &[f32],
    k: usize,
    filter: &RecordFilter,
    min_score: Option<f32>,
) -> QueryResult<Vec<SearchHit>> {
    if k == 0 {
        return Err(QueryError::InvalidQuery(
            "result count must be positive".to_string(),
        ));
    }
    if query_vector.len() != index.dimension() {
        return Err(QueryError::DimensionMismatch {
            expected: index.dimension(),
            actual: query_vector.len(),
        });
    }
    if index.is_empty() {
        return Ok(Vec::new());
    }

    let pool = candidate_pool(k, index.len());
    let matches = index.ranked_matches(query_vector, pool);

    struct Candidate<'a> {
        rank: usize,
        id: &'a str,
        record: &'a Record,
        score: f32,
    }

    let mut stale = 0usize;
    let mut survivors: Vec<Candidate> = Vec::new();
    for (rank, m) in matches.iter().enumerate() {
        let id = match alignment.id_at(m.position) {
            Some(id) => id,
            None => {
                stale += 1;
                continue;
            }
        };
        let record = match corpus.get(id) {
            Some(record) => record,
            None => {
                stale += 1;
                continue;
            }
        };
        if let Some(floor) = min_score {
            if m.score < floor {
                continue;
            }
        }
        if !filter.matches(record) {
            continue;
        }
        survivors.push(Candidate {
            rank,
            id,
            record,
            score: m.score,
        });
    }

    if stale > 0 {
        debug!(stale, "excluded stale index references from results");
    }

    // Candidates arrive rank-ordered already; the comparator restates the
    // full ordering so equal scores stay deterministic.
    survivors.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then(a.rank.cmp(&b.rank))
            .then(a.id.cmp(b.id))
    });
    survivors.truncate(k);

    Ok(survivors
        .into_iter()
        .map(|c| SearchHit::new(c.record.clone(), c.score))
        .collect())
}

/// Over-fetch size for post-filtered scans, clamped to the index length.
fn candidate_pool(k: usize, index_len: usize) -> usize {
    k.saturating_mul(10).max(100).min(index_len)
}

/// Trait for search engines.
///
/// The single entry point serving layers call. Implementations own how the
/// query text becomes a vector and which snapshot it runs against.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Execute a free-text search and return ranked results.
    ///
    /// # Errors
    /// Returns `QueryError` for malformed requests or embedding failures
    async fn search(&self, request: &SearchQuery) -> QueryResult<Vec<SearchHit>>;
}

/// Search engine over an installed snapshot.
///
/// Embeds query text with the same provider family the index was built with
/// and serves from whatever snapshot the handle currently holds. A handle
/// with nothing installed behaves as an empty index.
#[derive(Debug, Clone)]
pub struct SnapshotSearchEngine<E: EmbeddingProvider> {
    /// Embedding provider for query text
    provider: E,

    /// Shared handle to the serving snapshot
    handle: SnapshotHandle,
}

impl<E: EmbeddingProvider> SnapshotSearchEngine<E> {
    /// Create an engine over a provider and a snapshot handle.
    pub fn new(provider: E, handle: SnapshotHandle) -> Self {
        Self { provider, handle }
    }

    /// The snapshot handle this engine serves from.
    pub fn handle(&self) -> &SnapshotHandle {
        &self.handle
    }
}

#[async_trait]
impl<E: EmbeddingProvider> SearchEngine for SnapshotSearchEngine<E> {
    async fn search(&self, request: &SearchQuery) -> QueryResult<Vec<SearchHit>> {
        if request.text.trim().is_empty() {
            return Err(QueryError::InvalidQuery(
                "query text must not be empty".to_string(),
            ));
        }
        if request.k == 0 {
            return Err(QueryError::InvalidQuery(
                "result count must be positive".to_string(),
            ));
        }

        let snapshot = match self.handle.current() {
            Some(snapshot) => snapshot,
            None => {
                debug!("no snapshot installed, returning empty result");
                return Ok(Vec::new());
            }
        };

        let normalized = normalize_text(&request.text);
        let vector = self.provider.embed(&normalized).await?;

        query(
            &snapshot.index,
            &snapshot.alignment,
            &snapshot.corpus,
            &vector,
            request.k,
            &request.filter,
            request.min_score,
        )
    }
}
