//! Abstract Search - semantic retrieval over scholarly abstracts.
//!
//! This library provides the core functionality for the abstract search
//! system: it merges enriched metadata batches into a deduplicated record
//! store, builds a dense vector index over the abstracts, and serves
//! filtered top-k similarity queries from an atomically swapped snapshot.
//!
//! # Architecture
//!
//! The system is organized into several key modules:
//!
//! - **models**: Core data structures (Record, SearchHit, etc.) and
//!   per-record validation
//! - **corpus**: The durable record store (JSONL) and the merge/dedup phase
//! - **embedding**: Text embedding generation and normalization (local
//!   fastembed models or an OpenAI-compatible API)
//! - **index**: Flat vector index, alignment table, snapshot construction
//!   and the on-disk artifact set
//! - **query**: Filtered search execution and ranking
//! - **provider**: Record sources for the ingest pipeline
//!
//! # Workflow
//!
//! ## Offline Ingestion
//!
//! 1. Read enriched record batches from JSONL files
//! 2. Validate each record, skipping and counting the unusable ones
//! 3. Merge into the corpus, replacing earlier records that share an id
//! 4. Rewrite the corpus file atomically
//!
//! ## Index Build
//!
//! 1. Load the corpus and verify id uniqueness
//! 2. Embed every abstract in store order, in provider-sized batches
//! 3. Build the normalized index and its alignment table
//! 4. Write manifest, index, raw embeddings, and corpus as one artifact set
//!
//! ## Online Search
//!
//! 1. Normalize and embed the query text
//! 2. Scan the current snapshot's index for an over-fetched candidate pool
//! 3. Resolve candidates through the alignment table, dropping stale ids
//! 4. Apply the structured filter and return the top-k survivors
//!
//! # Example
//!
//! ```ignore
//! use std::path::Path;
//!
//! use abstract_search::{
//!     embedding::fastembed::FastEmbedProvider,
//!     index::{self, SnapshotHandle},
//!     query::{SearchEngine, SearchQuery, SnapshotSearchEngine},
//!     corpus::Corpus,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Build a snapshot from the corpus
//!     let corpus = Corpus::load(Path::new("corpus.jsonl"))?;
//!     let provider = FastEmbedProvider::with_defaults()?;
//!     let build = index::build(corpus, &provider, 32).await?;
//!
//!     // Install it and search
//!     let handle = SnapshotHandle::with_snapshot(build.snapshot);
//!     let engine = SnapshotSearchEngine::new(provider, handle);
//!     let request = SearchQuery::new("contrastive sentence embeddings");
//!     for hit in engine.search(&request).await? {
//!         println!("{}: {:.3}", hit.record.title, hit.score);
//!     }
//!
//!     Ok(())
//! }
//! ```

// Public modules
pub mod corpus;
pub mod embedding;
pub mod index;
pub mod models;
pub mod provider;
pub mod query;

// Re-export commonly used types at the crate root
pub use corpus::merge::{merge, MergeReport};
pub use corpus::Corpus;
pub use embedding::EmbeddingProvider;
pub use index::{build, AlignmentTable, Snapshot, SnapshotHandle, VectorIndex};
pub use models::{EmbeddingConfig, Record, SearchHit};
pub use provider::{JsonlRecordSource, RecordSource};
pub use query::{RecordFilter, SearchEngine, SearchQuery, SnapshotSearchEngine, YearRange};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model name
pub const DEFAULT_EMBEDDING_MODEL: &str = "multilingual-e5-small";

/// Default embedding dimension for multilingual-e5-small
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;

/// Default number of abstracts embedded per provider call
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Default number of search results
pub const DEFAULT_TOP_K: usize = 10;
