//! Core data models for the abstract search system.
//!
//! This module contains the fundamental data structures used across the application:
//! canonical record metadata, boundary validation, and search results.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a record is rejected at the merge boundary.
///
/// Rejection is always a skip, never a failure: the offending record is
/// counted and logged while the rest of the batch proceeds.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The record carries no identifier (missing or blank).
    #[error("missing id")]
    MissingId,

    /// The record's abstract is empty or whitespace-only.
    #[error("empty abstract")]
    EmptyAbstract,
}

/// Canonical metadata for one document.
///
/// This is the unit stored in the corpus, embedded for similarity search,
/// and returned in query results. Records arrive from the enrichment stage
/// as self-describing JSON objects, one per line; optional and collection
/// fields default when absent so sparse upstream output still parses, and
/// validation decides what is actually usable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    /// Stable external identifier, unique within one corpus. Dedup key.
    #[serde(default)]
    pub id: String,

    /// Document title (display only, not embedded)
    #[serde(default)]
    pub title: String,

    /// Abstract text; the field that gets embedded
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,

    /// Enrichment-produced summary, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Enrichment-produced keywords, in extraction order
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Author names in publication order
    #[serde(default)]
    pub authors: Vec<String>,

    /// Subject categories (set semantics, serialized sorted)
    #[serde(default)]
    pub categories: BTreeSet<String>,

    /// Institutional affiliations; may be empty if enrichment found none
    #[serde(default)]
    pub affiliations: BTreeSet<String>,

    /// Language code, `"unknown"` when upstream detection failed
    #[serde(default)]
    pub language: String,

    /// Publication year; `None` means explicitly unknown
    #[serde(default)]
    pub year: Option<i32>,

    /// Link to the document PDF
    #[serde(default)]
    pub pdf_url: String,
}

impl Record {
    /// Check the invariants required before a record may enter the corpus.
    ///
    /// # Errors
    /// Returns the [`ValidationError`] reason code for a blank `id` or an
    /// empty `abstract`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::MissingId);
        }
        if self.abstract_text.trim().is_empty() {
            return Err(ValidationError::EmptyAbstract);
        }
        Ok(())
    }

    /// Normalize fields that are tolerated but not trusted as-is.
    ///
    /// A year outside the 4-digit range is demoted to unknown rather than
    /// rejected; an empty language code becomes `"unknown"` to match the
    /// enrichment stage's own fallback.
    pub fn sanitize(&mut self) {
        if let Some(year) = self.year {
            if !(1000..=9999).contains(&year) {
                self.year = None;
            }
        }
        if self.language.trim().is_empty() {
            self.language = "unknown".to_string();
        }
    }
}

/// A single search result pairing a record with its similarity score.
///
/// This is the primary output type of the query engine. Scores are cosine
/// similarities against the query vector; higher is better.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// The matched record
    pub record: Record,

    /// Cosine similarity between the query vector and this record's vector
    pub score: f32,
}

impl SearchHit {
    /// Create a search hit from a record and its similarity score.
    pub fn new(record: Record, score: f32) -> Self {
        Self { record, score }
    }
}

/// Configuration of the embedding model behind an index.
///
/// Stored in the index manifest so query-time embedding uses the same model
/// and dimension the index was built with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    /// Name/identifier of the embedding model (e.g., "BAAI/bge-small-en-v1.5")
    pub model_name: String,

    /// Dimension of the embedding vectors
    pub dimension: usize,
}
