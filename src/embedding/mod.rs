//! Embedding provider abstraction and implementations.
//!
//! This module defines the interface for turning abstract text (and query
//! text) into fixed-dimension vectors, with a local provider backed by
//! fastembed and a remote provider for OpenAI-compatible endpoints.
//!
//! The index builder and the query engine only see the trait, so the model
//! backing an index can change without touching either of them. The one
//! contract both rely on: a provider is deterministic for a given
//! model+text pair and always produces vectors of `dimension()` width.

pub mod fastembed;
pub mod openai;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Network or API communication error
    #[error("API request failed: {0}")]
    ApiError(String),

    /// Invalid input text (e.g., empty)
    #[error("Invalid input text: {0}")]
    InvalidInput(String),

    /// Configuration error (e.g., missing API key, unknown model)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Other unexpected errors
    #[error("Unexpected error: {0}")]
    Other(String),
}

/// Result type for embedding operations.
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Trait for text embedding providers.
///
/// Implementors generate vector embeddings from text. The trait is async to
/// support API-based providers; local providers simply resolve immediately.
///
/// # Example Usage
/// ```ignore
/// let provider = FastEmbedProvider::with_defaults()?;
/// let text = normalize_text("Attention is all you need");
/// let vector = provider.embed(&text).await?;
/// assert_eq!(vector.len(), provider.dimension());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for the given text.
    ///
    /// # Arguments
    /// * `text` - The input text to embed (should be pre-normalized)
    ///
    /// # Errors
    /// Returns `EmbeddingError` if the embedding generation fails
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;

    /// Generate embeddings for multiple texts in a single batch.
    ///
    /// More efficient than repeated `embed` calls for providers that support
    /// batch requests. The output order matches the input order.
    ///
    /// # Errors
    /// Returns `EmbeddingError` if any embedding generation fails
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>>;

    /// Dimension of the vectors produced by this provider.
    fn dimension(&self) -> usize;

    /// Model name/identifier for this provider.
    ///
    /// Persisted in the index manifest and used to reconstruct an equivalent
    /// provider at query time.
    fn model_name(&self) -> &str;
}

/// Normalizes text for consistent embedding generation.
///
/// Applied to abstracts at build time and to query text at search time, so
/// both sides of a similarity comparison see the same transformations:
/// - Converts to lowercase
/// - Trims leading/trailing whitespace
/// - Collapses runs of whitespace to a single space
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .trim()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("Hello World"), "hello world");
        assert_eq!(normalize_text("  Multiple   Spaces  "), "multiple spaces");
        assert_eq!(normalize_text("UPPERCASE"), "uppercase");
        assert_eq!(normalize_text("tabs\tand\nnewlines"), "tabs and newlines");
        assert_eq!(normalize_text("   "), "");
    }
}
