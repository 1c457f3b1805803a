//! FastEmbed embedding provider implementation.
//!
//! Runs embedding models locally through the fastembed library, so corpus
//! builds and query embedding work offline once the model files are cached.
//!
//! The default model is multilingual-e5-small: the corpus mixes languages
//! (the `language` field is detected upstream, not enforced), so a
//! multilingual model keeps cross-language abstracts comparable.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::Mutex;

use super::{EmbeddingError, EmbeddingProvider, EmbeddingResult};

/// Local embedding provider backed by fastembed.
///
/// The underlying `TextEmbedding` session is not `Sync`, so it lives behind
/// a tokio `Mutex`; embedding requests serialize on the model while callers
/// stay async.
#[derive(Clone)]
pub struct FastEmbedProvider {
    /// The embedding model instance (wrapped in Arc<Mutex> for thread-safety)
    model: Arc<Mutex<TextEmbedding>>,

    /// Model identifier, stable across runs (used in the index manifest)
    model_name: String,

    /// Expected dimension of the embedding vectors
    embedding_dimension: usize,
}

/// Resolve a model identifier string to a fastembed model.
///
/// Accepts the canonical short names used by the CLI and the manifest
/// (`multilingual-e5-small`), the Hugging Face repo form
/// (`intfloat/multilingual-e5-small`), and the enum debug form
/// (`MultilingualE5Small`). Comparison ignores case and separators.
pub fn parse_model_name(name: &str) -> Option<EmbeddingModel> {
    let key: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase();
    let key = key
        .strip_prefix("intfloat")
        .or_else(|| key.strip_prefix("baai"))
        .or_else(|| key.strip_prefix("sentencetransformers"))
        .unwrap_or(&key);
    match key {
        "multilinguale5small" => Some(EmbeddingModel::MultilingualE5Small),
        "multilinguale5base" => Some(EmbeddingModel::MultilingualE5Base),
        "multilinguale5large" => Some(EmbeddingModel::MultilingualE5Large),
        "allminilml6v2" => Some(EmbeddingModel::AllMiniLML6V2),
        "bgesmallenv15" => Some(EmbeddingModel::BGESmallENV15),
        "bgebaseenv15" => Some(EmbeddingModel::BGEBaseENV15),
        "bgelargeenv15" => Some(EmbeddingModel::BGELargeENV15),
        "nomicembedtextv1" => Some(EmbeddingModel::NomicEmbedTextV1),
        "nomicembedtextv15" => Some(EmbeddingModel::NomicEmbedTextV15),
        "paraphrasemlminilml12v2" => Some(EmbeddingModel::ParaphraseMLMiniLML12V2),
        "paraphrasemlmpnetbasev2" => Some(EmbeddingModel::ParaphraseMLMpnetBaseV2),
        _ => None,
    }
}

/// Canonical identifier persisted for a fastembed model.
pub fn canonical_model_name(model: &EmbeddingModel) -> &'static str {
    match model {
        EmbeddingModel::MultilingualE5Small => "multilingual-e5-small",
        EmbeddingModel::MultilingualE5Base => "multilingual-e5-base",
        EmbeddingModel::MultilingualE5Large => "multilingual-e5-large",
        EmbeddingModel::AllMiniLML6V2 => "all-minilm-l6-v2",
        EmbeddingModel::BGESmallENV15 => "bge-small-en-v1.5",
        EmbeddingModel::BGEBaseENV15 => "bge-base-en-v1.5",
        EmbeddingModel::BGELargeENV15 => "bge-large-en-v1.5",
        EmbeddingModel::NomicEmbedTextV1 => "nomic-embed-text-v1",
        EmbeddingModel::NomicEmbedTextV15 => "nomic-embed-text-v1.5",
        EmbeddingModel::ParaphraseMLMiniLML12V2 => "paraphrase-multilingual-minilm-l12-v2",
        EmbeddingModel::ParaphraseMLMpnetBaseV2 => "paraphrase-multilingual-mpnet-base-v2",
        _ => "unknown",
    }
}

/// Vector width for a fastembed model.
pub fn model_dimension(model: &EmbeddingModel) -> usize {
    match model {
        EmbeddingModel::MultilingualE5Small => 384,
        EmbeddingModel::MultilingualE5Base => 768,
        EmbeddingModel::MultilingualE5Large => 1024,
        EmbeddingModel::AllMiniLML6V2 => 384,
        EmbeddingModel::BGESmallENV15 => 384,
        EmbeddingModel::BGEBaseENV15 => 768,
        EmbeddingModel::BGELargeENV15 => 1024,
        EmbeddingModel::NomicEmbedTextV1 => 768,
        EmbeddingModel::NomicEmbedTextV15 => 768,
        EmbeddingModel::ParaphraseMLMiniLML12V2 => 384,
        EmbeddingModel::ParaphraseMLMpnetBaseV2 => 768,
        _ => 384,
    }
}

impl FastEmbedProvider {
    /// Create a provider for the given model.
    ///
    /// # Arguments
    /// * `model` - fastembed model to load
    /// * `cache_dir` - Optional cache directory for model files; defaults to
    ///   `<user cache dir>/abstract-search/models`
    ///
    /// # Errors
    /// Returns `EmbeddingError::ConfigError` if model initialization fails
    pub fn new(model: EmbeddingModel, cache_dir: Option<PathBuf>) -> EmbeddingResult<Self> {
        let model_name = canonical_model_name(&model).to_string();
        let embedding_dimension = model_dimension(&model);

        let cache_dir = cache_dir.or_else(default_cache_dir);
        let mut init_options = InitOptions::new(model);
        if let Some(dir) = cache_dir {
            init_options = init_options.with_cache_dir(dir);
        }

        let text_embedding = TextEmbedding::try_new(init_options).map_err(|e| {
            EmbeddingError::ConfigError(format!("Failed to initialize fastembed model: {}", e))
        })?;

        Ok(Self {
            model: Arc::new(Mutex::new(text_embedding)),
            model_name,
            embedding_dimension,
        })
    }

    /// Create a provider by model identifier string.
    ///
    /// This is the path used when reconstructing the provider recorded in an
    /// index manifest.
    ///
    /// # Errors
    /// Returns `EmbeddingError::ConfigError` for unrecognized identifiers or
    /// failed initialization
    pub fn from_model_name(name: &str, cache_dir: Option<PathBuf>) -> EmbeddingResult<Self> {
        let model = parse_model_name(name).ok_or_else(|| {
            EmbeddingError::ConfigError(format!("Unknown fastembed model: {}", name))
        })?;
        Self::new(model, cache_dir)
    }

    /// Create a provider with the default model (multilingual-e5-small).
    ///
    /// # Errors
    /// Returns `EmbeddingError::ConfigError` if model initialization fails
    pub fn with_defaults() -> EmbeddingResult<Self> {
        Self::new(EmbeddingModel::MultilingualE5Small, None)
    }
}

fn default_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join("abstract-search").join("models"))
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput(
                "Text cannot be empty".to_string(),
            ));
        }

        let mut model = self.model.lock().await;
        let embeddings = model
            .embed(vec![text.to_string()], None)
            .map_err(|e| EmbeddingError::Other(format!("Embedding generation failed: {}", e)))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Other("No embedding generated".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        for text in texts {
            if text.trim().is_empty() {
                return Err(EmbeddingError::InvalidInput(
                    "All texts must be non-empty".to_string(),
                ));
            }
        }

        let mut model = self.model.lock().await;
        let text_strings: Vec<String> = texts.iter().map(|&s| s.to_string()).collect();
        let embeddings = model.embed(text_strings, None).map_err(|e| {
            EmbeddingError::Other(format!("Batch embedding generation failed: {}", e))
        })?;

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.embedding_dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

// TextEmbedding does not implement Debug, so derive is not an option.
impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("model_name", &self.model_name)
            .field("embedding_dimension", &self.embedding_dimension)
            .finish()
    }
}
