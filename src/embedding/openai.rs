//! OpenAI embedding provider implementation.
//!
//! Implements the `EmbeddingProvider` trait against the OpenAI embeddings
//! REST API (or any OpenAI-compatible endpoint via `with_base_url`).
//! Requests retry on rate limits and server errors with exponential backoff.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{EmbeddingError, EmbeddingProvider, EmbeddingResult};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "text-embedding-3-small";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_MAX_RETRIES: usize = 3;

/// OpenAI embedding provider.
///
/// Holds a configured HTTP client with the API key baked into the default
/// headers. Cloning shares the underlying connection pool.
#[derive(Debug, Clone)]
pub struct OpenAIEmbedding {
    /// HTTP client with auth headers installed
    client: reqwest::Client,

    /// Full embeddings endpoint URL
    endpoint: String,

    /// Model identifier (e.g., "text-embedding-3-small")
    model: String,

    /// Expected dimension of the embedding vectors
    embedding_dimension: usize,

    /// Retry budget for rate-limited or failed requests
    max_retries: usize,
}

impl OpenAIEmbedding {
    /// Create a new OpenAI embedding provider.
    ///
    /// # Arguments
    /// * `api_key` - OpenAI API key
    /// * `model` - Model name (defaults to "text-embedding-3-small" if None)
    ///
    /// # Errors
    /// Returns `EmbeddingError::ConfigError` for a blank key or a key that
    /// cannot form a valid header
    pub fn new(api_key: String, model: Option<String>) -> EmbeddingResult<Self> {
        if api_key.trim().is_empty() {
            return Err(EmbeddingError::ConfigError(
                "Missing OpenAI API key".to_string(),
            ));
        }

        let model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let embedding_dimension = openai_model_dimension(&model);

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        let auth_value = HeaderValue::from_str(&auth)
            .map_err(|_| EmbeddingError::ConfigError("Invalid OpenAI API key".to_string()))?;
        headers.insert(AUTHORIZATION, auth_value);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|e| {
                EmbeddingError::ConfigError(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", DEFAULT_BASE_URL),
            model,
            embedding_dimension,
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    /// Point the provider at an OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.endpoint = format!("{}/embeddings", base_url.trim_end_matches('/'));
        self
    }

    async fn request_embeddings(&self, inputs: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let mut attempt = 0usize;
        loop {
            let request = EmbeddingRequest {
                model: &self.model,
                input: inputs,
            };
            let response = self.client.post(&self.endpoint).json(&request).send().await;
            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let parsed: EmbeddingResponse = resp.json().await.map_err(|e| {
                            EmbeddingError::ApiError(format!(
                                "Failed to parse embedding response: {}",
                                e
                            ))
                        })?;
                        return extract_embeddings(parsed, inputs.len());
                    }

                    let body = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(EmbeddingError::ApiError(format!(
                        "Embeddings request failed ({}): {}",
                        status, body
                    )));
                }
                Err(err) => {
                    if is_retryable_error(&err) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(EmbeddingError::ApiError(err.to_string()));
                }
            }
        }
    }
}

/// Vector width for an OpenAI embedding model.
pub fn openai_model_dimension(model: &str) -> usize {
    match model {
        "text-embedding-3-small" => 1536,
        "text-embedding-3-large" => 3072,
        "text-embedding-ada-002" => 1536,
        _ => 1536,
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}

/// Order the response by input index and unwrap the vectors.
fn extract_embeddings(
    mut response: EmbeddingResponse,
    expected: usize,
) -> EmbeddingResult<Vec<Vec<f32>>> {
    response.data.sort_by_key(|entry| entry.index);
    if response.data.len() != expected {
        return Err(EmbeddingError::ApiError(format!(
            "API returned {} embeddings for {} inputs",
            response.data.len(),
            expected
        )));
    }
    Ok(response
        .data
        .into_iter()
        .map(|entry| entry.embedding)
        .collect())
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbedding {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput(
                "Text cannot be empty".to_string(),
            ));
        }
        let embeddings = self.request_embeddings(&[text]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::ApiError("Empty embedding response".to_string()))
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
        self.request_embeddings(texts).await
    }

    fn dimension(&self) -> usize {
        self.embedding_dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_dimensions() {
        assert_eq!(openai_model_dimension("text-embedding-3-small"), 1536);
        assert_eq!(openai_model_dimension("text-embedding-3-large"), 3072);
        assert_eq!(openai_model_dimension("text-embedding-ada-002"), 1536);
        assert_eq!(openai_model_dimension("future-model"), 1536);
    }

    #[test]
    fn test_new_rejects_blank_api_key() {
        let result = OpenAIEmbedding::new("   ".to_string(), None);
        assert!(matches!(result, Err(EmbeddingError::ConfigError(_))));
    }

    #[test]
    fn test_new_defaults_model() {
        let provider = OpenAIEmbedding::new("sk-test".to_string(), None).unwrap();
        assert_eq!(provider.model_name(), "text-embedding-3-small");
        assert_eq!(provider.dimension(), 1536);
    }

    #[test]
    fn test_with_base_url_strips_trailing_slash() {
        let provider = OpenAIEmbedding::new("sk-test".to_string(), None)
            .unwrap()
            .with_base_url("http://localhost:8080/v1/");
        assert_eq!(provider.endpoint, "http://localhost:8080/v1/embeddings");
    }

    #[test]
    fn test_extract_embeddings_sorts_by_index() {
        let response = EmbeddingResponse {
            data: vec![
                EmbeddingData {
                    embedding: vec![2.0],
                    index: 1,
                },
                EmbeddingData {
                    embedding: vec![1.0],
                    index: 0,
                },
            ],
        };
        let embeddings = extract_embeddings(response, 2).unwrap();
        assert_eq!(embeddings, vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn test_extract_embeddings_rejects_count_mismatch() {
        let response = EmbeddingResponse {
            data: vec![EmbeddingData {
                embedding: vec![1.0],
                index: 0,
            }],
        };
        assert!(matches!(
            extract_embeddings(response, 2),
            Err(EmbeddingError::ApiError(_))
        ));
    }

    #[test]
    fn test_response_deserialization() {
        let json = r#"{"data":[{"embedding":[0.1,0.2],"index":0}],"model":"text-embedding-3-small","usage":{"prompt_tokens":4,"total_tokens":4}}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.data.len(), 1);
        assert_eq!(parsed.data[0].embedding, vec![0.1, 0.2]);
    }

    #[tokio::test]
    async fn test_embed_rejects_empty_text() {
        let provider = OpenAIEmbedding::new("sk-test".to_string(), None).unwrap();
        let result = provider.embed("   ").await;
        assert!(matches!(result, Err(EmbeddingError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_embed_batch_empty_returns_empty() {
        let provider = OpenAIEmbedding::new("sk-test".to_string(), None).unwrap();
        let embeddings = provider.embed_batch(&[]).await.unwrap();
        assert!(embeddings.is_empty());
    }
}
