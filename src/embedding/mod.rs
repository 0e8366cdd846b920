//! Embedding client abstraction and batched generation.
//!
//! The provider seam is a small async trait so tests and alternative backends
//! can swap the HTTP client out. The production client speaks the
//! OpenAI-compatible `POST {base}/embeddings` protocol.

use crate::config::Config;
use crate::model::{DocumentChunk, current_timestamp_rfc3339};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of texts sent per provider call.
pub const EMBEDDING_BATCH_SIZE: usize = 10;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Provider responded with a failure status or malformed body.
    #[error("Failed to generate embeddings: {0}")]
    Provider(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider returned a different number of vectors than inputs.
    #[error("Embedding provider returned {actual} vectors for {expected} inputs")]
    CountMismatch {
        /// Number of texts submitted in the call.
        expected: usize,
        /// Number of vectors returned.
        actual: usize,
    },
    /// Provider returned no vector for a single-text request.
    #[error("Embedding provider returned no vectors for the query")]
    Empty,
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce one embedding vector per supplied text, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Deserialize)]
struct EmbeddingEntry {
    index: usize,
    embedding: Vec<f32>,
}

/// HTTP client for OpenAI-compatible embedding endpoints.
pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl HttpEmbeddingClient {
    /// Build a client from the shared configuration context.
    pub fn new(config: &Config) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .user_agent("docpipe/0.1")
            .build()?;
        let endpoint = format!(
            "{}/embeddings",
            config.embedding_endpoint.trim_end_matches('/')
        );

        tracing::debug!(
            endpoint = %endpoint,
            model = %config.embedding_model,
            has_api_key = config.embedding_api_key.is_some(),
            "Initialized embedding HTTP client"
        );

        Ok(Self {
            client,
            endpoint,
            api_key: config.embedding_api_key.clone(),
            model: config.embedding_model.clone(),
        })
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(api_key) = self.api_key.as_deref().filter(|key| !key.is_empty()) {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            let error = EmbeddingError::Provider(format!("{status}: {detail}"));
            tracing::error!(error = %error, "Embedding provider request failed");
            return Err(error);
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|err| EmbeddingError::Provider(err.to_string()))?;
        parsed.data.sort_by_key(|entry| entry.index);

        if parsed.data.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                actual: parsed.data.len(),
            });
        }

        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

/// Batched embedding generation for chunks, plus a single-text convenience.
///
/// Batches are processed one at a time to bound provider call concurrency;
/// any provider failure aborts the whole generation.
pub struct EmbeddingGenerator {
    client: Box<dyn EmbeddingClient>,
}

impl EmbeddingGenerator {
    /// Wrap an embedding client.
    pub fn new(client: Box<dyn EmbeddingClient>) -> Self {
        Self { client }
    }

    /// Attach an embedding vector to every chunk, preserving order.
    ///
    /// For `N` chunks, exactly `ceil(N / 10)` provider calls are made, each
    /// carrying at most 10 texts. `updated_at` is refreshed on every chunk
    /// that receives a vector.
    pub async fn embed_chunks(
        &self,
        mut chunks: Vec<DocumentChunk>,
    ) -> Result<Vec<DocumentChunk>, EmbeddingError> {
        if chunks.is_empty() {
            return Ok(chunks);
        }

        tracing::info!(chunks = chunks.len(), "Generating embeddings");

        let total = chunks.len();
        for (batch_index, batch) in chunks.chunks_mut(EMBEDDING_BATCH_SIZE).enumerate() {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.content.clone()).collect();
            let vectors = self.client.embed_batch(&texts).await?;

            if vectors.len() != batch.len() {
                return Err(EmbeddingError::CountMismatch {
                    expected: batch.len(),
                    actual: vectors.len(),
                });
            }

            for (chunk, vector) in batch.iter_mut().zip(vectors) {
                chunk.embedding = Some(vector);
                chunk.updated_at = current_timestamp_rfc3339();
            }

            tracing::debug!(
                batch = batch_index,
                processed = ((batch_index * EMBEDDING_BATCH_SIZE) + batch.len()).min(total),
                total,
                "Embedding batch processed"
            );
        }

        tracing::info!(chunks = chunks.len(), "Embeddings generated");
        Ok(chunks)
    }

    /// Embed a single query string.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.client.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or(EmbeddingError::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::model::generate_id;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    fn chunk(content: &str) -> DocumentChunk {
        DocumentChunk {
            id: generate_id(),
            content: content.to_string(),
            metadata: serde_json::Map::new(),
            embedding: None,
            source: "test.txt".into(),
            file_type: "text".into(),
            chunk_index: 0,
            created_at: current_timestamp_rfc3339(),
            updated_at: current_timestamp_rfc3339(),
        }
    }

    fn embedding_body(count: usize) -> serde_json::Value {
        let data: Vec<_> = (0..count)
            .map(|index| {
                json!({
                    "index": index,
                    "embedding": [index as f32, 0.5],
                })
            })
            .collect();
        json!({ "object": "list", "data": data, "model": "text-embedding-3-large" })
    }

    fn client_for(server: &MockServer) -> HttpEmbeddingClient {
        let config = test_config("http://unused", &server.base_url());
        HttpEmbeddingClient::new(&config).expect("client")
    }

    #[tokio::test]
    async fn twenty_five_chunks_take_three_batches() {
        let server = MockServer::start_async().await;

        let full = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/embeddings")
                    .json_body_partial(r#"{"model": "text-embedding-3-large"}"#)
                    .matches(|req| {
                        let body: serde_json::Value =
                            serde_json::from_slice(req.body.as_deref().unwrap_or(&[])).unwrap();
                        body["input"].as_array().map(|a| a.len()) == Some(10)
                    });
                then.status(200).json_body(embedding_body(10));
            })
            .await;
        let tail = server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings").matches(|req| {
                    let body: serde_json::Value =
                        serde_json::from_slice(req.body.as_deref().unwrap_or(&[])).unwrap();
                    body["input"].as_array().map(|a| a.len()) == Some(5)
                });
                then.status(200).json_body(embedding_body(5));
            })
            .await;

        let generator = EmbeddingGenerator::new(Box::new(client_for(&server)));
        let chunks: Vec<_> = (0..25).map(|i| chunk(&format!("chunk {i}"))).collect();
        let embedded = generator.embed_chunks(chunks).await.expect("embed");

        full.assert_hits_async(2).await;
        tail.assert_hits_async(1).await;
        assert_eq!(embedded.len(), 25);
        assert!(embedded.iter().all(DocumentChunk::has_embedding));
    }

    #[tokio::test]
    async fn embeddings_map_back_in_input_order() {
        let server = MockServer::start_async().await;

        // Entries deliberately returned out of order; the client sorts by index.
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200).json_body(json!({
                    "data": [
                        { "index": 1, "embedding": [1.0] },
                        { "index": 0, "embedding": [0.0] },
                        { "index": 2, "embedding": [2.0] },
                    ]
                }));
            })
            .await;

        let generator = EmbeddingGenerator::new(Box::new(client_for(&server)));
        let chunks = vec![chunk("a"), chunk("b"), chunk("c")];
        let embedded = generator.embed_chunks(chunks).await.expect("embed");

        for (position, chunk) in embedded.iter().enumerate() {
            assert_eq!(chunk.embedding, Some(vec![position as f32]));
        }
    }

    #[tokio::test]
    async fn provider_failure_aborts_generation() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(429).body("rate limited");
            })
            .await;

        let generator = EmbeddingGenerator::new(Box::new(client_for(&server)));
        let error = generator
            .embed_chunks(vec![chunk("a")])
            .await
            .expect_err("must fail");
        assert!(matches!(error, EmbeddingError::Provider(message) if message.contains("429")));
    }

    #[tokio::test]
    async fn embed_query_returns_single_vector() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200).json_body(embedding_body(1));
            })
            .await;

        let generator = EmbeddingGenerator::new(Box::new(client_for(&server)));
        let vector = generator.embed_query("hello").await.expect("query vector");
        assert_eq!(vector.len(), 2);
    }

    #[tokio::test]
    async fn count_mismatch_is_detected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200).json_body(embedding_body(1));
            })
            .await;

        let generator = EmbeddingGenerator::new(Box::new(client_for(&server)));
        let error = generator
            .embed_chunks(vec![chunk("a"), chunk("b")])
            .await
            .expect_err("must fail");
        assert!(matches!(
            error,
            EmbeddingError::CountMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }
}
