//! Shared types used by the Chroma client and helpers.

use crate::embedding::EmbeddingError;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors returned while interacting with the vector index.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid Chroma URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Chroma responded with an unexpected status code.
    #[error("Unexpected Chroma response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from Chroma.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Target collection could not be resolved or created.
    #[error("Failed to resolve collection '{collection}': {detail}")]
    CollectionResolution {
        /// Collection name the client attempted to resolve.
        collection: String,
        /// Diagnostic from the failing list or create call.
        detail: String,
    },
    /// Every write endpoint variant was tried and rejected.
    #[error("All write endpoints rejected the payload: {}", attempts.join("; "))]
    WriteExhausted {
        /// Diagnostics accumulated across the attempted variants.
        attempts: Vec<String>,
    },
    /// Embedding provider failed while preparing vectors for the write.
    #[error("Embedding provider failed during save: {0}")]
    Embedding(#[from] EmbeddingError),
}

/// Errors emitted while orchestrating similarity searches.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Embedding provider failed to return a vector for the query text.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingError),
    /// Chroma query request returned an error response.
    #[error("Chroma request failed: {0}")]
    Store(#[from] VectorStoreError),
}

#[derive(Debug, Deserialize)]
pub(crate) struct CollectionInfo {
    pub(crate) id: String,
    pub(crate) name: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct QueryResponse {
    #[serde(default)]
    pub(crate) ids: Vec<Vec<String>>,
    #[serde(default)]
    pub(crate) documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    pub(crate) metadatas: Option<Vec<Vec<Option<Map<String, Value>>>>>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RecordsResponse {
    #[serde(default)]
    pub(crate) ids: Vec<String>,
    #[serde(default)]
    pub(crate) documents: Vec<Option<String>>,
    #[serde(default)]
    pub(crate) metadatas: Vec<Option<Map<String, Value>>>,
}
