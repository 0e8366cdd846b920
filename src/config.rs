//! Environment-driven configuration for the ingestion pipeline.
//!
//! Configuration is loaded once near process start and passed explicitly
//! (via `Arc`) into each component at construction. There is no process-wide
//! singleton; tests construct a `Config` directly with the values they need.

use serde::Deserialize;
use std::env;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the docpipe pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the Chroma instance that stores chunk records.
    pub chroma_url: String,
    /// Name of the Chroma collection used for document storage.
    pub chroma_collection_name: String,
    /// Base URL of the OpenAI-compatible embedding endpoint.
    pub embedding_endpoint: String,
    /// Optional API key sent with embedding requests.
    pub embedding_api_key: Option<String>,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Default chunk size (characters) applied when a request omits one.
    pub default_chunk_size: usize,
    /// Default chunk overlap (characters) applied when a request omits one.
    pub default_chunk_overlap: usize,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            chroma_url: load_env("CHROMA_URL")?,
            chroma_collection_name: load_env_optional("CHROMA_COLLECTION_NAME")
                .unwrap_or_else(|| "documents".to_string()),
            embedding_endpoint: load_env("EMBEDDING_ENDPOINT")?,
            embedding_api_key: load_env_optional("EMBEDDING_API_KEY"),
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| "text-embedding-3-large".to_string()),
            default_chunk_size: load_env_optional("DEFAULT_CHUNK_SIZE")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("DEFAULT_CHUNK_SIZE".to_string()))
                })
                .transpose()?
                .unwrap_or(1000),
            default_chunk_overlap: load_env_optional("DEFAULT_CHUNK_OVERLAP")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("DEFAULT_CHUNK_OVERLAP".to_string()))
                })
                .transpose()?
                .unwrap_or(200),
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Construct a config pointing at explicit endpoints, shared across unit tests.
#[cfg(test)]
pub(crate) fn test_config(chroma_url: &str, embedding_endpoint: &str) -> Config {
    Config {
        chroma_url: chroma_url.to_string(),
        chroma_collection_name: "documents".to_string(),
        embedding_endpoint: embedding_endpoint.to_string(),
        embedding_api_key: None,
        embedding_model: "text-embedding-3-large".to_string(),
        default_chunk_size: 1000,
        default_chunk_overlap: 200,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_carries_defaults() {
        let config = test_config("http://localhost:8000", "http://localhost:9000/v1");
        assert_eq!(config.chroma_collection_name, "documents");
        assert_eq!(config.default_chunk_size, 1000);
        assert_eq!(config.default_chunk_overlap, 200);
    }
}
