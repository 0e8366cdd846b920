//! Extraction orchestration: one request in, one result record out.
//!
//! The orchestrator drives Load → Chunk → Embed → (conditionally) Persist
//! strictly in sequence and never lets an error escape to its caller; every
//! request yields a [`DocumentExtraction`] whose status and error fields
//! encode the outcome.

use crate::chunking::{self, ChunkingError, ChunkingStrategy};
use crate::config::Config;
use crate::embedding::{EmbeddingError, EmbeddingGenerator, HttpEmbeddingClient};
use crate::loader::{self, FileType, LoadError};
use crate::model::{
    DocumentChunk, DocumentExtraction, ExtractionStatus, current_timestamp_rfc3339, generate_id,
};
use crate::store::{ChromaStore, SearchError, VectorStoreError};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Errors emitted by the pipeline steps, caught at the orchestrator boundary.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Document loading failed.
    #[error("Failed to load document: {0}")]
    Load(#[from] LoadError),
    /// Chunking step failed to segment the document.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed to produce vectors.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingError),
    /// Vector store rejected the persistence request.
    #[error("Failed to save chunks: {0}")]
    Store(#[from] VectorStoreError),
}

/// Parameters for one ingestion request.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    /// Source reference (filesystem path) to ingest.
    pub source: String,
    /// Declared file-format tag: `pdf | spreadsheet | text | html`.
    pub file_type: String,
    /// Splitting strategy tag; unknown values fall back to `recursive`.
    pub chunking_strategy: Option<String>,
    /// Target chunk size; defaults from configuration when omitted.
    pub chunk_size: Option<usize>,
    /// Chunk overlap; defaults from configuration when omitted.
    pub chunk_overlap: Option<usize>,
    /// Additional metadata merged into every chunk.
    pub metadata: Option<Map<String, Value>>,
    /// Whether to persist the embedded chunks into the vector store.
    pub save_to_vector_store: bool,
}

impl ExtractionRequest {
    /// Build a request with defaults: recursive strategy, configured
    /// size/overlap, persistence enabled.
    pub fn new(source: impl Into<String>, file_type: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            file_type: file_type.into(),
            chunking_strategy: None,
            chunk_size: None,
            chunk_overlap: None,
            metadata: None,
            save_to_vector_store: true,
        }
    }
}

/// Coordinates the full ingestion pipeline: loading, chunking, embedding, and
/// vector store writes.
///
/// The service owns long-lived handles to the embedding generator and the
/// Chroma transport so concurrent requests reuse the same components.
/// Construct the service once near process start and share it through an
/// `Arc`.
pub struct ExtractionService {
    config: Arc<Config>,
    embeddings: Arc<EmbeddingGenerator>,
    store: ChromaStore,
}

impl ExtractionService {
    /// Build a new extraction service from the shared configuration context.
    pub fn new(config: Arc<Config>) -> Result<Self, PipelineError> {
        let client = HttpEmbeddingClient::new(&config)?;
        let embeddings = Arc::new(EmbeddingGenerator::new(Box::new(client)));
        let store = ChromaStore::new(&config, Arc::clone(&embeddings))?;
        Ok(Self {
            config,
            embeddings,
            store,
        })
    }

    /// Build a service from pre-constructed components, allowing an
    /// alternative embedding backend to be injected.
    pub fn with_components(
        config: Arc<Config>,
        embeddings: Arc<EmbeddingGenerator>,
        store: ChromaStore,
    ) -> Self {
        Self {
            config,
            embeddings,
            store,
        }
    }

    /// Run one extraction request to a terminal state.
    ///
    /// Never returns an error: failures are encoded in the record's `status`
    /// and `error` fields, with whatever chunks were produced before the
    /// failing step.
    pub async fn extract(&self, request: ExtractionRequest) -> DocumentExtraction {
        let started = Instant::now();
        let extraction_id = generate_id();
        tracing::info!(
            extraction = %extraction_id,
            source = %request.source,
            file_type = %request.file_type,
            "Starting extraction"
        );

        let now = current_timestamp_rfc3339();
        let mut extraction = DocumentExtraction {
            id: extraction_id.clone(),
            source: request.source.clone(),
            file_type: request.file_type.clone(),
            status: ExtractionStatus::Processing,
            total_chunks: 0,
            chunks: Vec::new(),
            processing_time_ms: None,
            error: None,
            metadata: request.metadata.clone(),
            created_at: now.clone(),
            updated_at: now,
        };

        let outcome = self.run_pipeline(&request, &mut extraction).await;
        extraction.processing_time_ms = Some(started.elapsed().as_millis() as u64);
        extraction.updated_at = current_timestamp_rfc3339();

        match outcome {
            Ok(()) => {
                extraction.status = ExtractionStatus::Completed;
                extraction.total_chunks = extraction.chunks.len();
                tracing::info!(
                    extraction = %extraction_id,
                    chunks = extraction.total_chunks,
                    elapsed_ms = extraction.processing_time_ms,
                    "Extraction completed"
                );
            }
            Err(error) => {
                tracing::error!(
                    extraction = %extraction_id,
                    error = %error,
                    "Extraction failed"
                );
                extraction.status = ExtractionStatus::Failed;
                extraction.error = Some(error.to_string());
            }
        }

        extraction
    }

    /// The four pipeline steps, strictly in sequence.
    ///
    /// Progress is written into the record as each step finishes so a failure
    /// leaves the partial state accumulated so far.
    async fn run_pipeline(
        &self,
        request: &ExtractionRequest,
        extraction: &mut DocumentExtraction,
    ) -> Result<(), PipelineError> {
        let file_type: FileType = request.file_type.parse().map_err(PipelineError::Load)?;
        let documents = loader::load_document(&request.source, file_type)?;

        let strategy = request
            .chunking_strategy
            .as_deref()
            .map(ChunkingStrategy::parse_or_default)
            .unwrap_or_default();
        let chunk_size = request.chunk_size.unwrap_or(self.config.default_chunk_size);
        let chunk_overlap = request
            .chunk_overlap
            .unwrap_or(self.config.default_chunk_overlap);

        let chunks = chunking::create_chunks(
            &documents,
            strategy,
            chunk_size,
            chunk_overlap,
            &request.source,
            file_type.as_str(),
            request.metadata.as_ref().unwrap_or(&Map::new()),
        )?;
        extraction.total_chunks = chunks.len();
        extraction.chunks = chunks;

        let embedded = self
            .embeddings
            .embed_chunks(std::mem::take(&mut extraction.chunks))
            .await?;
        extraction.chunks = embedded;

        if request.save_to_vector_store {
            self.store.save_chunks(&extraction.chunks).await?;
        } else {
            tracing::debug!("Persistence not requested; skipping vector store write");
        }

        Ok(())
    }

    /// Similarity search over the configured collection.
    ///
    /// Unlike [`extract`](Self::extract), search propagates its errors; there
    /// is no partial-success concept for queries.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<Value>,
    ) -> Result<Vec<DocumentChunk>, SearchError> {
        self.store.search_similar(query, k, filter).await
    }

    /// Enumerate every chunk currently stored in the collection.
    pub async fn list_chunks(&self) -> Result<Vec<DocumentChunk>, VectorStoreError> {
        self.store.list_chunks().await
    }
}
