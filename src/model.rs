//! Core data model shared across the ingestion pipeline.

use serde::Serialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

/// A bounded fragment of a document's text, the unit of embedding and storage.
///
/// Created by the chunker, mutated once by the embedding generator (vector
/// attached, `updated_at` refreshed), then persisted read-only by the store.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentChunk {
    /// Unique identifier, distinct from the chunk index.
    pub id: String,
    /// Raw text content of the chunk.
    pub content: String,
    /// Metadata mapping merged from the loader, the caller, and the chunker.
    pub metadata: Map<String, Value>,
    /// Embedding vector, attached by the embedding generator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Originating source reference (typically a file path).
    pub source: String,
    /// Declared file-format tag of the originating source.
    pub file_type: String,
    /// Zero-based index among the chunks of its originating logical document.
    pub chunk_index: usize,
    /// Creation timestamp (RFC3339).
    pub created_at: String,
    /// Last-update timestamp (RFC3339).
    pub updated_at: String,
}

impl DocumentChunk {
    /// Whether the chunk already carries a non-empty embedding vector.
    pub fn has_embedding(&self) -> bool {
        self.embedding
            .as_ref()
            .map(|vector| !vector.is_empty())
            .unwrap_or(false)
    }
}

/// Lifecycle state of one extraction request.
///
/// `Pending → Processing → {Completed, Failed}`; terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStatus {
    /// Request has been received but processing has not started.
    Pending,
    /// Pipeline steps are running.
    Processing,
    /// All requested steps finished successfully.
    Completed,
    /// A pipeline step failed; the record carries the error message.
    Failed,
}

/// Record produced for every ingestion request, success or failure.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentExtraction {
    /// Unique identifier of the request.
    pub id: String,
    /// Source reference submitted with the request.
    pub source: String,
    /// Declared file-format tag.
    pub file_type: String,
    /// Current lifecycle status.
    pub status: ExtractionStatus,
    /// Total chunk count, finalized on completion.
    pub total_chunks: usize,
    /// Ordered chunks accumulated so far (partial on failure).
    pub chunks: Vec<DocumentChunk>,
    /// Total processing duration in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,
    /// Error message recorded when the request failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Caller-supplied metadata echoed back with the record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    /// Creation timestamp (RFC3339).
    pub created_at: String,
    /// Last-update timestamp (RFC3339).
    pub updated_at: String,
}

/// Current timestamp formatted for record storage.
pub fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Construct a fresh identifier for chunks and extraction records.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}
