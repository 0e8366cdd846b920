//! HTTP client wrapper for interacting with Chroma.

use crate::config::Config;
use crate::embedding::EmbeddingGenerator;
use crate::model::DocumentChunk;
use crate::store::payload::chunk_metadata_record;
use crate::store::types::{
    CollectionInfo, QueryResponse, RecordsResponse, SearchError, VectorStoreError,
};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Ordered write endpoint variants tried by the direct path.
const WRITE_VARIANTS: [&str; 2] = ["upsert", "add"];

/// Client for a named collection of a Chroma vector index.
///
/// The handle is safe to share across requests; the resolved collection
/// identifier is cached after the first write or query so subsequent calls
/// skip the list/create round trip.
pub struct ChromaStore {
    pub(crate) client: reqwest::Client,
    pub(crate) base_url: String,
    pub(crate) collection_name: String,
    pub(crate) collection_id: Mutex<Option<String>>,
    pub(crate) embeddings: Arc<EmbeddingGenerator>,
}

/// Typed record batch sent by the structured write path.
#[derive(Serialize)]
struct WriteRequest {
    ids: Vec<String>,
    documents: Vec<String>,
    metadatas: Vec<Map<String, Value>>,
    embeddings: Vec<Vec<f32>>,
}

impl WriteRequest {
    fn from_chunks(chunks: &[DocumentChunk]) -> Self {
        Self {
            ids: chunks.iter().map(|chunk| chunk.id.clone()).collect(),
            documents: chunks.iter().map(|chunk| chunk.content.clone()).collect(),
            metadatas: chunks.iter().map(chunk_metadata_record).collect(),
            embeddings: chunks
                .iter()
                .map(|chunk| chunk.embedding.clone().unwrap_or_default())
                .collect(),
        }
    }
}

impl ChromaStore {
    /// Construct a new client from the shared configuration context.
    pub fn new(
        config: &Config,
        embeddings: Arc<EmbeddingGenerator>,
    ) -> Result<Self, VectorStoreError> {
        let client = reqwest::Client::builder()
            .user_agent("docpipe/0.1")
            .build()?;
        let base_url =
            normalize_base_url(&config.chroma_url).map_err(VectorStoreError::InvalidUrl)?;

        tracing::debug!(
            url = %base_url,
            collection = %config.chroma_collection_name,
            "Initialized Chroma HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            collection_name: config.chroma_collection_name.clone(),
            collection_id: Mutex::new(None),
            embeddings,
        })
    }

    fn collections_url(&self) -> String {
        format!(
            "{}/api/v2/tenants/default_tenant/databases/default_database/collections",
            self.base_url.trim_end_matches('/')
        )
    }

    fn collection_endpoint(&self, collection_id: &str, operation: &str) -> String {
        format!("{}/{collection_id}/{operation}", self.collections_url())
    }

    /// Resolve the target collection by name, creating it when absent.
    ///
    /// The identifier is cached on the handle; a second save reuses it
    /// without another list or create call. Two concurrent first-writers to
    /// the same new name may still race on the index side.
    pub(crate) async fn resolve_collection(&self) -> Result<String, VectorStoreError> {
        let mut cached = self.collection_id.lock().await;
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }

        let response = self.client.get(self.collections_url()).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(VectorStoreError::CollectionResolution {
                collection: self.collection_name.clone(),
                detail: format!("list failed ({status}): {body}"),
            });
        }

        let collections: Vec<CollectionInfo> =
            response
                .json()
                .await
                .map_err(|err| VectorStoreError::CollectionResolution {
                    collection: self.collection_name.clone(),
                    detail: format!("list response parse failed: {err}"),
                })?;

        let id = match collections
            .into_iter()
            .find(|collection| collection.name == self.collection_name)
        {
            Some(existing) => {
                tracing::debug!(
                    collection = %self.collection_name,
                    id = %existing.id,
                    "Collection found"
                );
                existing.id
            }
            None => self.create_collection().await?,
        };

        *cached = Some(id.clone());
        Ok(id)
    }

    /// Create the collection with a cosine-distance metric configuration.
    async fn create_collection(&self) -> Result<String, VectorStoreError> {
        tracing::info!(collection = %self.collection_name, "Creating collection");
        let body = json!({
            "name": self.collection_name,
            "metadata": { "hnsw:space": "cosine" },
        });

        let response = self
            .client
            .post(self.collections_url())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(VectorStoreError::CollectionResolution {
                collection: self.collection_name.clone(),
                detail: format!("create failed ({status}): {body}"),
            });
        }

        let created: CollectionInfo =
            response
                .json()
                .await
                .map_err(|err| VectorStoreError::CollectionResolution {
                    collection: self.collection_name.clone(),
                    detail: format!("create response parse failed: {err}"),
                })?;

        tracing::info!(
            collection = %self.collection_name,
            id = %created.id,
            "Collection created"
        );
        Ok(created.id)
    }

    /// Persist chunks into the collection.
    ///
    /// When every chunk already carries a non-empty embedding the direct path
    /// is used so the embedding provider is not re-invoked. Otherwise the
    /// structured path embeds the missing vectors first; if it fails, the
    /// direct path is tried as a fallback before giving up.
    pub async fn save_chunks(&self, chunks: &[DocumentChunk]) -> Result<(), VectorStoreError> {
        if chunks.is_empty() {
            return Ok(());
        }

        tracing::info!(
            collection = %self.collection_name,
            chunks = chunks.len(),
            "Saving chunks"
        );

        if chunks.iter().all(DocumentChunk::has_embedding) {
            tracing::debug!("All chunks embedded; using direct write path");
            return self.save_direct(chunks).await;
        }

        match self.save_structured(chunks).await {
            Ok(()) => Ok(()),
            Err(error) => {
                tracing::warn!(
                    error = %error,
                    "Structured write path failed; falling back to direct path"
                );
                self.save_direct(chunks).await
            }
        }
    }

    /// Structured write path: embed any chunk lacking a vector, then issue a
    /// single typed upsert.
    async fn save_structured(&self, chunks: &[DocumentChunk]) -> Result<(), VectorStoreError> {
        let mut prepared: Vec<DocumentChunk> = chunks.to_vec();
        let missing: Vec<usize> = prepared
            .iter()
            .enumerate()
            .filter(|(_, chunk)| !chunk.has_embedding())
            .map(|(index, _)| index)
            .collect();

        if !missing.is_empty() {
            tracing::debug!(
                missing = missing.len(),
                "Embedding chunks without vectors before structured write"
            );
            let unembedded: Vec<DocumentChunk> = missing
                .iter()
                .map(|&index| prepared[index].clone())
                .collect();
            let embedded = self.embeddings.embed_chunks(unembedded).await?;
            for (&index, chunk) in missing.iter().zip(embedded) {
                prepared[index] = chunk;
            }
        }

        let collection_id = self.resolve_collection().await?;
        let payload = WriteRequest::from_chunks(&prepared);
        let url = self.collection_endpoint(&collection_id, "upsert");

        let response = self.client.post(&url).json(&payload).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(VectorStoreError::UnexpectedStatus { status, body });
        }

        tracing::info!(chunks = prepared.len(), "Chunks saved via structured path");
        Ok(())
    }

    /// Direct write path: one bulk payload of parallel arrays, tried against
    /// the ordered endpoint variants.
    ///
    /// A 422-class response is treated as a schema mismatch and the next
    /// variant is tried; other failures also advance unless they occur on the
    /// final variant, which is fatal immediately.
    async fn save_direct(&self, chunks: &[DocumentChunk]) -> Result<(), VectorStoreError> {
        let collection_id = self.resolve_collection().await?;
        let payload = WriteRequest::from_chunks(chunks);

        let mut attempts = Vec::new();
        for (position, variant) in WRITE_VARIANTS.iter().enumerate() {
            let is_last = position == WRITE_VARIANTS.len() - 1;
            let url = self.collection_endpoint(&collection_id, variant);
            tracing::debug!(endpoint = %url, "Attempting write variant");

            match self.client.post(&url).json(&payload).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        tracing::info!(
                            collection = %self.collection_name,
                            chunks = chunks.len(),
                            variant,
                            "Chunks saved via direct path"
                        );
                        return Ok(());
                    }

                    let body = response.text().await.unwrap_or_default();
                    if status == StatusCode::UNPROCESSABLE_ENTITY || !is_last {
                        tracing::warn!(variant, %status, "Write variant rejected; trying next");
                        attempts.push(format!("{variant}: {status} {body}"));
                        continue;
                    }

                    tracing::error!(variant, %status, "Final write variant failed");
                    return Err(VectorStoreError::UnexpectedStatus { status, body });
                }
                Err(err) => {
                    if is_last {
                        return Err(VectorStoreError::Http(err));
                    }
                    tracing::warn!(variant, error = %err, "Write variant unreachable; trying next");
                    attempts.push(format!("{variant}: {err}"));
                }
            }
        }

        tracing::error!(
            collection = %self.collection_name,
            "All write endpoint variants exhausted"
        );
        Err(VectorStoreError::WriteExhausted { attempts })
    }

    /// Similarity search: embed the query and return the `k` nearest chunks.
    ///
    /// An empty collection yields an empty result list, not an error.
    pub async fn search_similar(
        &self,
        query: &str,
        k: usize,
        filter: Option<Value>,
    ) -> Result<Vec<DocumentChunk>, SearchError> {
        tracing::info!(collection = %self.collection_name, k, "Searching similar chunks");

        let vector = self.embeddings.embed_query(query).await?;
        let collection_id = self
            .resolve_collection()
            .await
            .map_err(SearchError::Store)?;

        let mut body = json!({
            "query_embeddings": [vector],
            "n_results": k,
            "include": ["documents", "metadatas"],
        });
        if let Some(filter_value) = filter {
            body.as_object_mut()
                .expect("query body is an object")
                .insert("where".into(), filter_value);
        }

        let url = self.collection_endpoint(&collection_id, "query");
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(VectorStoreError::Http)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Store(VectorStoreError::UnexpectedStatus {
                status,
                body,
            }));
        }

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(VectorStoreError::Http)
            .map_err(SearchError::Store)?;

        let ids = parsed.ids.into_iter().next().unwrap_or_default();
        let documents = parsed
            .documents
            .and_then(|groups| groups.into_iter().next())
            .unwrap_or_default();
        let metadatas = parsed
            .metadatas
            .and_then(|groups| groups.into_iter().next())
            .unwrap_or_default();

        let chunks: Vec<DocumentChunk> = ids
            .into_iter()
            .enumerate()
            .map(|(index, id)| {
                let content = documents
                    .get(index)
                    .and_then(|entry| entry.clone())
                    .unwrap_or_default();
                let metadata = metadatas
                    .get(index)
                    .and_then(|entry| entry.clone())
                    .unwrap_or_default();
                record_to_chunk(id, content, metadata)
            })
            .collect();

        tracing::debug!(results = chunks.len(), "Search completed");
        Ok(chunks)
    }

    /// Enumerate every chunk record stored in the collection.
    pub async fn list_chunks(&self) -> Result<Vec<DocumentChunk>, VectorStoreError> {
        let collection_id = self.resolve_collection().await?;
        let url = self.collection_endpoint(&collection_id, "get");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(VectorStoreError::UnexpectedStatus { status, body });
        }

        let parsed: RecordsResponse = response.json().await.map_err(VectorStoreError::Http)?;
        let chunks = parsed
            .ids
            .into_iter()
            .enumerate()
            .map(|(index, id)| {
                let content = parsed
                    .documents
                    .get(index)
                    .and_then(|entry| entry.clone())
                    .unwrap_or_default();
                let metadata = parsed
                    .metadatas
                    .get(index)
                    .and_then(|entry| entry.clone())
                    .unwrap_or_default();
                record_to_chunk(id, content, metadata)
            })
            .collect();

        Ok(chunks)
    }
}

/// Map a stored record back into a [`DocumentChunk`].
///
/// Identity fields are recovered from the sanitized metadata where present;
/// the embedding is omitted since the store does not return it.
fn record_to_chunk(
    fallback_id: String,
    content: String,
    metadata: Map<String, Value>,
) -> DocumentChunk {
    let id = metadata
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or(fallback_id);
    let source = metadata
        .get("source")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let file_type = metadata
        .get("file_type")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let chunk_index = metadata
        .get("chunk_index")
        .and_then(Value::as_u64)
        .unwrap_or(0) as usize;
    let now = crate::model::current_timestamp_rfc3339();

    DocumentChunk {
        id,
        content,
        metadata,
        embedding: None,
        source,
        file_type,
        chunk_index,
        created_at: now.clone(),
        updated_at: now,
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}
