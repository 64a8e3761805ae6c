//! Writing workflow chunks to the vector store.

use std::sync::Arc;

use async_trait::async_trait;

use super::types::IndexingError;
use crate::{
    embedding::{EmbeddingClient, EmbeddingClientError, SparseEncoder},
    qdrant::{
        DocumentContext, PointInsert, QdrantService,
        payload::{build_payload, current_timestamp_rfc3339, generate_point_id},
    },
    workflow::TextChunk,
};

/// Sink for the chunks of a finished run.
#[async_trait]
pub trait ChunkIndexer: Send + Sync {
    /// Index `chunks` under `document`, returning how many were written.
    async fn index(
        &self,
        chunks: &[TextChunk],
        document: DocumentContext<'_>,
    ) -> Result<usize, IndexingError>;
}

/// Indexes chunks into one Qdrant collection with dense and sparse vectors.
pub struct QdrantIndexer {
    pub(super) store: Arc<QdrantService>,
    pub(super) collection: String,
    embedder: Arc<dyn EmbeddingClient>,
    encoder: SparseEncoder,
}

impl QdrantIndexer {
    /// Indexer writing to `collection`.
    pub fn new(
        store: Arc<QdrantService>,
        collection: impl Into<String>,
        embedder: Arc<dyn EmbeddingClient>,
    ) -> Self {
        Self {
            store,
            collection: collection.into(),
            embedder,
            encoder: SparseEncoder,
        }
    }

    /// Create the collection and its payload indexes when missing.
    pub async fn ensure_collection(&self) -> Result<(), IndexingError> {
        self.store
            .create_collection_if_not_exists(&self.collection, self.embedder.dimension())
            .await?;
        self.store.ensure_payload_indexes(&self.collection).await?;
        tracing::debug!(collection = %self.collection, "Collection ensured");
        Ok(())
    }
}

#[async_trait]
impl ChunkIndexer for QdrantIndexer {
    async fn index(
        &self,
        chunks: &[TextChunk],
        document: DocumentContext<'_>,
    ) -> Result<usize, IndexingError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts = chunks.iter().map(|chunk| chunk.content.clone()).collect();
        let dense = self.embedder.generate_embeddings(texts).await?;
        if dense.len() != chunks.len() {
            return Err(EmbeddingClientError::ShapeMismatch {
                expected: chunks.len(),
                actual: dense.len(),
            }
            .into());
        }

        let now = current_timestamp_rfc3339();
        let points = chunks
            .iter()
            .zip(dense)
            .map(|(chunk, vector)| PointInsert {
                id: generate_point_id(),
                dense: vector,
                sparse: self.encoder.encode(&chunk.content),
                payload: build_payload(chunk, &document, &now),
            })
            .collect();

        let summary = self.store.upsert_points(&self.collection, points).await?;
        tracing::info!(
            collection = %self.collection,
            cooperative = document.cooperative,
            form_id = document.form_id,
            chunks = summary.upserted,
            "Chunks indexed"
        );
        Ok(summary.upserted)
    }
}
