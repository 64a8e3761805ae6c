//! Qdrant-backed retrievers for the hybrid search engine.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::client::QdrantService;
use super::filters::cooperative_filter;
use super::types::ScoredPoint;
use crate::embedding::{EmbeddingClient, EmbeddingClientError, SparseEncoder};
use crate::search::{Retriever, RetrieverError, ScoredCandidate};

/// Cosine search over the dense slot.
pub struct QdrantDenseRetriever {
    store: Arc<QdrantService>,
    collection: String,
    embedder: Arc<dyn EmbeddingClient>,
}

impl QdrantDenseRetriever {
    /// Retriever over `collection`, embedding queries with `embedder`.
    pub fn new(
        store: Arc<QdrantService>,
        collection: impl Into<String>,
        embedder: Arc<dyn EmbeddingClient>,
    ) -> Self {
        Self {
            store,
            collection: collection.into(),
            embedder,
        }
    }
}

#[async_trait]
impl Retriever for QdrantDenseRetriever {
    async fn search(
        &self,
        query_text: &str,
        cooperative: &str,
        limit: usize,
    ) -> Result<Vec<ScoredCandidate>, RetrieverError> {
        let Some(filter) = cooperative_filter(cooperative) else {
            return Ok(Vec::new());
        };
        let vector = self
            .embedder
            .generate_embeddings(vec![query_text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or(EmbeddingClientError::ShapeMismatch {
                expected: 1,
                actual: 0,
            })?;

        let points = self
            .store
            .query_dense(&self.collection, vector, filter, limit)
            .await?;
        Ok(points.into_iter().map(into_candidate).collect())
    }
}

/// IDF-weighted keyword search over the sparse slot.
pub struct QdrantSparseRetriever {
    store: Arc<QdrantService>,
    collection: String,
    encoder: SparseEncoder,
}

impl QdrantSparseRetriever {
    /// Retriever over `collection`.
    pub fn new(store: Arc<QdrantService>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
            encoder: SparseEncoder,
        }
    }
}

#[async_trait]
impl Retriever for QdrantSparseRetriever {
    async fn search(
        &self,
        query_text: &str,
        cooperative: &str,
        limit: usize,
    ) -> Result<Vec<ScoredCandidate>, RetrieverError> {
        let Some(filter) = cooperative_filter(cooperative) else {
            return Ok(Vec::new());
        };
        let vector = self.encoder.encode(query_text);
        // Only stop-words or punctuation: nothing to match on.
        if vector.is_empty() {
            return Ok(Vec::new());
        }

        let points = self
            .store
            .query_sparse(&self.collection, &vector, filter, limit)
            .await?;
        Ok(points.into_iter().map(into_candidate).collect())
    }
}

fn into_candidate(point: ScoredPoint) -> ScoredCandidate {
    ScoredCandidate {
        id: point.id,
        score: f64::from(point.score),
        payload: point.payload.map_or(Value::Null, Value::Object),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::LocalHashEmbedder;
    use crate::qdrant::client::tests::service_for;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    #[tokio::test]
    async fn dense_retriever_filters_by_cooperative() {
        let server = MockServer::start_async().await;
        let query = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/trials/points/query")
                    .json_body_partial(
                        r#"{"using":"dense","limit":20,"filter":{"must":[{"key":"cooperative","match":{"value":"south"}}]}}"#,
                    );
                then.status(200).json_body(json!({
                    "result": [
                        { "id": "a", "score": 0.75, "payload": { "content": "maize" } }
                    ]
                }));
            })
            .await;
        let retriever = QdrantDenseRetriever::new(
            Arc::new(service_for(&server)),
            "trials",
            Arc::new(LocalHashEmbedder::new(4)),
        );

        let hits = retriever.search("maize yield", "south", 20).await.expect("hits");

        query.assert_async().await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
        assert!((hits[0].score - 0.75).abs() < 1e-6);
        assert_eq!(hits[0].payload["content"], "maize");
    }

    #[tokio::test]
    async fn sparse_retriever_skips_store_for_stopword_queries() {
        let server = MockServer::start_async().await;
        let query = server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/trials/points/query");
                then.status(200).json_body(json!({ "result": [] }));
            })
            .await;
        let retriever = QdrantSparseRetriever::new(Arc::new(service_for(&server)), "trials");

        let hits = retriever.search("the of and", "south", 10).await.expect("hits");

        assert!(hits.is_empty());
        query.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn store_failure_becomes_retriever_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/trials/points/query");
                then.status(503).body("down");
            })
            .await;
        let retriever = QdrantSparseRetriever::new(Arc::new(service_for(&server)), "trials");

        let err = retriever
            .search("maize yield", "south", 10)
            .await
            .expect_err("error");
        assert!(matches!(err, RetrieverError::Store(_)));
    }
}
