//! Query, result and error types shared by the retrievers and the engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::embedding::EmbeddingClientError;
use crate::qdrant::QdrantError;

/// Longest accepted query text, in characters.
pub const MAX_QUERY_CHARS: usize = 500;

/// A tenant-scoped search request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Free-text query.
    pub text: String,
    /// Number of results wanted; clamped to `[1, max_top_k]` by the engine.
    pub top_k: usize,
    /// Tenant key. Only documents of this cooperative are searched.
    pub cooperative: String,
    /// Weight of the dense score in the fused score.
    pub dense_weight: f64,
    /// Weight of the sparse score in the fused score.
    pub sparse_weight: f64,
}

/// One fused hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Point identifier.
    pub id: String,
    /// Weighted combination of the two source scores.
    pub fused_score: f64,
    /// Dense similarity, `0.0` when the dense retriever did not return the point.
    pub dense_score: f64,
    /// Sparse similarity, `0.0` when the sparse retriever did not return the point.
    pub sparse_score: f64,
    /// Stored payload of the point.
    pub payload: Value,
}

/// Ordered results plus the degradation flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Most relevant first.
    pub results: Vec<SearchResult>,
    /// `true` when one retriever failed and scores come from the other alone.
    pub degraded: bool,
}

/// Candidate returned by a single retriever.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    /// Point identifier.
    pub id: String,
    /// Similarity under the retriever's own metric.
    pub score: f64,
    /// Stored payload.
    pub payload: Value,
}

/// Failure of a single retriever.
#[derive(Debug, Error)]
pub enum RetrieverError {
    /// The vector store request failed.
    #[error("vector store request failed: {0}")]
    Store(#[from] QdrantError),
    /// The query could not be encoded.
    #[error("query encoding failed: {0}")]
    Encoding(#[from] EmbeddingClientError),
    /// The retriever did not answer in time.
    #[error("retriever timed out")]
    TimedOut,
}

/// Errors surfaced to search callers.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Weights are negative, non-finite, or sum to zero.
    #[error("invalid search weights: dense={dense}, sparse={sparse}")]
    InvalidWeight {
        /// Requested dense weight.
        dense: f64,
        /// Requested sparse weight.
        sparse: f64,
    },
    /// Both retrievers failed.
    #[error("retrieval unavailable (dense: {dense}; sparse: {sparse})")]
    RetrievalUnavailable {
        /// Dense retriever failure.
        dense: String,
        /// Sparse retriever failure.
        sparse: String,
    },
    /// Query carried no cooperative.
    #[error("cooperative is required")]
    MissingCooperative,
    /// Query text is empty or too long.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// Tenant-filtered similarity search over one index.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Up to `limit` candidates for `query_text`, restricted to `cooperative` inside the index.
    async fn search(
        &self,
        query_text: &str,
        cooperative: &str,
        limit: usize,
    ) -> Result<Vec<ScoredCandidate>, RetrieverError>;
}
