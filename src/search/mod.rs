//! Hybrid dense + sparse retrieval with per-cooperative isolation.
//!
//! Both retrievers receive the cooperative and must apply it inside the index. The engine never
//! filters after the fact, so a retriever that ignores the cooperative breaks isolation.

pub mod fusion;

mod engine;
mod types;

pub use engine::{HybridSearchEngine, SearchSettings};
pub use fusion::FusionWeights;
pub use types::{
    MAX_QUERY_CHARS, Retriever, RetrieverError, ScoredCandidate, SearchError, SearchQuery,
    SearchResponse, SearchResult,
};
