//! Qdrant vector store integration.
//!
//! Every point carries a `dense` and a `sparse` named vector. Queries always go through
//! [`cooperative_filter`], so tenant isolation happens inside the index.

pub mod client;
pub mod filters;
pub mod payload;
mod retrievers;
pub mod scroller;
pub mod types;

pub use client::QdrantService;
pub use filters::{cooperative_filter, document_filter};
pub use payload::DocumentContext;
pub use retrievers::{QdrantDenseRetriever, QdrantSparseRetriever};
pub use types::{IndexSummary, PointInsert, QdrantError, ScoredPoint};
