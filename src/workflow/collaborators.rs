//! Seams between the orchestrator and the components that do the actual work.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::state::{AnalysisRecord, GraphSpec, TextChunk};
use crate::chunking::ChunkingError;

/// Uploaded document as received from the caller.
#[derive(Debug, Clone)]
pub struct RawDocument {
    /// Original file name, used to pick an extraction strategy.
    pub file_name: String,
    /// File contents.
    pub bytes: Vec<u8>,
}

impl RawDocument {
    /// Wrap `bytes` under `file_name`.
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Errors raised while turning an upload into markdown.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// File extension has no extraction strategy.
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),
    /// File exceeds the configured size limit.
    #[error("file is {size} bytes, limit is {limit} bytes")]
    TooLarge {
        /// Upload size in bytes.
        size: usize,
        /// Configured limit in bytes.
        limit: usize,
    },
    /// File is not valid UTF-8.
    #[error("file is not valid UTF-8: {0}")]
    InvalidEncoding(#[from] std::string::FromUtf8Error),
    /// File contains no text after trimming.
    #[error("file contains no extractable text")]
    Empty,
}

/// Content validation could not produce a verdict.
#[derive(Debug, Error)]
#[error("content validation failed: {0}")]
pub struct ValidationError(pub String);

/// Analysis could not produce a record.
#[derive(Debug, Error)]
#[error("analysis failed: {0}")]
pub struct AnalysisError(pub String);

/// Graph suggestion could not produce specs.
#[derive(Debug, Error)]
#[error("graph suggestion failed: {0}")]
pub struct GraphSuggestionError(pub String);

/// Converts an upload into markdown text.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract markdown from `input`.
    async fn extract(&self, input: &RawDocument) -> Result<String, ExtractionError>;
}

/// Decides whether extracted text is a product-trial document.
#[async_trait]
pub trait ContentValidator: Send + Sync {
    /// `Ok(false)` rejects the document.
    async fn validate(&self, markdown: &str) -> Result<bool, ValidationError>;
}

/// Produces a structured analysis of the document.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Analyze `markdown`. On a retry, `prior_issues` carries the previous panel findings.
    async fn analyze(
        &self,
        markdown: &str,
        prior_issues: Option<&[String]>,
    ) -> Result<AnalysisRecord, AnalysisError>;
}

/// Proposes visualizations for an analysis.
#[async_trait]
pub trait GraphSuggester: Send + Sync {
    /// Suggest graphs for `analysis`.
    async fn suggest_graphs(
        &self,
        analysis: &AnalysisRecord,
    ) -> Result<Vec<GraphSpec>, GraphSuggestionError>;
}

/// Splits the document into indexable chunks.
#[async_trait]
pub trait Chunker: Send + Sync {
    /// Chunk `context` (the extracted text) alongside `analysis`.
    async fn chunk(
        &self,
        analysis: &AnalysisRecord,
        context: &str,
    ) -> Result<Vec<TextChunk>, ChunkingError>;
}

/// The full set of stage implementations used by one orchestrator.
#[derive(Clone)]
pub struct Collaborators {
    /// Extract stage.
    pub extractor: Arc<dyn Extractor>,
    /// Validate stage.
    pub validator: Arc<dyn ContentValidator>,
    /// Analyze stage.
    pub analyzer: Arc<dyn Analyzer>,
    /// Suggest-graphs stage.
    pub graph_suggester: Arc<dyn GraphSuggester>,
    /// Chunk stage.
    pub chunker: Arc<dyn Chunker>,
}
