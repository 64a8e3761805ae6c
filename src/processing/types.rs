//! Request, outcome, and error types for the processing service.

use serde::Serialize;
use thiserror::Error;

use crate::{
    embedding::EmbeddingClientError,
    llm::LlmClientError,
    qdrant::QdrantError,
    search::SearchError,
    workflow::{RawDocument, WorkflowError, WorkflowState},
};

/// Longest accepted cooperative identifier, in characters.
pub const MAX_COOPERATIVE_CHARS: usize = 200;
/// Longest accepted report identifier, in characters.
pub const MAX_FORM_ID_CHARS: usize = 200;
/// Most documents accepted in one batch request.
pub const MAX_BATCH_DOCUMENTS: usize = 50;

/// One document to run through the workflow.
#[derive(Debug, Clone)]
pub struct DocumentRequest {
    /// Uploaded file.
    pub document: RawDocument,
    /// Tenant that owns the document.
    pub cooperative: String,
    /// Write the chunks to the vector store after a non-rejected run.
    pub index: bool,
}

/// Result of one processed document.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingOutcome {
    /// Identifier shared by all indexed chunks of the document.
    pub form_id: String,
    /// Final workflow state.
    pub state: WorkflowState,
    /// Chunks written to the vector store.
    pub indexed_chunks: usize,
}

/// Errors raised while writing chunks to the vector store.
#[derive(Debug, Error)]
pub enum IndexingError {
    /// Dense vectors could not be produced.
    #[error("Failed to embed chunks: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// The vector store rejected the write.
    #[error("Qdrant request failed: {0}")]
    Store(#[from] QdrantError),
}

/// Errors emitted by the processing service.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Cooperative is blank or too long.
    #[error("invalid cooperative: {0}")]
    InvalidCooperative(String),
    /// Report identifier is blank or too long.
    #[error("invalid form_id: {0}")]
    InvalidFormId(String),
    /// Batch is empty or larger than [`MAX_BATCH_DOCUMENTS`].
    #[error("invalid batch: {0}")]
    InvalidBatch(String),
    /// No report with this identifier exists in the caller's cooperative.
    #[error("report {form_id} not found")]
    ReportNotFound {
        /// Identifier that matched nothing.
        form_id: String,
    },
    /// The workflow aborted.
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    /// Chunks could not be indexed.
    #[error(transparent)]
    Indexing(#[from] IndexingError),
    /// Search was refused or could not be answered.
    #[error(transparent)]
    Search(#[from] SearchError),
    /// Reports could not be read or deleted.
    #[error("report store request failed: {0}")]
    Reports(#[from] QdrantError),
    /// A backing service could not be set up.
    #[error("service setup failed: {0}")]
    Setup(String),
}

impl From<LlmClientError> for ProcessingError {
    fn from(error: LlmClientError) -> Self {
        ProcessingError::Setup(error.to_string())
    }
}

/// Trimmed cooperative, or why it is unusable.
pub fn normalize_cooperative(raw: &str) -> Result<String, ProcessingError> {
    let cooperative = raw.trim();
    if cooperative.is_empty() {
        return Err(ProcessingError::InvalidCooperative(
            "cooperative is required".into(),
        ));
    }
    if cooperative.chars().count() > MAX_COOPERATIVE_CHARS {
        return Err(ProcessingError::InvalidCooperative(format!(
            "cooperative exceeds {MAX_COOPERATIVE_CHARS} characters"
        )));
    }
    Ok(cooperative.to_string())
}

/// Trimmed report identifier, or why it is unusable.
pub fn normalize_form_id(raw: &str) -> Result<String, ProcessingError> {
    let form_id = raw.trim();
    if form_id.is_empty() {
        return Err(ProcessingError::InvalidFormId("form_id is required".into()));
    }
    if form_id.chars().count() > MAX_FORM_ID_CHARS {
        return Err(ProcessingError::InvalidFormId(format!(
            "form_id exceeds {MAX_FORM_ID_CHARS} characters"
        )));
    }
    Ok(form_id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooperative_is_trimmed_and_bounded() {
        assert_eq!(normalize_cooperative("  north ").expect("valid"), "north");
        assert!(normalize_cooperative(" ").is_err());
        assert!(normalize_cooperative(&"c".repeat(MAX_COOPERATIVE_CHARS)).is_ok());
        assert!(normalize_cooperative(&"c".repeat(MAX_COOPERATIVE_CHARS + 1)).is_err());
    }

    #[test]
    fn form_id_is_trimmed_and_bounded() {
        assert_eq!(normalize_form_id(" LA-2025-0007 ").expect("valid"), "LA-2025-0007");
        assert!(matches!(normalize_form_id(""), Err(ProcessingError::InvalidFormId(_))));
        assert!(normalize_form_id(&"f".repeat(MAX_FORM_ID_CHARS + 1)).is_err());
    }
}
