//! Document processing: workflow runs, chunk indexing, batch execution, reports, and search.

mod indexing;
mod reports;
mod service;
mod types;

pub use indexing::{ChunkIndexer, QdrantIndexer};
pub use reports::{DeletedReport, ReportStats, ReportStore, ReportSummary, summarize_reports};
pub use service::{ProcessingApi, ProcessingService, build_orchestrator};
pub use types::{
    DocumentRequest, IndexingError, MAX_BATCH_DOCUMENTS, MAX_COOPERATIVE_CHARS, MAX_FORM_ID_CHARS,
    ProcessingError, ProcessingOutcome, normalize_cooperative, normalize_form_id,
};
