//! Document evaluation workflow.
//!
//! A run walks `extract -> validate_content -> analyze -> evaluate_analysis -> suggest_graphs ->
//! evaluate_graphs -> chunk -> end`. The two evaluate stages are gates: a poor panel verdict sends
//! the run back to the generation stage until the gate's attempt budget is spent, after which the
//! run continues and ends as `needs_review`. Every run owns its own [`WorkflowState`].

mod cancel;
mod collaborators;
mod orchestrator;
mod state;

pub use cancel::{CancelHandle, CancelSignal, cancel_pair};
pub use collaborators::{
    AnalysisError, Analyzer, Chunker, Collaborators, ContentValidator, ExtractionError, Extractor,
    GraphSuggester, GraphSuggestionError, RawDocument, ValidationError,
};
pub use orchestrator::{Orchestrator, WorkflowError, WorkflowSettings};
pub use state::{
    AnalysisRecord, ChunkKind, GraphSpec, Stage, TerminalStatus, TextChunk, WorkflowState,
};
