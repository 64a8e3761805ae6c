//! Records threaded through a single workflow run.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::evaluation::EvaluationResult;

/// Workflow stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Raw upload to markdown text.
    Extract,
    /// Relevance check of the extracted text.
    ValidateContent,
    /// Structured analysis of the text.
    Analyze,
    /// Panel gate over the analysis.
    EvaluateAnalysis,
    /// Visualization proposals derived from the analysis.
    SuggestGraphs,
    /// Panel gate over the graph proposals.
    EvaluateGraphs,
    /// Split into indexable chunks.
    Chunk,
    /// Terminal.
    End,
}

impl Stage {
    /// Stable identifier used in logs and serialized state.
    pub const fn as_str(self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::ValidateContent => "validate_content",
            Stage::Analyze => "analyze",
            Stage::EvaluateAnalysis => "evaluate_analysis",
            Stage::SuggestGraphs => "suggest_graphs",
            Stage::EvaluateGraphs => "evaluate_graphs",
            Stage::Chunk => "chunk",
            Stage::End => "end",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStatus {
    /// Every gate proceeded.
    Completed,
    /// At least one gate exhausted its retries with a poor result.
    NeedsReview,
    /// The document is not a product-trial document.
    Rejected,
}

impl TerminalStatus {
    /// Stable identifier used in payloads and metrics.
    pub const fn as_str(self) -> &'static str {
        match self {
            TerminalStatus::Completed => "completed",
            TerminalStatus::NeedsReview => "needs_review",
            TerminalStatus::Rejected => "rejected",
        }
    }
}

/// Structured fields extracted from a trial document.
///
/// Fields the analysis returns beyond the named ones are kept in `details`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// Product under trial.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    /// Product category (herbicide, foliar, fungicide, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_category: Option<String>,
    /// Grower or cooperator running the trial.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooperator: Option<String>,
    /// Trial location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Crop the product was applied to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<String>,
    /// Names of the metrics the document reports.
    #[serde(default)]
    pub metrics_detected: Vec<String>,
    /// Short narrative summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executive_summary: Option<String>,
    /// Remaining analysis fields.
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

/// Proposed visualization for an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSpec {
    /// Identifier unique within one suggestion set.
    pub chart_id: String,
    /// Chart kind, e.g. `bar_chart` or `line_chart`.
    pub chart_type: String,
    /// Display title.
    pub title: String,
    /// Optional description of what the chart shows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional priority hint (`high`, `medium`, `low`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    /// Chart payload (labels, datasets, options).
    #[serde(default)]
    pub chart_data: Value,
}

/// Origin of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    /// Token-bounded slice of prose.
    Text,
    /// Markdown table flattened to `header: value` lines.
    Table,
    /// Analysis executive summary.
    Summary,
}

impl ChunkKind {
    /// Stable identifier used in payloads.
    pub const fn as_str(self) -> &'static str {
        match self {
            ChunkKind::Text => "text",
            ChunkKind::Table => "table",
            ChunkKind::Summary => "summary",
        }
    }
}

/// Indexable unit of document content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Identifier unique within the document, e.g. `text_3` or `table_0`.
    pub chunk_id: String,
    /// Chunk text.
    pub content: String,
    /// Origin of the chunk.
    pub kind: ChunkKind,
    /// Token count under the chunker's tokenizer.
    pub token_count: usize,
    /// Character count.
    pub char_count: usize,
    /// SHA-256 of the content, hex encoded.
    pub chunk_hash: String,
}

/// Mutable record owned by exactly one workflow run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Extracted markdown.
    pub raw_text: String,
    /// Outcome of content validation.
    pub is_valid_document: Option<bool>,
    /// Latest analysis output.
    pub analysis_result: Option<AnalysisRecord>,
    /// Verdict of the analysis gate.
    pub analysis_evaluation: Option<EvaluationResult>,
    /// Latest graph suggestions.
    pub graph_suggestions: Option<Vec<GraphSpec>>,
    /// Verdict of the graph gate.
    pub graph_evaluation: Option<EvaluationResult>,
    /// Chunks ready for indexing.
    pub chunks: Option<Vec<TextChunk>>,
    /// Attempts spent per gate, keyed by the gate stage.
    pub attempt_counts: BTreeMap<Stage, u32>,
    /// Set once the run reaches `End`.
    pub terminal_status: Option<TerminalStatus>,
    /// Stages in the order they ran, retries included.
    pub visited: Vec<Stage>,
    /// Gates that ran out of attempts with a poor result.
    pub exhausted_gates: Vec<Stage>,
}

impl WorkflowState {
    /// Attempts spent at `gate` so far.
    pub fn attempts(&self, gate: Stage) -> u32 {
        self.attempt_counts.get(&gate).copied().unwrap_or(0)
    }

    /// Count one more attempt at `gate` and return the new total.
    pub(crate) fn record_attempt(&mut self, gate: Stage) -> u32 {
        let count = self.attempt_counts.entry(gate).or_insert(0);
        *count += 1;
        *count
    }

    pub(crate) fn mark_exhausted(&mut self, gate: Stage) {
        if !self.exhausted_gates.contains(&gate) {
            self.exhausted_gates.push(gate);
        }
    }

    /// Number of times `stage` ran.
    pub fn visits(&self, stage: Stage) -> usize {
        self.visited.iter().filter(|visited| **visited == stage).count()
    }

    /// Terminal status implied by the gates seen so far, for a run that was not rejected.
    pub(crate) fn settled_status(&self) -> TerminalStatus {
        if self.exhausted_gates.is_empty() {
            TerminalStatus::Completed
        } else {
            TerminalStatus::NeedsReview
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn analysis_record_keeps_unknown_fields() {
        let record: AnalysisRecord = serde_json::from_value(json!({
            "product": "FoliarMax",
            "crop": "maize",
            "metrics_detected": ["yield"],
            "performance_analysis": { "improvement_percent": 12.5 }
        }))
        .expect("record");

        assert_eq!(record.product.as_deref(), Some("FoliarMax"));
        assert_eq!(record.metrics_detected, vec!["yield"]);
        assert_eq!(
            record.details["performance_analysis"]["improvement_percent"],
            json!(12.5)
        );
    }

    #[test]
    fn attempts_are_tracked_per_gate() {
        let mut state = WorkflowState::default();
        assert_eq!(state.record_attempt(Stage::EvaluateAnalysis), 1);
        assert_eq!(state.record_attempt(Stage::EvaluateAnalysis), 2);
        assert_eq!(state.attempts(Stage::EvaluateGraphs), 0);
        assert_eq!(state.settled_status(), TerminalStatus::Completed);

        state.mark_exhausted(Stage::EvaluateAnalysis);
        state.mark_exhausted(Stage::EvaluateAnalysis);
        assert_eq!(state.exhausted_gates.len(), 1);
        assert_eq!(state.settled_status(), TerminalStatus::NeedsReview);
    }

    #[test]
    fn state_serializes_stage_keys_as_strings() {
        let mut state = WorkflowState::default();
        state.record_attempt(Stage::EvaluateGraphs);
        let value = serde_json::to_value(&state).expect("serialize");
        assert_eq!(value["attempt_counts"]["evaluate_graphs"], json!(1));
    }
}
