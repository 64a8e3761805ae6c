//! State machine driving one document through extraction, the quality gates and chunking.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::cancel::CancelSignal;
use super::collaborators::{
    AnalysisError, Collaborators, ExtractionError, GraphSuggestionError, RawDocument,
    ValidationError,
};
use super::state::{Stage, TerminalStatus, WorkflowState};
use crate::chunking::ChunkingError;
use crate::evaluation::{
    EvaluationContext, EvaluationPanel, RoleEvaluator, RoleWeights, WorkProduct,
};
use crate::policy::{self, Decision, Thresholds, Tier};

/// Tunables for one orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSettings {
    /// Attempts each gate may spend before it settles for `needs_review`.
    pub max_retry_attempts: u32,
    /// Upper bound on every external call, including each panel role.
    pub llm_timeout: Duration,
    /// Thresholds of the analysis gate.
    pub analysis_thresholds: Thresholds,
    /// Thresholds of the graph gate.
    pub graph_thresholds: Thresholds,
    /// Synthesis weights of the evaluation panel.
    pub role_weights: RoleWeights,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            max_retry_attempts: 2,
            llm_timeout: Duration::from_secs(60),
            analysis_thresholds: Thresholds::default(),
            graph_thresholds: Thresholds::default(),
            role_weights: RoleWeights::default(),
        }
    }
}

/// Fatal outcome of a run. The partial state is discarded.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Extract stage failed.
    #[error("extract failed: {source}")]
    Extraction {
        /// Underlying error.
        source: ExtractionError,
    },
    /// Content validation failed (as opposed to rejecting the document).
    #[error("validate_content failed: {source}")]
    Validation {
        /// Underlying error.
        source: ValidationError,
    },
    /// Analyzer returned an error.
    #[error("analyze failed on attempt {attempt}: {source}")]
    Analysis {
        /// Gate attempt the failure happened on.
        attempt: u32,
        /// Underlying error.
        source: AnalysisError,
    },
    /// Graph suggester returned an error.
    #[error("suggest_graphs failed on attempt {attempt}: {source}")]
    GraphSuggestion {
        /// Gate attempt the failure happened on.
        attempt: u32,
        /// Underlying error.
        source: GraphSuggestionError,
    },
    /// Chunker returned an error or no chunks.
    #[error("chunk failed: {source}")]
    Chunking {
        /// Underlying error.
        source: ChunkingError,
    },
    /// An external call exceeded the configured timeout and the run cannot continue without it.
    #[error("{stage} timed out after {timeout:?} on attempt {attempt}")]
    Timeout {
        /// Stage whose call timed out.
        stage: Stage,
        /// Attempt number of the call.
        attempt: u32,
        /// Configured bound.
        timeout: Duration,
    },
    /// The run was cancelled.
    #[error("cancelled during {stage}")]
    Cancelled {
        /// Stage in flight when cancellation was observed.
        stage: Stage,
    },
    /// A stage ran without the output of the stage it depends on.
    #[error("{stage} has no {missing} to work from")]
    MissingInput {
        /// Stage that could not start.
        stage: Stage,
        /// Name of the absent input.
        missing: &'static str,
    },
}

impl WorkflowError {
    /// Stage the run failed in.
    pub fn stage(&self) -> Stage {
        match self {
            WorkflowError::Extraction { .. } => Stage::Extract,
            WorkflowError::Validation { .. } => Stage::ValidateContent,
            WorkflowError::Analysis { .. } => Stage::Analyze,
            WorkflowError::GraphSuggestion { .. } => Stage::SuggestGraphs,
            WorkflowError::Chunking { .. } => Stage::Chunk,
            WorkflowError::Timeout { stage, .. }
            | WorkflowError::Cancelled { stage }
            | WorkflowError::MissingInput { stage, .. } => *stage,
        }
    }
}

enum Interrupt {
    TimedOut,
    Cancelled,
}

/// Drives a document through the stage graph.
///
/// The orchestrator holds no per-run state, so one instance can serve any number of concurrent
/// runs.
pub struct Orchestrator {
    settings: WorkflowSettings,
    collaborators: Collaborators,
    panel: EvaluationPanel,
}

impl Orchestrator {
    /// Wire `collaborators` and a panel over `evaluator` under `settings`.
    pub fn new(
        settings: WorkflowSettings,
        collaborators: Collaborators,
        evaluator: Arc<dyn RoleEvaluator>,
    ) -> Self {
        let panel = EvaluationPanel::new(evaluator, settings.role_weights, settings.llm_timeout);
        Self {
            settings,
            collaborators,
            panel,
        }
    }

    /// Run `input` to a terminal status.
    pub async fn run(&self, input: &RawDocument) -> Result<WorkflowState, WorkflowError> {
        self.run_with_cancel(input, &CancelSignal::never()).await
    }

    /// Run `input`, aborting with [`WorkflowError::Cancelled`] once `cancel` fires.
    pub async fn run_with_cancel(
        &self,
        input: &RawDocument,
        cancel: &CancelSignal,
    ) -> Result<WorkflowState, WorkflowError> {
        let max_attempts = self.settings.max_retry_attempts;
        let mut state = WorkflowState::default();
        let mut feedback: Option<Vec<String>> = None;
        let mut stage = Stage::Extract;

        tracing::info!(file = %input.file_name, "Workflow started");

        loop {
            state.visited.push(stage);
            tracing::info!(stage = %stage, "Entering stage");

            stage = match stage {
                Stage::Extract => {
                    let text = self
                        .bounded(cancel, self.collaborators.extractor.extract(input))
                        .await
                        .map_err(|interrupt| self.fatal(interrupt, Stage::Extract, 1))?
                        .map_err(|source| WorkflowError::Extraction { source })?;
                    state.raw_text = text;
                    Stage::ValidateContent
                }
                Stage::ValidateContent => {
                    let valid = self
                        .bounded(
                            cancel,
                            self.collaborators.validator.validate(&state.raw_text),
                        )
                        .await
                        .map_err(|interrupt| self.fatal(interrupt, Stage::ValidateContent, 1))?
                        .map_err(|source| WorkflowError::Validation { source })?;
                    state.is_valid_document = Some(valid);
                    if !valid {
                        tracing::info!(file = %input.file_name, "Document rejected as off-topic");
                        state.terminal_status = Some(TerminalStatus::Rejected);
                        state.visited.push(Stage::End);
                        return Ok(state);
                    }
                    Stage::Analyze
                }
                Stage::Analyze => {
                    let attempt = state.attempts(Stage::EvaluateAnalysis) + 1;
                    state.analysis_result = None;
                    state.analysis_evaluation = None;

                    let call = self
                        .collaborators
                        .analyzer
                        .analyze(&state.raw_text, feedback.as_deref());
                    match self.bounded(cancel, call).await {
                        Ok(Ok(record)) => {
                            state.analysis_result = Some(record);
                            Stage::EvaluateAnalysis
                        }
                        Ok(Err(source)) => return Err(WorkflowError::Analysis { attempt, source }),
                        Err(interrupt) => {
                            match self.absorb_timeout(
                                interrupt,
                                &mut state,
                                Stage::Analyze,
                                Stage::EvaluateAnalysis,
                            )? {
                                Some(issue) => {
                                    feedback = Some(issue);
                                    Stage::Analyze
                                }
                                // Nothing to carry forward without an analysis.
                                None => {
                                    return Err(self.fatal(
                                        Interrupt::TimedOut,
                                        Stage::Analyze,
                                        state.attempts(Stage::EvaluateAnalysis),
                                    ));
                                }
                            }
                        }
                    }
                }
                Stage::EvaluateAnalysis => {
                    let attempt = state.record_attempt(Stage::EvaluateAnalysis);
                    let Some(record) = state.analysis_result.as_ref() else {
                        return Err(WorkflowError::MissingInput {
                            stage: Stage::EvaluateAnalysis,
                            missing: "analysis",
                        });
                    };
                    let context = EvaluationContext {
                        source_text: &state.raw_text,
                        attempt,
                        max_attempts,
                        prior_assessments: &[],
                    };
                    let evaluation = cancellable(
                        cancel,
                        self.panel.evaluate(
                            WorkProduct::Analysis(record),
                            context,
                            self.settings.analysis_thresholds,
                        ),
                    )
                    .await
                    .map_err(|_| WorkflowError::Cancelled {
                        stage: Stage::EvaluateAnalysis,
                    })?;

                    let next = match evaluation.decision {
                        Decision::Proceed => Stage::SuggestGraphs,
                        Decision::Retry => {
                            tracing::warn!(
                                attempt,
                                confidence = evaluation.confidence,
                                "Analysis below threshold; retrying with panel feedback"
                            );
                            feedback = Some(evaluation.issues.clone());
                            Stage::Analyze
                        }
                        Decision::Fail => {
                            tracing::warn!(
                                attempt,
                                confidence = evaluation.confidence,
                                "Analysis gate exhausted; continuing for review"
                            );
                            state.mark_exhausted(Stage::EvaluateAnalysis);
                            Stage::SuggestGraphs
                        }
                    };
                    state.analysis_evaluation = Some(evaluation);
                    next
                }
                Stage::SuggestGraphs => {
                    let attempt = state.attempts(Stage::EvaluateGraphs) + 1;
                    state.graph_suggestions = None;
                    state.graph_evaluation = None;
                    let Some(record) = state.analysis_result.as_ref() else {
                        return Err(WorkflowError::MissingInput {
                            stage: Stage::SuggestGraphs,
                            missing: "analysis",
                        });
                    };

                    let call = self.collaborators.graph_suggester.suggest_graphs(record);
                    match self.bounded(cancel, call).await {
                        Ok(Ok(graphs)) => {
                            state.graph_suggestions = Some(graphs);
                            Stage::EvaluateGraphs
                        }
                        Ok(Err(source)) => {
                            return Err(WorkflowError::GraphSuggestion { attempt, source });
                        }
                        Err(interrupt) => {
                            match self.absorb_timeout(
                                interrupt,
                                &mut state,
                                Stage::SuggestGraphs,
                                Stage::EvaluateGraphs,
                            )? {
                                Some(_) => Stage::SuggestGraphs,
                                None => {
                                    tracing::warn!(
                                        attempt,
                                        "Graph suggestions kept timing out; continuing for review"
                                    );
                                    state.mark_exhausted(Stage::EvaluateGraphs);
                                    Stage::Chunk
                                }
                            }
                        }
                    }
                }
                Stage::EvaluateGraphs => {
                    let attempt = state.record_attempt(Stage::EvaluateGraphs);
                    let Some(graphs) = state.graph_suggestions.as_deref() else {
                        return Err(WorkflowError::MissingInput {
                            stage: Stage::EvaluateGraphs,
                            missing: "graph suggestions",
                        });
                    };
                    let context = EvaluationContext {
                        source_text: &state.raw_text,
                        attempt,
                        max_attempts,
                        prior_assessments: &[],
                    };
                    let evaluation = cancellable(
                        cancel,
                        self.panel.evaluate(
                            WorkProduct::Graphs(graphs),
                            context,
                            self.settings.graph_thresholds,
                        ),
                    )
                    .await
                    .map_err(|_| WorkflowError::Cancelled {
                        stage: Stage::EvaluateGraphs,
                    })?;

                    let next = match evaluation.decision {
                        Decision::Proceed => Stage::Chunk,
                        Decision::Retry => {
                            tracing::warn!(
                                attempt,
                                confidence = evaluation.confidence,
                                "Graph suggestions below threshold; retrying"
                            );
                            Stage::SuggestGraphs
                        }
                        Decision::Fail => {
                            tracing::warn!(
                                attempt,
                                confidence = evaluation.confidence,
                                "Graph gate exhausted; continuing for review"
                            );
                            state.mark_exhausted(Stage::EvaluateGraphs);
                            Stage::Chunk
                        }
                    };
                    state.graph_evaluation = Some(evaluation);
                    next
                }
                Stage::Chunk => {
                    let Some(record) = state.analysis_result.as_ref() else {
                        return Err(WorkflowError::MissingInput {
                            stage: Stage::Chunk,
                            missing: "analysis",
                        });
                    };
                    let chunks = self
                        .bounded(
                            cancel,
                            self.collaborators.chunker.chunk(record, &state.raw_text),
                        )
                        .await
                        .map_err(|interrupt| self.fatal(interrupt, Stage::Chunk, 1))?
                        .map_err(|source| WorkflowError::Chunking { source })?;
                    if chunks.is_empty() {
                        return Err(WorkflowError::Chunking {
                            source: ChunkingError::NoChunks,
                        });
                    }
                    state.chunks = Some(chunks);
                    Stage::End
                }
                Stage::End => {
                    let status = state.settled_status();
                    state.terminal_status = Some(status);
                    tracing::info!(
                        file = %input.file_name,
                        status = status.as_str(),
                        stages = state.visited.len(),
                        "Workflow finished"
                    );
                    return Ok(state);
                }
            };
        }
    }

    async fn bounded<T>(
        &self,
        cancel: &CancelSignal,
        call: impl Future<Output = T>,
    ) -> Result<T, Interrupt> {
        cancellable(cancel, tokio::time::timeout(self.settings.llm_timeout, call))
            .await?
            .map_err(|_| Interrupt::TimedOut)
    }

    fn fatal(&self, interrupt: Interrupt, stage: Stage, attempt: u32) -> WorkflowError {
        match interrupt {
            Interrupt::TimedOut => WorkflowError::Timeout {
                stage,
                attempt,
                timeout: self.settings.llm_timeout,
            },
            Interrupt::Cancelled => WorkflowError::Cancelled { stage },
        }
    }

    /// A timed-out generation call spends one attempt at its gate, like a poor evaluation.
    /// Returns the corrective issue when budget remains and `None` once the gate is exhausted.
    fn absorb_timeout(
        &self,
        interrupt: Interrupt,
        state: &mut WorkflowState,
        stage: Stage,
        gate: Stage,
    ) -> Result<Option<Vec<String>>, WorkflowError> {
        if let Interrupt::Cancelled = interrupt {
            return Err(WorkflowError::Cancelled { stage });
        }
        let used = state.record_attempt(gate);
        match policy::decide(Tier::Poor, used, self.settings.max_retry_attempts) {
            Decision::Retry => {
                tracing::warn!(stage = %stage, attempt = used, "Call timed out; retrying");
                Ok(Some(vec![format!(
                    "previous {stage} attempt timed out after {:?}",
                    self.settings.llm_timeout
                )]))
            }
            _ => Ok(None),
        }
    }
}

async fn cancellable<T>(
    cancel: &CancelSignal,
    call: impl Future<Output = T>,
) -> Result<T, Interrupt> {
    if cancel.is_cancelled() {
        return Err(Interrupt::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupt::Cancelled),
        value = call => Ok(value),
    }
}
