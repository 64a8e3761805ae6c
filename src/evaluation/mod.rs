//! Quality evaluation panel.
//!
//! Three scoring roles assess a work product independently, then the decision coordinator sees
//! their assessments and adds its own. [`synthesis::synthesize`] folds everything into one
//! confidence, and the confidence policy turns that into a gate decision. Role failures never
//! escape the panel: a failed or timed-out role contributes a score of `0.0` and a finding that
//! names the failure.

pub mod synthesis;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::policy::{self, Decision, Thresholds, Tier};
use crate::workflow::{AnalysisRecord, GraphSpec};

pub use synthesis::{RoleWeights, Synthesis, dedupe_issues, synthesize};

/// Panel member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Scores document-type fit and extraction completeness against the source text.
    ContextAnalyst,
    /// Scores internal accuracy and completeness of the work product.
    OutputQualityEvaluator,
    /// Scores whether the work product is sufficient to proceed.
    StrategyAdvisor,
    /// Reviews the other three assessments.
    DecisionCoordinator,
}

impl Role {
    /// Roles invoked before the coordinator, in invocation order.
    pub const SCORING: [Role; 3] = [
        Role::ContextAnalyst,
        Role::OutputQualityEvaluator,
        Role::StrategyAdvisor,
    ];

    /// Every role, in invocation order.
    pub const ALL: [Role; 4] = [
        Role::ContextAnalyst,
        Role::OutputQualityEvaluator,
        Role::StrategyAdvisor,
        Role::DecisionCoordinator,
    ];

    /// Stable identifier used in `per_role_scores` and logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::ContextAnalyst => "context_analyst",
            Role::OutputQualityEvaluator => "output_quality_evaluator",
            Role::StrategyAdvisor => "strategy_advisor",
            Role::DecisionCoordinator => "decision_coordinator",
        }
    }
}

/// Sub-score and findings returned by one role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleAssessment {
    /// Sub-score in `[0, 1]`.
    pub score: f64,
    /// Human-readable findings.
    pub findings: Vec<String>,
}

impl RoleAssessment {
    /// Assessment recorded when a role could not produce a result.
    pub fn failed(description: impl Into<String>) -> Self {
        Self {
            score: 0.0,
            findings: vec![description.into()],
        }
    }
}

/// The output under review at a gate.
#[derive(Debug, Clone, Copy)]
pub enum WorkProduct<'a> {
    /// Structured analysis produced by the analyze stage.
    Analysis(&'a AnalysisRecord),
    /// Visualization specs produced by the graph suggestion stage.
    Graphs(&'a [GraphSpec]),
}

impl WorkProduct<'_> {
    /// Short label used in prompts and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkProduct::Analysis(_) => "analysis",
            WorkProduct::Graphs(_) => "graphs",
        }
    }

    /// JSON rendering handed to role evaluators.
    pub fn to_json(&self) -> Value {
        match self {
            WorkProduct::Analysis(record) => serde_json::to_value(record).unwrap_or(Value::Null),
            WorkProduct::Graphs(graphs) => serde_json::to_value(graphs).unwrap_or(Value::Null),
        }
    }
}

/// Source context shared with every role.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    /// Document text the work product was derived from.
    pub source_text: &'a str,
    /// Attempt number at the owning gate, starting at 1.
    pub attempt: u32,
    /// Attempt budget of the owning gate.
    pub max_attempts: u32,
    /// Assessments already collected in this panel run. Empty for the scoring roles.
    pub prior_assessments: &'a [(Role, RoleAssessment)],
}

/// Per-role scoring backend, typically a language-model call.
///
/// Implementations never fail: internal errors are reported as
/// [`RoleAssessment::failed`].
#[async_trait]
pub trait RoleEvaluator: Send + Sync {
    /// Assess `product` from the perspective of `role`.
    async fn evaluate_role(
        &self,
        role: Role,
        product: &WorkProduct<'_>,
        context: &EvaluationContext<'_>,
    ) -> RoleAssessment;
}

/// Synthesized verdict of the panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Weighted confidence in `[0, 1]`.
    pub confidence: f64,
    /// Tier derived from `confidence`.
    pub tier: Tier,
    /// Gate decision given the tier and attempt budget.
    pub decision: Decision,
    /// Deduplicated findings.
    pub issues: Vec<String>,
    /// Individual role scores.
    pub per_role_scores: BTreeMap<String, f64>,
}

/// Stateless panel runner.
pub struct EvaluationPanel {
    evaluator: Arc<dyn RoleEvaluator>,
    weights: RoleWeights,
    role_timeout: Duration,
}

impl EvaluationPanel {
    /// Build a panel over `evaluator` with synthesis `weights` and a per-role timeout.
    pub fn new(
        evaluator: Arc<dyn RoleEvaluator>,
        weights: RoleWeights,
        role_timeout: Duration,
    ) -> Self {
        Self {
            evaluator,
            weights,
            role_timeout,
        }
    }

    /// Run every role over `product` and synthesize a verdict. Never fails.
    pub async fn evaluate(
        &self,
        product: WorkProduct<'_>,
        context: EvaluationContext<'_>,
        thresholds: Thresholds,
    ) -> EvaluationResult {
        let mut assessments: Vec<(Role, RoleAssessment)> = Vec::with_capacity(Role::ALL.len());

        for role in Role::SCORING {
            let role_context = EvaluationContext {
                prior_assessments: &[],
                ..context
            };
            let assessment = self.invoke(role, &product, &role_context).await;
            assessments.push((role, assessment));
        }

        let coordinator_context = EvaluationContext {
            prior_assessments: &assessments,
            ..context
        };
        let coordinator = self
            .invoke(Role::DecisionCoordinator, &product, &coordinator_context)
            .await;
        assessments.push((Role::DecisionCoordinator, coordinator));

        let Synthesis {
            confidence,
            issues,
            per_role_scores,
        } = synthesize(&assessments, &self.weights);
        let tier = policy::classify(confidence, thresholds);
        let decision = policy::decide(tier, context.attempt, context.max_attempts);

        tracing::info!(
            product = product.kind(),
            attempt = context.attempt,
            confidence,
            ?tier,
            ?decision,
            issues = issues.len(),
            "Panel evaluation complete"
        );

        EvaluationResult {
            confidence,
            tier,
            decision,
            issues,
            per_role_scores,
        }
    }

    async fn invoke(
        &self,
        role: Role,
        product: &WorkProduct<'_>,
        context: &EvaluationContext<'_>,
    ) -> RoleAssessment {
        let call = self.evaluator.evaluate_role(role, product, context);
        let assessment = match tokio::time::timeout(self.role_timeout, call).await {
            Ok(assessment) => assessment,
            Err(_) => {
                tracing::warn!(
                    role = role.as_str(),
                    timeout_secs = self.role_timeout.as_secs_f64(),
                    "Role evaluation timed out"
                );
                RoleAssessment::failed(format!(
                    "{} timed out after {:.1}s",
                    role.as_str(),
                    self.role_timeout.as_secs_f64()
                ))
            }
        };
        let assessment = sanitize_assessment(role, assessment);
        tracing::debug!(
            role = role.as_str(),
            score = assessment.score,
            findings = assessment.findings.len(),
            "Role assessed"
        );
        assessment
    }
}

fn sanitize_assessment(role: Role, mut assessment: RoleAssessment) -> RoleAssessment {
    if !assessment.score.is_finite() {
        assessment
            .findings
            .push(format!("{} returned a non-numeric score", role.as_str()));
        assessment.score = 0.0;
    }
    assessment.score = assessment.score.clamp(0.0, 1.0);
    assessment
}
