//! Workflow collaborators backed by a language model.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{LlmClient, extract_json, prompts, truncate_chars};
use crate::evaluation::{EvaluationContext, Role, RoleAssessment, RoleEvaluator, WorkProduct};
use crate::workflow::{
    AnalysisError, AnalysisRecord, Analyzer, ContentValidator, GraphSpec, GraphSuggester,
    GraphSuggestionError, ValidationError,
};

const VALIDATION_PREVIEW_CHARS: usize = 3000;
const ANALYSIS_TEXT_CHARS: usize = 4000;

/// Relevance check backed by a language model.
pub struct LlmValidator {
    client: Arc<dyn LlmClient>,
}

impl LlmValidator {
    /// Validator over `client`.
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct ValidationReply {
    is_valid_demo: bool,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    feedback: Option<String>,
}

#[async_trait]
impl ContentValidator for LlmValidator {
    async fn validate(&self, markdown: &str) -> Result<bool, ValidationError> {
        let prompt = prompts::validation(truncate_chars(markdown, VALIDATION_PREVIEW_CHARS));
        let reply = self
            .client
            .complete(&prompt)
            .await
            .map_err(|error| ValidationError(error.to_string()))?;
        let value = extract_json(&reply)
            .ok_or_else(|| ValidationError("reply carried no JSON".into()))?;
        let verdict: ValidationReply = serde_json::from_value(value)
            .map_err(|error| ValidationError(format!("unexpected reply shape: {error}")))?;

        tracing::info!(
            valid = verdict.is_valid_demo,
            content_type = verdict.content_type.as_deref().unwrap_or("unknown"),
            feedback = verdict.feedback.as_deref().unwrap_or(""),
            "Content validated"
        );
        Ok(verdict.is_valid_demo)
    }
}

/// Structured analysis backed by a language model.
pub struct LlmAnalyzer {
    client: Arc<dyn LlmClient>,
}

impl LlmAnalyzer {
    /// Analyzer over `client`.
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Analyzer for LlmAnalyzer {
    async fn analyze(
        &self,
        markdown: &str,
        prior_issues: Option<&[String]>,
    ) -> Result<AnalysisRecord, AnalysisError> {
        let prompt = prompts::analysis(truncate_chars(markdown, ANALYSIS_TEXT_CHARS), prior_issues);
        let reply = self
            .client
            .complete(&prompt)
            .await
            .map_err(|error| AnalysisError(error.to_string()))?;
        match extract_json(&reply) {
            Some(value @ Value::Object(_)) => serde_json::from_value(value)
                .map_err(|error| AnalysisError(format!("unexpected analysis shape: {error}"))),
            Some(_) => Err(AnalysisError("analysis reply is not a JSON object".into())),
            None => Err(AnalysisError("analysis reply carried no JSON".into())),
        }
    }
}

/// Graph suggestions backed by a language model.
pub struct LlmGraphSuggester {
    client: Arc<dyn LlmClient>,
}

impl LlmGraphSuggester {
    /// Suggester over `client`.
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct GraphReply {
    suggested_charts: Vec<GraphSpec>,
}

#[async_trait]
impl GraphSuggester for LlmGraphSuggester {
    async fn suggest_graphs(
        &self,
        analysis: &AnalysisRecord,
    ) -> Result<Vec<GraphSpec>, GraphSuggestionError> {
        let analysis_json = serde_json::to_string_pretty(analysis)
            .map_err(|error| GraphSuggestionError(error.to_string()))?;
        let reply = self
            .client
            .complete(&prompts::graphs(&analysis_json))
            .await
            .map_err(|error| GraphSuggestionError(error.to_string()))?;
        let value = extract_json(&reply)
            .ok_or_else(|| GraphSuggestionError("reply carried no JSON".into()))?;

        let charts = match value {
            Value::Array(_) => serde_json::from_value::<Vec<GraphSpec>>(value),
            other => {
                serde_json::from_value::<GraphReply>(other).map(|reply| reply.suggested_charts)
            }
        }
        .map_err(|error| GraphSuggestionError(format!("unexpected chart shape: {error}")))?;

        if charts.is_empty() {
            return Err(GraphSuggestionError("no charts suggested".into()));
        }
        Ok(charts)
    }
}

/// Panel role scoring backed by a language model.
pub struct LlmRoleEvaluator {
    client: Arc<dyn LlmClient>,
}

impl LlmRoleEvaluator {
    /// Evaluator over `client`.
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct RoleReply {
    score: f64,
    #[serde(default)]
    findings: Vec<String>,
}

#[async_trait]
impl RoleEvaluator for LlmRoleEvaluator {
    async fn evaluate_role(
        &self,
        role: Role,
        product: &WorkProduct<'_>,
        context: &EvaluationContext<'_>,
    ) -> RoleAssessment {
        let product_json = product.to_json().to_string();
        let prompt = prompts::role(
            role,
            product.kind(),
            &product_json,
            truncate_chars(context.source_text, ANALYSIS_TEXT_CHARS),
            context.prior_assessments,
        );

        let reply = match self.client.complete(&prompt).await {
            Ok(reply) => reply,
            Err(error) => {
                tracing::warn!(role = role.as_str(), error = %error, "Role call failed");
                return RoleAssessment::failed(format!("{} failed: {error}", role.as_str()));
            }
        };

        match extract_json(&reply).map(serde_json::from_value::<RoleReply>) {
            Some(Ok(parsed)) => RoleAssessment {
                score: parsed.score,
                findings: parsed.findings,
            },
            Some(Err(error)) => RoleAssessment::failed(format!(
                "{} returned an unexpected reply: {error}",
                role.as_str()
            )),
            None => RoleAssessment::failed(format!("{} returned no JSON", role.as_str())),
        }
    }
}
