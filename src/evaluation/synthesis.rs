//! Deterministic synthesis of role assessments into a single confidence and issue list.

use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Role, RoleAssessment};

/// Relative weight of each role in the synthesized confidence.
///
/// The default averages the three scoring roles and records the coordinator's own score for
/// auditability only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoleWeights {
    /// Weight of the context analyst.
    pub context_analyst: f64,
    /// Weight of the output quality evaluator.
    pub output_quality: f64,
    /// Weight of the strategy advisor.
    pub strategy_advisor: f64,
    /// Weight of the decision coordinator's own score.
    pub decision_coordinator: f64,
}

impl Default for RoleWeights {
    fn default() -> Self {
        Self {
            context_analyst: 1.0,
            output_quality: 1.0,
            strategy_advisor: 1.0,
            decision_coordinator: 0.0,
        }
    }
}

impl RoleWeights {
    /// Weight applied to `role`.
    pub fn weight(&self, role: Role) -> f64 {
        match role {
            Role::ContextAnalyst => self.context_analyst,
            Role::OutputQualityEvaluator => self.output_quality,
            Role::StrategyAdvisor => self.strategy_advisor,
            Role::DecisionCoordinator => self.decision_coordinator,
        }
    }

    /// All weights finite and non-negative, with a positive sum.
    pub fn is_valid(&self) -> bool {
        let weights = Role::ALL.map(|role| self.weight(role));
        weights
            .iter()
            .all(|weight| weight.is_finite() && *weight >= 0.0)
            && weights.iter().sum::<f64>() > 0.0
    }
}

impl FromStr for RoleWeights {
    type Err = String;

    /// Parse `analyst,quality,strategy[,coordinator]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values = s
            .split(',')
            .map(|part| part.trim().parse::<f64>().map_err(|err| err.to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        match values.as_slice() {
            [analyst, quality, strategy] => Ok(Self {
                context_analyst: *analyst,
                output_quality: *quality,
                strategy_advisor: *strategy,
                decision_coordinator: 0.0,
            }),
            [analyst, quality, strategy, coordinator] => Ok(Self {
                context_analyst: *analyst,
                output_quality: *quality,
                strategy_advisor: *strategy,
                decision_coordinator: *coordinator,
            }),
            _ => Err(format!("expected 3 or 4 weights, got {}", values.len())),
        }
    }
}

/// Output of [`synthesize`].
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    /// Weighted confidence clamped to `[0, 1]`.
    pub confidence: f64,
    /// Findings from every role, deduplicated in first-seen order.
    pub issues: Vec<String>,
    /// Score reported by each role.
    pub per_role_scores: BTreeMap<String, f64>,
}

/// Fold role assessments into one confidence and issue list.
pub fn synthesize(assessments: &[(Role, RoleAssessment)], weights: &RoleWeights) -> Synthesis {
    let mut weighted = 0.0;
    let mut total_weight = 0.0;
    let mut per_role_scores = BTreeMap::new();

    for (role, assessment) in assessments {
        let weight = weights.weight(*role);
        weighted += weight * assessment.score;
        total_weight += weight;
        per_role_scores.insert(role.as_str().to_string(), assessment.score);
    }

    let confidence = if total_weight > 0.0 {
        (weighted / total_weight).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let issues = dedupe_issues(
        assessments
            .iter()
            .flat_map(|(_, assessment)| assessment.findings.iter().map(String::as_str)),
    );

    Synthesis {
        confidence,
        issues,
        per_role_scores,
    }
}

/// Remove duplicate findings using a case-insensitive, whitespace-collapsed key.
pub fn dedupe_issues<'a>(findings: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut issues = Vec::new();
    for finding in findings {
        let collapsed = finding.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            continue;
        }
        if seen.insert(collapsed.to_lowercase()) {
            issues.push(collapsed);
        }
    }
    issues
}
