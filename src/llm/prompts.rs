//! Prompt builders for validation, analysis, graph suggestion and role review.

use std::fmt::Write as _;

use crate::evaluation::{Role, RoleAssessment};

pub(crate) fn validation(preview: &str) -> String {
    format!(
        "You screen uploaded agricultural documents.\n\
         Decide whether the document below reports a product trial or product demonstration \
         (a product applied to a crop with measured results).\n\
         Reply with JSON only: {{\"is_valid_demo\": bool, \"confidence\": number between 0 and 1, \
         \"content_type\": string, \"feedback\": string}}.\n\n\
         DOCUMENT:\n{preview}"
    )
}

pub(crate) fn analysis(text: &str, prior_issues: Option<&[String]>) -> String {
    let mut prompt = String::from(
        "Extract the trial facts from the document below.\n\
         Reply with JSON only, using these keys: product, product_category, cooperator, location, \
         crop, metrics_detected (list of metric names), executive_summary, and \
         performance_analysis (object with the measured results). Use null for facts the \
         document does not state. Do not invent values.\n",
    );
    if let Some(issues) = prior_issues.filter(|issues| !issues.is_empty()) {
        prompt.push_str("\nA reviewer rejected the previous extraction. Fix these issues:\n");
        for issue in issues {
            let _ = writeln!(prompt, "- {issue}");
        }
    }
    let _ = write!(prompt, "\nDOCUMENT:\n{text}");
    prompt
}

pub(crate) fn graphs(analysis_json: &str) -> String {
    format!(
        "Propose charts that visualize the trial analysis below.\n\
         Reply with JSON only: {{\"suggested_charts\": [{{\"chart_id\": string, \"chart_type\": \
         one of bar_chart, line_chart, pie_chart, scatter_chart, \"title\": string, \
         \"description\": string, \"priority\": one of high, medium, low, \"chart_data\": \
         {{\"labels\": [...], \"datasets\": [...]}}}}]}}.\n\
         Only chart values present in the analysis.\n\n\
         ANALYSIS:\n{analysis_json}"
    )
}

fn role_brief(role: Role) -> &'static str {
    match role {
        Role::ContextAnalyst => {
            "You are the Document Context Analyst. Score how well the work product fits the \
             document type and how completely it captures the source document."
        }
        Role::OutputQualityEvaluator => {
            "You are the Output Quality Evaluator. Score the accuracy and completeness of the \
             work product. Every stated metric must be supported by the source document."
        }
        Role::StrategyAdvisor => {
            "You are the Processing Strategy Advisor. Score whether the work product is good \
             enough to move on to the next processing step, looking for gaps the other reviewers \
             might accept."
        }
        Role::DecisionCoordinator => {
            "You are the Evaluation Decision Coordinator. Weigh the reviewer assessments below \
             against the work product and give your own overall score."
        }
    }
}

pub(crate) fn role(
    role: Role,
    product_kind: &str,
    product_json: &str,
    source_excerpt: &str,
    prior: &[(Role, RoleAssessment)],
) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "{}", role_brief(role));
    let _ = writeln!(
        prompt,
        "Reply with JSON only: {{\"score\": number between 0 and 1, \"findings\": [string]}}. \
         Findings name concrete problems; leave the list empty when there are none."
    );
    if !prior.is_empty() {
        prompt.push_str("\nREVIEWER ASSESSMENTS:\n");
        for (reviewer, assessment) in prior {
            let _ = writeln!(
                prompt,
                "- {}: score {:.2}; findings: {}",
                reviewer.as_str(),
                assessment.score,
                if assessment.findings.is_empty() {
                    "none".to_string()
                } else {
                    assessment.findings.join("; ")
                }
            );
        }
    }
    let _ = write!(
        prompt,
        "\nWORK PRODUCT ({product_kind}):\n{product_json}\n\nSOURCE DOCUMENT:\n{source_excerpt}"
    );
    prompt
}
