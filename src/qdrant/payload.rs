//! Helpers for constructing Qdrant payloads.

use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::workflow::{AnalysisRecord, TerminalStatus, TextChunk};

/// Document-level fields copied into every chunk payload.
#[derive(Debug, Clone, Copy)]
pub struct DocumentContext<'a> {
    /// Tenant that owns the document.
    pub cooperative: &'a str,
    /// Identifier shared by all chunks of one document.
    pub form_id: &'a str,
    /// Uploaded file name.
    pub file_name: &'a str,
    /// Analysis of the document, when the run produced one.
    pub analysis: Option<&'a AnalysisRecord>,
    /// Final status of the run.
    pub terminal_status: Option<TerminalStatus>,
}

/// Build the payload object stored alongside each indexed chunk.
pub(crate) fn build_payload(
    chunk: &TextChunk,
    document: &DocumentContext<'_>,
    timestamp_rfc3339: &str,
) -> Value {
    let mut payload = Map::new();
    payload.insert("cooperative".into(), document.cooperative.into());
    payload.insert("form_id".into(), document.form_id.into());
    payload.insert("file_name".into(), document.file_name.into());
    payload.insert("chunk_id".into(), chunk.chunk_id.as_str().into());
    payload.insert("chunk_type".into(), chunk.kind.as_str().into());
    payload.insert("chunk_hash".into(), chunk.chunk_hash.as_str().into());
    payload.insert("content".into(), chunk.content.as_str().into());
    payload.insert("token_count".into(), chunk.token_count.into());
    payload.insert("char_count".into(), chunk.char_count.into());
    payload.insert("timestamp".into(), timestamp_rfc3339.into());

    if let Some(status) = document.terminal_status {
        payload.insert("terminal_status".into(), status.as_str().into());
    }

    if let Some(analysis) = document.analysis {
        let fields = [
            ("product", &analysis.product),
            ("product_category", &analysis.product_category),
            ("cooperator", &analysis.cooperator),
            ("location", &analysis.location),
            ("crop", &analysis.crop),
        ];
        for (key, value) in fields {
            if let Some(value) = value.as_deref().filter(|value| !value.trim().is_empty()) {
                payload.insert(key.into(), value.into());
            }
        }
        if !analysis.metrics_detected.is_empty() {
            payload.insert(
                "metrics_detected".into(),
                Value::Array(
                    analysis
                        .metrics_detected
                        .iter()
                        .map(|metric| Value::String(metric.clone()))
                        .collect(),
                ),
            );
        }
    }

    Value::Object(payload)
}

/// Current timestamp formatted for payload storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Construct an identifier suitable for Qdrant points.
pub(crate) fn generate_point_id() -> String {
    Uuid::new_v4().to_string()
}
