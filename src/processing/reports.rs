//! Per-cooperative report listing, statistics, and deletion.
//!
//! A report is the set of indexed chunks sharing one `form_id`. Every read and delete goes
//! through a cooperative filter evaluated inside the store, so one tenant never observes
//! another tenant's reports.

use std::collections::{BTreeMap, btree_map::Entry};

use async_trait::async_trait;
use futures_util::TryStreamExt;
use serde::Serialize;
use serde_json::{Map, Value, json};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use super::indexing::QdrantIndexer;
use crate::qdrant::{QdrantError, cooperative_filter, document_filter, scroller::stream_payloads};

/// Payload fields read when listing reports; chunk text and vectors stay in the store.
const SUMMARY_FIELDS: [&str; 8] = [
    "form_id",
    "file_name",
    "product",
    "crop",
    "cooperator",
    "location",
    "terminal_status",
    "timestamp",
];

/// Read and delete access to the indexed reports of one cooperative.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Summary payloads of every chunk owned by `cooperative`.
    async fn report_payloads(
        &self,
        cooperative: &str,
    ) -> Result<Vec<Map<String, Value>>, QdrantError>;

    /// Delete the chunks of `form_id` owned by `cooperative`, returning how many matched.
    async fn delete_report(&self, cooperative: &str, form_id: &str) -> Result<usize, QdrantError>;
}

/// One indexed document as seen by its cooperative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    /// Identifier shared by the report's chunks.
    pub form_id: String,
    /// Uploaded file name.
    pub file_name: Option<String>,
    /// Product under trial.
    pub product: Option<String>,
    /// Crop the product was applied to.
    pub crop: Option<String>,
    /// Farmer or organisation running the trial.
    pub cooperator: Option<String>,
    /// Trial site.
    pub location: Option<String>,
    /// Final status of the run that produced the report.
    pub terminal_status: Option<String>,
    /// Latest chunk timestamp (RFC 3339).
    pub indexed_at: Option<String>,
    /// Chunks stored for the report.
    pub chunk_count: usize,
}

/// Totals over the reports of one cooperative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportStats {
    /// Cooperative the totals cover.
    pub cooperative: String,
    /// Distinct reports.
    pub reports: usize,
    /// Chunks across all reports.
    pub chunks: usize,
    /// Reports per terminal status; reports without a status count as `unknown`.
    pub by_status: BTreeMap<String, usize>,
}

/// Result of deleting one report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletedReport {
    /// Identifier of the deleted report.
    pub form_id: String,
    /// Chunks removed from the store.
    pub deleted_chunks: usize,
}

impl ReportStats {
    /// Aggregate `reports` for `cooperative`.
    pub fn from_reports(cooperative: impl Into<String>, reports: &[ReportSummary]) -> Self {
        let mut by_status = BTreeMap::new();
        for report in reports {
            let status = report.terminal_status.as_deref().unwrap_or("unknown");
            *by_status.entry(status.to_string()).or_insert(0) += 1;
        }
        Self {
            cooperative: cooperative.into(),
            reports: reports.len(),
            chunks: reports.iter().map(|report| report.chunk_count).sum(),
            by_status,
        }
    }
}

/// Group chunk payloads by `form_id`, newest report first.
///
/// Payloads without a `form_id` are skipped. Document fields come from the first chunk that
/// carries them.
pub fn summarize_reports<I>(payloads: I) -> Vec<ReportSummary>
where
    I: IntoIterator<Item = Map<String, Value>>,
{
    let mut reports: BTreeMap<String, ReportSummary> = BTreeMap::new();

    for payload in payloads {
        let Some(form_id) = text_field(&payload, "form_id") else {
            continue;
        };
        let report = match reports.entry(form_id) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let form_id = entry.key().clone();
                entry.insert(ReportSummary {
                    form_id,
                    file_name: None,
                    product: None,
                    crop: None,
                    cooperator: None,
                    location: None,
                    terminal_status: None,
                    indexed_at: None,
                    chunk_count: 0,
                })
            }
        };

        report.chunk_count += 1;
        let slots = [
            (&mut report.file_name, "file_name"),
            (&mut report.product, "product"),
            (&mut report.crop, "crop"),
            (&mut report.cooperator, "cooperator"),
            (&mut report.location, "location"),
            (&mut report.terminal_status, "terminal_status"),
        ];
        for (slot, key) in slots {
            if slot.is_none() {
                *slot = text_field(&payload, key);
            }
        }
        if let Some(timestamp) = text_field(&payload, "timestamp")
            && parse_timestamp(Some(&timestamp)) > parse_timestamp(report.indexed_at.as_deref())
        {
            report.indexed_at = Some(timestamp);
        }
    }

    let mut reports: Vec<_> = reports.into_values().collect();
    reports.sort_by(|left, right| {
        parse_timestamp(right.indexed_at.as_deref())
            .cmp(&parse_timestamp(left.indexed_at.as_deref()))
            .then_with(|| left.form_id.cmp(&right.form_id))
    });
    reports
}

fn text_field(payload: &Map<String, Value>, key: &str) -> Option<String> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Unparsable or missing timestamps order before every real one.
fn parse_timestamp(raw: Option<&str>) -> Option<OffsetDateTime> {
    raw.and_then(|value| OffsetDateTime::parse(value, &Rfc3339).ok())
}

#[async_trait]
impl ReportStore for QdrantIndexer {
    async fn report_payloads(
        &self,
        cooperative: &str,
    ) -> Result<Vec<Map<String, Value>>, QdrantError> {
        let Some(filter) = cooperative_filter(cooperative) else {
            return Ok(Vec::new());
        };
        let payloads: Vec<_> = stream_payloads(
            &self.store,
            &self.collection,
            json!(SUMMARY_FIELDS),
            filter,
        )
        .try_collect()
        .await?;
        tracing::debug!(cooperative, chunks = payloads.len(), "Report payloads scrolled");
        Ok(payloads)
    }

    async fn delete_report(&self, cooperative: &str, form_id: &str) -> Result<usize, QdrantError> {
        let Some(filter) = document_filter(cooperative, form_id) else {
            return Ok(0);
        };
        let matched = self
            .store
            .count_points(&self.collection, filter.clone())
            .await?;
        if matched == 0 {
            return Ok(0);
        }
        self.store.delete_points(&self.collection, filter).await?;
        tracing::info!(cooperative, form_id, chunks = matched, "Report deleted");
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::LocalHashEmbedder;
    use crate::qdrant::client::tests::service_for;
    use httpmock::{Method::POST, MockServer};
    use std::sync::Arc;

    fn payload(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn indexer(server: &MockServer) -> QdrantIndexer {
        QdrantIndexer::new(
            Arc::new(service_for(server)),
            "trials",
            Arc::new(LocalHashEmbedder::new(4)),
        )
    }

    #[test]
    fn chunks_group_into_reports_newest_first() {
        let reports = summarize_reports([
            payload(json!({
                "form_id": "old",
                "file_name": "a.md",
                "terminal_status": "completed",
                "timestamp": "2025-03-01T10:00:00Z"
            })),
            payload(json!({
                "form_id": "new",
                "file_name": "b.md",
                "product": "FoliarMax",
                "terminal_status": "needs_review",
                "timestamp": "2025-04-01T10:00:00Z"
            })),
            payload(json!({
                "form_id": "old",
                "crop": "maize",
                "timestamp": "2025-03-01T10:00:00Z"
            })),
            payload(json!({ "file_name": "orphan.md" })),
        ]);

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].form_id, "new");
        assert_eq!(reports[0].product.as_deref(), Some("FoliarMax"));
        assert_eq!(reports[1].form_id, "old");
        assert_eq!(reports[1].chunk_count, 2);
        assert_eq!(reports[1].file_name.as_deref(), Some("a.md"));
        assert_eq!(reports[1].crop.as_deref(), Some("maize"));
        assert_eq!(reports[1].indexed_at.as_deref(), Some("2025-03-01T10:00:00Z"));
    }

    #[test]
    fn undated_reports_sort_last_by_form_id() {
        let reports = summarize_reports([
            payload(json!({ "form_id": "b" })),
            payload(json!({ "form_id": "a", "timestamp": "not a date" })),
            payload(json!({ "form_id": "c", "timestamp": "2025-01-01T00:00:00Z" })),
        ]);
        let order: Vec<_> = reports.iter().map(|report| report.form_id.as_str()).collect();
        assert_eq!(order, ["c", "a", "b"]);
    }

    #[test]
    fn stats_count_reports_per_status() {
        let reports = summarize_reports([
            payload(json!({ "form_id": "a", "terminal_status": "completed" })),
            payload(json!({ "form_id": "a", "terminal_status": "completed" })),
            payload(json!({ "form_id": "b", "terminal_status": "needs_review" })),
            payload(json!({ "form_id": "c" })),
        ]);
        let stats = ReportStats::from_reports("north", &reports);

        assert_eq!(stats.reports, 3);
        assert_eq!(stats.chunks, 4);
        assert_eq!(stats.by_status.get("completed"), Some(&1));
        assert_eq!(stats.by_status.get("needs_review"), Some(&1));
        assert_eq!(stats.by_status.get("unknown"), Some(&1));
    }

    #[tokio::test]
    async fn listing_scrolls_only_the_callers_cooperative() {
        let server = MockServer::start_async().await;
        let scroll = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/trials/points/scroll")
                    .json_body_partial(
                        r#"{"with_vector":false,"filter":{"must":[{"key":"cooperative","match":{"value":"north"}}]}}"#,
                    )
                    .body_contains("\"terminal_status\"");
                then.status(200).json_body(json!({
                    "result": {
                        "points": [{ "id": "p1", "payload": { "form_id": "f1" } }],
                        "next_page_offset": null
                    }
                }));
            })
            .await;

        let payloads = indexer(&server)
            .report_payloads("north")
            .await
            .expect("payloads");

        scroll.assert_async().await;
        assert_eq!(payloads.len(), 1);
    }

    #[tokio::test]
    async fn deleting_an_unknown_report_skips_the_delete_call() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/trials/points/count");
                then.status(200)
                    .json_body(json!({ "status": "ok", "result": { "count": 0 } }));
            })
            .await;
        let delete = server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/trials/points/delete");
                then.status(200).json_body(json!({ "status": "ok" }));
            })
            .await;

        let deleted = indexer(&server)
            .delete_report("north", "f1")
            .await
            .expect("count");

        assert_eq!(deleted, 0);
        delete.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn deleting_a_report_filters_by_tenant_and_form() {
        let server = MockServer::start_async().await;
        let filter = r#"{"filter":{"must":[{"key":"cooperative","match":{"value":"north"}},{"key":"form_id","match":{"value":"f1"}}]}}"#;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/trials/points/count")
                    .json_body_partial(filter);
                then.status(200)
                    .json_body(json!({ "status": "ok", "result": { "count": 3 } }));
            })
            .await;
        let delete = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/trials/points/delete")
                    .json_body_partial(filter);
                then.status(200).json_body(json!({ "status": "ok" }));
            })
            .await;

        let deleted = indexer(&server)
            .delete_report("north", "f1")
            .await
            .expect("deleted");

        delete.assert_async().await;
        assert_eq!(deleted, 3);
    }
}
