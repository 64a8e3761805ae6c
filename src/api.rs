//! HTTP surface for trialgate.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `POST /documents` – Run an uploaded document through the quality-gated workflow and, unless
//!   `index` is `false`, index its chunks. Returns the final workflow state.
//! - `POST /documents/batch` – Run several documents concurrently; one entry per document.
//! - `POST /search` – Hybrid dense + sparse search within the caller's cooperative.
//! - `GET /reports/list`, `GET /reports/stats` – Indexed reports of the caller's cooperative.
//! - `DELETE /reports/:form_id` – Remove one report of the caller's cooperative.
//! - `GET /metrics` – Workflow and search counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.
//!
//! Tenant-scoped endpoints require the `X-Cooperative` header. Dropping a request (client
//! disconnect) drops the workflow run with it.

use crate::processing::{
    DeletedReport, DocumentRequest, MAX_BATCH_DOCUMENTS, ProcessingApi, ProcessingError,
    ProcessingOutcome, ReportStats, ReportSummary, normalize_cooperative,
};
use crate::search::{SearchError, SearchQuery, SearchResponse};
use crate::workflow::{RawDocument, WorkflowError, WorkflowState};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Header carrying the tenant key.
pub const COOPERATIVE_HEADER: &str = "x-cooperative";

/// Build the HTTP router exposing the workflow and search API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: ProcessingApi + 'static,
{
    Router::new()
        .route("/documents", post(process_document::<S>))
        .route("/documents/batch", post(process_batch::<S>))
        .route("/search", post(search::<S>))
        .route("/reports/list", get(list_reports::<S>))
        .route("/reports/stats", get(report_stats::<S>))
        .route("/reports/:form_id", delete(delete_report::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .with_state(service)
}

/// Request body for the `POST /documents` endpoint.
#[derive(Deserialize)]
struct DocumentBody {
    /// Original file name; its extension selects the extraction strategy.
    file_name: String,
    /// File contents as text.
    content: String,
    /// Index the chunks after a non-rejected run.
    #[serde(default = "default_index")]
    index: bool,
}

fn default_index() -> bool {
    true
}

impl DocumentBody {
    fn into_request(self, cooperative: String) -> DocumentRequest {
        DocumentRequest {
            document: RawDocument::new(self.file_name, self.content),
            cooperative,
            index: self.index,
        }
    }
}

/// Success response for the `POST /documents` endpoint.
#[derive(Serialize)]
struct DocumentResponse {
    form_id: String,
    indexed_chunks: usize,
    state: WorkflowState,
}

impl From<ProcessingOutcome> for DocumentResponse {
    fn from(outcome: ProcessingOutcome) -> Self {
        Self {
            form_id: outcome.form_id,
            indexed_chunks: outcome.indexed_chunks,
            state: outcome.state,
        }
    }
}

async fn process_document<S>(
    State(service): State<Arc<S>>,
    headers: HeaderMap,
    Json(body): Json<DocumentBody>,
) -> Result<Json<DocumentResponse>, AppError>
where
    S: ProcessingApi,
{
    let cooperative = cooperative_from(&headers)?;
    let outcome = service.process_document(body.into_request(cooperative)).await?;
    tracing::info!(
        form_id = %outcome.form_id,
        status = outcome.state.terminal_status.map(|status| status.as_str()).unwrap_or("unknown"),
        indexed = outcome.indexed_chunks,
        "Document request completed"
    );
    Ok(Json(outcome.into()))
}

/// Request body for the `POST /documents/batch` endpoint.
#[derive(Deserialize)]
struct BatchBody {
    documents: Vec<DocumentBody>,
}

/// One entry of a batch reply: the run's outcome, or the error body a single request would get.
#[derive(Serialize)]
#[serde(untagged)]
enum BatchEntry {
    Processed(DocumentResponse),
    Failed(serde_json::Value),
}

#[derive(Serialize)]
struct BatchResponse {
    results: Vec<BatchEntry>,
}

async fn process_batch<S>(
    State(service): State<Arc<S>>,
    headers: HeaderMap,
    Json(body): Json<BatchBody>,
) -> Result<Json<BatchResponse>, AppError>
where
    S: ProcessingApi,
{
    let cooperative = cooperative_from(&headers)?;
    let count = body.documents.len();
    if count == 0 || count > MAX_BATCH_DOCUMENTS {
        return Err(ProcessingError::InvalidBatch(format!(
            "expected 1 to {MAX_BATCH_DOCUMENTS} documents, got {count}"
        ))
        .into());
    }

    let requests = body
        .documents
        .into_iter()
        .map(|document| document.into_request(cooperative.clone()))
        .collect();
    let results: Vec<_> = service
        .process_batch(requests)
        .await
        .into_iter()
        .map(|result| match result {
            Ok(outcome) => BatchEntry::Processed(outcome.into()),
            Err(error) => BatchEntry::Failed(error_body(&error)),
        })
        .collect();
    let failed = results
        .iter()
        .filter(|entry| matches!(entry, BatchEntry::Failed(_)))
        .count();
    tracing::info!(documents = count, failed, "Batch request completed");
    Ok(Json(BatchResponse { results }))
}

/// Request body for the `POST /search` endpoint. Omitted fields take the configured defaults.
#[derive(Deserialize)]
struct SearchBody {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
    #[serde(default)]
    dense_weight: Option<f64>,
    #[serde(default)]
    sparse_weight: Option<f64>,
}

async fn search<S>(
    State(service): State<Arc<S>>,
    headers: HeaderMap,
    Json(body): Json<SearchBody>,
) -> Result<Json<SearchResponse>, AppError>
where
    S: ProcessingApi,
{
    let cooperative = cooperative_from(&headers)?;
    let defaults = service.search_settings();
    let query = SearchQuery {
        text: body.query,
        top_k: body.top_k.unwrap_or(defaults.default_top_k),
        cooperative,
        dense_weight: body.dense_weight.unwrap_or(defaults.dense_weight),
        sparse_weight: body.sparse_weight.unwrap_or(defaults.sparse_weight),
    };
    let response = service.search(query).await?;
    Ok(Json(response))
}

async fn list_reports<S>(
    State(service): State<Arc<S>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError>
where
    S: ProcessingApi,
{
    let cooperative = cooperative_from(&headers)?;
    let reports: Vec<ReportSummary> = service.list_reports(&cooperative).await?;
    Ok(Json(json!({
        "cooperative": cooperative,
        "total": reports.len(),
        "reports": reports,
    })))
}

async fn report_stats<S>(
    State(service): State<Arc<S>>,
    headers: HeaderMap,
) -> Result<Json<ReportStats>, AppError>
where
    S: ProcessingApi,
{
    let cooperative = cooperative_from(&headers)?;
    Ok(Json(service.report_stats(&cooperative).await?))
}

async fn delete_report<S>(
    State(service): State<Arc<S>>,
    headers: HeaderMap,
    Path(form_id): Path<String>,
) -> Result<Json<DeletedReport>, AppError>
where
    S: ProcessingApi,
{
    let cooperative = cooperative_from(&headers)?;
    let deleted = service.delete_report(&cooperative, &form_id).await?;
    tracing::info!(
        form_id = %deleted.form_id,
        chunks = deleted.deleted_chunks,
        "Report delete request completed"
    );
    Ok(Json(deleted))
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<crate::metrics::MetricsSnapshot>
where
    S: ProcessingApi,
{
    Json(service.metrics_snapshot())
}

fn cooperative_from(headers: &HeaderMap) -> Result<String, AppError> {
    let raw = headers
        .get(COOPERATIVE_HEADER)
        .ok_or_else(|| {
            ProcessingError::InvalidCooperative("X-Cooperative header is required".into())
        })?
        .to_str()
        .map_err(|_| ProcessingError::InvalidCooperative("X-Cooperative must be text".into()))?;
    Ok(normalize_cooperative(raw)?)
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "process_document",
                method: "POST",
                path: "/documents",
                description: "Run a markdown or text trial document through extraction, validation, analysis, graph suggestion and chunking with quality gates. Requires the X-Cooperative header.",
                request_example: Some(json!({
                    "file_name": "maize-trial.md",
                    "content": "# FoliarMax on maize\n...",
                    "index": true
                })),
            },
            CommandDescriptor {
                name: "process_batch",
                method: "POST",
                path: "/documents/batch",
                description: "Run up to 50 documents concurrently for one cooperative. Each entry of the reply is either the run outcome or its error.",
                request_example: Some(json!({
                    "documents": [
                        { "file_name": "maize-trial.md", "content": "# FoliarMax on maize\n..." },
                        {
                            "file_name": "rice-trial.txt",
                            "content": "Rice trial at ...",
                            "index": false
                        }
                    ]
                })),
            },
            CommandDescriptor {
                name: "search",
                method: "POST",
                path: "/search",
                description: "Hybrid dense + keyword search over the caller's cooperative. Requires the X-Cooperative header.",
                request_example: Some(json!({
                    "query": "foliar fertilizer yield increase",
                    "top_k": 5,
                    "dense_weight": 0.7,
                    "sparse_weight": 0.3
                })),
            },
            CommandDescriptor {
                name: "list_reports",
                method: "GET",
                path: "/reports/list",
                description: "List the indexed reports of the caller's cooperative, newest first.",
                request_example: None,
            },
            CommandDescriptor {
                name: "report_stats",
                method: "GET",
                path: "/reports/stats",
                description: "Count the caller's reports and chunks by terminal status.",
                request_example: None,
            },
            CommandDescriptor {
                name: "delete_report",
                method: "DELETE",
                path: "/reports/:form_id",
                description: "Delete every chunk of one report owned by the caller's cooperative.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return workflow outcome and search counters.",
                request_example: None,
            },
        ],
    })
}

struct AppError(ProcessingError);

impl AppError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            ProcessingError::InvalidCooperative(_)
            | ProcessingError::InvalidFormId(_)
            | ProcessingError::InvalidBatch(_) => StatusCode::BAD_REQUEST,
            ProcessingError::ReportNotFound { .. } => StatusCode::NOT_FOUND,
            ProcessingError::Search(SearchError::RetrievalUnavailable { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ProcessingError::Search(_) => StatusCode::BAD_REQUEST,
            ProcessingError::Workflow(error) => match error {
                WorkflowError::Extraction { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                WorkflowError::Validation { .. }
                | WorkflowError::Analysis { .. }
                | WorkflowError::GraphSuggestion { .. } => StatusCode::BAD_GATEWAY,
                WorkflowError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                WorkflowError::Cancelled { .. } => StatusCode::SERVICE_UNAVAILABLE,
                WorkflowError::Chunking { .. } | WorkflowError::MissingInput { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ProcessingError::Indexing(_) | ProcessingError::Reports(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ProcessingError::Setup(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON error body, with the failing stage for workflow errors.
fn error_body(error: &ProcessingError) -> serde_json::Value {
    let mut body = json!({ "error": error.to_string() });
    if let ProcessingError::Workflow(error) = error {
        body["stage"] = json!(error.stage().as_str());
    }
    body
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = error_body(&self.0);
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self.0, "Request failed");
        }
        (status, Json(body)).into_response()
    }
}

impl From<ProcessingError> for AppError {
    fn from(inner: ProcessingError) -> Self {
        Self(inner)
    }
}
