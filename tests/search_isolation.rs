use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use trialgate::chunking::MarkdownChunker;
use trialgate::embedding::LocalHashEmbedder;
use trialgate::evaluation::{EvaluationContext, Role, RoleAssessment, RoleEvaluator, WorkProduct};
use trialgate::extraction::PlainTextExtractor;
use trialgate::processing::{
    ChunkIndexer, DocumentRequest, IndexingError, ProcessingError, ProcessingService, ReportStore,
};
use trialgate::qdrant::{DocumentContext, QdrantError};
use trialgate::search::{
    HybridSearchEngine, Retriever, RetrieverError, ScoredCandidate, SearchError, SearchSettings,
};
use trialgate::workflow::{
    AnalysisError, AnalysisRecord, Analyzer, Collaborators, ContentValidator, GraphSpec,
    GraphSuggester, GraphSuggestionError, Orchestrator, RawDocument, TerminalStatus, TextChunk,
    ValidationError, WorkflowError, WorkflowSettings, cancel_pair,
};

const SHARED_TRIAL: &str = "# FoliarMax on corn\n\n\
FoliarMax applied at V6 increased corn yield by 11 bushels per acre across strip plots.";

struct StoredChunk {
    id: String,
    cooperative: String,
    form_id: String,
    file_name: String,
    chunk_id: String,
    content: String,
    terminal_status: Option<&'static str>,
}

impl StoredChunk {
    fn payload(&self) -> Value {
        json!({
            "cooperative": self.cooperative,
            "form_id": self.form_id,
            "file_name": self.file_name,
            "chunk_id": self.chunk_id,
            "content": self.content,
            "terminal_status": self.terminal_status,
        })
    }
}

/// Vector store stand-in that applies the cooperative filter while scanning, like a payload
/// filter inside the index would.
struct InMemoryStore {
    chunks: Mutex<Vec<StoredChunk>>,
    embedder: LocalHashEmbedder,
}

impl InMemoryStore {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            chunks: Mutex::new(Vec::new()),
            embedder: LocalHashEmbedder::new(32),
        })
    }

    fn scan(
        &self,
        cooperative: &str,
        limit: usize,
        score: impl Fn(&StoredChunk) -> f64,
    ) -> Vec<ScoredCandidate> {
        let chunks = self.chunks.lock().expect("lock");
        let mut hits: Vec<ScoredCandidate> = chunks
            .iter()
            .filter(|chunk| chunk.cooperative == cooperative)
            .map(|chunk| ScoredCandidate {
                id: chunk.id.clone(),
                score: score(chunk),
                payload: chunk.payload(),
            })
            .filter(|candidate| candidate.score > 0.0)
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        hits
    }

    fn len(&self) -> usize {
        self.chunks.lock().expect("lock").len()
    }
}

#[async_trait]
impl ChunkIndexer for InMemoryStore {
    async fn index(
        &self,
        chunks: &[TextChunk],
        document: DocumentContext<'_>,
    ) -> Result<usize, IndexingError> {
        let mut stored = self.chunks.lock().expect("lock");
        for chunk in chunks {
            stored.push(StoredChunk {
                id: format!("{}:{}", document.form_id, chunk.chunk_id),
                cooperative: document.cooperative.to_string(),
                form_id: document.form_id.to_string(),
                file_name: document.file_name.to_string(),
                chunk_id: chunk.chunk_id.clone(),
                content: chunk.content.clone(),
                terminal_status: document.terminal_status.map(|status| status.as_str()),
            });
        }
        Ok(chunks.len())
    }
}

#[async_trait]
impl ReportStore for InMemoryStore {
    async fn report_payloads(
        &self,
        cooperative: &str,
    ) -> Result<Vec<Map<String, Value>>, QdrantError> {
        let chunks = self.chunks.lock().expect("lock");
        Ok(chunks
            .iter()
            .filter(|chunk| chunk.cooperative == cooperative)
            .filter_map(|chunk| match chunk.payload() {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect())
    }

    async fn delete_report(&self, cooperative: &str, form_id: &str) -> Result<usize, QdrantError> {
        let mut chunks = self.chunks.lock().expect("lock");
        let before = chunks.len();
        chunks.retain(|chunk| !(chunk.cooperative == cooperative && chunk.form_id == form_id));
        Ok(before - chunks.len())
    }
}

struct DenseView(Arc<InMemoryStore>);

#[async_trait]
impl Retriever for DenseView {
    async fn search(
        &self,
        query_text: &str,
        cooperative: &str,
        limit: usize,
    ) -> Result<Vec<ScoredCandidate>, RetrieverError> {
        let query = self.0.embedder.encode(query_text);
        Ok(self.0.scan(cooperative, limit, |chunk| {
            let vector = self.0.embedder.encode(&chunk.content);
            query
                .iter()
                .zip(&vector)
                .map(|(a, b)| f64::from(a * b))
                .sum::<f64>()
                .max(0.0)
        }))
    }
}

struct SparseView(Arc<InMemoryStore>);

#[async_trait]
impl Retriever for SparseView {
    async fn search(
        &self,
        query_text: &str,
        cooperative: &str,
        limit: usize,
    ) -> Result<Vec<ScoredCandidate>, RetrieverError> {
        let terms: HashSet<String> = query_text
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        Ok(self.0.scan(cooperative, limit, |chunk| {
            let content = chunk.content.to_lowercase();
            let matched = terms.iter().filter(|term| content.contains(term.as_str())).count();
            matched as f64 / terms.len().max(1) as f64
        }))
    }
}

struct OfflineRetriever;

#[async_trait]
impl Retriever for OfflineRetriever {
    async fn search(
        &self,
        _query_text: &str,
        _cooperative: &str,
        _limit: usize,
    ) -> Result<Vec<ScoredCandidate>, RetrieverError> {
        Err(RetrieverError::TimedOut)
    }
}

struct AcceptsDemos;

#[async_trait]
impl ContentValidator for AcceptsDemos {
    async fn validate(&self, markdown: &str) -> Result<bool, ValidationError> {
        Ok(!markdown.contains("newsletter"))
    }
}

struct FixedAnalyzer;

#[async_trait]
impl Analyzer for FixedAnalyzer {
    async fn analyze(
        &self,
        _markdown: &str,
        _prior_issues: Option<&[String]>,
    ) -> Result<AnalysisRecord, AnalysisError> {
        Ok(AnalysisRecord {
            product: Some("FoliarMax".into()),
            executive_summary: Some("FoliarMax improved corn yield.".into()),
            ..Default::default()
        })
    }
}

struct NoGraphs;

#[async_trait]
impl GraphSuggester for NoGraphs {
    async fn suggest_graphs(
        &self,
        _analysis: &AnalysisRecord,
    ) -> Result<Vec<GraphSpec>, GraphSuggestionError> {
        Ok(Vec::new())
    }
}

struct Approves;

#[async_trait]
impl RoleEvaluator for Approves {
    async fn evaluate_role(
        &self,
        _role: Role,
        _product: &WorkProduct<'_>,
        _context: &EvaluationContext<'_>,
    ) -> RoleAssessment {
        RoleAssessment {
            score: 0.9,
            findings: Vec::new(),
        }
    }
}

fn orchestrator() -> Orchestrator {
    let collaborators = Collaborators {
        extractor: Arc::new(PlainTextExtractor::new(1024 * 1024)),
        validator: Arc::new(AcceptsDemos),
        analyzer: Arc::new(FixedAnalyzer),
        graph_suggester: Arc::new(NoGraphs),
        chunker: Arc::new(MarkdownChunker::with_whitespace_tokens(64).expect("chunker")),
    };
    Orchestrator::new(WorkflowSettings::default(), collaborators, Arc::new(Approves))
}

fn settings() -> SearchSettings {
    SearchSettings {
        retriever_timeout: Duration::from_secs(5),
        ..SearchSettings::default()
    }
}

fn service(store: Arc<InMemoryStore>, sparse: Arc<dyn Retriever>) -> ProcessingService {
    let search = HybridSearchEngine::new(settings(), Arc::new(DenseView(store.clone())), sparse);
    ProcessingService::new(orchestrator(), store.clone(), store, search, 2)
}

fn request(file_name: &str, content: &str, cooperative: &str) -> DocumentRequest {
    DocumentRequest {
        document: RawDocument::new(file_name, content),
        cooperative: cooperative.into(),
        index: true,
    }
}

#[tokio::test]
async fn tenants_with_identical_documents_never_see_each_other() {
    let store = InMemoryStore::new();
    let service = service(store.clone(), Arc::new(SparseView(store.clone())));

    let north = service
        .process_document(request("north.md", SHARED_TRIAL, "north"))
        .await
        .expect("north");
    let south = service
        .process_document(request("south.md", SHARED_TRIAL, "south"))
        .await
        .expect("south");
    assert_ne!(north.form_id, south.form_id);
    assert!(north.indexed_chunks > 0);
    assert_eq!(store.len(), north.indexed_chunks + south.indexed_chunks);

    for (cooperative, form_id) in [("north", &north.form_id), ("south", &south.form_id)] {
        let response = service
            .search(settings().query("FoliarMax corn yield", cooperative))
            .await
            .expect("search");
        assert!(!response.degraded);
        assert!(!response.results.is_empty());
        for result in &response.results {
            assert_eq!(result.payload["cooperative"], cooperative);
            assert_eq!(&result.payload["form_id"], form_id.as_str());
        }
    }
}

#[tokio::test]
async fn unknown_cooperative_gets_nothing_and_blank_is_refused() {
    let store = InMemoryStore::new();
    let service = service(store.clone(), Arc::new(SparseView(store.clone())));
    service
        .process_document(request("north.md", SHARED_TRIAL, "north"))
        .await
        .expect("north");

    let response = service
        .search(settings().query("FoliarMax", "west"))
        .await
        .expect("search");
    assert!(response.results.is_empty());

    let err = service
        .search(settings().query("FoliarMax", "  "))
        .await
        .expect_err("blank cooperative");
    assert!(matches!(
        err,
        ProcessingError::Search(SearchError::MissingCooperative)
    ));
}

#[tokio::test]
async fn results_stay_isolated_when_a_retriever_is_down() {
    let store = InMemoryStore::new();
    let service = service(store.clone(), Arc::new(OfflineRetriever));
    for cooperative in ["north", "south"] {
        service
            .process_document(request("trial.md", SHARED_TRIAL, cooperative))
            .await
            .expect("indexed");
    }

    let response = service
        .search(settings().query("FoliarMax corn", "south"))
        .await
        .expect("degraded search");

    assert!(response.degraded);
    assert!(!response.results.is_empty());
    assert!(
        response
            .results
            .iter()
            .all(|result| result.payload["cooperative"] == "south" && result.sparse_score == 0.0)
    );
    let metrics = service.metrics_snapshot();
    assert_eq!(metrics.searches, 1);
    assert_eq!(metrics.degraded_searches, 1);
}

#[tokio::test]
async fn rejected_documents_are_never_indexed() {
    let store = InMemoryStore::new();
    let service = service(store.clone(), Arc::new(SparseView(store.clone())));

    let outcome = service
        .process_document(request("news.md", "Spring newsletter for members.", "north"))
        .await
        .expect("outcome");

    assert_eq!(outcome.state.terminal_status, Some(TerminalStatus::Rejected));
    assert_eq!(outcome.indexed_chunks, 0);
    assert_eq!(store.len(), 0);
    assert_eq!(service.metrics_snapshot().documents_rejected, 1);
}

#[tokio::test]
async fn invalid_cooperative_is_refused_before_the_workflow() {
    let store = InMemoryStore::new();
    let service = service(store.clone(), Arc::new(SparseView(store.clone())));

    let err = service
        .process_document(request("north.md", SHARED_TRIAL, "   "))
        .await
        .expect_err("invalid");

    assert!(matches!(err, ProcessingError::InvalidCooperative(_)));
    assert_eq!(store.len(), 0);
    assert_eq!(service.metrics_snapshot().documents_completed, 0);
}

#[tokio::test]
async fn batch_results_follow_request_order() {
    let store = InMemoryStore::new();
    let service = service(store.clone(), Arc::new(SparseView(store.clone())));

    let outcomes = service
        .process_batch(vec![
            request("a.md", SHARED_TRIAL, "north"),
            request("b.md", "Spring newsletter for members.", "north"),
            request("c.md", SHARED_TRIAL, ""),
            request("d.md", SHARED_TRIAL, "south"),
        ])
        .await;

    assert_eq!(outcomes.len(), 4);
    let status = |index: usize| {
        outcomes[index]
            .as_ref()
            .ok()
            .and_then(|outcome| outcome.state.terminal_status)
    };
    assert_eq!(status(0), Some(TerminalStatus::Completed));
    assert_eq!(status(1), Some(TerminalStatus::Rejected));
    assert!(outcomes[2].is_err());
    assert!(outcomes[3].is_ok());
    assert_eq!(service.metrics_snapshot().documents_completed, 2);
}

#[tokio::test]
async fn reports_are_listed_and_deleted_per_cooperative() {
    let store = InMemoryStore::new();
    let service = service(store.clone(), Arc::new(SparseView(store.clone())));
    let north = service
        .process_document(request("north.md", SHARED_TRIAL, "north"))
        .await
        .expect("north");
    let south = service
        .process_document(request("south.md", SHARED_TRIAL, "south"))
        .await
        .expect("south");

    let listed = service.list_reports(" north ").await.expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].form_id, north.form_id);
    assert_eq!(listed[0].file_name.as_deref(), Some("north.md"));
    assert_eq!(listed[0].terminal_status.as_deref(), Some("completed"));
    assert_eq!(listed[0].chunk_count, north.indexed_chunks);

    let stats = service.report_stats("north").await.expect("stats");
    assert_eq!(stats.reports, 1);
    assert_eq!(stats.chunks, north.indexed_chunks);
    assert_eq!(stats.by_status.get("completed"), Some(&1));

    let err = service
        .delete_report("north", &south.form_id)
        .await
        .expect_err("other tenant");
    assert!(matches!(err, ProcessingError::ReportNotFound { .. }));
    assert_eq!(store.len(), north.indexed_chunks + south.indexed_chunks);

    let deleted = service
        .delete_report("north", &north.form_id)
        .await
        .expect("deleted");
    assert_eq!(deleted.deleted_chunks, north.indexed_chunks);
    assert!(service.list_reports("north").await.expect("list").is_empty());
    assert_eq!(service.list_reports("south").await.expect("list").len(), 1);

    let err = service.delete_report("north", "  ").await.expect_err("blank");
    assert!(matches!(err, ProcessingError::InvalidFormId(_)));
}

#[tokio::test]
async fn cancelled_batch_stops_every_run_and_indexes_nothing() {
    let store = InMemoryStore::new();
    let service = service(store.clone(), Arc::new(SparseView(store.clone())));
    let (handle, cancel) = cancel_pair();
    handle.cancel();

    let outcomes = service
        .process_batch_with_cancel(
            vec![
                request("a.md", SHARED_TRIAL, "north"),
                request("b.md", SHARED_TRIAL, "north"),
            ],
            &cancel,
        )
        .await;

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|outcome| matches!(
        outcome,
        Err(ProcessingError::Workflow(WorkflowError::Cancelled { .. }))
    )));
    assert_eq!(store.len(), 0);
    assert_eq!(service.metrics_snapshot().documents_failed, 2);
}
