//! Processing service coordinating the workflow, indexing, reports, and hybrid search.

use crate::{
    chunking::MarkdownChunker,
    config::Config,
    embedding::build_embedding_client,
    extraction::PlainTextExtractor,
    llm::{
        LlmAnalyzer, LlmClient, LlmGraphSuggester, LlmRoleEvaluator, LlmValidator,
        OllamaLlmClient,
    },
    metrics::{MetricsSnapshot, WorkflowMetrics},
    processing::{
        indexing::{ChunkIndexer, QdrantIndexer},
        reports::{DeletedReport, ReportStats, ReportStore, ReportSummary, summarize_reports},
        types::{
            DocumentRequest, ProcessingError, ProcessingOutcome, normalize_cooperative,
            normalize_form_id,
        },
    },
    qdrant::{DocumentContext, QdrantDenseRetriever, QdrantService, QdrantSparseRetriever},
    search::{HybridSearchEngine, SearchQuery, SearchResponse, SearchSettings},
    workflow::{CancelSignal, Collaborators, Orchestrator, TerminalStatus},
};
use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use std::sync::Arc;
use uuid::Uuid;

const TOKEN_ENCODING: &str = "cl100k_base";

/// Runs documents through the workflow, indexes the results, and answers searches.
///
/// The service owns long-lived handles to the orchestrator, the chunk store, and the search
/// engine so that the HTTP surface and the CLI reuse the same components. Construct it once
/// near process start and share it through an `Arc`.
pub struct ProcessingService {
    orchestrator: Orchestrator,
    indexer: Arc<dyn ChunkIndexer>,
    reports: Arc<dyn ReportStore>,
    search: HybridSearchEngine,
    metrics: Arc<WorkflowMetrics>,
    concurrency: usize,
}

/// Abstraction over the processing pipeline used by external surfaces.
#[async_trait]
pub trait ProcessingApi: Send + Sync {
    /// Run one document through the workflow and index it when requested.
    async fn process_document(
        &self,
        request: DocumentRequest,
    ) -> Result<ProcessingOutcome, ProcessingError>;

    /// Run several documents concurrently; results follow request order.
    async fn process_batch(
        &self,
        requests: Vec<DocumentRequest>,
    ) -> Vec<Result<ProcessingOutcome, ProcessingError>>;

    /// Answer a hybrid search query.
    async fn search(&self, query: SearchQuery) -> Result<SearchResponse, ProcessingError>;

    /// Reports indexed for `cooperative`, newest first.
    async fn list_reports(&self, cooperative: &str) -> Result<Vec<ReportSummary>, ProcessingError>;

    /// Report and chunk totals for `cooperative`.
    async fn report_stats(&self, cooperative: &str) -> Result<ReportStats, ProcessingError>;

    /// Delete one report of `cooperative`.
    async fn delete_report(
        &self,
        cooperative: &str,
        form_id: &str,
    ) -> Result<DeletedReport, ProcessingError>;

    /// Defaults applied to search requests that omit fields.
    fn search_settings(&self) -> SearchSettings;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl ProcessingService {
    /// Assemble a service from already-built components.
    pub fn new(
        orchestrator: Orchestrator,
        indexer: Arc<dyn ChunkIndexer>,
        reports: Arc<dyn ReportStore>,
        search: HybridSearchEngine,
        concurrency: usize,
    ) -> Self {
        Self {
            orchestrator,
            indexer,
            reports,
            search,
            metrics: Arc::new(WorkflowMetrics::new()),
            concurrency: concurrency.max(1),
        }
    }

    /// Build the production wiring described by `config` and ensure the collection exists.
    pub async fn from_config(config: &Config) -> Result<Self, ProcessingError> {
        let orchestrator = build_orchestrator(config)?;
        let embedder = build_embedding_client(config)
            .map_err(|error| ProcessingError::Setup(error.to_string()))?;
        let store = Arc::new(
            QdrantService::new(config).map_err(|error| ProcessingError::Setup(error.to_string()))?,
        );
        let collection = config.qdrant_collection_name.clone();

        let indexer = Arc::new(QdrantIndexer::new(
            store.clone(),
            collection.clone(),
            embedder.clone(),
        ));
        indexer.ensure_collection().await?;

        let search = HybridSearchEngine::new(
            config.search,
            Arc::new(QdrantDenseRetriever::new(store.clone(), collection.clone(), embedder)),
            Arc::new(QdrantSparseRetriever::new(store, collection)),
        );

        tracing::info!(
            collection = %config.qdrant_collection_name,
            concurrency = config.workflow_concurrency,
            "Processing service ready"
        );
        Ok(Self::new(
            orchestrator,
            indexer.clone(),
            indexer,
            search,
            config.workflow_concurrency,
        ))
    }

    /// Run one document and index its chunks when requested.
    pub async fn process_document(
        &self,
        request: DocumentRequest,
    ) -> Result<ProcessingOutcome, ProcessingError> {
        self.process_document_with_cancel(request, &CancelSignal::never())
            .await
    }

    /// Like [`Self::process_document`], aborting the workflow once `cancel` fires.
    pub async fn process_document_with_cancel(
        &self,
        request: DocumentRequest,
        cancel: &CancelSignal,
    ) -> Result<ProcessingOutcome, ProcessingError> {
        let cooperative = normalize_cooperative(&request.cooperative)?;
        let form_id = Uuid::new_v4().to_string();
        tracing::info!(
            file = %request.document.file_name,
            cooperative = %cooperative,
            form_id = %form_id,
            "Processing document"
        );

        let state = match self
            .orchestrator
            .run_with_cancel(&request.document, cancel)
            .await
        {
            Ok(state) => state,
            Err(error) => {
                self.metrics.record_failure();
                tracing::error!(stage = %error.stage(), error = %error, "Workflow aborted");
                return Err(error.into());
            }
        };

        if let Some(status) = state.terminal_status {
            self.metrics.record_run(status);
        }

        let indexable = request.index && state.terminal_status != Some(TerminalStatus::Rejected);
        let indexed_chunks = match state.chunks.as_deref() {
            Some(chunks) if indexable => {
                let document = DocumentContext {
                    cooperative: &cooperative,
                    form_id: &form_id,
                    file_name: &request.document.file_name,
                    analysis: state.analysis_result.as_ref(),
                    terminal_status: state.terminal_status,
                };
                let written = self.indexer.index(chunks, document).await?;
                self.metrics.record_indexed(written as u64);
                written
            }
            _ => 0,
        };

        Ok(ProcessingOutcome {
            form_id,
            state,
            indexed_chunks,
        })
    }

    /// Process independent documents concurrently, at most `WORKFLOW_CONCURRENCY` at a time.
    ///
    /// Results come back in request order; one failure does not affect the other runs.
    pub async fn process_batch(
        &self,
        requests: Vec<DocumentRequest>,
    ) -> Vec<Result<ProcessingOutcome, ProcessingError>> {
        self.process_batch_with_cancel(requests, &CancelSignal::never())
            .await
    }

    /// Like [`Self::process_batch`]; every run still in flight stops once `cancel` fires.
    pub async fn process_batch_with_cancel(
        &self,
        requests: Vec<DocumentRequest>,
        cancel: &CancelSignal,
    ) -> Vec<Result<ProcessingOutcome, ProcessingError>> {
        tracing::info!(
            documents = requests.len(),
            concurrency = self.concurrency,
            "Processing batch"
        );
        stream::iter(requests)
            .map(|request| self.process_document_with_cancel(request, cancel))
            .buffered(self.concurrency)
            .collect()
            .await
    }

    /// Answer a hybrid search query.
    pub async fn search(&self, query: SearchQuery) -> Result<SearchResponse, ProcessingError> {
        let response = self.search.search(&query).await?;
        self.metrics.record_search(response.degraded);
        Ok(response)
    }

    /// Reports indexed for `cooperative`, newest first.
    pub async fn list_reports(
        &self,
        cooperative: &str,
    ) -> Result<Vec<ReportSummary>, ProcessingError> {
        let cooperative = normalize_cooperative(cooperative)?;
        let payloads = self.reports.report_payloads(&cooperative).await?;
        let reports = summarize_reports(payloads);
        tracing::debug!(cooperative = %cooperative, reports = reports.len(), "Reports listed");
        Ok(reports)
    }

    /// Report and chunk totals for `cooperative`.
    pub async fn report_stats(&self, cooperative: &str) -> Result<ReportStats, ProcessingError> {
        let cooperative = normalize_cooperative(cooperative)?;
        let reports = self.list_reports(&cooperative).await?;
        Ok(ReportStats::from_reports(cooperative, &reports))
    }

    /// Delete every chunk of `form_id` within `cooperative`.
    ///
    /// A report owned by another cooperative is indistinguishable from a missing one.
    pub async fn delete_report(
        &self,
        cooperative: &str,
        form_id: &str,
    ) -> Result<DeletedReport, ProcessingError> {
        let cooperative = normalize_cooperative(cooperative)?;
        let form_id = normalize_form_id(form_id)?;
        let deleted_chunks = self.reports.delete_report(&cooperative, &form_id).await?;
        if deleted_chunks == 0 {
            tracing::warn!(cooperative = %cooperative, form_id = %form_id, "Report not found");
            return Err(ProcessingError::ReportNotFound { form_id });
        }
        Ok(DeletedReport {
            form_id,
            deleted_chunks,
        })
    }

    /// Return the current metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// Orchestrator wired with the default collaborators for `config`.
pub fn build_orchestrator(config: &Config) -> Result<Orchestrator, ProcessingError> {
    tracing::info!(
        model = %config.llm_model,
        url = %config.ollama_url,
        "Initializing language model client"
    );
    let llm: Arc<dyn LlmClient> =
        Arc::new(OllamaLlmClient::new(&config.ollama_url, &config.llm_model)?);
    let chunker = MarkdownChunker::new(config.text_splitter_chunk_size, TOKEN_ENCODING)
        .map_err(|error| ProcessingError::Setup(error.to_string()))?;
    let collaborators = Collaborators {
        extractor: Arc::new(PlainTextExtractor::new(config.max_file_size_bytes())),
        validator: Arc::new(LlmValidator::new(llm.clone())),
        analyzer: Arc::new(LlmAnalyzer::new(llm.clone())),
        graph_suggester: Arc::new(LlmGraphSuggester::new(llm.clone())),
        chunker: Arc::new(chunker),
    };
    Ok(Orchestrator::new(
        config.workflow,
        collaborators,
        Arc::new(LlmRoleEvaluator::new(llm)),
    ))
}

#[async_trait]
impl ProcessingApi for ProcessingService {
    async fn process_document(
        &self,
        request: DocumentRequest,
    ) -> Result<ProcessingOutcome, ProcessingError> {
        ProcessingService::process_document(self, request).await
    }

    async fn process_batch(
        &self,
        requests: Vec<DocumentRequest>,
    ) -> Vec<Result<ProcessingOutcome, ProcessingError>> {
        ProcessingService::process_batch(self, requests).await
    }

    async fn search(&self, query: SearchQuery) -> Result<SearchResponse, ProcessingError> {
        ProcessingService::search(self, query).await
    }

    async fn list_reports(&self, cooperative: &str) -> Result<Vec<ReportSummary>, ProcessingError> {
        ProcessingService::list_reports(self, cooperative).await
    }

    async fn report_stats(&self, cooperative: &str) -> Result<ReportStats, ProcessingError> {
        ProcessingService::report_stats(self, cooperative).await
    }

    async fn delete_report(
        &self,
        cooperative: &str,
        form_id: &str,
    ) -> Result<DeletedReport, ProcessingError> {
        ProcessingService::delete_report(self, cooperative, form_id).await
    }

    fn search_settings(&self) -> SearchSettings {
        *self.search.settings()
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        ProcessingService::metrics_snapshot(self)
    }
}
