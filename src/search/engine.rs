//! Hybrid search engine: concurrent retrieval, degraded mode and fused ranking.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::fusion;
use super::types::{
    MAX_QUERY_CHARS, Retriever, RetrieverError, ScoredCandidate, SearchError, SearchQuery,
    SearchResponse,
};

/// Search tunables, resolved from configuration at startup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchSettings {
    /// `top_k` applied when the caller gives none.
    pub default_top_k: usize,
    /// Upper bound on `top_k`; also the floor of the per-retriever candidate limit.
    pub max_top_k: usize,
    /// Default dense weight.
    pub dense_weight: f64,
    /// Default sparse weight.
    pub sparse_weight: f64,
    /// Candidates requested per retriever, as a multiple of `top_k`.
    pub overfetch_multiplier: usize,
    /// Bound on each retriever call.
    pub retriever_timeout: Duration,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            max_top_k: 100,
            dense_weight: 0.7,
            sparse_weight: 0.3,
            overfetch_multiplier: 4,
            retriever_timeout: Duration::from_secs(30),
        }
    }
}

impl SearchSettings {
    /// Query for `text` in `cooperative` carrying the default `top_k` and weights.
    pub fn query(&self, text: impl Into<String>, cooperative: impl Into<String>) -> SearchQuery {
        SearchQuery {
            text: text.into(),
            top_k: self.default_top_k,
            cooperative: cooperative.into(),
            dense_weight: self.dense_weight,
            sparse_weight: self.sparse_weight,
        }
    }

    /// Candidates requested from each retriever for a clamped `top_k`.
    pub fn candidate_limit(&self, top_k: usize) -> usize {
        top_k
            .saturating_mul(self.overfetch_multiplier.max(1))
            .max(self.max_top_k)
    }
}

/// Fuses a dense and a sparse retriever into one ranked, tenant-scoped result list.
///
/// The engine only reads from its retrievers and holds no mutable state, so it is shared freely
/// across requests.
pub struct HybridSearchEngine {
    settings: SearchSettings,
    dense: Arc<dyn Retriever>,
    sparse: Arc<dyn Retriever>,
}

impl HybridSearchEngine {
    /// Build an engine over the two retrievers.
    pub fn new(
        settings: SearchSettings,
        dense: Arc<dyn Retriever>,
        sparse: Arc<dyn Retriever>,
    ) -> Self {
        Self {
            settings,
            dense,
            sparse,
        }
    }

    /// Active settings.
    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// Run `query` against both retrievers and return the fused ranking.
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, SearchError> {
        let text = query.text.trim();
        if text.is_empty() {
            return Err(SearchError::InvalidQuery("query text is empty".into()));
        }
        if text.chars().count() > MAX_QUERY_CHARS {
            return Err(SearchError::InvalidQuery(format!(
                "query text exceeds {MAX_QUERY_CHARS} characters"
            )));
        }
        let cooperative = query.cooperative.trim();
        if cooperative.is_empty() {
            return Err(SearchError::MissingCooperative);
        }

        let weights = fusion::resolve_weights(query.dense_weight, query.sparse_weight)?;
        let top_k = query.top_k.clamp(1, self.settings.max_top_k.max(1));
        let limit = self.settings.candidate_limit(top_k);

        let (dense, sparse) = tokio::join!(
            self.bounded(self.dense.as_ref(), text, cooperative, limit),
            self.bounded(self.sparse.as_ref(), text, cooperative, limit),
        );

        let (dense_hits, sparse_hits, weights, degraded) = match (dense, sparse) {
            (Ok(dense_hits), Ok(sparse_hits)) => (dense_hits, sparse_hits, weights, false),
            (Ok(dense_hits), Err(err)) => {
                tracing::warn!(error = %err, cooperative, "Sparse retriever failed; dense only");
                (dense_hits, Vec::new(), weights.without_sparse(), true)
            }
            (Err(err), Ok(sparse_hits)) => {
                tracing::warn!(error = %err, cooperative, "Dense retriever failed; sparse only");
                (Vec::new(), sparse_hits, weights.without_dense(), true)
            }
            (Err(dense_err), Err(sparse_err)) => {
                tracing::error!(
                    dense = %dense_err,
                    sparse = %sparse_err,
                    cooperative,
                    "Both retrievers failed"
                );
                return Err(SearchError::RetrievalUnavailable {
                    dense: dense_err.to_string(),
                    sparse: sparse_err.to_string(),
                });
            }
        };

        let mut results = fusion::fuse(dense_hits, sparse_hits, weights);
        fusion::rank(&mut results);
        results.truncate(top_k);

        tracing::info!(
            cooperative,
            top_k,
            returned = results.len(),
            degraded,
            "Hybrid search complete"
        );

        Ok(SearchResponse { results, degraded })
    }

    async fn bounded(
        &self,
        retriever: &dyn Retriever,
        text: &str,
        cooperative: &str,
        limit: usize,
    ) -> Result<Vec<ScoredCandidate>, RetrieverError> {
        match tokio::time::timeout(
            self.settings.retriever_timeout,
            retriever.search(text, cooperative, limit),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(RetrieverError::TimedOut),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    use crate::qdrant::QdrantError;

    struct FixedRetriever {
        hits: Vec<(&'static str, f64)>,
        fail: bool,
        seen: Mutex<Vec<(String, usize)>>,
    }

    impl FixedRetriever {
        fn new(hits: &[(&'static str, f64)]) -> Self {
            Self {
                hits: hits.to_vec(),
                fail: false,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                hits: Vec::new(),
                fail: true,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Retriever for FixedRetriever {
        async fn search(
            &self,
            _query_text: &str,
            cooperative: &str,
            limit: usize,
        ) -> Result<Vec<ScoredCandidate>, RetrieverError> {
            self.seen
                .lock()
                .expect("lock")
                .push((cooperative.to_string(), limit));
            if self.fail {
                return Err(RetrieverError::Store(QdrantError::UnexpectedStatus {
                    status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                    body: "index offline".into(),
                }));
            }
            Ok(self
                .hits
                .iter()
                .map(|(id, score)| ScoredCandidate {
                    id: id.to_string(),
                    score: *score,
                    payload: json!({ "cooperative": cooperative }),
                })
                .collect())
        }
    }

    fn engine(dense: FixedRetriever, sparse: FixedRetriever) -> HybridSearchEngine {
        HybridSearchEngine::new(SearchSettings::default(), Arc::new(dense), Arc::new(sparse))
    }

    #[tokio::test]
    async fn document_found_by_dense_only_is_penalized() {
        let engine = engine(
            FixedRetriever::new(&[("x", 0.9), ("y", 0.8)]),
            FixedRetriever::new(&[("y", 0.9)]),
        );
        let query = engine.settings().query("foliar yield", "coop-a");

        let response = engine.search(&query).await.expect("search");

        assert!(!response.degraded);
        let x = response.results.iter().find(|r| r.id == "x").expect("x");
        assert!((x.fused_score - 0.63).abs() < 1e-9);
        assert_eq!(x.sparse_score, 0.0);
        assert_eq!(response.results[0].id, "y");
    }

    #[tokio::test]
    async fn over_fetch_uses_floor_and_passes_cooperative() {
        let dense = Arc::new(FixedRetriever::new(&[]));
        let sparse = Arc::new(FixedRetriever::new(&[]));
        let engine =
            HybridSearchEngine::new(SearchSettings::default(), dense.clone(), sparse.clone());
        let mut query = engine.settings().query("yield", "  coop-a ");
        query.top_k = 50;

        engine.search(&query).await.expect("search");

        assert_eq!(
            dense.seen.lock().expect("lock").as_slice(),
            &[("coop-a".to_string(), 200)]
        );
        query.top_k = 0;
        engine.search(&query).await.expect("search");
        assert_eq!(sparse.seen.lock().expect("lock")[1], ("coop-a".to_string(), 100));
    }

    #[tokio::test]
    async fn results_are_truncated_to_top_k() {
        let engine = engine(
            FixedRetriever::new(&[("a", 0.9), ("b", 0.8), ("c", 0.7)]),
            FixedRetriever::new(&[]),
        );
        let mut query = engine.settings().query("yield", "coop-a");
        query.top_k = 2;

        let response = engine.search(&query).await.expect("search");
        let ids: Vec<_> = response.results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn single_failure_degrades_to_surviving_source() {
        let engine = engine(FixedRetriever::failing(), FixedRetriever::new(&[("s", 0.4)]));
        let query = engine.settings().query("yield", "coop-a");

        let response = engine.search(&query).await.expect("search");

        assert!(response.degraded);
        assert_eq!(response.results.len(), 1);
        assert!((response.results[0].fused_score - 0.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn both_failures_are_unavailable() {
        let engine = engine(FixedRetriever::failing(), FixedRetriever::failing());
        let query = engine.settings().query("yield", "coop-a");

        let err = engine.search(&query).await.expect_err("must fail");
        assert!(matches!(err, SearchError::RetrievalUnavailable { .. }));
    }

    #[tokio::test]
    async fn surviving_source_with_zero_weight_still_answers() {
        let engine = engine(FixedRetriever::new(&[("d", 0.9)]), FixedRetriever::failing());
        let mut query = engine.settings().query("yield", "coop-a");
        query.dense_weight = 0.0;
        query.sparse_weight = 1.0;

        let response = engine.search(&query).await.expect("degraded search");

        assert!(response.degraded);
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].id, "d");
        assert!((response.results[0].fused_score - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected_before_retrieval() {
        let dense = Arc::new(FixedRetriever::new(&[]));
        let engine = HybridSearchEngine::new(
            SearchSettings::default(),
            dense.clone(),
            Arc::new(FixedRetriever::new(&[])),
        );

        let blank = engine.settings().query("yield", "   ");
        assert!(matches!(
            engine.search(&blank).await,
            Err(SearchError::MissingCooperative)
        ));

        let empty = engine.settings().query("  ", "coop-a");
        assert!(matches!(
            engine.search(&empty).await,
            Err(SearchError::InvalidQuery(_))
        ));

        let long = engine.settings().query("y".repeat(MAX_QUERY_CHARS + 1), "coop-a");
        assert!(matches!(
            engine.search(&long).await,
            Err(SearchError::InvalidQuery(_))
        ));

        let mut weightless = engine.settings().query("yield", "coop-a");
        weightless.dense_weight = 0.0;
        weightless.sparse_weight = 0.0;
        assert!(matches!(
            engine.search(&weightless).await,
            Err(SearchError::InvalidWeight { .. })
        ));

        assert!(dense.seen.lock().expect("lock").is_empty());
    }
}
