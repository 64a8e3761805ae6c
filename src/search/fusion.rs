//! Pure score fusion and ranking.

use std::collections::BTreeMap;

use serde_json::Value;

use super::types::{ScoredCandidate, SearchError, SearchResult};

/// Effective weights applied to one query, summing to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    /// Dense share.
    pub dense: f64,
    /// Sparse share.
    pub sparse: f64,
}

impl FusionWeights {
    /// Weights after the dense source failed. The sparse survivor carries the whole score,
    /// whatever share it was requested with.
    pub fn without_dense(self) -> Self {
        Self {
            dense: 0.0,
            sparse: 1.0,
        }
    }

    /// Weights after the sparse source failed. The dense survivor carries the whole score.
    pub fn without_sparse(self) -> Self {
        Self {
            dense: 1.0,
            sparse: 0.0,
        }
    }
}

/// Validate requested weights and normalize them to sum to 1.
pub fn resolve_weights(dense: f64, sparse: f64) -> Result<FusionWeights, SearchError> {
    let usable = dense.is_finite() && sparse.is_finite() && dense >= 0.0 && sparse >= 0.0;
    let sum = dense + sparse;
    if !usable || sum <= 0.0 {
        return Err(SearchError::InvalidWeight { dense, sparse });
    }
    if (sum - 1.0).abs() <= f64::EPSILON {
        return Ok(FusionWeights { dense, sparse });
    }
    Ok(FusionWeights {
        dense: dense / sum,
        sparse: sparse / sum,
    })
}

/// Merge both candidate sets by id. A source that did not return an id contributes `0.0`.
pub fn fuse(
    dense: Vec<ScoredCandidate>,
    sparse: Vec<ScoredCandidate>,
    weights: FusionWeights,
) -> Vec<SearchResult> {
    let mut merged: BTreeMap<String, (Option<f64>, Option<f64>, Value)> = BTreeMap::new();

    for candidate in dense {
        let entry = merged
            .entry(candidate.id)
            .or_insert((None, None, candidate.payload));
        entry.0 = Some(entry.0.map_or(candidate.score, |score| score.max(candidate.score)));
    }
    for candidate in sparse {
        let entry = merged
            .entry(candidate.id)
            .or_insert((None, None, candidate.payload));
        entry.1 = Some(entry.1.map_or(candidate.score, |score| score.max(candidate.score)));
    }

    merged
        .into_iter()
        .map(|(id, (dense_score, sparse_score, payload))| {
            let dense_score = dense_score.unwrap_or(0.0);
            let sparse_score = sparse_score.unwrap_or(0.0);
            SearchResult {
                id,
                fused_score: weights.dense * dense_score + weights.sparse * sparse_score,
                dense_score,
                sparse_score,
                payload,
            }
        })
        .collect()
}

/// Sort by fused score, then dense score (both descending), then id ascending.
pub fn rank(results: &mut [SearchResult]) {
    results.sort_by(|left, right| {
        right
            .fused_score
            .total_cmp(&left.fused_score)
            .then_with(|| right.dense_score.total_cmp(&left.dense_score))
            .then_with(|| left.id.cmp(&right.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn candidate(id: &str, score: f64) -> ScoredCandidate {
        ScoredCandidate {
            id: id.to_string(),
            score,
            payload: json!({ "id": id }),
        }
    }

    #[test]
    fn fused_score_is_exact_weighted_sum() {
        let weights = resolve_weights(0.7, 0.3).expect("weights");
        let results = fuse(
            vec![candidate("a", 0.8), candidate("b", 0.9)],
            vec![candidate("a", 0.5)],
            weights,
        );
        let a = results.iter().find(|r| r.id == "a").expect("a");
        let b = results.iter().find(|r| r.id == "b").expect("b");
        assert!((a.fused_score - (0.7 * 0.8 + 0.3 * 0.5)).abs() < 1e-9);
        assert!((b.fused_score - 0.63).abs() < 1e-9);
        assert_eq!(b.sparse_score, 0.0);
    }

    #[test]
    fn weights_are_normalized_when_they_do_not_sum_to_one() {
        let weights = resolve_weights(3.0, 1.0).expect("weights");
        assert!((weights.dense - 0.75).abs() < 1e-12);
        assert!((weights.sparse - 0.25).abs() < 1e-12);
    }

    #[test]
    fn invalid_weights_are_rejected() {
        assert!(matches!(
            resolve_weights(0.0, 0.0),
            Err(SearchError::InvalidWeight { .. })
        ));
        assert!(resolve_weights(-0.5, 1.0).is_err());
        assert!(resolve_weights(f64::NAN, 1.0).is_err());
        assert!(resolve_weights(0.0, 0.4).is_ok());
    }

    #[test]
    fn ranking_breaks_ties_by_dense_then_id() {
        let weights = FusionWeights {
            dense: 0.5,
            sparse: 0.5,
        };
        let mut results = fuse(
            vec![candidate("c", 0.6), candidate("b", 0.4), candidate("a", 0.4)],
            vec![candidate("c", 0.2), candidate("b", 0.4), candidate("a", 0.4)],
            weights,
        );
        rank(&mut results);
        let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn duplicate_candidates_keep_the_best_score() {
        let weights = FusionWeights {
            dense: 1.0,
            sparse: 0.0,
        };
        let results = fuse(
            vec![candidate("a", 0.2), candidate("a", 0.7)],
            Vec::new(),
            weights,
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].dense_score, 0.7);
    }

    #[test]
    fn dropping_a_source_moves_all_weight_to_the_other() {
        let weights = resolve_weights(0.7, 0.3).expect("weights");
        assert_eq!(
            weights.without_sparse(),
            FusionWeights {
                dense: 1.0,
                sparse: 0.0
            }
        );
        let dense_only = resolve_weights(1.0, 0.0).expect("weights");
        assert_eq!(
            dense_only.without_dense(),
            FusionWeights {
                dense: 0.0,
                sparse: 1.0
            }
        );
    }
}
