//! Neighbor ranking and tiered highlighting

use crate::error::{ExploreError, ExploreResult};
use crate::metric::{distance, Metric};
use crate::types::{
    color_for_key, EmbeddingPoint, Rgb, VisualWeight, FOCAL_ALPHA, FOCAL_COLOR, TIER_ALPHAS,
};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// One entry of a ranking: corpus index plus the metric value against
/// the focal point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankedPoint {
    pub index: usize,
    pub metric_value: f32,
}

/// Full ranking of the corpus against a focal point.
///
/// Recomputed wholesale on every focal-point or metric change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborResult {
    pub focal_index: usize,
    pub metric: Metric,
    /// Neighbor count the caller asked for, clamped to the corpus size.
    pub k: usize,
    /// Every corpus index, sorted by the metric's natural order.
    pub ranked: Vec<RankedPoint>,
}

/// Rank every corpus point against the focal point under the metric.
///
/// The focal point itself is included in the scan (its Euclidean
/// self-distance of 0 puts it first). The sort is stable, so equal
/// metric values keep original corpus index order.
pub fn rank(
    corpus: &[EmbeddingPoint],
    focal_index: usize,
    metric: Metric,
    k: usize,
) -> ExploreResult<NeighborResult> {
    if corpus.is_empty() {
        return Err(ExploreError::InvalidInput("corpus is empty".to_string()));
    }
    if focal_index >= corpus.len() {
        return Err(ExploreError::IndexOutOfRange {
            index: focal_index,
            len: corpus.len(),
        });
    }

    let focal = corpus[focal_index].vector();

    #[cfg(feature = "parallel")]
    let values: Vec<ExploreResult<f32>> = corpus
        .par_iter()
        .map(|p| distance(p.vector(), focal, metric))
        .collect();
    #[cfg(not(feature = "parallel"))]
    let values: Vec<ExploreResult<f32>> = corpus
        .iter()
        .map(|p| distance(p.vector(), focal, metric))
        .collect();

    let mut ranked = Vec::with_capacity(corpus.len());
    for (index, value) in values.into_iter().enumerate() {
        ranked.push(RankedPoint {
            index,
            metric_value: value?,
        });
    }

    if metric.ranks_ascending() {
        ranked.sort_by(|a, b| a.metric_value.total_cmp(&b.metric_value));
    } else {
        ranked.sort_by(|a, b| b.metric_value.total_cmp(&a.metric_value));
    }

    Ok(NeighborResult {
        focal_index,
        metric,
        k: k.clamp(1, corpus.len()),
        ranked,
    })
}

/// Apply the tiered highlight for a ranking.
///
/// Every point is reset to neutral gray, the focal point is painted the
/// fixed highlight color, and ranked entries 1..=k get the focal point's
/// base color with the three-level opacity ladder: the closest third of
/// the top-k at 192, the middle third at 128, the farthest third at 64.
pub fn apply_tiers(corpus: &mut [EmbeddingPoint], result: &NeighborResult, focal_color: Rgb) {
    for point in corpus.iter_mut() {
        point.visual = VisualWeight::neutral();
        point.tier = None;
        point.metric_value = 0.0;
    }

    for entry in &result.ranked {
        corpus[entry.index].metric_value = entry.metric_value;
    }

    let tier_size = result.k.div_ceil(3);
    for (rank, entry) in result.ranked.iter().enumerate().skip(1).take(result.k) {
        let tier = ((rank - 1) / tier_size).min(TIER_ALPHAS.len() - 1);
        let point = &mut corpus[entry.index];
        point.tier = Some(tier as u8);
        point.visual = VisualWeight {
            color: focal_color,
            alpha: TIER_ALPHAS[tier],
        };
    }

    let focal = &mut corpus[result.focal_index];
    focal.tier = None;
    focal.visual = VisualWeight {
        color: FOCAL_COLOR,
        alpha: FOCAL_ALPHA,
    };
}

/// Recolor the whole corpus by a label category ("color by").
///
/// Each distinct value gets a deterministic color at half opacity;
/// points without the label fall back to neutral. Passing None resets
/// everything to neutral.
pub fn color_by_category(corpus: &mut [EmbeddingPoint], category: Option<&str>) {
    match category {
        Some(category) => {
            for point in corpus.iter_mut() {
                point.visual = match point.labels.get(category) {
                    Some(value) if !value.is_empty() => VisualWeight {
                        color: color_for_key(value),
                        alpha: 128,
                    },
                    _ => VisualWeight::neutral(),
                };
            }
        }
        None => {
            for point in corpus.iter_mut() {
                point.visual = VisualWeight::neutral();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NEUTRAL_ALPHA, NEUTRAL_COLOR};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn corpus_1d(values: &[f32]) -> Vec<EmbeddingPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| EmbeddingPoint::new(format!("p{i}"), "", BTreeMap::new(), vec![*v]))
            .collect()
    }

    #[test]
    fn euclidean_ranking_orders_by_distance() {
        // Distances to point 0 are [0, 1, 2, 3, 4] in index order.
        let corpus = corpus_1d(&[0.0, 1.0, 2.0, 3.0, 4.0]);
        let result = rank(&corpus, 0, Metric::Euclidean, 3).unwrap();
        let order: Vec<usize> = result.ranked.iter().map(|r| r.index).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
        assert_eq!(result.ranked[0].metric_value, 0.0);
        assert_eq!(result.ranked[4].metric_value, 4.0);
    }

    #[test]
    fn ties_preserve_corpus_order() {
        let corpus = corpus_1d(&[0.0, 1.0, -1.0, 2.0]);
        let result = rank(&corpus, 0, Metric::Euclidean, 3).unwrap();
        let order: Vec<usize> = result.ranked.iter().map(|r| r.index).collect();
        // Indices 1 and 2 are both at distance 1; index 1 stays first.
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn cosine_ranks_descending() {
        let corpus = vec![
            EmbeddingPoint::new("a", "", BTreeMap::new(), vec![1.0, 0.0]),
            EmbeddingPoint::new("b", "", BTreeMap::new(), vec![0.0, 1.0]),
            EmbeddingPoint::new("c", "", BTreeMap::new(), vec![1.0, 0.1]),
        ];
        let result = rank(&corpus, 0, Metric::Cosine, 2).unwrap();
        // Self-quotient is the largest, the near-parallel vector next,
        // the orthogonal vector last.
        let order: Vec<usize> = result.ranked.iter().map(|r| r.index).collect();
        assert_eq!(order, vec![0, 2, 1]);
    }

    #[test]
    fn k_is_clamped_to_corpus_size() {
        let corpus = corpus_1d(&[0.0, 1.0]);
        assert_eq!(rank(&corpus, 0, Metric::Euclidean, 100).unwrap().k, 2);
        assert_eq!(rank(&corpus, 0, Metric::Euclidean, 0).unwrap().k, 1);
    }

    #[test]
    fn empty_corpus_rejected() {
        assert!(matches!(
            rank(&[], 0, Metric::Euclidean, 1),
            Err(ExploreError::InvalidInput(_))
        ));
    }

    #[test]
    fn bad_focal_index_rejected() {
        let corpus = corpus_1d(&[0.0]);
        assert_eq!(
            rank(&corpus, 5, Metric::Euclidean, 1),
            Err(ExploreError::IndexOutOfRange { index: 5, len: 1 })
        );
    }

    #[test]
    fn tiers_split_top_k_into_thirds() {
        let mut corpus = corpus_1d(&[0.0, 1.0, 2.0, 3.0, 4.0]);
        let result = rank(&corpus, 0, Metric::Euclidean, 3).unwrap();
        let focal_color = corpus[0].base_color;
        apply_tiers(&mut corpus, &result, focal_color);

        // k=3 means tier_size=1: ranks 1, 2, 3 land in tiers 0, 1, 2.
        assert_eq!(corpus[1].tier, Some(0));
        assert_eq!(corpus[2].tier, Some(1));
        assert_eq!(corpus[3].tier, Some(2));
        assert_eq!(corpus[1].visual.alpha, 192);
        assert_eq!(corpus[2].visual.alpha, 128);
        assert_eq!(corpus[3].visual.alpha, 64);
        assert_eq!(corpus[1].visual.color, focal_color);

        // Focal point gets the fixed highlight, not a tier.
        assert_eq!(corpus[0].tier, None);
        assert_eq!(corpus[0].visual.color, FOCAL_COLOR);
        assert_eq!(corpus[0].visual.alpha, FOCAL_ALPHA);

        // Point beyond the top-k stays neutral.
        assert_eq!(corpus[4].tier, None);
        assert_eq!(corpus[4].visual.color, NEUTRAL_COLOR);
        assert_eq!(corpus[4].visual.alpha, NEUTRAL_ALPHA);

        // Metric values are written back for every point.
        assert_eq!(corpus[4].metric_value, 4.0);
    }

    #[test]
    fn category_coloring_is_deterministic_and_resets() {
        let mut labels = BTreeMap::new();
        labels.insert("cancer_type".to_string(), "BRCA".to_string());
        let mut corpus = vec![
            EmbeddingPoint::new("a", "", labels.clone(), vec![0.0]),
            EmbeddingPoint::new("b", "", labels, vec![1.0]),
            EmbeddingPoint::new("c", "", BTreeMap::new(), vec![2.0]),
        ];

        color_by_category(&mut corpus, Some("cancer_type"));
        assert_eq!(corpus[0].visual, corpus[1].visual);
        assert_eq!(corpus[0].visual.alpha, 128);
        assert_eq!(corpus[2].visual, VisualWeight::neutral());

        color_by_category(&mut corpus, None);
        assert_eq!(corpus[0].visual, VisualWeight::neutral());
    }
}
