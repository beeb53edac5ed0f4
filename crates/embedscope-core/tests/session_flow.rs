//! End-to-end exploration flow: load a corpus, rank neighbors, reduce,
//! merge a query point, and focus the camera on it.

use embedscope_core::{
    CancelFlag, EmbeddingPoint, ExplorationSession, ExploreError, IterativeParams, LinearParams,
    MergeOutcome, Metric, Method, ReduceOutcome, ReductionParams,
};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;

fn corpus() -> Vec<EmbeddingPoint> {
    let labeled = |id: &str, cancer: &str, v: Vec<f32>| {
        let mut labels = BTreeMap::new();
        labels.insert("cancer_type".to_string(), cancer.to_string());
        EmbeddingPoint::new(id, format!("patient-{id}"), labels, v)
    };
    vec![
        labeled("r0", "BRCA", vec![0.0, 0.0]),
        labeled("r1", "BRCA", vec![1.0, 0.0]),
        labeled("r2", "LUAD", vec![0.0, 1.0]),
        labeled("r3", "LUAD", vec![5.0, 5.0]),
    ]
}

#[test]
fn ranking_orders_and_reports_neighbors() {
    let mut session = ExplorationSession::new();
    session.load_corpus(corpus()).unwrap();
    session.set_neighbor_count(3).unwrap();

    let result = session.set_focal(0).unwrap();
    let order: Vec<usize> = result.ranked.iter().map(|r| r.index).collect();
    // Distances from r0: 0, 1, 1, ~7.071. The tie keeps index order.
    assert_eq!(order, vec![0, 1, 2, 3]);
    assert_eq!(result.ranked[0].metric_value, 0.0);
    assert_eq!(result.ranked[1].metric_value, 1.0);
    assert!((result.ranked[3].metric_value - 50.0f32.sqrt()).abs() < 1e-5);

    let report = session.neighbor_report();
    assert_eq!(report.len(), 3);
    assert_eq!(report[0].id, "r0");
    assert_eq!(report[0].source_id, "patient-r0");
    assert_eq!(report[1].id, "r1");
    assert_eq!(report[1].labels["cancer_type"], "BRCA");
}

#[test]
fn tiered_highlight_follows_ranking() {
    let mut session = ExplorationSession::new();
    session.load_corpus(corpus()).unwrap();
    session.set_neighbor_count(3).unwrap();
    session.set_focal(0).unwrap();

    let points = session.points();
    // k=3, tier_size=1: ranks 1..3 land in tiers 0..2.
    assert_eq!(points[1].tier, Some(0));
    assert_eq!(points[2].tier, Some(1));
    assert_eq!(points[3].tier, Some(2));
    assert_eq!(points[1].visual.alpha, 192);
    assert_eq!(points[0].visual.color, [255, 0, 0]);
    assert_eq!(points[0].visual.alpha, 255);
}

#[tokio::test]
async fn linear_reduction_merge_keeps_prior_rows() {
    let mut session = ExplorationSession::new();
    session.load_corpus(corpus()).unwrap();

    let params = ReductionParams::Linear(LinearParams {
        components: 2,
        dimensions: 2,
        feature_cap: None,
    });
    let outcome = session
        .reduce(params, false, &CancelFlag::new(), |_, _| {})
        .await
        .unwrap();
    assert_eq!(outcome, ReduceOutcome::Computed);

    let before = session.projection().unwrap();
    assert_eq!(before.method, Method::Linear);
    assert_eq!(before.coordinates.len(), 4);
    assert_eq!(session.explained_variance().unwrap().len(), 2);

    // Same params: cache hit.
    let outcome = session
        .reduce(params, false, &CancelFlag::new(), |_, _| {})
        .await
        .unwrap();
    assert_eq!(outcome, ReduceOutcome::Reused);

    // Merge a query point: prior rows stay byte-identical.
    let added = session.add_query_point(vec![0.5, 0.5], "midpoint").unwrap();
    assert_eq!(added.index, 4);
    assert_eq!(added.merge, MergeOutcome::Reprojected);

    let after = session.projection().unwrap();
    assert_eq!(after.coordinates.len(), 5);
    for (a, b) in after.coordinates.iter().zip(&before.coordinates) {
        for (x, y) in a.iter().zip(b) {
            assert_eq!(x.to_bits(), y.to_bits());
        }
    }

    assert_eq!(session.take_camera_focus(), Some(4));
    assert_eq!(session.take_camera_focus(), None);
}

#[tokio::test]
async fn iterative_reduction_reports_progress_and_recomputes_on_merge() {
    let mut session = ExplorationSession::new();
    session.load_corpus(corpus()).unwrap();

    let params = ReductionParams::Iterative(IterativeParams {
        dimensions: 2,
        n_neighbors: 2,
        min_dist: 0.1,
        epochs: 20,
    });
    let mut reports = Vec::new();
    session
        .reduce(params, false, &CancelFlag::new(), |cur, total| {
            reports.push((cur, total));
        })
        .await
        .unwrap();
    assert_eq!(reports.len(), 20);
    assert_eq!(reports.last(), Some(&(20, 20)));
    assert_eq!(session.projection().unwrap().coordinates.len(), 4);

    // The iterative layout cannot absorb a new point in place.
    let added = session.add_query_point(vec![2.0, 2.0], "query").unwrap();
    assert_eq!(added.merge, MergeOutcome::RecomputePending);
    assert_eq!(session.projection().unwrap_err(), ExploreError::NotReady);
    assert_eq!(session.take_camera_focus(), None);

    // Re-running the strategy covers the merged point and releases the
    // camera focus.
    session
        .reduce(params, false, &CancelFlag::new(), |_, _| {})
        .await
        .unwrap();
    assert_eq!(session.projection().unwrap().coordinates.len(), 5);
    assert_eq!(session.take_camera_focus(), Some(4));
}

#[tokio::test]
async fn cancellation_is_a_session_no_op() {
    let mut session = ExplorationSession::new();
    session.load_corpus(corpus()).unwrap();

    let short = ReductionParams::Iterative(IterativeParams {
        dimensions: 2,
        n_neighbors: 2,
        min_dist: 0.1,
        epochs: 10,
    });
    session
        .reduce(short, false, &CancelFlag::new(), |_, _| {})
        .await
        .unwrap();
    let before = session.projection().unwrap();

    let long = ReductionParams::Iterative(IterativeParams {
        dimensions: 2,
        n_neighbors: 2,
        min_dist: 0.1,
        epochs: 500,
    });
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    let outcome = session
        .reduce(long, false, &cancel, |cur, _| {
            if cur == 3 {
                flag.cancel();
            }
        })
        .await
        .unwrap();

    assert_eq!(outcome, ReduceOutcome::Cancelled);
    assert_eq!(session.projection().unwrap(), before);
}

#[test]
fn metric_switch_reorders_without_projection() {
    let mut session = ExplorationSession::new();
    session.load_corpus(corpus()).unwrap();
    session.set_focal(1).unwrap();

    session.set_metric(Metric::Cosine).unwrap();
    let result = session.neighbor_result().unwrap();
    assert_eq!(result.metric, Metric::Cosine);
    // Raw quotients against r1 = [1, 0]: the long parallel-ish r3 beats
    // even the focal's self-quotient, and the zero/orthogonal vectors
    // tie at 0 in corpus order.
    let order: Vec<usize> = result.ranked.iter().map(|r| r.index).collect();
    assert_eq!(order, vec![3, 1, 0, 2]);

    // No reduction ran; coordinates are still unavailable.
    assert_eq!(session.projection().unwrap_err(), ExploreError::NotReady);
}
