//! Iterative reduction strategy: neighbor-graph layout
//!
//! UMAP-style non-linear embedding driven as a sequence of discrete
//! epochs: a kNN graph over the normalized vectors supplies attractive
//! pairs, randomly sampled non-neighbors supply repulsion, and positions
//! are nudged a little every epoch under a decaying learning rate. The
//! loop yields back to the runtime after every epoch so progress can be
//! observed and cancellation honored within one epoch's worth of work.

use super::CancelFlag;
use crate::error::{ExploreError, ExploreResult};
use tracing::debug;

/// Parameters of the iterative strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterativeParams {
    /// Output dimensionality, 2 or 3.
    pub dimensions: usize,
    /// kNN edge count per point (local/global balance).
    pub n_neighbors: usize,
    /// Minimum distance neighbors settle at in the embedding.
    pub min_dist: f32,
    /// Total epoch count; one progress report per epoch.
    pub epochs: usize,
}

impl Default for IterativeParams {
    fn default() -> Self {
        Self {
            dimensions: 3,
            n_neighbors: 15,
            min_dist: 0.1,
            epochs: 200,
        }
    }
}

/// Repulsive samples drawn per attractive edge per epoch.
const NEGATIVE_SAMPLES: usize = 5;
/// Largest per-axis nudge in one epoch, like the reference gradient clip.
const MAX_STEP: f32 = 4.0;
const ATTRACT_STRENGTH: f32 = 0.1;
const REPEL_STRENGTH: f32 = 1.0;

/// Run the iterative strategy over normalized vectors.
///
/// Calls `on_progress(current_epoch, total_epochs)` after every epoch and
/// then checks the cancel flag; a cancelled run resolves with
/// `Err(Cancelled)` and no coordinates. An individual epoch is atomic.
pub async fn reduce_iterative(
    rows: &[Vec<f32>],
    params: &IterativeParams,
    cancel: &CancelFlag,
    mut on_progress: impl FnMut(usize, usize),
) -> ExploreResult<Vec<Vec<f32>>> {
    if rows.is_empty() {
        return Err(ExploreError::InvalidInput(
            "cannot reduce an empty matrix".to_string(),
        ));
    }
    if params.dimensions != 2 && params.dimensions != 3 {
        return Err(ExploreError::InvalidInput(format!(
            "output dimensions must be 2 or 3, got {}",
            params.dimensions
        )));
    }
    if params.epochs == 0 {
        return Err(ExploreError::InvalidInput(
            "epoch count must be at least 1".to_string(),
        ));
    }
    let dims = rows[0].len();
    for row in rows {
        if row.len() != dims {
            return Err(ExploreError::DimensionMismatch {
                expected: dims,
                actual: row.len(),
            });
        }
    }

    let n = rows.len();
    let out_dims = params.dimensions;
    let edges = knn_edges(rows, params.n_neighbors);

    debug!(
        "iterative reduce: {} points, {} edges, {} epochs",
        n,
        edges.len(),
        params.epochs
    );

    let mut rng = Lcg::new(0x9e37_79b9_7f4a_7c15);
    let mut positions: Vec<Vec<f32>> = (0..n)
        .map(|_| (0..out_dims).map(|_| rng.uniform() * 20.0 - 10.0).collect())
        .collect();

    for epoch in 0..params.epochs {
        let alpha = 1.0 - epoch as f32 / params.epochs as f32;
        step_epoch(&mut positions, &edges, params.min_dist, alpha, &mut rng);

        on_progress(epoch + 1, params.epochs);
        if cancel.is_cancelled() {
            debug!("iterative reduce cancelled at epoch {}", epoch + 1);
            return Err(ExploreError::Cancelled);
        }
        tokio::task::yield_now().await;
    }

    Ok(positions)
}

/// One attractive edge of the neighbor graph.
struct Edge {
    from: usize,
    to: usize,
}

fn knn_edges(rows: &[Vec<f32>], n_neighbors: usize) -> Vec<Edge> {
    let n = rows.len();
    if n < 2 {
        return Vec::new();
    }
    let k = n_neighbors.clamp(1, n - 1);

    let mut edges = Vec::with_capacity(n * k);
    let mut candidates: Vec<(f32, usize)> = Vec::with_capacity(n - 1);
    for i in 0..n {
        candidates.clear();
        for (j, other) in rows.iter().enumerate() {
            if j == i {
                continue;
            }
            let mut sum = 0.0f32;
            for (a, b) in rows[i].iter().zip(other) {
                let d = a - b;
                sum += d * d;
            }
            candidates.push((sum, j));
        }
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0));
        for &(_, j) in candidates.iter().take(k) {
            edges.push(Edge { from: i, to: j });
        }
    }
    edges
}

/// Advance the layout by one epoch. Atomic; not interruptible mid-step.
fn step_epoch(
    positions: &mut [Vec<f32>],
    edges: &[Edge],
    min_dist: f32,
    alpha: f32,
    rng: &mut Lcg,
) {
    let n = positions.len();

    for edge in edges {
        // Spring attraction along the kNN edge with a min_dist rest
        // length, split evenly across both endpoints.
        let delta = displacement(&positions[edge.from], &positions[edge.to], rng);
        let dist = length(&delta);
        let force = (dist - min_dist) / dist * ATTRACT_STRENGTH * alpha;
        for axis in 0..delta.len() {
            let step = clip(delta[axis] * force * 0.5);
            positions[edge.from][axis] += step;
            positions[edge.to][axis] -= step;
        }

        // Repulsion against randomly sampled points keeps the layout
        // from collapsing onto the neighbor graph.
        for _ in 0..NEGATIVE_SAMPLES {
            let other = rng.index(n);
            if other == edge.from {
                continue;
            }
            let delta = displacement(&positions[edge.from], &positions[other], rng);
            let dist_sq = delta.iter().map(|d| d * d).sum::<f32>();
            let force = REPEL_STRENGTH * alpha / (1.0 + dist_sq);
            for axis in 0..delta.len() {
                let step = clip(delta[axis] / dist_sq.sqrt().max(1e-6) * force);
                positions[edge.from][axis] -= step;
            }
        }
    }
}

/// Vector from `b` to `a`, jiggled when the points coincide.
fn displacement(a: &[f32], b: &[f32], rng: &mut Lcg) -> Vec<f32> {
    let mut delta: Vec<f32> = b.iter().zip(a).map(|(y, x)| y - x).collect();
    if delta.iter().all(|d| *d == 0.0) {
        for d in &mut delta {
            *d = rng.jiggle();
        }
    }
    delta
}

fn length(v: &[f32]) -> f32 {
    v.iter().map(|d| d * d).sum::<f32>().sqrt()
}

fn clip(v: f32) -> f32 {
    v.clamp(-MAX_STEP, MAX_STEP)
}

/// Deterministic linear congruential generator; the layout has no
/// statistical requirements beyond decorrelation, and a fixed seed keeps
/// runs reproducible.
struct Lcg {
    state: u64,
}

impl Lcg {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.state
    }

    /// Uniform in [0, 1).
    fn uniform(&mut self) -> f32 {
        (self.next() >> 40) as f32 / (1u64 << 24) as f32
    }

    fn index(&mut self, n: usize) -> usize {
        (self.next() >> 33) as usize % n
    }

    fn jiggle(&mut self) -> f32 {
        (self.uniform() - 0.5) * 1e-6
    }
}
