//! Reduction orchestrator
//!
//! Owns the cached reduced-space coordinates for the corpus and exposes
//! the two strategies behind one contract: a one-shot linear fit (PCA)
//! and a cancelable, progress-reporting iterative layout. A computed
//! projection is reused until the method, its parameters, or the corpus
//! identity change.

pub mod pca;
pub mod umap;

pub use pca::{PcaModel, PcaOutput};
pub use umap::IterativeParams;

use crate::error::{ExploreError, ExploreResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Shared cancellation flag checked between epochs of the iterative
/// strategy.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Reduction method selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Linear,
    Iterative,
}

/// Parameters of the linear strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearParams {
    /// Number of principal components to extract. Display axes pick
    /// from these at read time.
    pub components: usize,
    /// Display dimensionality, 2 or 3.
    pub dimensions: usize,
    /// Optional truncation of every vector to its first N features
    /// before the fit.
    pub feature_cap: Option<usize>,
}

impl Default for LinearParams {
    fn default() -> Self {
        Self {
            components: 5,
            dimensions: 3,
            feature_cap: None,
        }
    }
}

/// Parameters of either strategy, used as the projection cache key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReductionParams {
    Linear(LinearParams),
    Iterative(IterativeParams),
}

impl ReductionParams {
    pub fn method(&self) -> Method {
        match self {
            ReductionParams::Linear(_) => Method::Linear,
            ReductionParams::Iterative(_) => Method::Iterative,
        }
    }

    pub fn dimensions(&self) -> usize {
        match self {
            ReductionParams::Linear(p) => p.dimensions,
            ReductionParams::Iterative(p) => p.dimensions,
        }
    }
}

/// Lifecycle of the current corpus+method combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReductionState {
    #[default]
    Uncomputed,
    Computing,
    Ready,
    Cancelled,
}

/// Whether a compute call did work or reused the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeOutcome {
    Computed,
    Reused,
}

/// How the merge path handled a newly appended vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Linear strategy: the vector was reprojected through the fitted
    /// basis and appended; prior rows are untouched.
    Reprojected,
    /// Iterative strategy: the cached layout was invalidated and a full
    /// recompute including the new point must be run.
    RecomputePending,
}

/// Snapshot of the active projection for the output boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Projection {
    pub method: Method,
    pub dimensions: usize,
    /// One coordinate tuple per corpus index, parallel to the corpus.
    pub coordinates: Vec<Vec<f32>>,
}

enum Fitted {
    Linear {
        model: PcaModel,
        /// Full component scores, one row per corpus index.
        scores: Vec<Vec<f32>>,
        /// Display-axis -> component-column mapping, read-time only.
        axes: Vec<usize>,
        params: LinearParams,
    },
    Iterative {
        coordinates: Vec<Vec<f32>>,
        params: IterativeParams,
    },
}

/// Single owner of the cached projection.
#[derive(Default)]
pub struct Orchestrator {
    state: ReductionState,
    fitted: Option<Fitted>,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ReductionState {
        self.state
    }

    /// Drop the cached projection (corpus replaced).
    pub fn invalidate(&mut self) {
        self.state = ReductionState::Uncomputed;
        self.fitted = None;
    }

    /// Parameters of the cached fit, if any.
    pub fn cached_params(&self) -> Option<ReductionParams> {
        match &self.fitted {
            Some(Fitted::Linear { params, .. }) => Some(ReductionParams::Linear(*params)),
            Some(Fitted::Iterative { params, .. }) => Some(ReductionParams::Iterative(*params)),
            None => None,
        }
    }

    fn can_reuse(&self, params: &ReductionParams, force: bool) -> bool {
        !force
            && self.state == ReductionState::Ready
            && self.cached_params().as_ref() == Some(params)
    }

    /// Run (or reuse) the linear strategy. Synchronous one-shot fit.
    pub fn compute_linear(
        &mut self,
        rows: &[Vec<f32>],
        params: LinearParams,
        force: bool,
    ) -> ExploreResult<ComputeOutcome> {
        if self.can_reuse(&ReductionParams::Linear(params), force) {
            return Ok(ComputeOutcome::Reused);
        }

        self.state = ReductionState::Computing;
        let (model, output) = match pca::fit(rows, params.components, params.feature_cap) {
            Ok(fit) => fit,
            Err(e) => {
                // Failed attempt; the previous cache (if any) stays valid.
                self.state = if self.fitted.is_some() {
                    ReductionState::Ready
                } else {
                    ReductionState::Uncomputed
                };
                return Err(e);
            }
        };

        let axes: Vec<usize> = (0..params.dimensions.min(model.n_components())).collect();
        info!(
            "linear reduction ready: {} points, {} components",
            output.coordinates.len(),
            model.n_components()
        );
        self.fitted = Some(Fitted::Linear {
            model,
            scores: output.coordinates,
            axes,
            params,
        });
        self.state = ReductionState::Ready;
        Ok(ComputeOutcome::Computed)
    }

    /// Run (or reuse) the iterative strategy.
    ///
    /// Yields after every epoch; `on_progress` observes `(current,
    /// total)` and the cancel flag is honored with at most one epoch of
    /// latency. On cancellation the previous Ready projection (if any)
    /// remains cached and displayed.
    pub async fn compute_iterative(
        &mut self,
        rows: &[Vec<f32>],
        params: IterativeParams,
        force: bool,
        cancel: &CancelFlag,
        on_progress: impl FnMut(usize, usize),
    ) -> ExploreResult<ComputeOutcome> {
        if self.can_reuse(&ReductionParams::Iterative(params), force) {
            return Ok(ComputeOutcome::Reused);
        }

        self.state = ReductionState::Computing;
        match umap::reduce_iterative(rows, &params, cancel, on_progress).await {
            Ok(coordinates) => {
                info!(
                    "iterative reduction ready: {} points, {} epochs",
                    coordinates.len(),
                    params.epochs
                );
                self.fitted = Some(Fitted::Iterative {
                    coordinates,
                    params,
                });
                self.state = ReductionState::Ready;
                Ok(ComputeOutcome::Computed)
            }
            Err(ExploreError::Cancelled) => {
                // The attempt is dead, but an earlier projection stays
                // valid and displayed.
                self.state = if self.fitted.is_some() {
                    ReductionState::Ready
                } else {
                    ReductionState::Cancelled
                };
                Err(ExploreError::Cancelled)
            }
            Err(e) => {
                self.state = if self.fitted.is_some() {
                    ReductionState::Ready
                } else {
                    ReductionState::Uncomputed
                };
                Err(e)
            }
        }
    }

    /// Remap display axes onto already-computed component columns.
    /// Linear strategy only; never triggers a recompute.
    pub fn set_axes(&mut self, new_axes: &[usize]) -> ExploreResult<()> {
        match &mut self.fitted {
            Some(Fitted::Linear { model, axes, .. }) => {
                if new_axes.len() != 2 && new_axes.len() != 3 {
                    return Err(ExploreError::InvalidInput(format!(
                        "axis selection must name 2 or 3 components, got {}",
                        new_axes.len()
                    )));
                }
                for &axis in new_axes {
                    if axis >= model.n_components() {
                        return Err(ExploreError::IndexOutOfRange {
                            index: axis,
                            len: model.n_components(),
                        });
                    }
                }
                *axes = new_axes.to_vec();
                Ok(())
            }
            Some(Fitted::Iterative { .. }) => Err(ExploreError::InvalidInput(
                "axis selection applies to the linear strategy only".to_string(),
            )),
            None => Err(ExploreError::NotReady),
        }
    }

    /// Explained-variance ratios of the linear fit, if one is cached.
    pub fn explained_variance(&self) -> Option<&[f32]> {
        match &self.fitted {
            Some(Fitted::Linear { model, .. }) => Some(model.explained_variance()),
            _ => None,
        }
    }

    /// The active projection. `NotReady` until a strategy has completed.
    pub fn projection(&self) -> ExploreResult<Projection> {
        if self.state != ReductionState::Ready {
            return Err(ExploreError::NotReady);
        }
        match &self.fitted {
            Some(Fitted::Linear { scores, axes, .. }) => Ok(Projection {
                method: Method::Linear,
                dimensions: axes.len(),
                coordinates: scores
                    .iter()
                    .map(|row| axes.iter().map(|&a| row[a]).collect())
                    .collect(),
            }),
            Some(Fitted::Iterative {
                coordinates,
                params,
            }) => Ok(Projection {
                method: Method::Iterative,
                dimensions: params.dimensions,
                coordinates: coordinates.clone(),
            }),
            None => Err(ExploreError::NotReady),
        }
    }

    /// Merge one new vector into the cached projection.
    ///
    /// Linear: deterministic reprojection through the fitted basis, no
    /// refit. Iterative: no exact incremental insertion exists for the
    /// algorithm family, so the cache is invalidated and the caller is
    /// told to re-run the strategy including the new point.
    pub fn append_point(&mut self, vector: &[f32]) -> ExploreResult<MergeOutcome> {
        match &mut self.fitted {
            Some(Fitted::Linear { model, scores, .. }) => {
                let coords = model.transform(vector)?;
                scores.push(coords);
                Ok(MergeOutcome::Reprojected)
            }
            Some(Fitted::Iterative { .. }) | None => {
                self.invalidate();
                Ok(MergeOutcome::RecomputePending)
            }
        }
    }
}
