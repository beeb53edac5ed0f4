//! Exploration session: single owner of corpus, projection, and focal state
//!
//! All mutable engine state lives behind one `&mut self` surface, so no
//! two components ever race on the same structures; concurrent external
//! callers serialize their mutating calls (a mutex or actor wrapper
//! suffices). Focal-point and metric changes never touch the projection,
//! so this session applies them immediately even while an iterative
//! reduction is being driven; a corpus change invalidates the projection
//! outright.

use crate::error::{ExploreError, ExploreResult};
use crate::ingest::LabelCatalog;
use crate::metric::Metric;
use crate::rank::{apply_tiers, color_by_category, rank, NeighborResult};
use crate::reduce::{
    CancelFlag, ComputeOutcome, MergeOutcome, Orchestrator, Projection, ReductionParams,
};
use crate::types::{EmbeddingPoint, VisualWeight};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Default neighbor count before the caller sets one.
const DEFAULT_NEIGHBORS: usize = 10;

/// Result of driving a reduction through the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOutcome {
    Computed,
    /// Cached Ready projection with identical parameters was reused.
    Reused,
    /// The caller cancelled; the previous Ready projection (if any)
    /// remains valid and displayed. Not an error.
    Cancelled,
}

/// A newly merged query point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryPointAdded {
    /// Corpus index of the new point.
    pub index: usize,
    /// How the orchestrator merged it into the projection.
    pub merge: MergeOutcome,
}

/// One row of the focal point's neighbor report, for the external UI.
#[derive(Debug, Clone, Serialize)]
pub struct NeighborRow {
    pub id: String,
    pub source_id: String,
    pub labels: BTreeMap<String, String>,
    pub metric_value: f32,
}

/// The exploration engine facade.
pub struct ExplorationSession {
    corpus: Vec<EmbeddingPoint>,
    dims: Option<usize>,
    metric: Metric,
    k: usize,
    focal: Option<usize>,
    neighbors: Option<NeighborResult>,
    orchestrator: Orchestrator,
    /// Index of a freshly merged query point awaiting a camera focus.
    pending_focus: Option<usize>,
    query_seq: usize,
}

impl Default for ExplorationSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ExplorationSession {
    pub fn new() -> Self {
        Self {
            corpus: Vec::new(),
            dims: None,
            metric: Metric::Euclidean,
            k: DEFAULT_NEIGHBORS,
            focal: None,
            neighbors: None,
            orchestrator: Orchestrator::new(),
            pending_focus: None,
            query_seq: 0,
        }
    }

    /// Replace the corpus wholesale. Invalidates the projection, any
    /// neighbor ranking, and the focal selection.
    pub fn load_corpus(&mut self, points: Vec<EmbeddingPoint>) -> ExploreResult<()> {
        if points.is_empty() {
            return Err(ExploreError::InvalidInput(
                "corpus must contain at least one point".to_string(),
            ));
        }
        let dims = points[0].dimensionality();
        for point in &points {
            if point.dimensionality() != dims {
                return Err(ExploreError::InvalidInput(format!(
                    "inconsistent dimensionality: point '{}' has {} features, expected {dims}",
                    point.id,
                    point.dimensionality()
                )));
            }
        }

        info!("corpus loaded: {} points, {} dims", points.len(), dims);
        self.corpus = points;
        self.dims = Some(dims);
        self.focal = None;
        self.neighbors = None;
        self.pending_focus = None;
        self.orchestrator.invalidate();
        Ok(())
    }

    pub fn points(&self) -> &[EmbeddingPoint] {
        &self.corpus
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn neighbor_count(&self) -> usize {
        self.k
    }

    pub fn focal(&self) -> Option<usize> {
        self.focal
    }

    pub fn label_catalog(&self) -> LabelCatalog {
        LabelCatalog::from_corpus(&self.corpus)
    }

    /// Select the focal point and re-rank the whole corpus against it.
    pub fn set_focal(&mut self, index: usize) -> ExploreResult<&NeighborResult> {
        if index >= self.corpus.len() {
            return Err(ExploreError::IndexOutOfRange {
                index,
                len: self.corpus.len(),
            });
        }
        self.focal = Some(index);
        self.rerank()?;
        Ok(self.neighbors.as_ref().expect("rerank just set neighbors"))
    }

    /// Switch the metric; re-ranks against the existing focal point
    /// without touching the projection.
    pub fn set_metric(&mut self, metric: Metric) -> ExploreResult<()> {
        self.metric = metric;
        if self.focal.is_some() {
            self.rerank()?;
        }
        Ok(())
    }

    /// Change the highlighted neighbor count; re-ranks if a focal point
    /// is selected.
    pub fn set_neighbor_count(&mut self, k: usize) -> ExploreResult<()> {
        self.k = k;
        if self.focal.is_some() {
            self.rerank()?;
        }
        Ok(())
    }

    fn rerank(&mut self) -> ExploreResult<()> {
        let focal = self.focal.expect("rerank requires a focal point");
        let result = rank(&self.corpus, focal, self.metric, self.k)?;
        let focal_color = self.corpus[focal].base_color;
        apply_tiers(&mut self.corpus, &result, focal_color);
        debug!(
            "re-ranked {} points against focal {} ({})",
            self.corpus.len(),
            focal,
            self.metric
        );
        self.neighbors = Some(result);
        Ok(())
    }

    pub fn neighbor_result(&self) -> Option<&NeighborResult> {
        self.neighbors.as_ref()
    }

    /// Ranked neighbor rows for the external UI, up to k entries
    /// starting with the focal point itself.
    pub fn neighbor_report(&self) -> Vec<NeighborRow> {
        let Some(result) = &self.neighbors else {
            return Vec::new();
        };
        result
            .ranked
            .iter()
            .take(result.k)
            .map(|entry| {
                let point = &self.corpus[entry.index];
                NeighborRow {
                    id: point.id.clone(),
                    source_id: point.source_id.clone(),
                    labels: point.labels.clone(),
                    metric_value: entry.metric_value,
                }
            })
            .collect()
    }

    /// Recolor the corpus by a label category; None resets to neutral.
    /// Replaces any focal highlight until the next re-rank.
    pub fn color_by(&mut self, category: Option<&str>) {
        color_by_category(&mut self.corpus, category);
    }

    /// Drive the reduction orchestrator.
    ///
    /// A cached Ready projection with identical parameters is reused
    /// unless `force` is set. The iterative strategy reports progress
    /// after every epoch and honors the cancel flag between epochs;
    /// cancellation is a no-op for session state.
    pub async fn reduce(
        &mut self,
        params: ReductionParams,
        force: bool,
        cancel: &CancelFlag,
        on_progress: impl FnMut(usize, usize),
    ) -> ExploreResult<ReduceOutcome> {
        if self.corpus.is_empty() {
            return Err(ExploreError::InvalidInput(
                "load a corpus before reducing".to_string(),
            ));
        }

        let rows: Vec<Vec<f32>> = self.corpus.iter().map(|p| p.vector().to_vec()).collect();

        let outcome = match params {
            ReductionParams::Linear(linear) => {
                // The linear fit centers and scales internally.
                self.orchestrator.compute_linear(&rows, linear, force)
            }
            ReductionParams::Iterative(iterative) => {
                let normalized = crate::normalize::normalize(&rows)?;
                self.orchestrator
                    .compute_iterative(&normalized, iterative, force, cancel, on_progress)
                    .await
            }
        };

        match outcome {
            Ok(ComputeOutcome::Computed) => Ok(ReduceOutcome::Computed),
            Ok(ComputeOutcome::Reused) => Ok(ReduceOutcome::Reused),
            Err(ExploreError::Cancelled) => Ok(ReduceOutcome::Cancelled),
            Err(e) => Err(e),
        }
    }

    /// Remap linear display axes; read-time only, never recomputes.
    pub fn set_axes(&mut self, axes: &[usize]) -> ExploreResult<()> {
        self.orchestrator.set_axes(axes)
    }

    /// The active projection, parallel to the corpus. `NotReady` until
    /// a reduction has completed.
    pub fn projection(&self) -> ExploreResult<Projection> {
        self.orchestrator.projection()
    }

    /// Explained-variance ratios of the linear fit, if one is active.
    pub fn explained_variance(&self) -> Option<&[f32]> {
        self.orchestrator.explained_variance()
    }

    /// Append an externally embedded query vector to the corpus and
    /// merge it into the projection.
    ///
    /// The rest of the corpus is dimmed to neutral and the new point is
    /// painted opaque in its own color; once coordinates for it are
    /// available, `take_camera_focus` hands the index to the renderer.
    pub fn add_query_point(
        &mut self,
        vector: Vec<f32>,
        label: &str,
    ) -> ExploreResult<QueryPointAdded> {
        let Some(dims) = self.dims else {
            return Err(ExploreError::InvalidInput(
                "load a corpus before adding query points".to_string(),
            ));
        };
        if vector.len() != dims {
            return Err(ExploreError::DimensionMismatch {
                expected: dims,
                actual: vector.len(),
            });
        }

        self.query_seq += 1;
        let id = format!("query-{}", self.query_seq);
        let mut labels = BTreeMap::new();
        if !label.is_empty() {
            labels.insert("query_text".to_string(), label.to_string());
        }
        let mut point = EmbeddingPoint::new(id.clone(), "", labels, vector.clone());

        color_by_category(&mut self.corpus, None);
        point.visual = VisualWeight {
            color: point.base_color,
            alpha: 255,
        };

        let index = self.corpus.len();
        self.corpus.push(point);
        self.neighbors = None;

        let merge = self.orchestrator.append_point(&vector)?;
        self.pending_focus = Some(index);
        info!("query point '{}' added at index {} ({:?})", id, index, merge);

        Ok(QueryPointAdded { index, merge })
    }

    /// Hand out the index of a newly merged query point once its
    /// coordinates exist, clearing the request. Returns None while the
    /// projection is still pending.
    pub fn take_camera_focus(&mut self) -> Option<usize> {
        let index = self.pending_focus?;
        match self.orchestrator.projection() {
            Ok(projection) if projection.coordinates.len() > index => {
                self.pending_focus = None;
                Some(index)
            }
            _ => None,
        }
    }
}
