//! Embedscope Core Engine
//!
//! Exploration engine for a corpus of high-dimensional embedding vectors:
//! feature normalization, neighbor ranking with tiered highlighting, and
//! cancelable dimensionality reduction down to renderable 2D/3D
//! coordinates. The engine computes colors, opacities, rankings, and
//! coordinates; drawing them is the embedding renderer's job.
//!
//! # Features
//!
//! - `parallel` - Parallel distance scans and normalization via rayon
//!
//! # Example
//!
//! ```rust
//! use embedscope_core::{EmbeddingPoint, ExplorationSession, Metric};
//! use std::collections::BTreeMap;
//!
//! let corpus = vec![
//!     EmbeddingPoint::new("a", "", BTreeMap::new(), vec![0.0, 0.0]),
//!     EmbeddingPoint::new("b", "", BTreeMap::new(), vec![1.0, 0.0]),
//!     EmbeddingPoint::new("c", "", BTreeMap::new(), vec![5.0, 5.0]),
//! ];
//!
//! let mut session = ExplorationSession::new();
//! session.load_corpus(corpus).unwrap();
//! let result = session.set_focal(0).unwrap();
//! assert_eq!(result.ranked[0].index, 0);
//! assert_eq!(session.metric(), Metric::Euclidean);
//! ```

pub mod error;
pub mod ingest;
pub mod metric;
pub mod normalize;
pub mod rank;
pub mod reduce;
pub mod session;
pub mod types;

// Re-export main types at crate root
pub use error::{ExploreError, ExploreResult};
pub use ingest::{
    join_corpus, parse_jsonl, LabelCatalog, PatientRecord, ReportRecord, LABEL_CATEGORIES,
};
pub use metric::{distance, Metric};
pub use rank::{apply_tiers, color_by_category, rank, NeighborResult, RankedPoint};
pub use reduce::{
    CancelFlag, ComputeOutcome, IterativeParams, LinearParams, MergeOutcome, Method, Orchestrator,
    Projection, ReductionParams, ReductionState,
};
pub use session::{ExplorationSession, NeighborRow, QueryPointAdded, ReduceOutcome};
pub use types::{color_for_key, EmbeddingPoint, Rgb, VisualWeight};
