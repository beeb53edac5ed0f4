//! Distance engine: scalar similarity/dissimilarity between two vectors

use crate::error::{ExploreError, ExploreResult};
use serde::{Deserialize, Serialize};

/// Selectable distance metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Euclidean,
    Cosine,
}

impl Metric {
    /// Whether a smaller metric value means "closer".
    ///
    /// Euclidean ranks ascending; the cosine quotient ranks descending
    /// (larger = more similar). Keeping the per-metric sort direction
    /// here stops callers from assuming "distance" is always
    /// smaller-is-closer.
    pub fn ranks_ascending(self) -> bool {
        matches!(self, Metric::Euclidean)
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::Euclidean => write!(f, "euclidean"),
            Metric::Cosine => write!(f, "cosine"),
        }
    }
}

/// Compute the metric value between two vectors.
///
/// Euclidean: L2 norm of the element-wise difference, range `[0, inf)`.
///
/// Cosine: `dot / (sqrt(|a|) * sqrt(|b|))` where `|a|` is the magnitude.
/// The denominator takes a second square root of each magnitude and the
/// quotient is left unclamped; only the ordering of the raw value is
/// relied upon downstream. A zero denominator yields 0.0.
pub fn distance(a: &[f32], b: &[f32], metric: Metric) -> ExploreResult<f32> {
    if a.len() != b.len() {
        return Err(ExploreError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    Ok(match metric {
        Metric::Euclidean => {
            let mut sum = 0.0f32;
            for (x, y) in a.iter().zip(b) {
                let d = x - y;
                sum += d * d;
            }
            sum.sqrt()
        }
        Metric::Cosine => {
            let mut dot = 0.0f32;
            let mut mag_a = 0.0f32;
            let mut mag_b = 0.0f32;
            for (x, y) in a.iter().zip(b) {
                dot += x * y;
                mag_a += x * x;
                mag_b += y * y;
            }
            let denom = mag_a.sqrt().sqrt() * mag_b.sqrt().sqrt();
            if denom == 0.0 {
                0.0
            } else {
                dot / denom
            }
        }
    })
}
