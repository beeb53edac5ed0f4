//! Corpus data model: embedding points and their visual state

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// RGB triple as handed to the renderer.
pub type Rgb = [u8; 3];

/// Neutral color for points outside the current top-k highlight.
pub const NEUTRAL_COLOR: Rgb = [200, 200, 200];
/// Alpha for neutral points.
pub const NEUTRAL_ALPHA: u8 = 64;
/// Color of the focal point itself.
pub const FOCAL_COLOR: Rgb = [255, 0, 0];
/// Alpha of the focal point itself.
pub const FOCAL_ALPHA: u8 = 255;
/// Opacity ladder over the three neighbor tiers, closest first.
pub const TIER_ALPHAS: [u8; 3] = [192, 128, 64];

/// RGBA-like visual weight consumed by the external renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualWeight {
    pub color: Rgb,
    pub alpha: u8,
}

impl VisualWeight {
    pub const fn neutral() -> Self {
        Self {
            color: NEUTRAL_COLOR,
            alpha: NEUTRAL_ALPHA,
        }
    }
}

impl Default for VisualWeight {
    fn default() -> Self {
        Self::neutral()
    }
}

/// One embedded document/record in the corpus.
///
/// The vector is fixed at construction; visual state and rank metadata
/// are rewritten by the neighbor ranker on every focal-point change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingPoint {
    pub id: String,
    /// Identifier of the joined source record (patient id for the
    /// reference corpus, empty for ad-hoc query points).
    pub source_id: String,
    /// Category-name -> value labels (cancer_type, race, gender, ...).
    pub labels: BTreeMap<String, String>,
    vector: Vec<f32>,
    /// Stable per-point color, used as the highlight base when this
    /// point is focal.
    pub base_color: Rgb,
    pub visual: VisualWeight,
    /// Metric value against the current focal point.
    pub metric_value: f32,
    /// Tier band within the top-k (0 = closest third), None outside it.
    pub tier: Option<u8>,
}

impl EmbeddingPoint {
    pub fn new(
        id: impl Into<String>,
        source_id: impl Into<String>,
        labels: BTreeMap<String, String>,
        vector: Vec<f32>,
    ) -> Self {
        let id = id.into();
        let base_color = color_for_key(&id);
        Self {
            id,
            source_id: source_id.into(),
            labels,
            vector,
            base_color,
            visual: VisualWeight::neutral(),
            metric_value: 0.0,
            tier: None,
        }
    }

    /// The embedding vector. Immutable after construction.
    pub fn vector(&self) -> &[f32] {
        &self.vector
    }

    pub fn dimensionality(&self) -> usize {
        self.vector.len()
    }
}

/// Deterministic color for a string key (point id or label value).
///
/// FNV-1a mixed down to three channels, so the same corpus always renders
/// with the same palette.
pub fn color_for_key(key: &str) -> Rgb {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in key.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    [
        (hash >> 16) as u8,
        (hash >> 32) as u8,
        (hash >> 48) as u8,
    ]
}
