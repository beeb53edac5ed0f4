//! Linear reduction strategy: PCA by power iteration
//!
//! Centers and scales features, then extracts principal components from
//! the covariance of the standardized matrix by power iteration with
//! Gram-Schmidt deflation. Components come out ordered by descending
//! explained variance, so the result matches any standard
//! covariance-eigendecomposition PCA up to component sign.

use crate::error::{ExploreError, ExploreResult};
use ndarray::{Array1, Array2};
use tracing::debug;

const POWER_ITERATIONS: usize = 300;
const CONVERGENCE_EPS: f32 = 1e-9;

/// Fitted PCA basis. Kept so a new vector can be reprojected through the
/// same basis without a refit (the merge path).
#[derive(Debug, Clone)]
pub struct PcaModel {
    means: Vec<f32>,
    stds: Vec<f32>,
    /// (n_components, n_features) row-per-component basis.
    components: Array2<f32>,
    explained_variance: Vec<f32>,
    feature_cap: Option<usize>,
}

/// Output of a linear fit: one coordinate row per input row plus the
/// per-component explained-variance ratios.
#[derive(Debug, Clone)]
pub struct PcaOutput {
    pub coordinates: Vec<Vec<f32>>,
    pub explained_variance: Vec<f32>,
}

impl PcaModel {
    pub fn n_components(&self) -> usize {
        self.components.nrows()
    }

    pub fn explained_variance(&self) -> &[f32] {
        &self.explained_variance
    }

    /// Project one new vector through the fitted basis. Deterministic
    /// read-time reprojection; no refit.
    pub fn transform(&self, vector: &[f32]) -> ExploreResult<Vec<f32>> {
        let capped = match self.feature_cap {
            Some(cap) if vector.len() > cap => &vector[..cap],
            _ => vector,
        };
        if capped.len() != self.means.len() {
            return Err(ExploreError::DimensionMismatch {
                expected: self.means.len(),
                actual: capped.len(),
            });
        }

        let z: Array1<f32> = capped
            .iter()
            .zip(&self.means)
            .zip(&self.stds)
            .map(|((v, m), s)| (v - m) / if *s == 0.0 { 1.0 } else { *s })
            .collect();

        Ok(self.components.dot(&z).to_vec())
    }
}

/// Fit PCA on raw feature rows and project them.
///
/// `feature_cap` truncates every vector to its first N features before
/// the fit, matching the reference corpus treatment of long embeddings.
/// `n_components` is clamped to `min(rows, features)`.
pub fn fit(
    rows: &[Vec<f32>],
    n_components: usize,
    feature_cap: Option<usize>,
) -> ExploreResult<(PcaModel, PcaOutput)> {
    if rows.is_empty() {
        return Err(ExploreError::InvalidInput(
            "cannot fit PCA on an empty matrix".to_string(),
        ));
    }
    if n_components == 0 {
        return Err(ExploreError::InvalidInput(
            "n_components must be at least 1".to_string(),
        ));
    }

    let full_dims = rows[0].len();
    for row in rows {
        if row.len() != full_dims {
            return Err(ExploreError::DimensionMismatch {
                expected: full_dims,
                actual: row.len(),
            });
        }
    }

    let dims = match feature_cap {
        Some(cap) if cap > 0 && cap < full_dims => cap,
        _ => full_dims,
    };
    if dims == 0 {
        return Err(ExploreError::InvalidInput(
            "cannot fit PCA on zero-length vectors".to_string(),
        ));
    }

    let n = rows.len();
    let n_components = n_components.min(dims).min(n);

    // Center and scale.
    let mut means = vec![0.0f32; dims];
    for row in rows {
        for (m, v) in means.iter_mut().zip(&row[..dims]) {
            *m += v;
        }
    }
    for m in &mut means {
        *m /= n as f32;
    }
    let mut stds = vec![0.0f32; dims];
    for row in rows {
        for ((s, v), m) in stds.iter_mut().zip(&row[..dims]).zip(&means) {
            let d = v - m;
            *s += d * d;
        }
    }
    for s in &mut stds {
        *s = (*s / n as f32).sqrt();
    }

    let mut x = Array2::<f32>::zeros((n, dims));
    for (i, row) in rows.iter().enumerate() {
        for j in 0..dims {
            let s = if stds[j] == 0.0 { 1.0 } else { stds[j] };
            x[[i, j]] = (row[j] - means[j]) / s;
        }
    }

    // Total variance of the standardized matrix (trace of its
    // covariance); zero-variance columns contribute nothing.
    let total_variance: f32 = x
        .columns()
        .into_iter()
        .map(|c| c.iter().map(|v| v * v).sum::<f32>() / n as f32)
        .sum();

    let mut components = Array2::<f32>::zeros((n_components, dims));
    let mut eigenvalues = vec![0.0f32; n_components];

    let mut seed: u64 = 0x5eed_1234;
    for c in 0..n_components {
        // Deterministic pseudo-random start so the fit is reproducible.
        let mut v = Array1::<f32>::zeros(dims);
        for item in v.iter_mut() {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            *item = ((seed >> 33) as f32 / (1u64 << 31) as f32) - 0.5;
        }
        // Start orthogonal to the components already extracted, so a
        // rank-deficient tail converges to a zero eigenvalue instead of
        // re-discovering an earlier component.
        for p in 0..c {
            let prev = components.row(p);
            let overlap = v.dot(&prev);
            v.scaled_add(-overlap, &prev);
        }
        normalize_in_place(&mut v);

        for _ in 0..POWER_ITERATIONS {
            // w = C v with C = X^T X / n, computed as two matrix-vector
            // products to avoid forming the d x d covariance.
            let xv = x.dot(&v);
            let mut w = x.t().dot(&xv) / n as f32;

            // Deflate against already-extracted components.
            for p in 0..c {
                let prev = components.row(p);
                let overlap = w.dot(&prev);
                w.scaled_add(-overlap, &prev);
            }

            let norm = w.dot(&w).sqrt();
            if norm <= f32::EPSILON {
                // Remaining variance is (numerically) zero; keep the
                // current orthogonal direction.
                break;
            }
            w /= norm;

            let drift = 1.0 - w.dot(&v).abs();
            v = w;
            if drift < CONVERGENCE_EPS {
                break;
            }
        }

        let xv = x.dot(&v);
        eigenvalues[c] = xv.dot(&xv) / n as f32;
        components.row_mut(c).assign(&v);
    }

    let explained_variance: Vec<f32> = eigenvalues
        .iter()
        .map(|ev| {
            if total_variance == 0.0 {
                0.0
            } else {
                (ev / total_variance).max(0.0)
            }
        })
        .collect();

    debug!(
        "pca fit complete: {} points, {} features, {} components",
        n, dims, n_components
    );

    let model = PcaModel {
        means,
        stds,
        components,
        explained_variance: explained_variance.clone(),
        feature_cap,
    };

    let mut coordinates = Vec::with_capacity(n);
    for i in 0..n {
        let row = x.row(i);
        coordinates.push(model.components.dot(&row).to_vec());
    }

    Ok((
        model,
        PcaOutput {
            coordinates,
            explained_variance,
        },
    ))
}

fn normalize_in_place(v: &mut Array1<f32>) {
    let norm = v.dot(v).sqrt();
    if norm > 0.0 {
        *v /= norm;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deterministic_rows(n: usize, d: usize) -> Vec<Vec<f32>> {
        let mut seed: u64 = 42;
        (0..n)
            .map(|_| {
                (0..d)
                    .map(|_| {
                        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
                        ((seed >> 33) as f32 / (1u64 << 31) as f32) - 0.5
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn reduces_100_points_in_50_dims_to_3_components() {
        let rows = deterministic_rows(100, 50);
        let (_, output) = fit(&rows, 3, None).unwrap();

        assert_eq!(output.coordinates.len(), 100);
        for coord in &output.coordinates {
            assert_eq!(coord.len(), 3);
        }

        assert_eq!(output.explained_variance.len(), 3);
        let sum: f32 = output.explained_variance.iter().sum();
        assert!(sum <= 1.0 + 1e-4, "ratios sum to {sum}");
        for r in &output.explained_variance {
            assert!(*r >= 0.0);
        }
    }

    #[test]
    fn components_ordered_by_descending_variance() {
        let rows = deterministic_rows(80, 10);
        let (_, output) = fit(&rows, 5, None).unwrap();
        for pair in output.explained_variance.windows(2) {
            assert!(pair[0] >= pair[1] - 1e-5, "ratios not descending: {pair:?}");
        }
    }

    #[test]
    fn collinear_data_loads_on_first_component() {
        // Points on the line y = x: one direction carries all variance.
        let rows: Vec<Vec<f32>> = (0..20).map(|i| vec![i as f32, i as f32]).collect();
        let (_, output) = fit(&rows, 2, None).unwrap();
        assert!(output.explained_variance[0] > 0.99);
        assert!(output.explained_variance[1] < 0.01);
    }

    #[test]
    fn components_are_orthonormal() {
        let rows = deterministic_rows(60, 8);
        let (model, _) = fit(&rows, 3, None).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let dot = model.components.row(i).dot(&model.components.row(j));
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!(
                    (dot - expected).abs() < 1e-3,
                    "components {i},{j} dot {dot}"
                );
            }
        }
    }

    #[test]
    fn transform_matches_fit_projection() {
        let rows = deterministic_rows(40, 6);
        let (model, output) = fit(&rows, 3, None).unwrap();
        let reproj = model.transform(&rows[7]).unwrap();
        for (a, b) in reproj.iter().zip(&output.coordinates[7]) {
            assert!((a - b).abs() < 1e-4, "{a} vs {b}");
        }
    }

    #[test]
    fn feature_cap_truncates_input() {
        let rows = deterministic_rows(30, 20);
        let (model, output) = fit(&rows, 2, Some(5)).unwrap();
        assert_eq!(output.coordinates.len(), 30);
        // Transform accepts the full-width vector and caps it itself.
        assert!(model.transform(&rows[0]).is_ok());
        // A vector shorter than the cap is a mismatch.
        assert!(model.transform(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn empty_input_rejected() {
        assert!(matches!(
            fit(&[], 3, None),
            Err(ExploreError::InvalidInput(_))
        ));
    }

    #[test]
    fn ragged_rows_rejected() {
        let rows = vec![vec![1.0, 2.0], vec![1.0]];
        assert!(matches!(
            fit(&rows, 2, None),
            Err(ExploreError::DimensionMismatch { .. })
        ));
    }
}
