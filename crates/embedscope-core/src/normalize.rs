//! Z-score feature normalization

use crate::error::{ExploreError, ExploreResult};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Z-score-normalize a matrix of feature vectors.
///
/// Per-feature mean and population standard deviation across all rows;
/// a zero-variance feature keeps std treated as 1 so constant columns
/// normalize to all zeros instead of dividing by zero.
///
/// Pure function; safe to call concurrently on independent inputs.
pub fn normalize(rows: &[Vec<f32>]) -> ExploreResult<Vec<Vec<f32>>> {
    if rows.is_empty() {
        return Err(ExploreError::InvalidInput(
            "cannot normalize an empty matrix".to_string(),
        ));
    }

    let dims = rows[0].len();
    if dims == 0 {
        return Err(ExploreError::InvalidInput(
            "cannot normalize zero-length vectors".to_string(),
        ));
    }
    for row in rows {
        if row.len() != dims {
            return Err(ExploreError::DimensionMismatch {
                expected: dims,
                actual: row.len(),
            });
        }
    }

    let n = rows.len() as f32;

    let mut means = vec![0.0f32; dims];
    for row in rows {
        for (m, v) in means.iter_mut().zip(row) {
            *m += v;
        }
    }
    for m in &mut means {
        *m /= n;
    }

    let mut stds = vec![0.0f32; dims];
    for row in rows {
        for ((s, v), m) in stds.iter_mut().zip(row).zip(&means) {
            let d = v - m;
            *s += d * d;
        }
    }
    for s in &mut stds {
        *s = (*s / n).sqrt();
    }

    let scale_row = |row: &Vec<f32>| -> Vec<f32> {
        row.iter()
            .zip(&means)
            .zip(&stds)
            .map(|((v, m), s)| (v - m) / if *s == 0.0 { 1.0 } else { *s })
            .collect()
    };

    #[cfg(feature = "parallel")]
    let out = rows.par_iter().map(scale_row).collect();
    #[cfg(not(feature = "parallel"))]
    let out = rows.iter().map(scale_row).collect();

    Ok(out)
}
