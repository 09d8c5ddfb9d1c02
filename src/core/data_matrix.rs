//! The 9×9 data matrix of the epipolar constraints.
//!
//! For a correspondence `(x1, x2)` the constraint `x2ᵀ E x1 = 0` is linear in
//! the column-major vectorization of `E`:
//!
//! ```text
//! x2ᵀ E x1 = aᵀ vec(E),   a = x1 ⊗ x2,   a[3j + i] = x1[j]·x2[i]
//! ```
//!
//! Stacking all correspondences gives `C = Σ aᵢaᵢᵀ`, a symmetric positive
//! semi-definite matrix, and the algebraic cost `½ vec(E)ᵀ C vec(E)`.

use crate::core::{CoreError, CoreResult, PointCorrespondence};
use nalgebra::{Matrix3, SMatrix, SVector};
use rayon::prelude::*;

pub type Matrix9 = SMatrix<f64, 9, 9>;
pub type Vector9 = SVector<f64, 9>;

/// Number of correspondences above which the accumulation runs on rayon.
const PARALLEL_THRESHOLD: usize = 4096;
const PARALLEL_CHUNK_SIZE: usize = 1024;

/// Column-major vectorization of a 3×3 matrix.
pub fn vec3x3(m: &Matrix3<f64>) -> Vector9 {
    Vector9::from_column_slice(m.as_slice())
}

/// Inverse of [`vec3x3`].
pub fn mat3x3(v: &Vector9) -> Matrix3<f64> {
    Matrix3::from_column_slice(v.as_slice())
}

/// Kronecker product `x1 ⊗ x2` of one correspondence.
pub fn correspondence_vector(point: &PointCorrespondence) -> Vector9 {
    Vector9::from_fn(|k, _| point.x1[k / 3] * point.x2[k % 3])
}

/// Build `C = Σ aᵢaᵢᵀ` from unweighted correspondences.
pub fn construct_data_matrix(points: &[PointCorrespondence]) -> Matrix9 {
    if points.len() >= PARALLEL_THRESHOLD {
        // Fixed chunks summed in order keep the result independent of scheduling.
        points
            .par_chunks(PARALLEL_CHUNK_SIZE)
            .map(accumulate)
            .collect::<Vec<_>>()
            .into_iter()
            .fold(Matrix9::zeros(), |acc, m| acc + m)
    } else {
        accumulate(points)
    }
}

fn accumulate(points: &[PointCorrespondence]) -> Matrix9 {
    points.iter().fold(Matrix9::zeros(), |acc, point| {
        let a = correspondence_vector(point);
        acc + a * a.transpose()
    })
}

/// Build `C = Σ wᵢ aᵢaᵢᵀ`; weights must be finite and non-negative.
pub fn construct_weighted_data_matrix(
    points: &[PointCorrespondence],
    weights: &[f64],
) -> CoreResult<Matrix9> {
    if points.len() != weights.len() {
        return Err(CoreError::InvalidInput(format!(
            "{} weights given for {} correspondences",
            weights.len(),
            points.len()
        )));
    }
    if let Some(index) = weights.iter().position(|w| !w.is_finite() || *w < 0.0) {
        return Err(CoreError::InvalidInput(format!(
            "weight {index} is negative or non-finite"
        )));
    }

    Ok(points
        .iter()
        .zip(weights)
        .fold(Matrix9::zeros(), |acc, (point, &weight)| {
            let a = correspondence_vector(point);
            acc + a * a.transpose() * weight
        }))
}
