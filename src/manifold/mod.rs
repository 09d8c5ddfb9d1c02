//! Manifold representations for relative pose estimation.
//!
//! A relative pose is a rotation R ∈ SO(3) together with a translation
//! direction t ∈ S(2). The product SO(3)×S(2) is realized as an embedded
//! submanifold of the space of 3×4 matrices `Y = [R | t]`, so the induced
//! Riemannian metric is the ambient Euclidean (Frobenius) inner product
//! restricted to the tangent space.
//!
//! Manifold     | size | dim | X ∈ M     | Constraint         | T_X M
//! ------------ | ---- | --- | --------- | ------------------ | -----------------------
//! Rotation     | 9    | 3   | R         | RᵀR = I, det R = 1 | R·Ω, Ω ∈ so(3)
//! 2-sphere     | 3    | 2   | t         | tᵀt = 1            | v, tᵀv = 0
//! SO(3)×S(2)   | 12   | 5   | [R \| t]  | both of the above  | [R·Ω \| v]
//!
//! Two submodules:
//! - [`so3_s2`]: tangent projection, metric and retraction on `[R | t]`
//! - [`essential`]: the map between essential matrices and `(R, t)` pairs

use nalgebra::{Matrix3, Rotation3, Vector3};
use thiserror::Error;

pub mod essential;
pub mod so3_s2;

pub use essential::{
    compute_e_from_rt, compute_rt_from_e, compute_rt_from_e_canonical,
    project_to_essential_manifold,
};
pub use so3_s2::Matrix34;

/// Errors that can occur during manifold operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ManifoldError {
    /// Invalid manifold element
    #[error("Invalid manifold element: {0}")]
    InvalidElement(String),

    /// Numerical instability in computation
    #[error("Numerical instability: {0}")]
    NumericalInstability(String),
}

/// Result type for manifold operations.
pub type ManifoldResult<T> = Result<T, ManifoldError>;

/// Hat operator: maps v ∈ ℝ³ to the skew-symmetric matrix `[v]ₓ`.
///
/// `[v]ₓ w = v × w` for every w.
pub fn hat(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Vee operator, the inverse of [`hat`] on skew-symmetric matrices.
pub fn vee(m: &Matrix3<f64>) -> Vector3<f64> {
    Vector3::new(m[(2, 1)], m[(0, 2)], m[(1, 0)])
}

/// Skew-symmetric part `(A − Aᵀ)/2`.
pub fn skew(m: &Matrix3<f64>) -> Matrix3<f64> {
    (m - m.transpose()) * 0.5
}

/// Symmetric part `(A + Aᵀ)/2`.
pub fn sym(m: &Matrix3<f64>) -> Matrix3<f64> {
    (m + m.transpose()) * 0.5
}

/// Nearest rotation matrix to `m` in the Frobenius norm.
///
/// Computed from the SVD `m = U Σ Vᵀ` as `U diag(1, 1, det(UVᵀ)) Vᵀ`, which
/// is orthonormal with determinant +1 even when `m` is reflected.
pub fn project_to_so3(m: &Matrix3<f64>) -> Matrix3<f64> {
    let svd = m.svd(true, true);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Rotation3::from_matrix(m).into_inner();
    };

    let mut correction = Matrix3::identity();
    if (u * v_t).determinant() < 0.0 {
        correction[(2, 2)] = -1.0;
    }
    u * correction * v_t
}

/// Check if a 3×3 matrix is a rotation within `tolerance`.
pub fn is_rotation(r: &Matrix3<f64>, tolerance: f64) -> bool {
    (r.transpose() * r - Matrix3::identity()).norm() < tolerance
        && (r.determinant() - 1.0).abs() < tolerance
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hat_vee_roundtrip() {
        let v = Vector3::new(0.3, -1.2, 2.5);
        let m = hat(&v);
        assert!((m + m.transpose()).norm() < 1e-15);
        assert!((vee(&m) - v).norm() < 1e-15);
    }

    #[test]
    fn test_hat_is_cross_product() {
        let v = Vector3::new(1.0, 2.0, 3.0);
        let w = Vector3::new(-0.5, 0.25, 4.0);
        assert!((hat(&v) * w - v.cross(&w)).norm() < 1e-14);
    }

    #[test]
    fn test_skew_sym_decomposition() {
        let m = Matrix3::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 10.0);
        assert!((skew(&m) + sym(&m) - m).norm() < 1e-14);
        assert!((skew(&m) + skew(&m).transpose()).norm() < 1e-14);
        assert!((sym(&m) - sym(&m).transpose()).norm() < 1e-14);
    }

    #[test]
    fn test_project_to_so3_fixes_reflection() {
        let reflection = Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, -1.0);
        let r = project_to_so3(&reflection);
        assert!(is_rotation(&r, 1e-12));
    }

    #[test]
    fn test_project_to_so3_keeps_rotation() {
        let r = Rotation3::from_scaled_axis(Vector3::new(0.2, -0.4, 0.9)).into_inner();
        let projected = project_to_so3(&(r * 2.0));
        assert!((projected - r).norm() < 1e-12);
    }
}
