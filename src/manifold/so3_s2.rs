//! SO(3)×S(2) realized as an embedded submanifold of ℝ^{3×4}.
//!
//! A point is a 3×4 matrix `Y = [R | t]` whose left 3×3 block is a rotation
//! and whose last column is a unit vector. Tangent vectors share the same
//! shape: `Ẏ = [Ṙ | ṫ]` with `RᵀṘ` skew-symmetric and `tᵀṫ = 0`.
//!
//! The metric is the one induced by the ambient Euclidean space:
//!
//! ```text
//! ⟨V₁, V₂⟩_Y = tr(R₁ᵀR₂) + t₁ᵀt₂
//! ```
//!
//! The retraction acts block-wise: the rotation block is mapped back to SO(3)
//! by polar projection and the translation block is renormalized. Both are
//! second-order retractions.

use crate::manifold::{ManifoldError, ManifoldResult, is_rotation, project_to_so3, skew};
use nalgebra::{Matrix3, Matrix3x4, Vector3};

/// Embedded representation of points and tangent vectors of SO(3)×S(2).
pub type Matrix34 = Matrix3x4<f64>;

/// Assemble `[R | t]` from its blocks.
pub fn from_rt(rotation: &Matrix3<f64>, translation: &Vector3<f64>) -> Matrix34 {
    let mut y = Matrix34::zeros();
    y.fixed_view_mut::<3, 3>(0, 0).copy_from(rotation);
    y.fixed_view_mut::<3, 1>(0, 3).copy_from(translation);
    y
}

/// Rotation block `R` of `[R | t]`.
pub fn rotation_block(y: &Matrix34) -> Matrix3<f64> {
    y.fixed_view::<3, 3>(0, 0).into_owned()
}

/// Translation block `t` of `[R | t]`.
pub fn translation_block(y: &Matrix34) -> Vector3<f64> {
    y.fixed_view::<3, 1>(0, 3).into_owned()
}

/// Riemannian metric at `y` between tangent vectors `v1` and `v2`.
///
/// Sum of the Frobenius inner product of the rotation blocks and the dot
/// product of the translation blocks; independent of `y` because the metric
/// is inherited from the ambient space.
pub fn metric(_y: &Matrix34, v1: &Matrix34, v2: &Matrix34) -> f64 {
    let r1 = rotation_block(v1);
    let r2 = rotation_block(v2);
    (r1.transpose() * r2).trace() + translation_block(v1).dot(&translation_block(v2))
}

/// Orthogonal projection of an ambient 3×4 matrix onto the tangent space at `y`.
///
/// Rotation block: `R·skew(RᵀV_R)`. Translation block: `V_t − t(tᵀV_t)`.
pub fn project_to_tangent(y: &Matrix34, v: &Matrix34) -> Matrix34 {
    let r = rotation_block(y);
    let t = translation_block(y);
    let v_r = rotation_block(v);
    let v_t = translation_block(v);

    let tangent_r = r * skew(&(r.transpose() * v_r));
    let tangent_t = v_t - t * t.dot(&v_t);
    from_rt(&tangent_r, &tangent_t)
}

/// Retract the tangent vector `v` at `y` back onto SO(3)×S(2).
pub fn retract(y: &Matrix34, v: &Matrix34) -> Matrix34 {
    let rotation = project_to_so3(&(rotation_block(y) + rotation_block(v)));

    let moved = translation_block(y) + translation_block(v);
    let norm = moved.norm();
    let translation = if norm > f64::EPSILON {
        moved / norm
    } else {
        translation_block(y)
    };

    from_rt(&rotation, &translation)
}

/// Check if `y` lies on SO(3)×S(2) within `tolerance`.
pub fn is_on_manifold(y: &Matrix34, tolerance: f64) -> bool {
    is_rotation(&rotation_block(y), tolerance)
        && (translation_block(y).norm() - 1.0).abs() < tolerance
}

/// Validate a user-supplied point, returning it unchanged when it is on the manifold.
pub fn validate_point(y: &Matrix34, tolerance: f64) -> ManifoldResult<Matrix34> {
    if y.iter().any(|value| !value.is_finite()) {
        return Err(ManifoldError::InvalidElement(
            "point contains non-finite entries".to_string(),
        ));
    }
    if !is_on_manifold(y, tolerance) {
        return Err(ManifoldError::InvalidElement(format!(
            "[R | t] violates RᵀR = I, det R = 1, |t| = 1 beyond tolerance {tolerance:.1e}"
        )));
    }
    Ok(*y)
}
