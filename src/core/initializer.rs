//! Closed-form initialization and preconditioning.
//!
//! The linear 8-point estimate is the unit vector minimizing `vᵀ C v`, i.e.
//! the eigenvector of the data matrix for its smallest eigenvalue, reshaped
//! to 3×3, projected onto the essential manifold and rescaled to the norm of
//! `[t]ₓR` with `|t| = 1`.
//!
//! The block-Jacobi preconditioner approximates the inverse Gauss-Newton
//! Hessian at the 8-point estimate `E₀ = [t₀]ₓR₀`, one 3×3 block for the
//! rotation (in left-trivialized `so(3)` coordinates) and one for the
//! translation:
//!
//! ```text
//! J_R ω = vec([t₀]ₓ R₀ [ω]ₓ),   H_R = J_Rᵀ C J_R
//! J_t v = vec([v]ₓ R₀),         H_t = J_tᵀ C J_t
//! ```
//!
//! Eigenvalues are floored at `max(λ_max · 1e-8, 1e-12)` before inversion, so
//! the blocks stay symmetric positive-definite for rank-deficient `C`.

use crate::core::data_matrix::{Matrix9, Vector9, mat3x3, vec3x3};
use crate::manifold::essential::{compute_rt_from_e_canonical, project_to_essential_manifold};
use crate::manifold::so3_s2::{
    Matrix34, from_rt, project_to_tangent, rotation_block, translation_block,
};
use crate::manifold::{hat, skew, vee};
use crate::optimizer::LinearOperator;
use nalgebra::{Matrix2, Matrix3, Matrix3x2, SMatrix, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::SQRT_2;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

const RELATIVE_EIGENVALUE_FLOOR: f64 = 1e-8;
const ABSOLUTE_EIGENVALUE_FLOOR: f64 = 1e-12;

/// Selects the initializer and preconditioning strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PreconditionerType {
    /// Run the 8-point initializer without preconditioning
    #[default]
    None,
    /// Skip the 8-point initializer; the caller supplies the initial guess
    Any,
    /// Run the 8-point initializer and precondition the inner solver with
    /// block-diagonal inverse Gauss-Newton blocks
    BlockJacobi,
}

impl PreconditionerType {
    /// Whether the 8-point initializer runs for this selector.
    pub fn runs_initializer(&self) -> bool {
        !matches!(self, PreconditionerType::Any)
    }

    /// Whether a preconditioning matrix is computed and applied.
    pub fn uses_preconditioner(&self) -> bool {
        matches!(self, PreconditionerType::BlockJacobi)
    }
}

impl fmt::Display for PreconditionerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreconditionerType::None => write!(f, "none"),
            PreconditionerType::Any => write!(f, "any"),
            PreconditionerType::BlockJacobi => write!(f, "block-jacobi"),
        }
    }
}

impl FromStr for PreconditionerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "none" => Ok(PreconditionerType::None),
            "any" => Ok(PreconditionerType::Any),
            "block-jacobi" | "blockjacobi" => Ok(PreconditionerType::BlockJacobi),
            other => Err(format!(
                "unknown preconditioner '{other}' (expected none, any or block-jacobi)"
            )),
        }
    }
}

/// Block-diagonal preconditioner on the tangent space of SO(3)×S(2).
///
/// For a tangent vector `[Ṙ | ṫ]` at `[R | t]` the action is
/// `[R [P_R ω]ₓ | Proj_t(P_t ṫ)]` with `ω = vee(RᵀṘ)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreconditionerMatrix {
    /// `P_R`, acting on `so(3)` coordinates
    pub rotation: Matrix3<f64>,
    /// `P_t`, acting on ℝ³
    pub translation: Matrix3<f64>,
}

impl PreconditionerMatrix {
    /// The identity operator on the tangent space.
    pub fn identity() -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation: Matrix3::identity(),
        }
    }

    /// Block-Jacobi blocks of the Gauss-Newton Hessian at `e0`.
    pub fn from_data_matrix(c: &Matrix9, e0: &Matrix3<f64>) -> Self {
        let (r0, t0) = compute_rt_from_e_canonical(e0);
        let e_canonical = hat(&t0) * r0;

        let mut j_r = SMatrix::<f64, 9, 3>::zeros();
        let mut j_t = SMatrix::<f64, 9, 3>::zeros();
        for k in 0..3 {
            let axis = Vector3::ith(k, 1.0);
            j_r.set_column(k, &vec3x3(&(e_canonical * hat(&axis))));
            j_t.set_column(k, &vec3x3(&(hat(&axis) * r0)));
        }

        let h_r = j_r.transpose() * c * j_r;
        let h_t = j_t.transpose() * c * j_t;

        // The metric on so(3) coordinates is 2ωᵀω, so the Riemannian Hessian
        // block is H_R / 2.
        let rotation = floored_inverse(&h_r) * 2.0;
        let translation = sphere_block_inverse(&h_t, &t0);

        debug!(
            "Block-Jacobi preconditioner: |P_R| = {:.3e}, |P_t| = {:.3e}",
            rotation.norm(),
            translation.norm()
        );

        Self {
            rotation,
            translation,
        }
    }

    /// Apply the preconditioner to the tangent vector `v` at `y`.
    pub fn apply(&self, y: &Matrix34, v: &Matrix34) -> Matrix34 {
        let r = rotation_block(y);
        let omega = vee(&skew(&(r.transpose() * rotation_block(v))));
        let rotation_part = r * hat(&(self.rotation * omega));
        let translation_part = self.translation * translation_block(v);
        project_to_tangent(y, &from_rt(&rotation_part, &translation_part))
    }

    /// The 6×6 block-diagonal matrix `diag(P_R, P_t)`.
    pub fn as_block_diagonal(&self) -> SMatrix<f64, 6, 6> {
        let mut m = SMatrix::<f64, 6, 6>::zeros();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.rotation);
        m.fixed_view_mut::<3, 3>(3, 3).copy_from(&self.translation);
        m
    }
}

impl LinearOperator<Matrix34, Matrix34> for PreconditionerMatrix {
    fn apply(&self, x: &Matrix34, v: &Matrix34) -> Matrix34 {
        PreconditionerMatrix::apply(self, x, v)
    }
}

/// Inverse of a symmetric PSD matrix with floored eigenvalues.
fn floored_inverse(h: &Matrix3<f64>) -> Matrix3<f64> {
    let eigen = h.symmetric_eigen();
    let floor = eigenvalue_floor(eigen.eigenvalues.max());
    let inverted = eigen.eigenvalues.map(|lambda| 1.0 / lambda.max(floor));
    eigen.eigenvectors * Matrix3::from_diagonal(&inverted) * eigen.eigenvectors.transpose()
}

fn eigenvalue_floor(lambda_max: f64) -> f64 {
    (lambda_max * RELATIVE_EIGENVALUE_FLOOR).max(ABSOLUTE_EIGENVALUE_FLOOR)
}

/// Inverse of the translation block restricted to the tangent plane of `t0`.
///
/// `H_t` is nearly singular along `t0` itself (that direction only rescales
/// `E₀`), so the block is inverted on an orthonormal basis of `t0⊥` and the
/// normal direction receives the mean tangent eigenvalue.
fn sphere_block_inverse(h_t: &Matrix3<f64>, t0: &Vector3<f64>) -> Matrix3<f64> {
    let helper = if t0.x.abs() < 0.9 { Vector3::x() } else { Vector3::y() };
    let b1 = t0.cross(&helper).normalize();
    let b2 = t0.cross(&b1);
    let basis = Matrix3x2::from_columns(&[b1, b2]);

    let reduced: Matrix2<f64> = basis.transpose() * h_t * basis;
    let eigen = reduced.symmetric_eigen();
    let floor = eigenvalue_floor(eigen.eigenvalues.max());
    let inverted = eigen.eigenvalues.map(|lambda| 1.0 / lambda.max(floor));
    let reduced_inverse =
        eigen.eigenvectors * Matrix2::from_diagonal(&inverted) * eigen.eigenvectors.transpose();

    let normal_weight = 0.5 * inverted.sum();
    basis * reduced_inverse * basis.transpose() + t0 * t0.transpose() * normal_weight
}

/// Linear 8-point estimate of the essential matrix from the data matrix.
///
/// Scaled to singular values `(1, 1, 0)`, the scale of `[t]ₓR` with `|t| = 1`.
pub fn eight_point_estimate(c: &Matrix9) -> Matrix3<f64> {
    let eigen = c.symmetric_eigen();
    let index = eigen.eigenvalues.imin();
    let v: Vector9 = eigen.eigenvectors.column(index).into_owned();
    let e = project_to_essential_manifold(&mat3x3(&v));
    let norm = e.norm();
    if norm > f64::EPSILON {
        e * (SQRT_2 / norm)
    } else {
        e
    }
}

/// Output of [`initialize_8pts`].
#[derive(Debug, Clone, Default)]
pub struct InitializerOutput {
    /// 8-point estimate, present unless the selector is `Any`
    pub e_8pts: Option<Matrix3<f64>>,
    /// Preconditioning matrix, present for `BlockJacobi`
    pub precon: Option<PreconditionerMatrix>,
}

/// Run the initializer requested by `selector`.
pub fn initialize_8pts(c: &Matrix9, selector: PreconditionerType) -> InitializerOutput {
    if !selector.runs_initializer() {
        return InitializerOutput::default();
    }

    let e_8pts = eight_point_estimate(c);
    let precon = selector
        .uses_preconditioner()
        .then(|| PreconditionerMatrix::from_data_matrix(c, &e_8pts));

    InitializerOutput {
        e_8pts: Some(e_8pts),
        precon,
    }
}
