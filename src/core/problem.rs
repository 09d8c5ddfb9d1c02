//! The essential matrix estimation problem on SO(3)×S(2).
//!
//! For `Y = [R | t]` and `E = [t]ₓR` the cost is the algebraic epipolar error
//!
//! ```text
//! f(Y) = ½ vec(E)ᵀ C vec(E)
//! ```
//!
//! With `G_E = mat(C vec(E))` the Euclidean gradient is
//!
//! ```text
//! ∇_R f = [t]ₓᵀ G_E
//! ∇_t f = vee(M − Mᵀ),   M = G_E Rᵀ
//! ```
//!
//! The Riemannian Hessian-vector product is assembled in three steps that
//! are exposed separately: the exact directional derivative of the Euclidean
//! gradient ([`EssentialProblem::ambient_hessian_vector_product`]), the
//! Weingarten terms of the embedding ([`EssentialProblem::curvature_correction`])
//! and the projection onto the tangent space.

use crate::core::correspondence::PointCorrespondence;
use crate::core::data_matrix::{Matrix9, Vector9, mat3x3, vec3x3};
use crate::core::initializer::{PreconditionerMatrix, PreconditionerType};
use crate::manifold::essential::compute_e_from_rt;
use crate::manifold::so3_s2::{self, Matrix34, from_rt, rotation_block, translation_block};
use crate::manifold::{hat, sym, vee};
use crate::optimizer::{Preconditioning, RiemannianProblem};
use nalgebra::Matrix3;

/// Per-run cache of iterate-dependent quantities.
///
/// Everything stored here belongs to the point recorded in `point`; reading
/// it through [`EssentialProblem`] at any other point recomputes it first.
#[derive(Debug, Clone, Default)]
pub struct ProblemCachedMatrices {
    point: Option<Matrix34>,
    c_vec_e: Vector9,
    euclidean_gradient: Option<Matrix34>,
}

impl ProblemCachedMatrices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the cached quantities were computed at `y`.
    pub fn is_valid_for(&self, y: &Matrix34) -> bool {
        self.point.as_ref() == Some(y)
    }

    /// Point the cache currently describes.
    pub fn point(&self) -> Option<&Matrix34> {
        self.point.as_ref()
    }

    /// Cached Euclidean gradient, if one was computed for the current point.
    pub fn euclidean_gradient(&self) -> Option<&Matrix34> {
        self.euclidean_gradient.as_ref()
    }

    pub fn invalidate(&mut self) {
        *self = Self::default();
    }
}

/// Cost, gradient and Hessian operators bound to one data matrix.
#[derive(Debug, Clone)]
pub struct EssentialProblem<'a> {
    data_matrix: Matrix9,
    preconditioner_type: PreconditionerType,
    precon: Option<PreconditionerMatrix>,
    points: &'a [PointCorrespondence],
}

impl<'a> EssentialProblem<'a> {
    pub fn new(data_matrix: Matrix9, preconditioner_type: PreconditionerType) -> Self {
        Self {
            data_matrix,
            preconditioner_type,
            precon: None,
            points: &[],
        }
    }

    pub fn set_point_correspondences(&mut self, points: &'a [PointCorrespondence]) {
        self.points = points;
    }

    pub fn set_matrix_precon(&mut self, precon: PreconditionerMatrix) {
        self.precon = Some(precon);
    }

    pub fn data_matrix(&self) -> &Matrix9 {
        &self.data_matrix
    }

    pub fn preconditioner_type(&self) -> PreconditionerType {
        self.preconditioner_type
    }

    pub fn points(&self) -> &'a [PointCorrespondence] {
        self.points
    }

    /// The installed preconditioner, when the selector asks for one.
    fn active_preconditioner(&self) -> Option<&PreconditionerMatrix> {
        if self.preconditioner_type.uses_preconditioner() {
            self.precon.as_ref()
        } else {
            None
        }
    }

    /// Essential matrix `[t]ₓR` of the point `y`.
    pub fn essential_matrix(y: &Matrix34) -> Matrix3<f64> {
        compute_e_from_rt(&rotation_block(y), &translation_block(y))
    }

    /// Bring the cache to `y`, dropping everything computed elsewhere.
    fn refresh_cache(&self, y: &Matrix34, cache: &mut ProblemCachedMatrices) {
        if !cache.is_valid_for(y) {
            let e = Self::essential_matrix(y);
            cache.point = Some(*y);
            cache.c_vec_e = self.data_matrix * vec3x3(&e);
            cache.euclidean_gradient = None;
        }
    }

    /// `f(Y) = ½ vec(E)ᵀ C vec(E)`.
    pub fn evaluate_objective(&self, y: &Matrix34, cache: &mut ProblemCachedMatrices) -> f64 {
        self.refresh_cache(y, cache);
        0.5 * vec3x3(&Self::essential_matrix(y)).dot(&cache.c_vec_e)
    }

    /// Ambient gradient of `f` at `y`, cached for later Hessian products.
    pub fn euclidean_gradient(&self, y: &Matrix34, cache: &mut ProblemCachedMatrices) -> Matrix34 {
        self.refresh_cache(y, cache);
        if let Some(gradient) = cache.euclidean_gradient {
            return gradient;
        }

        let r = rotation_block(y);
        let t = translation_block(y);
        let g_e = mat3x3(&cache.c_vec_e);

        let grad_r = hat(&t).transpose() * g_e;
        let m = g_e * r.transpose();
        let grad_t = vee(&(m - m.transpose()));

        let gradient = from_rt(&grad_r, &grad_t);
        cache.euclidean_gradient = Some(gradient);
        gradient
    }

    /// Project a Euclidean gradient onto the tangent space at `y`.
    pub fn riemannian_gradient(&self, y: &Matrix34, euclidean_gradient: &Matrix34) -> Matrix34 {
        so3_s2::project_to_tangent(y, euclidean_gradient)
    }

    /// Riemannian gradient at `y` computed from scratch.
    pub fn riemannian_gradient_at(&self, y: &Matrix34) -> Matrix34 {
        let mut cache = ProblemCachedMatrices::new();
        let gradient = self.euclidean_gradient(y, &mut cache);
        self.riemannian_gradient(y, &gradient)
    }

    /// Directional derivative of the Euclidean gradient at `y` along `v`.
    pub fn ambient_hessian_vector_product(
        &self,
        y: &Matrix34,
        cache: &mut ProblemCachedMatrices,
        v: &Matrix34,
    ) -> Matrix34 {
        self.refresh_cache(y, cache);
        let r = rotation_block(y);
        let t = translation_block(y);
        let r_dot = rotation_block(v);
        let t_dot = translation_block(v);

        let g_e = mat3x3(&cache.c_vec_e);
        let e_dot = hat(&t_dot) * r + hat(&t) * r_dot;
        let g_e_dot = mat3x3(&(self.data_matrix * vec3x3(&e_dot)));

        let d_grad_r = hat(&t_dot).transpose() * g_e + hat(&t).transpose() * g_e_dot;
        let d_m = g_e_dot * r.transpose() + g_e * r_dot.transpose();
        let d_grad_t = vee(&(d_m - d_m.transpose()));

        from_rt(&d_grad_r, &d_grad_t)
    }

    /// Weingarten terms `[−Ṙ sym(Rᵀ∇_R f) | −ṫ (tᵀ∇_t f)]`.
    pub fn curvature_correction(
        &self,
        y: &Matrix34,
        euclidean_gradient: &Matrix34,
        v: &Matrix34,
    ) -> Matrix34 {
        let r = rotation_block(y);
        let t = translation_block(y);
        let grad_r = rotation_block(euclidean_gradient);
        let grad_t = translation_block(euclidean_gradient);
        let rotation_term = -rotation_block(v) * sym(&(r.transpose() * grad_r));
        let translation_term = -translation_block(v) * t.dot(&grad_t);
        from_rt(&rotation_term, &translation_term)
    }

    /// Riemannian Hessian at `y` applied to the tangent vector `v`.
    pub fn riemannian_hessian_vector_product(
        &self,
        y: &Matrix34,
        cache: &mut ProblemCachedMatrices,
        v: &Matrix34,
    ) -> Matrix34 {
        let euclidean_gradient = self.euclidean_gradient(y, cache);
        let ambient = self.ambient_hessian_vector_product(y, cache, v);
        let correction = self.curvature_correction(y, &euclidean_gradient, v);
        so3_s2::project_to_tangent(y, &(ambient + correction))
    }

    /// Apply the preconditioner, or the identity when none is active.
    pub fn precondition(&self, y: &Matrix34, v: &Matrix34) -> Matrix34 {
        match self.active_preconditioner() {
            Some(precon) => precon.apply(y, v),
            None => *v,
        }
    }

    pub fn retract(&self, y: &Matrix34, v: &Matrix34) -> Matrix34 {
        so3_s2::retract(y, v)
    }

    pub fn metric(&self, y: &Matrix34, v1: &Matrix34, v2: &Matrix34) -> f64 {
        so3_s2::metric(y, v1, v2)
    }

    /// Algebraic epipolar residuals `x2ᵀ E x1` of the bound correspondences.
    pub fn epipolar_residuals(&self, y: &Matrix34) -> Vec<f64> {
        let e = Self::essential_matrix(y);
        self.points.iter().map(|point| point.epipolar_residual(&e)).collect()
    }
}

impl RiemannianProblem for EssentialProblem<'_> {
    type Point = Matrix34;
    type Tangent = Matrix34;
    type Cache = ProblemCachedMatrices;

    fn objective(&self, x: &Matrix34, cache: &mut ProblemCachedMatrices) -> f64 {
        self.evaluate_objective(x, cache)
    }

    fn gradient(&self, x: &Matrix34, cache: &mut ProblemCachedMatrices) -> Matrix34 {
        let euclidean_gradient = self.euclidean_gradient(x, cache);
        self.riemannian_gradient(x, &euclidean_gradient)
    }

    fn hessian_vector_product(
        &self,
        x: &Matrix34,
        cache: &mut ProblemCachedMatrices,
        v: &Matrix34,
    ) -> Matrix34 {
        self.riemannian_hessian_vector_product(x, cache, v)
    }

    fn metric(&self, x: &Matrix34, v1: &Matrix34, v2: &Matrix34) -> f64 {
        EssentialProblem::metric(self, x, v1, v2)
    }

    fn retract(&self, x: &Matrix34, v: &Matrix34) -> Matrix34 {
        EssentialProblem::retract(self, x, v)
    }

    fn zero_tangent(&self, _x: &Matrix34) -> Matrix34 {
        Matrix34::zeros()
    }

    fn preconditioner(&self) -> Preconditioning<'_, Matrix34, Matrix34> {
        match self.active_preconditioner() {
            Some(precon) => Preconditioning::Preconditioner(precon),
            None => Preconditioning::NoPreconditioner,
        }
    }
}
