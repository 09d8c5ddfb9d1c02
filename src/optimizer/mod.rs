//! Riemannian trust-region optimization.
//!
//! The solver is generic over a [`RiemannianProblem`]: anything that can
//! evaluate a cost, a Riemannian gradient and a Riemannian Hessian-vector
//! product, measure tangent vectors with a metric and move along them with a
//! retraction. The outer loop lives in [`trust_region`]; the inner
//! Steihaug–Toint truncated conjugate gradient lives in [`truncated_cg`].
//!
//! Problems may expose an optional preconditioner. It is returned as an
//! explicit [`Preconditioning`] variant so the solver never has to guess
//! whether one is installed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Sub};
use thiserror::Error;

pub mod truncated_cg;
pub mod trust_region;

pub use truncated_cg::{TcgResult, TcgStopReason, truncated_cg};
pub use trust_region::{
    IterationStats, TrustRegion, TrustRegionConfig, TrustRegionResult, TrustRegionSummary,
};

/// Linear map acting on the tangent space at a point.
pub trait LinearOperator<X, V> {
    fn apply(&self, x: &X, v: &V) -> V;
}

/// Preconditioner exposed by a problem.
pub enum Preconditioning<'a, X, V> {
    /// Identity preconditioning
    NoPreconditioner,
    /// Symmetric positive-definite operator on the tangent space
    Preconditioner(&'a dyn LinearOperator<X, V>),
}

impl<X, V: Clone> Preconditioning<'_, X, V> {
    /// Apply the preconditioner, or return `v` unchanged when none is installed.
    pub fn apply(&self, x: &X, v: &V) -> V {
        match self {
            Preconditioning::NoPreconditioner => v.clone(),
            Preconditioning::Preconditioner(operator) => operator.apply(x, v),
        }
    }

    pub fn is_some(&self) -> bool {
        matches!(self, Preconditioning::Preconditioner(_))
    }
}

/// A smooth cost function on a Riemannian manifold.
///
/// `Cache` carries quantities shared between the cost, the gradient and the
/// Hessian at one point. Implementations must recompute anything that was
/// cached for a different point.
pub trait RiemannianProblem {
    type Point: Clone;
    type Tangent: Clone
        + Add<Output = Self::Tangent>
        + Sub<Output = Self::Tangent>
        + Mul<f64, Output = Self::Tangent>;
    type Cache;

    fn objective(&self, x: &Self::Point, cache: &mut Self::Cache) -> f64;

    /// Riemannian gradient at `x`.
    fn gradient(&self, x: &Self::Point, cache: &mut Self::Cache) -> Self::Tangent;

    /// Riemannian Hessian at `x` applied to the tangent vector `v`.
    fn hessian_vector_product(
        &self,
        x: &Self::Point,
        cache: &mut Self::Cache,
        v: &Self::Tangent,
    ) -> Self::Tangent;

    fn metric(&self, x: &Self::Point, v1: &Self::Tangent, v2: &Self::Tangent) -> f64;

    fn retract(&self, x: &Self::Point, v: &Self::Tangent) -> Self::Point;

    fn zero_tangent(&self, x: &Self::Point) -> Self::Tangent;

    fn preconditioner(&self) -> Preconditioning<'_, Self::Point, Self::Tangent> {
        Preconditioning::NoPreconditioner
    }
}

/// Why the trust-region solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizationStatus {
    /// Riemannian gradient norm fell below the tolerance
    GradientToleranceReached,
    /// Preconditioned gradient norm fell below the tolerance
    PreconditionedGradientToleranceReached,
    /// An accepted step decreased the cost by less than the relative tolerance
    RelativeDecreaseToleranceReached,
    /// The computed step was shorter than the tolerance
    StepSizeToleranceReached,
    /// Maximum number of outer iterations reached
    MaxIterationsReached,
    /// Wall-clock budget exhausted
    Timeout,
}

impl OptimizationStatus {
    /// Whether the solver stopped on a first-order criterion.
    pub fn is_converged(&self) -> bool {
        matches!(
            self,
            OptimizationStatus::GradientToleranceReached
                | OptimizationStatus::PreconditionedGradientToleranceReached
        )
    }
}

impl fmt::Display for OptimizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizationStatus::GradientToleranceReached => write!(f, "Gradient tolerance reached"),
            OptimizationStatus::PreconditionedGradientToleranceReached => {
                write!(f, "Preconditioned gradient tolerance reached")
            }
            OptimizationStatus::RelativeDecreaseToleranceReached => {
                write!(f, "Relative decrease tolerance reached")
            }
            OptimizationStatus::StepSizeToleranceReached => {
                write!(f, "Step size tolerance reached")
            }
            OptimizationStatus::MaxIterationsReached => write!(f, "Maximum iterations reached"),
            OptimizationStatus::Timeout => write!(f, "Timeout"),
        }
    }
}

/// Errors raised by the optimizer before iterating.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimizerError {
    /// Configuration values out of range
    #[error("Invalid solver configuration: {0}")]
    InvalidConfiguration(String),

    /// Cost or gradient evaluated to NaN or infinity at the initial point
    #[error("Non-finite value at the initial point: {0}")]
    NonFiniteInitialValue(String),
}

/// Result type for optimizer operations.
pub type OptimizerResult<T> = Result<T, OptimizerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    struct Scale(f64);

    impl LinearOperator<Vector3<f64>, Vector3<f64>> for Scale {
        fn apply(&self, _x: &Vector3<f64>, v: &Vector3<f64>) -> Vector3<f64> {
            v * self.0
        }
    }

    #[test]
    fn test_preconditioning_dispatch() {
        let x = Vector3::x();
        let v = Vector3::new(1.0, -2.0, 3.0);

        let none: Preconditioning<'_, Vector3<f64>, Vector3<f64>> =
            Preconditioning::NoPreconditioner;
        assert!(!none.is_some());
        assert_eq!(none.apply(&x, &v), v);

        let scale = Scale(0.5);
        let some: Preconditioning<'_, Vector3<f64>, Vector3<f64>> =
            Preconditioning::Preconditioner(&scale);
        assert!(some.is_some());
        assert_eq!(some.apply(&x, &v), v * 0.5);
    }

    #[test]
    fn test_status_display_and_convergence() {
        assert!(OptimizationStatus::GradientToleranceReached.is_converged());
        assert!(!OptimizationStatus::MaxIterationsReached.is_converged());
        assert_eq!(OptimizationStatus::Timeout.to_string(), "Timeout");
    }
}
