//! Steihaug–Toint truncated preconditioned conjugate gradient.
//!
//! Approximately minimizes the quadratic model
//!
//! ```text
//! m(η) = f(x) + ⟨grad f(x), η⟩ + ½⟨η, Hess f(x)[η]⟩
//! ```
//!
//! over the tangent space at `x`, subject to `‖η‖_P ≤ Δ` where `‖·‖_P` is the
//! norm induced by the inverse preconditioner. The iterates' `P`-norms are
//! tracked by the recursions
//!
//! ```text
//! ⟨η, η⟩_P,  ⟨η, δ⟩_P,  ⟨δ, δ⟩_P
//! ```
//!
//! so the preconditioner is applied once per iteration and never inverted.
//! Iteration stops on negative curvature, on leaving the trust region (both
//! return the boundary point), or when the residual reaches the
//! linear/superlinear target `‖r‖ ≤ ‖r₀‖·min(‖r₀‖^θ, κ)`.

use crate::optimizer::RiemannianProblem;
use std::fmt;

/// Inputs of one truncated CG solve.
#[derive(Debug, Clone, Copy)]
pub struct TcgParameters {
    /// Trust-region radius Δ
    pub radius: f64,
    /// Linear convergence factor κ
    pub kappa: f64,
    /// Superlinear convergence exponent θ
    pub theta: f64,
    /// Maximum number of CG iterations
    pub max_iterations: usize,
}

/// Why truncated CG stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcgStopReason {
    /// Direction of non-positive curvature; the step goes to the boundary
    NegativeCurvature,
    /// The next iterate would leave the trust region; the step goes to the boundary
    ExceededTrustRegion,
    /// Residual reached the linear target `κ‖r₀‖`
    LinearConvergence,
    /// Residual reached the superlinear target `‖r₀‖^{1+θ}`
    SuperlinearConvergence,
    /// Iteration cap reached
    MaxIterations,
    /// The last update increased the model; the previous iterate is returned
    ModelIncreased,
    /// The preconditioned residual lost positivity
    PreconditionerBreakdown,
}

impl TcgStopReason {
    /// Whether the returned step lies on the trust-region boundary.
    pub fn hit_boundary(&self) -> bool {
        matches!(
            self,
            TcgStopReason::NegativeCurvature | TcgStopReason::ExceededTrustRegion
        )
    }
}

impl fmt::Display for TcgStopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TcgStopReason::NegativeCurvature => "negative curvature",
            TcgStopReason::ExceededTrustRegion => "exceeded trust region",
            TcgStopReason::LinearConvergence => "linear convergence",
            TcgStopReason::SuperlinearConvergence => "superlinear convergence",
            TcgStopReason::MaxIterations => "max iterations",
            TcgStopReason::ModelIncreased => "model increased",
            TcgStopReason::PreconditionerBreakdown => "preconditioner breakdown",
        };
        write!(f, "{text}")
    }
}

/// Step computed by truncated CG.
#[derive(Debug, Clone)]
pub struct TcgResult<V> {
    /// Approximate model minimizer η
    pub step: V,
    /// Hessian applied to the step, Hess f(x)[η]
    pub hessian_step: V,
    /// Number of CG iterations performed
    pub iterations: usize,
    pub stop_reason: TcgStopReason,
}

/// Run truncated preconditioned CG at `x` for the given gradient.
pub fn truncated_cg<P: RiemannianProblem>(
    problem: &P,
    x: &P::Point,
    cache: &mut P::Cache,
    gradient: &P::Tangent,
    params: &TcgParameters,
) -> TcgResult<P::Tangent> {
    let preconditioner = problem.preconditioner();
    let radius_sq = params.radius * params.radius;

    let mut eta = problem.zero_tangent(x);
    let mut hessian_eta = problem.zero_tangent(x);

    let mut residual = gradient.clone();
    let residual_norm0 = problem.metric(x, &residual, &residual).sqrt();
    let mut z = preconditioner.apply(x, &residual);
    let mut z_r = problem.metric(x, &z, &residual);

    if residual_norm0 == 0.0 || z_r <= 0.0 {
        let stop_reason = if residual_norm0 == 0.0 {
            TcgStopReason::LinearConvergence
        } else {
            TcgStopReason::PreconditionerBreakdown
        };
        return TcgResult {
            step: eta,
            hessian_step: hessian_eta,
            iterations: 0,
            stop_reason,
        };
    }

    let mut e_pe = 0.0;
    let mut e_pd = 0.0;
    let mut d_pd = z_r;
    let mut delta = z.clone() * -1.0;

    // Model value m(η) − f(x) of the current iterate.
    let mut model_value = 0.0;
    let target = residual_norm0 * residual_norm0.powf(params.theta).min(params.kappa);
    let mut stop_reason = TcgStopReason::MaxIterations;
    let mut iterations = 0;

    for j in 0..params.max_iterations {
        iterations = j + 1;
        let hessian_delta = problem.hessian_vector_product(x, cache, &delta);
        let d_hd = problem.metric(x, &delta, &hessian_delta);
        let alpha = z_r / d_hd;
        let e_pe_new = e_pe + 2.0 * alpha * e_pd + alpha * alpha * d_pd;

        if d_hd <= 0.0 || e_pe_new >= radius_sq {
            let tau = (-e_pd + (e_pd * e_pd + d_pd * (radius_sq - e_pe)).max(0.0).sqrt()) / d_pd;
            eta = eta + delta.clone() * tau;
            hessian_eta = hessian_eta + hessian_delta * tau;
            stop_reason = if d_hd <= 0.0 {
                TcgStopReason::NegativeCurvature
            } else {
                TcgStopReason::ExceededTrustRegion
            };
            break;
        }

        e_pe = e_pe_new;
        let candidate = eta.clone() + delta.clone() * alpha;
        let hessian_candidate = hessian_eta.clone() + hessian_delta.clone() * alpha;

        let candidate_value = problem.metric(x, &candidate, gradient)
            + 0.5 * problem.metric(x, &candidate, &hessian_candidate);
        if candidate_value >= model_value {
            stop_reason = TcgStopReason::ModelIncreased;
            break;
        }
        model_value = candidate_value;
        eta = candidate;
        hessian_eta = hessian_candidate;

        residual = residual + hessian_delta * alpha;
        let residual_norm = problem.metric(x, &residual, &residual).sqrt();
        if residual_norm <= target {
            stop_reason = if params.kappa < residual_norm0.powf(params.theta) {
                TcgStopReason::LinearConvergence
            } else {
                TcgStopReason::SuperlinearConvergence
            };
            break;
        }

        z = preconditioner.apply(x, &residual);
        let z_r_old = z_r;
        z_r = problem.metric(x, &z, &residual);
        if z_r <= 0.0 {
            stop_reason = TcgStopReason::PreconditionerBreakdown;
            break;
        }

        let beta = z_r / z_r_old;
        delta = delta * beta - z.clone();
        e_pd = beta * (e_pd + alpha * d_pd);
        d_pd = z_r + beta * beta * d_pd;
    }

    TcgResult {
        step: eta,
        hessian_step: hessian_eta,
        iterations,
        stop_reason,
    }
}
