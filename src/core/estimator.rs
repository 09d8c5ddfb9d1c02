//! End-to-end relative pose estimation.
//!
//! [`EssentialEstimator::estimate`] runs the whole pipeline:
//!
//! 1. build the data matrix `C`
//! 2. run the 8-point initializer and compute the preconditioner (unless the
//!    selector is [`PreconditionerType::Any`])
//! 3. project the initial essential matrix onto the essential manifold and
//!    factor it into `Y₀ = [R₀ | t₀]` with the cheirality test
//! 4. minimize the cost with the trust-region solver
//! 5. extract `(R, t, E)`, recompute the Riemannian gradient norm and record
//!    the per-phase timings
//!
//! # Example
//!
//! ```no_run
//! use apex_essential::core::{EssentialEstimationOptions, EssentialEstimator, PointCorrespondence};
//! # fn load() -> Vec<PointCorrespondence> { Vec::new() }
//!
//! let points = load();
//! let result = EssentialEstimator::new(&points, EssentialEstimationOptions::default())
//!     .estimate()
//!     .expect("estimation failed");
//! println!("{result}");
//! ```

use crate::core::correspondence::PointCorrespondence;
use crate::core::data_matrix::construct_data_matrix;
use crate::core::initializer::{PreconditionerType, initialize_8pts};
use crate::core::problem::{EssentialProblem, ProblemCachedMatrices};
use crate::core::{CoreError, MIN_CORRESPONDENCES};
use crate::error::ApexEssentialResult;
use crate::manifold::essential::{
    compute_e_from_rt, compute_rt_from_e, project_to_essential_manifold, validate_essential_matrix,
};
use crate::manifold::so3_s2::{from_rt, rotation_block, translation_block};
use crate::optimizer::{OptimizationStatus, TrustRegion, TrustRegionConfig};
use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::info;

/// Options controlling one estimation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EssentialEstimationOptions {
    /// Initializer and preconditioner selection
    pub use_preconditioning: PreconditionerType,
    /// Log pipeline diagnostics at info level
    pub estimation_verbose: bool,
    /// Log the solver's per-iteration table at debug level
    pub verbose: bool,
    pub tol_grad_norm: f64,
    pub rel_func_decrease_tol: f64,
    pub stepsize_tol: f64,
    pub preconditioned_grad_norm_tol: f64,
    pub max_rtr_iterations: usize,
    pub max_tcg_iterations: usize,
}

impl Default for EssentialEstimationOptions {
    fn default() -> Self {
        Self {
            use_preconditioning: PreconditionerType::None,
            estimation_verbose: false,
            verbose: false,
            tol_grad_norm: 1e-9,
            rel_func_decrease_tol: 1e-10,
            stepsize_tol: 1e-12,
            preconditioned_grad_norm_tol: 1e-12,
            max_rtr_iterations: 500,
            max_tcg_iterations: 2000,
        }
    }
}

impl EssentialEstimationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_preconditioning(mut self, selector: PreconditionerType) -> Self {
        self.use_preconditioning = selector;
        self
    }

    pub fn with_estimation_verbose(mut self, verbose: bool) -> Self {
        self.estimation_verbose = verbose;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_tol_grad_norm(mut self, tolerance: f64) -> Self {
        self.tol_grad_norm = tolerance;
        self
    }

    pub fn with_rel_func_decrease_tol(mut self, tolerance: f64) -> Self {
        self.rel_func_decrease_tol = tolerance;
        self
    }

    pub fn with_stepsize_tol(mut self, tolerance: f64) -> Self {
        self.stepsize_tol = tolerance;
        self
    }

    pub fn with_preconditioned_grad_norm_tol(mut self, tolerance: f64) -> Self {
        self.preconditioned_grad_norm_tol = tolerance;
        self
    }

    pub fn with_max_rtr_iterations(mut self, max_iterations: usize) -> Self {
        self.max_rtr_iterations = max_iterations;
        self
    }

    pub fn with_max_tcg_iterations(mut self, max_iterations: usize) -> Self {
        self.max_tcg_iterations = max_iterations;
        self
    }

    /// Solver configuration derived from these options.
    pub fn trust_region_config(&self) -> TrustRegionConfig {
        TrustRegionConfig::new()
            .with_gradient_tolerance(self.tol_grad_norm)
            .with_relative_decrease_tolerance(self.rel_func_decrease_tol)
            .with_stepsize_tolerance(self.stepsize_tol)
            .with_preconditioned_gradient_tolerance(self.preconditioned_grad_norm_tol)
            .with_max_iterations(self.max_rtr_iterations)
            .with_max_tpcg_iterations(self.max_tcg_iterations)
            .with_verbose(self.verbose)
    }
}

/// Outcome of one estimation run. Durations are in microseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EssentialEstimationResult {
    /// Final objective value
    pub f_hat: f64,
    /// Riemannian gradient norm at the returned pose
    pub gradnorm: f64,
    pub r_opt: Matrix3<f64>,
    pub t_opt: Vector3<f64>,
    pub e_opt: Matrix3<f64>,
    pub status: OptimizationStatus,
    pub iterations: usize,
    /// Data matrix construction
    pub elapsed_c_time: u128,
    /// 8-point initializer and preconditioner
    pub elapsed_8pt_time: u128,
    /// Everything before the solver starts
    pub elapsed_init_time: u128,
    /// Solver
    pub elapsed_iterative_time: u128,
    /// Whole run
    pub elapsed_estimation_time: u128,
}

impl fmt::Display for EssentialEstimationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Data from estimation")?;
        writeln!(f, "--------------------")?;
        writeln!(f, "f_hat = {:.6e}", self.f_hat)?;
        writeln!(f, "gradnorm = {:.6e}", self.gradnorm)?;
        writeln!(f, "status = {} after {} iterations", self.status, self.iterations)?;
        writeln!(f, "######## Times [in microseconds]:")?;
        writeln!(f, "Data matrix C construction: {}", self.elapsed_c_time)?;
        writeln!(f, "8-point initialization:     {}", self.elapsed_8pt_time)?;
        writeln!(f, "-----")?;
        writeln!(f, "Total init:                 {}", self.elapsed_init_time)?;
        writeln!(f, "Iterative method:           {}", self.elapsed_iterative_time)?;
        writeln!(f, "---------------------")?;
        writeln!(f, "Total time:                 {}", self.elapsed_estimation_time)?;
        writeln!(f)?;
        writeln!(f, "Recovered R:{}", self.r_opt)?;
        writeln!(f, "Recovered t:{}", self.t_opt)?;
        Ok(())
    }
}

/// Relative pose estimator over a borrowed correspondence set.
#[derive(Debug, Clone)]
pub struct EssentialEstimator<'a> {
    points: &'a [PointCorrespondence],
    options: EssentialEstimationOptions,
    initial_guess: Option<Matrix3<f64>>,
}

impl<'a> EssentialEstimator<'a> {
    pub fn new(points: &'a [PointCorrespondence], options: EssentialEstimationOptions) -> Self {
        Self {
            points,
            options,
            initial_guess: None,
        }
    }

    /// Start from `e` instead of the 8-point estimate.
    ///
    /// Required for [`PreconditionerType::Any`]. The matrix does not need to
    /// be a valid essential matrix; it is projected first.
    pub fn with_initial_guess(mut self, e: Matrix3<f64>) -> Self {
        self.initial_guess = Some(e);
        self
    }

    pub fn options(&self) -> &EssentialEstimationOptions {
        &self.options
    }

    fn validate_points(&self) -> Result<(), CoreError> {
        if self.points.len() < MIN_CORRESPONDENCES {
            return Err(CoreError::InsufficientCorrespondences {
                found: self.points.len(),
                required: MIN_CORRESPONDENCES,
            });
        }
        if let Some(index) = self.points.iter().position(|point| !point.is_finite()) {
            return Err(CoreError::NonFiniteInput(index));
        }
        Ok(())
    }

    /// Run the full estimation pipeline.
    pub fn estimate(&self) -> ApexEssentialResult<EssentialEstimationResult> {
        self.validate_points()?;
        let verbose = self.options.estimation_verbose;
        let selector = self.options.use_preconditioning;

        if verbose {
            info!("Constructing data matrix C from {} correspondences", self.points.len());
        }
        let start_time = Instant::now();
        let c = construct_data_matrix(self.points);
        let elapsed_c_time = start_time.elapsed().as_micros();

        let start_8pt = Instant::now();
        let initializer = initialize_8pts(&c, selector);
        let elapsed_8pt_time = start_8pt.elapsed().as_micros();

        let e_raw = match (self.initial_guess, initializer.e_8pts) {
            (Some(guess), _) => guess,
            (None, Some(e_8pts)) => e_8pts,
            (None, None) => return Err(CoreError::MissingInitialGuess.into()),
        };
        validate_essential_matrix(&e_raw)?;
        let e_initial = project_to_essential_manifold(&e_raw);
        let (r_initial, t_initial) = compute_rt_from_e(self.points, &e_initial);
        let y0 = from_rt(&r_initial, &t_initial);

        if verbose {
            info!("Initial guess rotation:{}", r_initial);
            info!("Initial guess translation:{}", t_initial);
        }

        let mut problem = EssentialProblem::new(c, selector);
        problem.set_point_correspondences(self.points);
        if let Some(precon) = initializer.precon {
            problem.set_matrix_precon(precon);
        }
        let mut cache = ProblemCachedMatrices::new();

        if verbose {
            let f_initial = problem.evaluate_objective(&y0, &mut cache);
            info!("Initial objective value f_init = {:.6e}", f_initial);
        }

        let config = self.options.trust_region_config();
        if verbose {
            config.print_configuration();
        }
        let solver = TrustRegion::with_config(config);
        let elapsed_init_time = start_time.elapsed().as_micros();

        let start_opt = Instant::now();
        let solution = solver.optimize(&problem, &y0, &mut cache)?;
        let elapsed_iterative_time = start_opt.elapsed().as_micros();

        let r_opt = rotation_block(&solution.point);
        let t_opt = translation_block(&solution.point);
        let e_opt = compute_e_from_rt(&r_opt, &t_opt);
        let gradnorm = problem.riemannian_gradient_at(&solution.point).norm();

        if verbose {
            info!("Final objective {:.6e}, {}", solution.objective, solution.status);
            info!("\n{}", solution.summary);
        }

        Ok(EssentialEstimationResult {
            f_hat: solution.objective,
            gradnorm,
            r_opt,
            t_opt,
            e_opt,
            status: solution.status,
            iterations: solution.iterations,
            elapsed_c_time,
            elapsed_8pt_time,
            elapsed_init_time,
            elapsed_iterative_time,
            elapsed_estimation_time: start_time.elapsed().as_micros(),
        })
    }
}

/// Estimate independent problems in parallel, one problem and cache per run.
pub fn estimate_batch(
    point_sets: &[Vec<PointCorrespondence>],
    options: &EssentialEstimationOptions,
) -> Vec<ApexEssentialResult<EssentialEstimationResult>> {
    point_sets
        .par_iter()
        .map(|points| EssentialEstimator::new(points, options.clone()).estimate())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApexEssentialError;
    use nalgebra::Rotation3;

    fn scene() -> (Matrix3<f64>, Vector3<f64>, Vec<PointCorrespondence>) {
        let r = Rotation3::from_scaled_axis(Vector3::new(-0.1, 0.25, 0.05)).into_inner();
        let t = Vector3::new(0.7, -0.1, 0.3).normalize();
        let points = (0..40)
            .map(|i| {
                let fi = i as f64;
                let landmark = Vector3::new(
                    (fi * 2.1).sin() * 1.8,
                    (fi * 1.3).cos() * 1.4,
                    4.5 + (fi * 0.7).sin() * 1.5,
                );
                let second = r * landmark + t;
                PointCorrespondence::new(landmark / landmark.z, second / second.z)
            })
            .collect();
        (r, t, points)
    }

    #[test]
    fn test_default_options() {
        let options = EssentialEstimationOptions::default();
        assert_eq!(options.use_preconditioning, PreconditionerType::None);
        assert_eq!(options.tol_grad_norm, 1e-9);
        assert_eq!(options.max_rtr_iterations, 500);
        assert_eq!(options.max_tcg_iterations, 2000);

        let config = options.trust_region_config();
        assert_eq!(config.gradient_tolerance, 1e-9);
        assert_eq!(config.relative_decrease_tolerance, 1e-10);
        assert_eq!(config.max_tpcg_iterations, 2000);
    }

    #[test]
    fn test_noiseless_scene_is_recovered() {
        let (r, t, points) = scene();
        let result = EssentialEstimator::new(&points, EssentialEstimationOptions::default())
            .estimate()
            .unwrap();

        let truth = compute_e_from_rt(&r, &t);
        let error = (result.e_opt - truth).norm().min((result.e_opt + truth).norm());
        assert!(error < 1e-6, "essential error {error}");
        assert!((result.r_opt - r).norm() < 1e-6);
        assert!(result.f_hat < 1e-12);
    }

    #[test]
    fn test_too_few_points_is_rejected() {
        let (_, _, points) = scene();
        let result =
            EssentialEstimator::new(&points[..4], EssentialEstimationOptions::default()).estimate();
        assert!(matches!(
            result,
            Err(ApexEssentialError::Core(CoreError::InsufficientCorrespondences {
                found: 4,
                required: 5
            }))
        ));
    }

    #[test]
    fn test_non_finite_point_is_rejected() {
        let (_, _, mut points) = scene();
        points[7].x1.x = f64::NAN;
        let result =
            EssentialEstimator::new(&points, EssentialEstimationOptions::default()).estimate();
        assert!(matches!(
            result,
            Err(ApexEssentialError::Core(CoreError::NonFiniteInput(7)))
        ));
    }

    #[test]
    fn test_any_requires_initial_guess() {
        let (_, _, points) = scene();
        let options =
            EssentialEstimationOptions::default().with_preconditioning(PreconditionerType::Any);
        let result = EssentialEstimator::new(&points, options).estimate();
        assert!(matches!(
            result,
            Err(ApexEssentialError::Core(CoreError::MissingInitialGuess))
        ));
    }

    #[test]
    fn test_result_display() {
        let (_, _, points) = scene();
        let result = EssentialEstimator::new(&points, EssentialEstimationOptions::default())
            .estimate()
            .unwrap();
        let text = result.to_string();
        assert!(text.contains("f_hat"));
        assert!(text.contains("Total time"));
        assert!(text.contains("Recovered R"));
    }
}
