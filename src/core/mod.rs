//! Core relative pose estimation pipeline.
//!
//! - [`correspondence`]: calibrated point correspondences between two views
//! - [`data_matrix`]: the 9×9 data matrix `C` of the epipolar constraints
//! - [`initializer`]: closed-form 8-point estimate and preconditioner blocks
//! - [`problem`]: cost, gradient and Hessian operators on SO(3)×S(2)
//! - [`estimator`]: end-to-end orchestration and result extraction

use thiserror::Error;

pub mod correspondence;
pub mod data_matrix;
pub mod estimator;
pub mod initializer;
pub mod problem;

pub use correspondence::PointCorrespondence;
pub use data_matrix::{Matrix9, Vector9, construct_data_matrix, construct_weighted_data_matrix};
pub use estimator::{
    EssentialEstimationOptions, EssentialEstimationResult, EssentialEstimator, estimate_batch,
};
pub use initializer::{PreconditionerMatrix, PreconditionerType, initialize_8pts};
pub use problem::{EssentialProblem, ProblemCachedMatrices};

/// Minimum number of correspondences for a relative pose (5 degrees of freedom).
pub const MIN_CORRESPONDENCES: usize = 5;

/// Errors raised while setting up an estimation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// Not enough correspondences to constrain a relative pose
    #[error("Insufficient correspondences: found {found}, at least {required} required")]
    InsufficientCorrespondences { found: usize, required: usize },

    /// `PreconditionerType::Any` skips the 8-point initializer, so a guess is mandatory
    #[error("An initial essential matrix is required when the 8-point initializer is skipped")]
    MissingInitialGuess,

    /// A correspondence contains NaN or infinite coordinates
    #[error("Correspondence {0} has non-finite coordinates")]
    NonFiniteInput(usize),

    /// Invalid input parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
