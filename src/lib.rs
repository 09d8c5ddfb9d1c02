//! Relative pose estimation from calibrated two-view correspondences.
//!
//! The essential matrix `E = [t]ₓR` is estimated by minimizing the algebraic
//! epipolar error `½ vec(E)ᵀ C vec(E)` over the product manifold SO(3)×S(2)
//! with a Riemannian trust-region Newton method.

pub mod core;
pub mod error;
pub mod io;
pub mod logger;
pub mod manifold;
pub mod optimizer;
pub mod synthetic;

pub use crate::core::{
    EssentialEstimationOptions, EssentialEstimationResult, EssentialEstimator, EssentialProblem,
    PointCorrespondence, PreconditionerType, estimate_batch,
};
pub use error::{ApexEssentialError, ApexEssentialResult};
pub use io::*;
pub use logger::{init_logger, init_logger_with_level};
pub use optimizer::OptimizationStatus;
