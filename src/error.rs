//! Error types for the apex-essential library
//!
//! Each module owns a `thiserror` enum; [`ApexEssentialError`] wraps them so
//! callers can use `?` across module boundaries. Numerical trouble such as
//! degenerate data or non-convergence is not an error: it is reported through
//! the objective value, the gradient norm and the solver status.

use crate::{core::CoreError, io::IoError, manifold::ManifoldError, optimizer::OptimizerError};
use thiserror::Error;

/// Main result type used throughout the apex-essential library
pub type ApexEssentialResult<T> = Result<T, ApexEssentialError>;

/// Main error type for the apex-essential library
#[derive(Debug, Error)]
pub enum ApexEssentialError {
    /// Invalid estimation input
    #[error("Estimation error: {0}")]
    Core(#[from] CoreError),

    /// Manifold operations errors
    #[error("Manifold error: {0}")]
    Manifold(#[from] ManifoldError),

    /// Solver related errors
    #[error("Solver error: {0}")]
    Optimizer(#[from] OptimizerError),

    /// IO related errors (file loading, parsing, etc.)
    #[error("IO error: {0}")]
    Io(#[from] IoError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ApexEssentialError::from(CoreError::MissingInitialGuess);
        assert!(error.to_string().starts_with("Estimation error:"));

        let error =
            ApexEssentialError::from(OptimizerError::InvalidConfiguration("radius".to_string()));
        assert_eq!(error.to_string(), "Solver error: Invalid solver configuration: radius");
    }

    #[test]
    fn test_error_from_io() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let error = ApexEssentialError::from(IoError::from(io_error));

        match error {
            ApexEssentialError::Io(inner) => assert!(inner.to_string().contains("File not found")),
            _ => panic!("Expected IO error"),
        }
    }

    #[test]
    fn test_result_alias() {
        let result: ApexEssentialResult<i32> =
            Err(CoreError::InvalidInput("bad".to_string()).into());
        assert!(result.is_err());
    }
}
