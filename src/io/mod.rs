//! Reading and writing correspondence files.

use std::path::Path;
use thiserror::Error;

pub mod correspondences;

pub use correspondences::CorrespondenceLoader;

/// Errors that can occur while reading or writing correspondence files
#[derive(Error, Debug)]
pub enum IoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Invalid number format at line {line}: {value}")]
    InvalidNumber { line: usize, value: String },

    #[error("Missing required fields at line {line}")]
    MissingFields { line: usize },
}

/// A file format holding data of type `T`.
pub trait DataLoader<T> {
    /// Load from a file
    fn load<P: AsRef<Path>>(path: P) -> Result<T, IoError>;

    /// Write to a file
    fn write<P: AsRef<Path>>(data: &T, path: P) -> Result<(), IoError>;
}
