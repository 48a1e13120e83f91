//! Error types for the inekf library
//!
//! This module provides the main error and result types used by the filter layer.
//! All errors use the `thiserror` crate for automatic trait implementations.

use crate::manifold::ManifoldError;
use thiserror::Error;

/// Main result type used throughout the inekf library
pub type InekfResult<T> = Result<T, InekfError>;

/// Main error type for the inekf library
///
/// None of these are recovered from inside the filter; they propagate to the caller
/// and leave the filter state as it was before the failing call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InekfError {
    /// State, covariance, Jacobian or measurement sizes disagree
    #[error("Dimension error: {0}")]
    Dimension(String),

    /// Singular innovation covariance or a covariance that lost positive semi-definiteness
    #[error("Numerical error: {0}")]
    Numerical(String),

    /// Update requested against a measurement model that was never registered
    #[error("Unknown measurement model: {0}")]
    UnknownModel(String),

    /// Missing noise parameters or a model used outside its supported configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<ManifoldError> for InekfError {
    fn from(err: ManifoldError) -> Self {
        match err {
            ManifoldError::InvalidElement(_) => InekfError::Numerical(err.to_string()),
            _ => InekfError::Dimension(err.to_string()),
        }
    }
}
