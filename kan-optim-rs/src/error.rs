//! Error types for KAN parameter tracking and grouping.

use thiserror::Error;

/// Result type alias for kan-optim operations.
pub type Result<T> = std::result::Result<T, KanOptimError>;

/// Errors that can occur while tracking or grouping parameters.
#[derive(Debug, Error)]
pub enum KanOptimError {
    /// Invalid configuration parameter.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A tracked parameter changed shape between observations.
    #[error("shape mismatch for parameter '{param}': expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Name of the offending parameter.
        param: String,
        /// Shape of the stored baseline.
        expected: Vec<usize>,
        /// Shape observed on this call.
        actual: Vec<usize>,
    },

    /// Candle tensor operation error.
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}
