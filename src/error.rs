//! Error types for the micrograd crate.

use thiserror::Error;

/// Failures raised around the engine. Numeric domain problems are not errors:
/// they propagate as IEEE `inf`/`nan` through the graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Expected {expected} inputs, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Cannot build a network without layers")]
    EmptyNetwork,

    #[error(
        "Gradient mismatch for input {input_index}: analytic {analytic} != numeric {numeric} (relative error {relative_error})"
    )]
    GradientMismatch {
        input_index: usize,
        analytic: f64,
        numeric: f64,
        relative_error: f64,
    },

    #[error("Invalid rank direction '{0}', use 'LR' or 'TB'")]
    InvalidRankDir(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, Error>;
