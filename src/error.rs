//! Error type shared by the analysis core.
//!
//! Insufficient data and empty results are values, not errors. Only the
//! conditions below are surfaced to callers.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum AnalysisError {
    #[error("length mismatch: expected {expected} values, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("invalid value {value} for threshold '{name}'")]
    InvalidThreshold { name: String, value: f64 },

    #[error("unknown threshold '{name}'")]
    UnknownThreshold { name: String },

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("malformed cost record: {reason}")]
    MalformedRecord { reason: String },
}

pub type Result<T, E = AnalysisError> = std::result::Result<T, E>;
