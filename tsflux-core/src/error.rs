//! Error types for TSFlux

use crate::Timestamp;
use thiserror::Error;

/// Result type alias for TSFlux operations
pub type Result<T> = std::result::Result<T, TsError>;

/// TSFlux error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TsError {
    /// Duplicate timestamp under a policy that forbids overwrite
    #[error("Duplicate sample blocked at timestamp {timestamp}")]
    Blocked { timestamp: Timestamp },

    /// Series, chunk or rule destination not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Chunk directory invariant violated
    #[error("Malformed series: {0}")]
    Malformed(String),

    /// Operation not supported by the chunk encoding
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Sample older than the retention window
    #[error("Timestamp {timestamp} is older than retention (min {min_timestamp})")]
    TooOld {
        timestamp: Timestamp,
        min_timestamp: Timestamp,
    },

    /// Series key already in use
    #[error("Series already exists: {0}")]
    SeriesExists(String),

    /// Compressed chunk could not be decoded
    #[error("Compression error: {0}")]
    Compression(String),
}

impl TsError {
    /// Check if the error is a rejected duplicate
    pub fn is_blocked(&self) -> bool {
        matches!(self, TsError::Blocked { .. })
    }

    /// Check if error indicates a broken series layout
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, TsError::Malformed(_) | TsError::Compression(_))
    }
}
