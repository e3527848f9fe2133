//! Error types for the jsync system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for jsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the jsync system
#[derive(Error, Debug)]
pub enum Error {
    /// The device collaborator failed a query, apply, lock or commit
    #[error("Transport error: {0}")]
    Transport(String),

    /// Entity already exists at create time, or a precondition on the
    /// device configuration does not hold
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Entity not found on the device
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid structured input (empty sub-block, attribute not valid for
    /// the interface type, malformed name)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A numeric field in a configuration dump could not be parsed
    #[error("failed to convert value from '{statement}' to integer: {source}")]
    InvalidNumber {
        /// The offending statement, as read from the device
        statement: String,
        /// Underlying parse error
        #[source]
        source: std::num::ParseIntError,
    },

    /// Commit succeeded but the state read back afterwards is not the
    /// expected one
    #[error("State inconsistency after commit: {0}")]
    StateInconsistency(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors (file-backed devices)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Coarse classification of an [`Error`]
///
/// Callers use this to decide how to react: transport failures may be
/// retried by the caller, conflicts need intervention, validation errors
/// need different input, state inconsistencies need investigation on the
/// device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Collaborator call failure
    Transport,
    /// Existence conflict
    Conflict,
    /// Local input or decode failure
    Validation,
    /// Post-commit verification failure
    StateInconsistency,
    /// Everything else (configuration, I/O, serialization)
    Internal,
}

impl Error {
    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a numeric decode error for `statement`
    pub fn invalid_number(statement: impl Into<String>, source: std::num::ParseIntError) -> Self {
        Self::InvalidNumber {
            statement: statement.into(),
            source,
        }
    }

    /// Create a post-commit state inconsistency error
    pub fn state_inconsistency(msg: impl Into<String>) -> Self {
        Self::StateInconsistency(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport(_) => ErrorKind::Transport,
            Error::Conflict(_) | Error::NotFound(_) => ErrorKind::Conflict,
            Error::Validation(_) | Error::InvalidNumber { .. } => ErrorKind::Validation,
            Error::StateInconsistency(_) => ErrorKind::StateInconsistency,
            Error::Config(_) | Error::Io(_) | Error::Json(_) | Error::Other(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
