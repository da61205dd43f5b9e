//! Error types for ratsd logging setup

use thiserror::Error;

/// Result type for logging operations
pub type LoggingResult<T> = Result<T, LoggingError>;

#[derive(Error, Debug)]
pub enum LoggingError {
    /// The configured filter directive does not parse
    #[error("invalid log level {level:?}: {reason}")]
    InvalidLevel { level: String, reason: String },
}
