//! Error types for range-serve

use thiserror::Error;

/// Result type alias for range-serve operations
pub type Result<T> = std::result::Result<T, RangeError>;

/// Error types that can occur while resolving and serving resources
///
/// Malformed or unsatisfiable `Range` headers are not errors: they are
/// absorbed by the evaluator and expressed as a
/// [`RangeDecision`](crate::models::RangeDecision).
#[derive(Error, Debug, Clone)]
pub enum RangeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Invalid byte range: {0}")]
    InvalidRange(String),

    #[error("Resource length changed: expected {expected} bytes, found {actual}")]
    LengthMismatch { expected: u64, actual: u64 },

    #[error("IO error: {0}")]
    IoError(String),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<std::io::Error> for RangeError {
    fn from(err: std::io::Error) -> Self {
        RangeError::IoError(err.to_string())
    }
}

impl From<http::Error> for RangeError {
    fn from(err: http::Error) -> Self {
        RangeError::HttpError(err.to_string())
    }
}

impl RangeError {
    /// Convert error to HTTP status code
    ///
    /// Only errors raised before the response head is sent reach this
    /// mapping. A failure in the middle of a body aborts the connection
    /// instead.
    pub fn to_http_status(&self) -> u16 {
        match self {
            RangeError::NotFound(_) => 404,
            RangeError::MethodNotAllowed(_) => 405,
            RangeError::InvalidRange(_) => 416,
            RangeError::LengthMismatch { .. } => 500,
            RangeError::IoError(_) => 500,
            RangeError::HttpError(_) => 500,
            RangeError::ConfigError(_) => 500,
            RangeError::InternalError(_) => 500,
        }
    }

    /// Create a NotFound error for a request path
    pub fn not_found(path: impl Into<String>) -> Self {
        RangeError::NotFound(path.into())
    }

    /// Create an IoError from anything displayable
    pub fn io(message: impl Into<String>) -> Self {
        RangeError::IoError(message.into())
    }

    /// Whether this error is the client's fault rather than the server's
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.to_http_status())
    }
}
