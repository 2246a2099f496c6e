//! Gateway error types

use thiserror::Error;

/// Main gateway error type
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Contradictory or unparseable configuration; fatal at startup
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Request rejected before reaching the backend
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Non-success response from the backend
    #[error("Backend error: {status} - {message}")]
    Backend { status: u16, message: String },

    /// Transport-level failure before a response arrived
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Backend request timed out")]
    Timeout,

    #[error("Backend throttled the request")]
    Throttled,

    /// Protocol-invariant violation, e.g. stream data after the terminal chunk
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Whether the dispatcher may retry this failure once (non-streaming only).
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Timeout | GatewayError::Throttled | GatewayError::Connection(_) => true,
            GatewayError::Backend { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Connection(err.to_string())
        }
    }
}

/// Result type alias for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(GatewayError::Timeout.is_transient());
        assert!(GatewayError::Throttled.is_transient());
        assert!(GatewayError::Connection("reset".into()).is_transient());
        assert!(GatewayError::Backend {
            status: 503,
            message: "unavailable".into()
        }
        .is_transient());

        assert!(!GatewayError::Backend {
            status: 400,
            message: "bad field".into()
        }
        .is_transient());
        assert!(!GatewayError::ModelNotFound("x".into()).is_transient());
        assert!(!GatewayError::Validation("x".into()).is_transient());
        assert!(!GatewayError::Auth("x".into()).is_transient());
    }
}
