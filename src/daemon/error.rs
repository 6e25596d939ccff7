//! Error taxonomy for request handling.
//!
//! Only [`DaemonError::Parse`] closes a connection without a response.
//! Every other variant is rendered as `{"status":"error","error":<Display>}`.

use thiserror::Error;

/// Authentication and rate-limit failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SecurityError {
    #[error("Invalid token: {0}")]
    TokenInvalid(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Rate limit exceeded: {limit} requests per {window_secs}s")]
    RateLimitExceeded { limit: usize, window_secs: u64 },
}

/// Failures of the guarded model resource.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResourceError {
    #[error("Model not ready ({state}), retry shortly")]
    ModelNotReady { state: String },

    #[error("Transcription failed: {0}")]
    InferenceFailed(String),
}

/// Request-handling errors, one variant per category.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DaemonError {
    /// Malformed body. No response is written.
    #[error("Malformed request: {0}")]
    Parse(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("Unknown action")]
    Protocol(String),
}

impl DaemonError {
    /// Whether the connection should be closed without writing anything.
    pub fn is_silent(&self) -> bool {
        matches!(self, DaemonError::Parse(_))
    }

    /// Whether reissuing the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DaemonError::Resource(ResourceError::ModelNotReady { .. })
                | DaemonError::Security(SecurityError::RateLimitExceeded { .. })
        )
    }

    /// Short label for logs.
    pub fn category(&self) -> &'static str {
        match self {
            DaemonError::Parse(_) => "parse",
            DaemonError::Validation(_) => "validation",
            DaemonError::Security(_) => "security",
            DaemonError::Resource(_) => "resource",
            DaemonError::Protocol(_) => "protocol",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_parse_is_silent() {
        assert!(DaemonError::Parse("x".into()).is_silent());
        assert!(!DaemonError::Protocol("x".into()).is_silent());
        assert!(!DaemonError::Validation("x".into()).is_silent());
        assert!(!DaemonError::from(SecurityError::TokenExpired).is_silent());
    }

    #[test]
    fn test_unknown_action_message() {
        assert_eq!(
            DaemonError::Protocol("reboot".into()).to_string(),
            "Unknown action"
        );
    }

    #[test]
    fn test_retryable_errors() {
        let not_ready = DaemonError::from(ResourceError::ModelNotReady {
            state: "loading".into(),
        });
        assert!(not_ready.is_retryable());
        let limited = DaemonError::from(SecurityError::RateLimitExceeded {
            limit: 60,
            window_secs: 60,
        });
        assert!(limited.is_retryable());
        assert!(!DaemonError::from(ResourceError::InferenceFailed("boom".into())).is_retryable());
        assert!(!DaemonError::from(SecurityError::TokenExpired).is_retryable());
    }
}
