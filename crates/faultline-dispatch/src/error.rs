//! Error types for event dispatch operations.
//!
//! Defines all failure conditions on the delivery path with the
//! classification the retry logic needs: transient failures are retried
//! per backoff policy, permanent rejections drop the batch. Nothing in
//! this module ever propagates into the host application.

use std::fmt;

use thiserror::Error;

/// Result type alias for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Failure conditions on the event delivery path.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// Network-level connectivity failure.
    #[error("network connection failed: {message}")]
    Network {
        /// Error message describing the network failure
        message: String,
    },

    /// HTTP request timeout exceeded.
    #[error("request timeout after {timeout_seconds}s")]
    Timeout {
        /// Number of seconds before the request timed out
        timeout_seconds: u64,
    },

    /// Remote service rejected the request as malformed (4xx other than
    /// auth and rate limiting).
    #[error("request rejected: HTTP {status_code}")]
    Rejected {
        /// HTTP status code (4xx)
        status_code: u16,
        /// Response body content
        body: String,
    },

    /// Authorization rejected by the remote service (401/403).
    #[error("authorization rejected: HTTP {status_code}")]
    AuthRejected {
        /// HTTP status code returned by the service
        status_code: u16,
    },

    /// Remote service failure (5xx).
    #[error("server error: HTTP {status_code}")]
    Server {
        /// HTTP status code (5xx)
        status_code: u16,
        /// Response body content
        body: String,
    },

    /// Rate limit exceeded with retry guidance.
    #[error("rate limited: retry after {retry_after_seconds}s")]
    RateLimited {
        /// Seconds to wait before retrying
        retry_after_seconds: u64,
    },

    /// Project identity or credentials could not be resolved.
    #[error("identity unresolved: {message}")]
    Identity {
        /// Why identity resolution failed
        message: String,
    },

    /// Invalid dispatcher or client configuration.
    #[error("invalid dispatch configuration: {message}")]
    Configuration {
        /// Configuration error message
        message: String,
    },

    /// Graceful shutdown exceeded its time budget.
    #[error("shutdown timed out after {timeout_seconds}s")]
    ShutdownTimeout {
        /// The budget that was exceeded, in seconds
        timeout_seconds: u64,
    },
}

impl DispatchError {
    /// Creates a network error from a message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout_seconds: u64) -> Self {
        Self::Timeout { timeout_seconds }
    }

    /// Creates a malformed-request rejection from an HTTP response.
    pub fn rejected(status_code: u16, body: impl Into<String>) -> Self {
        Self::Rejected { status_code, body: body.into() }
    }

    /// Creates an authorization rejection.
    pub fn auth_rejected(status_code: u16) -> Self {
        Self::AuthRejected { status_code }
    }

    /// Creates a server error from an HTTP response.
    pub fn server(status_code: u16, body: impl Into<String>) -> Self {
        Self::Server { status_code, body: body.into() }
    }

    /// Creates a rate limit error with retry guidance.
    pub fn rate_limited(retry_after_seconds: u64) -> Self {
        Self::RateLimited { retry_after_seconds }
    }

    /// Creates an identity resolution error.
    pub fn identity(message: impl Into<String>) -> Self {
        Self::Identity { message: message.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Whether this failure is transient and the batch should be retried.
    ///
    /// Network errors, timeouts, server errors, and rate limits retry.
    /// Malformed-request and authorization rejections, identity failures,
    /// and configuration problems do not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. }
            | Self::Timeout { .. }
            | Self::Server { .. }
            | Self::RateLimited { .. } => true,

            Self::Rejected { .. }
            | Self::AuthRejected { .. }
            | Self::Identity { .. }
            | Self::Configuration { .. }
            | Self::ShutdownTimeout { .. } => false,
        }
    }

    /// Suggested retry delay in seconds, when the service provided one.
    ///
    /// Returns the Retry-After value for rate limits, or None to indicate
    /// standard exponential backoff should be used.
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_seconds } => Some(*retry_after_seconds),
            _ => None,
        }
    }
}

/// Category of dispatch failure for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network connectivity issues, including timeouts.
    Network,
    /// Permanent request rejection (malformed or unauthorized).
    Rejection,
    /// HTTP server errors (5xx).
    Server,
    /// Rate limiting.
    RateLimit,
    /// Identity or configuration problems.
    Setup,
}

impl From<&DispatchError> for ErrorCategory {
    fn from(error: &DispatchError) -> Self {
        match error {
            DispatchError::Network { .. } | DispatchError::Timeout { .. } => Self::Network,
            DispatchError::Rejected { .. } | DispatchError::AuthRejected { .. } => Self::Rejection,
            DispatchError::Server { .. } => Self::Server,
            DispatchError::RateLimited { .. } => Self::RateLimit,
            DispatchError::Identity { .. }
            | DispatchError::Configuration { .. }
            | DispatchError::ShutdownTimeout { .. } => Self::Setup,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Rejection => write!(f, "rejection"),
            Self::Server => write!(f, "server"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Setup => write!(f, "setup"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors_identified_correctly() {
        assert!(DispatchError::network("connection refused").is_retryable());
        assert!(DispatchError::timeout(10).is_retryable());
        assert!(DispatchError::server(500, "internal server error").is_retryable());
        assert!(DispatchError::rate_limited(60).is_retryable());

        assert!(!DispatchError::rejected(400, "bad request").is_retryable());
        assert!(!DispatchError::auth_rejected(403).is_retryable());
        assert!(!DispatchError::identity("no credential").is_retryable());
        assert!(!DispatchError::configuration("bad endpoint").is_retryable());
    }

    #[test]
    fn rate_limit_retry_after_extracted() {
        let error = DispatchError::rate_limited(120);
        assert_eq!(error.retry_after_seconds(), Some(120));

        let timeout_error = DispatchError::timeout(10);
        assert_eq!(timeout_error.retry_after_seconds(), None);
    }

    #[test]
    fn error_categories_mapped_correctly() {
        assert_eq!(ErrorCategory::from(&DispatchError::network("x")), ErrorCategory::Network);
        assert_eq!(ErrorCategory::from(&DispatchError::auth_rejected(401)), ErrorCategory::Rejection);
        assert_eq!(ErrorCategory::from(&DispatchError::server(503, "x")), ErrorCategory::Server);
        assert_eq!(ErrorCategory::from(&DispatchError::rate_limited(1)), ErrorCategory::RateLimit);
        assert_eq!(ErrorCategory::from(&DispatchError::identity("x")), ErrorCategory::Setup);
    }

    #[test]
    fn error_display_format() {
        let error = DispatchError::timeout(10);
        assert_eq!(error.to_string(), "request timeout after 10s");

        let auth = DispatchError::auth_rejected(403);
        assert_eq!(auth.to_string(), "authorization rejected: HTTP 403");
    }
}
