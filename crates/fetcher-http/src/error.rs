//! Error types for building and dispatching requests.

use std::time::Duration;
use thiserror::Error;

/// Boxed error used for transport and hook failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while assembling an [`HttpClient`](crate::HttpClient).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },

    #[error("invalid value for environment variable {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

impl ConfigError {
    /// Create an invalid value error for a config field.
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            message: message.into(),
        }
    }
}

/// Errors raised while building a [`Request`](crate::Request).
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid header {name:?}")]
    InvalidHeader { name: String },

    #[error("max attempts must be at least 1")]
    ZeroAttempts,

    #[error("failed to encode request body: {0}")]
    Body(#[source] serde_json::Error),
}

/// Why a [`Context`](crate::Context) stopped an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("context cancelled")]
    Cancelled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Errors returned from dispatching a request.
///
/// A final 5xx response is not an error; inspect [`Response::status`](crate::Response::status)
/// or call [`Response::check`](crate::Response::check).
#[derive(Debug, Error)]
pub enum HttpError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("request failed: {0}")]
    Transport(#[source] BoxError),

    #[error("after-do hook failed: {0}")]
    Hook(#[source] BoxError),
}

impl HttpError {
    /// Wrap a connector failure.
    pub fn transport(err: impl Into<BoxError>) -> Self {
        Self::Transport(err.into())
    }

    /// Whether the error came from a cancelled or expired context.
    pub fn is_context(&self) -> bool {
        matches!(self, Self::Context(_))
    }
}

impl From<reqwest::Error> for HttpError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(Box::new(e))
    }
}

/// Errors from reading or classifying a response.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("failed to read response body: {0}")]
    Read(#[source] reqwest::Error),

    #[error("failed to parse JSON (status {status}): {source}")]
    Parse {
        status: u16,
        body: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("server error: {status}")]
    ServerError { status: u16, body: String },

    #[error("client error: {status}")]
    ClientError { status: u16, body: String },

    #[error("unexpected status: {status}")]
    UnexpectedStatus { status: u16 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_error_display() {
        assert_eq!(ContextError::Cancelled.to_string(), "context cancelled");
        assert_eq!(
            ContextError::DeadlineExceeded.to_string(),
            "context deadline exceeded"
        );
    }

    #[test]
    fn test_http_error_is_context() {
        assert!(HttpError::from(ContextError::Cancelled).is_context());
        assert!(!HttpError::Build(BuildError::ZeroAttempts).is_context());
    }

    #[test]
    fn test_transport_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = HttpError::transport(io);
        assert!(err.to_string().contains("refused"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_response_error_display() {
        let rate_limited = ResponseError::RateLimited {
            retry_after: Some(Duration::from_secs(60)),
        };
        assert!(rate_limited.to_string().contains("rate limited"));
        assert!(rate_limited.to_string().contains("60"));

        let server = ResponseError::ServerError {
            status: 503,
            body: String::new(),
        };
        assert_eq!(server.to_string(), "server error: 503");
    }

    #[test]
    fn test_config_error_invalid() {
        let err = ConfigError::invalid("handshake_timeout", "must be non-zero");
        assert_eq!(
            err.to_string(),
            "invalid value for handshake_timeout: must be non-zero"
        );
    }
}
