//! Error types for the Trellis client.
//!
//! This module defines `TrellisError`, the unified error type returned by
//! every operation in the crate.
//!
//! # Taxonomy
//!
//! - `Validation` is raised before any network I/O and is never retried.
//! - `ClientError` (4xx other than 429) is terminal on the first attempt.
//! - `RateLimited`, `ServerError`, `Network` and `Timeout` are transient and
//!   are retried by the dispatcher until the attempt budget runs out, at
//!   which point they are wrapped in `ExhaustedRetries`.
//!
//! # Security
//!
//! The API key and token travel in the query string, so any message that
//! may contain a URL must go through `sanitize_message()` before it is
//! logged or surfaced.

use std::time::Duration;
use thiserror::Error;

/// Boxed error used as the cause of transport failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Unified error type for all Trellis operations.
#[derive(Error, Debug)]
pub enum TrellisError {
    /// Configuration error - missing or invalid environment variables.
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP client initialization failed.
    #[error("HTTP client error: {0}")]
    HttpClient(#[source] reqwest::Error),

    /// A required identifier or parameter is structurally missing or malformed.
    #[error("validation error: {0}")]
    Validation(String),

    /// The service rejected the request (4xx other than rate limiting).
    #[error("HTTP {status}: {message}")]
    ClientError {
        /// The HTTP status code returned.
        status: u16,
        /// The response body, truncated and sanitized.
        message: String,
    },

    /// Throttled by the service (HTTP 429).
    #[error("rate limited by server")]
    RateLimited {
        /// Retry hint from the `Retry-After` header, if the server sent one.
        retry_after: Option<Duration>,
    },

    /// The service failed to handle the request (HTTP 5xx).
    #[error("server error ({status})")]
    ServerError {
        /// The specific status code.
        status: u16,
    },

    /// The request never produced a response.
    #[error("network failure: {0}")]
    Network(#[source] BoxError),

    /// The request timed out.
    #[error("request timed out after {duration:?}")]
    Timeout {
        /// How long we waited before giving up.
        duration: Duration,
    },

    /// Every allowed attempt ended in a transient failure.
    #[error("giving up after {attempts} attempt(s): {last}")]
    ExhaustedRetries {
        /// Number of attempts made.
        attempts: u32,
        /// The transient error observed on the final attempt.
        #[source]
        last: Box<TrellisError>,
    },

    /// JSON serialization or deserialization failed.
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Connection test failed.
    #[error("connection test failed: {message}")]
    ConnectionTest {
        /// Details about why the connection test failed.
        message: String,
    },
}

impl TrellisError {
    /// Creates a configuration error for a missing environment variable.
    pub fn missing_env(var_name: &str) -> Self {
        TrellisError::Config(format!(
            "missing required environment variable: {}",
            var_name
        ))
    }

    /// Creates a configuration error for an invalid value.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        TrellisError::Config(message.into())
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        TrellisError::Validation(message.into())
    }

    /// Creates a client error from a status and response message.
    pub fn client_error(status: u16, message: impl Into<String>) -> Self {
        TrellisError::ClientError {
            status,
            message: message.into(),
        }
    }

    /// Wraps any error as a network failure.
    pub fn network(cause: impl Into<BoxError>) -> Self {
        TrellisError::Network(cause.into())
    }

    /// Creates a connection test error.
    pub fn connection_test(message: impl Into<String>) -> Self {
        TrellisError::ConnectionTest {
            message: message.into(),
        }
    }

    /// Returns true if this error is transient and the call should be re-sent.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TrellisError::RateLimited { .. }
                | TrellisError::ServerError { .. }
                | TrellisError::Network(_)
                | TrellisError::Timeout { .. }
        )
    }

    /// Returns true if this is a rate limit error.
    #[must_use]
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, TrellisError::RateLimited { .. })
    }

    /// Returns the server's retry hint, if any.
    ///
    /// Looks through `ExhaustedRetries` to the last observed error.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            TrellisError::RateLimited { retry_after } => *retry_after,
            TrellisError::ExhaustedRetries { last, .. } => last.retry_after(),
            _ => None,
        }
    }

    /// Returns the HTTP status code carried by this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            TrellisError::ClientError { status, .. } | TrellisError::ServerError { status } => {
                Some(*status)
            }
            TrellisError::RateLimited { .. } => Some(429),
            TrellisError::ExhaustedRetries { last, .. } => last.status(),
            _ => None,
        }
    }

    /// Replaces every occurrence of each secret with `[REDACTED]`.
    ///
    /// Empty secrets are ignored.
    #[must_use]
    pub fn sanitize_message(message: &str, secrets: &[&str]) -> String {
        secrets
            .iter()
            .filter(|s| !s.is_empty())
            .fold(message.to_string(), |msg, secret| {
                msg.replace(secret, "[REDACTED]")
            })
    }

    /// Creates a sanitized version of this error's display message.
    #[must_use]
    pub fn sanitized_display(&self, secrets: &[&str]) -> String {
        Self::sanitize_message(&self.to_string(), secrets)
    }
}
