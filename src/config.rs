//! Configuration management for the Trellis client.
//!
//! This module handles loading credentials and retry settings from
//! environment variables, with validation to ensure all required values
//! are present.

use crate::error::TrellisError;
use std::env;
use std::fmt;
use std::time::Duration;
use url::Url;

/// Default Trello REST API root.
pub const DEFAULT_BASE_URL: &str = "https://api.trello.com/1";

/// Default base delay between retry attempts (milliseconds).
pub const DEFAULT_BACKOFF_MS: u64 = 3000;

/// Default total number of attempts per call.
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 5;

/// Retry settings shared read-only by every call.
///
/// The delay before attempt `n + 1` is `base_backoff * 2^(n - 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay after the first failed attempt.
    pub base_backoff: Duration,
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Creates a policy from a base delay and an attempt budget.
    pub fn new(base_backoff: Duration, max_attempts: u32) -> Self {
        Self {
            base_backoff,
            max_attempts,
        }
    }

    /// Attempt budget, never less than one.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after failed attempt number `attempt` (counted from 1).
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_backoff.saturating_mul(1u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(DEFAULT_BACKOFF_MS),
            DEFAULT_MAX_RETRY_ATTEMPTS,
        )
    }
}

/// Configuration for connecting to the Trello API.
///
/// The key and token are stored but never logged; `Debug` redacts them.
#[derive(Clone)]
pub struct Config {
    /// API root (e.g., `https://api.trello.com/1`).
    pub base_url: String,

    /// Application key, sent as the `key` query parameter.
    key: String,

    /// User token, sent as the `token` query parameter.
    token: String,

    /// Retry policy applied to every call.
    pub retry: RetryPolicy,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("key", &"[REDACTED]")
            .field("token", &"[REDACTED]")
            .field("retry", &self.retry)
            .finish()
    }
}

impl Config {
    /// Creates a configuration with default base URL and retry policy.
    pub fn new(key: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            key: key.into(),
            token: token.into(),
            retry: RetryPolicy::default(),
        }
    }

    /// Overrides the API root. The value is validated and normalized.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Result<Self, TrellisError> {
        self.base_url = Self::validate_base_url(base_url.into())?;
        Ok(self)
    }

    /// Overrides the base backoff delay.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.retry.base_backoff = backoff;
        self
    }

    /// Overrides the total attempt budget.
    pub fn with_max_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry.max_attempts = attempts;
        self
    }

    /// Application key. Never log this value.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// User token. Never log this value.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Loads configuration from environment variables.
    ///
    /// # Required Environment Variables
    ///
    /// - `TRELLO_KEY`: application key
    /// - `TRELLO_TOKEN`: user token
    ///
    /// # Optional Environment Variables
    ///
    /// - `TRELLO_BASE_URL`: API root (default `https://api.trello.com/1`)
    /// - `TRELLO_BACKOFF_MS`: base retry delay in milliseconds (default 3000)
    /// - `TRELLO_MAX_RETRIES`: total attempts per call (default 5)
    ///
    /// # Errors
    ///
    /// Returns `TrellisError::Config` if a required variable is missing
    /// or if any value fails validation.
    pub fn from_env() -> Result<Self, TrellisError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    ///
    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TrellisError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let require = |name: &str| get(name).ok_or_else(|| TrellisError::missing_env(name));

        let key = require("TRELLO_KEY")?;
        let token = require("TRELLO_TOKEN")?;

        Self::validate_credential("TRELLO_KEY", &key)?;
        Self::validate_credential("TRELLO_TOKEN", &token)?;

        let mut config = Config::new(key.trim(), token.trim());

        if let Some(base_url) = get("TRELLO_BASE_URL") {
            config = config.with_base_url(base_url)?;
        }
        if let Some(raw) = get("TRELLO_BACKOFF_MS") {
            let ms = Self::parse_number::<u64>("TRELLO_BACKOFF_MS", &raw)?;
            config = config.with_backoff(Duration::from_millis(ms));
        }
        if let Some(raw) = get("TRELLO_MAX_RETRIES") {
            let attempts = Self::parse_number::<u32>("TRELLO_MAX_RETRIES", &raw)?;
            if attempts == 0 {
                return Err(TrellisError::invalid_config(
                    "TRELLO_MAX_RETRIES must be at least 1",
                ));
            }
            config = config.with_max_retry_attempts(attempts);
        }

        Ok(config)
    }

    fn parse_number<N: std::str::FromStr>(name: &str, raw: &str) -> Result<N, TrellisError> {
        raw.trim().parse::<N>().map_err(|_| {
            TrellisError::invalid_config(format!("{} must be a non-negative integer", name))
        })
    }

    /// Validates and normalizes the base URL.
    fn validate_base_url(url: String) -> Result<String, TrellisError> {
        let url = url.trim().trim_end_matches('/').to_string();

        let parsed = Url::parse(&url)
            .map_err(|e| TrellisError::invalid_config(format!("invalid base URL: {}", e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(TrellisError::invalid_config(
                "TRELLO_BASE_URL must start with http:// or https://",
            ));
        }
        if parsed.query().is_some() {
            return Err(TrellisError::invalid_config(
                "TRELLO_BASE_URL must not carry a query string",
            ));
        }

        Ok(url)
    }

    /// Rejects credentials that are obviously placeholder values.
    fn validate_credential(name: &str, value: &str) -> Result<(), TrellisError> {
        let lower = value.to_lowercase();
        let placeholder_patterns = ["your_key", "your_token", "placeholder", "xxx", "changeme"];

        for pattern in placeholder_patterns {
            if lower.contains(pattern) {
                return Err(TrellisError::invalid_config(format!(
                    "{} appears to be a placeholder value",
                    name
                )));
            }
        }

        Ok(())
    }
}
