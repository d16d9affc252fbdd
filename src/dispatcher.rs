//! Request dispatch with retry.
//!
//! A [`Dispatcher`] turns one [`RequestDescriptor`] into one logical API
//! call. Each attempt goes through the same steps:
//!
//! 1. encode the descriptor (query string, JSON body or multipart form),
//!    always ending the query with the `key`/`token` credentials;
//! 2. send it through the [`Transport`];
//! 3. classify the response as an [`Outcome`].
//!
//! # Retry Logic
//!
//! - `Success`: decode the payload and return.
//! - `ClientError` (4xx except 429): fail immediately.
//! - `RateLimited`, `ServerError`, `NetworkFailure`: wait and re-send the
//!   same descriptor, up to `max_attempts` attempts in total.
//!
//! The wait after attempt `n` is `base_backoff * 2^(n - 1)`. Once the budget
//! is spent the last transient error is returned inside
//! `TrellisError::ExhaustedRetries`.
//!
//! Every call owns its own attempt counter; concurrent calls share nothing
//! except the read-only configuration.

use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::config::{Config, RetryPolicy};
use crate::error::TrellisError;
use crate::params::{BinaryPart, ParamBag};
use crate::serializer::{self, EncodingOptions};

/// Maximum length for error bodies carried in `ClientError`.
const MAX_ERROR_BODY_LEN: usize = 500;

/// HTTP verbs used by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
}

impl HttpMethod {
    /// Upper-case verb.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = TrellisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(TrellisError::validation(format!(
                "unsupported HTTP method {:?}",
                other
            ))),
        }
    }
}

/// How a call's parameters travel.
///
/// Query and multipart encodings are mutually exclusive for one call.
#[derive(Debug, Clone, PartialEq)]
pub enum Encoding {
    /// Everything in the query string.
    Query(ParamBag),
    /// Query string plus a JSON body for values that do not flatten cleanly.
    QueryWithJson {
        /// Flattened into the query string.
        query: ParamBag,
        /// Sent verbatim as `application/json`.
        body: serde_json::Value,
    },
    /// Everything in a multipart body; the query carries only credentials.
    Multipart {
        /// Sent as text fields.
        fields: ParamBag,
        /// Sent as one binary field.
        file: BinaryPart,
    },
}

/// One logical API call. Retries re-send the same descriptor unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    /// HTTP verb.
    pub method: HttpMethod,
    /// Path below the API root, e.g. `/boards/abc/lists`.
    pub path: String,
    /// Parameter placement.
    pub encoding: Encoding,
    /// Flattening options.
    pub options: EncodingOptions,
}

impl RequestDescriptor {
    /// Creates a query-encoded call.
    pub fn new(method: HttpMethod, path: impl Into<String>, params: ParamBag) -> Self {
        Self {
            method,
            path: path.into(),
            encoding: Encoding::Query(params),
            options: EncodingOptions::default(),
        }
    }

    /// Creates a query-encoded call carrying a JSON body.
    pub fn with_json(
        method: HttpMethod,
        path: impl Into<String>,
        query: ParamBag,
        body: serde_json::Value,
    ) -> Self {
        Self {
            method,
            path: path.into(),
            encoding: Encoding::QueryWithJson { query, body },
            options: EncodingOptions::default(),
        }
    }

    /// Creates a multipart call.
    pub fn multipart(
        method: HttpMethod,
        path: impl Into<String>,
        fields: ParamBag,
        file: BinaryPart,
    ) -> Self {
        Self {
            method,
            path: path.into(),
            encoding: Encoding::Multipart { fields, file },
            options: EncodingOptions::default(),
        }
    }

    /// Sets the flattening options.
    #[must_use]
    pub fn with_options(mut self, options: EncodingOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds the wire form of this call.
    pub fn prepare(&self, base_url: &str, key: &str, token: &str) -> Result<PreparedRequest, TrellisError> {
        let (query, body) = match &self.encoding {
            Encoding::Query(params) => (serializer::serialize(params, &self.options), PreparedBody::Empty),
            Encoding::QueryWithJson { query, body } => (
                serializer::serialize(query, &self.options),
                PreparedBody::Json(serde_json::to_string(body)?),
            ),
            Encoding::Multipart { fields, file } => (
                serializer::SerializedQuery::default(),
                PreparedBody::Multipart {
                    fields: serializer::multipart_fields(fields, &self.options),
                    file: file.clone(),
                },
            ),
        };

        let query = query.with_credentials(key, token);
        let url = format!("{}{}?{}", base_url, self.path, query);

        Ok(PreparedRequest {
            method: self.method,
            url,
            body,
        })
    }
}

/// Body of a prepared request.
#[derive(Debug, Clone, PartialEq)]
pub enum PreparedBody {
    /// No body.
    Empty,
    /// Serialized JSON document.
    Json(String),
    /// Multipart text fields plus one file.
    Multipart {
        /// Text fields in order; names may repeat.
        fields: Vec<(String, String)>,
        /// The binary field.
        file: BinaryPart,
    },
}

/// A fully encoded request, ready for a transport.
///
/// The URL contains the credentials; never log it unsanitized.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    /// HTTP verb.
    pub method: HttpMethod,
    /// Absolute URL including the query string.
    pub url: String,
    /// Request body.
    pub body: PreparedBody,
}

impl PreparedRequest {
    /// The raw query string (after `?`).
    pub fn query(&self) -> &str {
        self.url.split_once('?').map(|(_, q)| q).unwrap_or("")
    }
}

/// What came back from the network for one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Parsed `Retry-After` header.
    pub retry_after: Option<Duration>,
    /// Raw response body.
    pub body: String,
}

impl TransportResponse {
    /// Creates a response without a retry hint.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }
}

/// Sends prepared requests over the network.
///
/// Returns `Err` only when no response was received at all; any HTTP
/// status, including errors, is an `Ok` response.
pub trait Transport: Send + Sync {
    /// Performs one HTTP exchange.
    fn send(
        &self,
        request: &PreparedRequest,
    ) -> impl Future<Output = Result<TransportResponse, TrellisError>> + Send;
}

/// Classification of a single attempt.
#[derive(Debug)]
pub enum Outcome {
    /// 2xx with its raw body.
    Success(String),
    /// 4xx other than 429.
    ClientError {
        /// Status code.
        status: u16,
        /// Truncated response body.
        message: String,
    },
    /// 429 with the server's retry hint.
    RateLimited(Option<Duration>),
    /// 5xx.
    ServerError(u16),
    /// No response.
    NetworkFailure(TrellisError),
}

impl Outcome {
    /// Classifies a transport result.
    pub fn classify(result: Result<TransportResponse, TrellisError>) -> Self {
        let response = match result {
            Ok(response) => response,
            Err(e) => return Outcome::NetworkFailure(e),
        };

        match response.status {
            200..=299 => Outcome::Success(response.body),
            429 => Outcome::RateLimited(response.retry_after),
            500..=599 => Outcome::ServerError(response.status),
            status => Outcome::ClientError {
                status,
                message: truncate(response.body),
            },
        }
    }

    /// Converts a failed outcome into the matching error.
    fn into_result(self) -> Result<String, TrellisError> {
        match self {
            Outcome::Success(body) => Ok(body),
            Outcome::ClientError { status, message } => {
                Err(TrellisError::client_error(status, message))
            }
            Outcome::RateLimited(retry_after) => Err(TrellisError::RateLimited { retry_after }),
            Outcome::ServerError(status) => Err(TrellisError::ServerError { status }),
            Outcome::NetworkFailure(e) => Err(e),
        }
    }
}

fn truncate(body: String) -> String {
    if body.len() <= MAX_ERROR_BODY_LEN {
        return body;
    }
    let mut end = MAX_ERROR_BODY_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...[truncated]", &body[..end])
}

/// Performs API calls with classification and retry.
#[derive(Clone)]
pub struct Dispatcher<T> {
    transport: T,
    base_url: String,
    key: String,
    token: String,
    policy: RetryPolicy,
}

impl<T: Transport> Dispatcher<T> {
    /// Creates a dispatcher using the configuration's credentials and policy.
    pub fn new(config: &Config, transport: T) -> Self {
        Self {
            transport,
            base_url: config.base_url.clone(),
            key: config.key().to_string(),
            token: config.token().to_string(),
            policy: config.retry,
        }
    }

    /// The configured retry policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Redacts the credentials from a message.
    pub fn sanitize(&self, message: &str) -> String {
        TrellisError::sanitize_message(message, &[self.key.as_str(), self.token.as_str()])
    }

    /// Performs one logical call with the configured policy.
    pub async fn dispatch<R>(&self, descriptor: &RequestDescriptor) -> Result<R, TrellisError>
    where
        R: DeserializeOwned,
    {
        self.dispatch_with_policy(descriptor, &self.policy).await
    }

    /// Performs one logical call with an explicit policy.
    ///
    /// # Errors
    ///
    /// - `ClientError` as soon as the service rejects the request.
    /// - `ExhaustedRetries` once `policy.attempts()` transient failures occurred.
    /// - `Serialization` if a successful body does not decode into `R`.
    pub async fn dispatch_with_policy<R>(
        &self,
        descriptor: &RequestDescriptor,
        policy: &RetryPolicy,
    ) -> Result<R, TrellisError>
    where
        R: DeserializeOwned,
    {
        let request = descriptor.prepare(&self.base_url, &self.key, &self.token)?;
        let max_attempts = policy.attempts();
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            tracing::debug!(
                method = %descriptor.method,
                path = %descriptor.path,
                attempt = attempt,
                "Sending Trello API request"
            );

            // Error bodies end up in error messages; success bodies are data.
            let result = self.transport.send(&request).await.map(|mut response| {
                if !(200..=299).contains(&response.status) {
                    response.body = self.sanitize(&response.body);
                }
                response
            });
            let outcome = Outcome::classify(result);

            let error = match outcome.into_result() {
                Ok(body) => return decode(&body),
                Err(e) => e,
            };

            if !error.is_retryable() {
                tracing::debug!(
                    method = %descriptor.method,
                    path = %descriptor.path,
                    error = %self.sanitize(&error.to_string()),
                    "Request rejected"
                );
                return Err(error);
            }

            if attempt >= max_attempts {
                tracing::warn!(
                    method = %descriptor.method,
                    path = %descriptor.path,
                    attempts = attempt,
                    error = %self.sanitize(&error.to_string()),
                    "All retry attempts exhausted"
                );
                return Err(TrellisError::ExhaustedRetries {
                    attempts: attempt,
                    last: Box::new(error),
                });
            }

            let delay = policy.backoff_for(attempt);

            tracing::debug!(
                method = %descriptor.method,
                path = %descriptor.path,
                attempt = attempt,
                max_attempts = max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %self.sanitize(&error.to_string()),
                "Retrying after transient error"
            );

            tokio::time::sleep(delay).await;
        }
    }
}

/// Decodes a success body; an empty body decodes from `null`.
fn decode<R: DeserializeOwned>(body: &str) -> Result<R, TrellisError> {
    if body.trim().is_empty() {
        return Ok(serde_json::from_value(serde_json::Value::Null)?);
    }
    Ok(serde_json::from_str(body)?)
}
