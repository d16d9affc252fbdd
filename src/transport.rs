//! HTTP transport backed by `reqwest`.
//!
//! Sends [`PreparedRequest`]s and hands raw status, `Retry-After` and body
//! back to the dispatcher. No classification or retrying happens here.
//!
//! # Security
//!
//! The request URL carries the credentials, so transport errors are
//! stripped of their URL before they leave this module.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method};

use crate::dispatcher::{HttpMethod, PreparedBody, PreparedRequest, Transport, TransportResponse};
use crate::error::TrellisError;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// `reqwest` implementation of [`Transport`].
///
/// Cloning is cheap; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Creates a transport with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns `TrellisError::HttpClient` if the HTTP client fails to initialize.
    pub fn new() -> Result<Self, TrellisError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Creates a transport with a custom per-request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, TrellisError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("trellis/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(TrellisError::HttpClient)?;

        Ok(Self { http, timeout })
    }

    fn method(method: HttpMethod) -> Method {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Delete => Method::DELETE,
        }
    }

    fn multipart_form(
        fields: &[(String, String)],
        file: &crate::params::BinaryPart,
    ) -> Result<Form, TrellisError> {
        let form = fields
            .iter()
            .fold(Form::new(), |form, (name, value)| form.text(name.clone(), value.clone()));

        let mut part = Part::bytes(file.bytes.clone()).file_name(file.file_name.clone());
        if let Some(mime) = &file.mime_type {
            part = part.mime_str(mime).map_err(|e| {
                TrellisError::validation(format!("invalid MIME type {:?}: {}", mime, e.without_url()))
            })?;
        }

        Ok(form.part(file.field.clone(), part))
    }

    /// Converts a `reqwest` error into a URL-free transport error.
    fn transport_error(&self, e: reqwest::Error) -> TrellisError {
        if e.is_timeout() {
            return TrellisError::Timeout {
                duration: self.timeout,
            };
        }
        TrellisError::network(e.without_url())
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: &PreparedRequest) -> Result<TransportResponse, TrellisError> {
        let mut req = self
            .http
            .request(Self::method(request.method), &request.url)
            .header("Accept", "application/json");

        req = match &request.body {
            PreparedBody::Empty => req,
            PreparedBody::Json(json) => req
                .header("Content-Type", "application/json")
                .body(json.clone()),
            PreparedBody::Multipart { fields, file } => {
                req.multipart(Self::multipart_form(fields, file)?)
            }
        };

        let response = req.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status().as_u16();

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| parse_retry_after(s, Utc::now()));

        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        tracing::trace!(status = status, body_len = body.len(), "Trello API response");

        Ok(TransportResponse {
            status,
            retry_after,
            body,
        })
    }
}

/// Reads a `Retry-After` value: delta-seconds or an HTTP-date.
///
/// A date in the past means "retry now".
fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}
