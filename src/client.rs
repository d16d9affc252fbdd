//! Trello API client.
//!
//! [`TrelloClient`] is what resource-level code calls: one helper per HTTP
//! verb, each building a [`RequestDescriptor`] and handing it to the
//! [`Dispatcher`]. Payloads decode into any `serde` type, or into
//! `serde_json::Value` when the caller does not care.
//!
//! Identifiers interpolated into paths are checked with [`validate_id`],
//! and every path segment is checked the same way before dispatch, so
//! malformed ids fail with `TrellisError::Validation` before anything
//! touches the network.

use serde::de::DeserializeOwned;

use crate::config::Config;
use crate::dispatcher::{Dispatcher, HttpMethod, RequestDescriptor, Transport};
use crate::error::TrellisError;
use crate::params::{BinaryPart, ParamBag};
use crate::serializer::EncodingOptions;
use crate::transport::HttpTransport;

/// Validates an identifier before it is interpolated into a path.
///
/// Trello accepts both 24-character ids and short links, so only
/// characters that would change the path or query are rejected.
///
/// # Errors
///
/// Returns `TrellisError::Validation` if the id is empty or contains
/// `/`, `?`, `#`, `%` or whitespace.
pub fn validate_id(id: &str, field_name: &str) -> Result<(), TrellisError> {
    if id.is_empty() {
        return Err(TrellisError::validation(format!("{} is required", field_name)));
    }
    if id
        .chars()
        .any(|c| matches!(c, '/' | '?' | '#' | '%') || c.is_whitespace())
    {
        return Err(TrellisError::validation(format!(
            "{} contains characters not allowed in a path segment: {:?}",
            field_name,
            id.chars().take(50).collect::<String>()
        )));
    }
    Ok(())
}

/// Checks a resource path such as `/boards/abc/lists` segment by segment.
fn validate_path(path: &str) -> Result<(), TrellisError> {
    let rest = path
        .strip_prefix('/')
        .ok_or_else(|| TrellisError::validation(format!("path must start with '/': {:?}", path)))?;
    rest.split('/').try_for_each(|segment| validate_id(segment, "path segment"))
}

/// Client for the Trello REST API.
///
/// # Example
///
/// ```ignore
/// let config = Config::from_env()?;
/// let client = TrelloClient::new(&config)?;
///
/// let board: serde_json::Value = client
///     .post(
///         "/boards",
///         ParamBag::new()
///             .with("name", "Roadmap")
///             .with("defaultLists", false)
///             .with("prefs", ParamBag::new().with("permissionLevel", "private")),
///     )
///     .await?;
/// ```
#[derive(Clone)]
pub struct TrelloClient<T = HttpTransport> {
    dispatcher: Dispatcher<T>,
}

impl TrelloClient<HttpTransport> {
    /// Creates a client that talks HTTP through `reqwest`.
    ///
    /// # Errors
    ///
    /// Returns `TrellisError::HttpClient` if the HTTP client fails to initialize.
    pub fn new(config: &Config) -> Result<Self, TrellisError> {
        Ok(Self::with_transport(config, HttpTransport::new()?))
    }
}

impl<T: Transport> TrelloClient<T> {
    /// Creates a client over a custom transport.
    pub fn with_transport(config: &Config, transport: T) -> Self {
        Self {
            dispatcher: Dispatcher::new(config, transport),
        }
    }

    /// The dispatcher behind this client.
    pub fn dispatcher(&self) -> &Dispatcher<T> {
        &self.dispatcher
    }

    /// Dispatches a prebuilt descriptor.
    pub async fn send<R>(&self, descriptor: &RequestDescriptor) -> Result<R, TrellisError>
    where
        R: DeserializeOwned,
    {
        self.dispatcher.dispatch(descriptor).await
    }

    /// `GET` with `_`-joined parameters.
    pub async fn get<R: DeserializeOwned>(&self, path: &str, params: ParamBag) -> Result<R, TrellisError> {
        self.get_with(path, params, EncodingOptions::default()).await
    }

    /// `GET` with explicit encoding options.
    pub async fn get_with<R: DeserializeOwned>(
        &self,
        path: &str,
        params: ParamBag,
        options: EncodingOptions,
    ) -> Result<R, TrellisError> {
        self.call(HttpMethod::Get, path, params, options).await
    }

    /// `POST` with `_`-joined parameters.
    pub async fn post<R: DeserializeOwned>(&self, path: &str, params: ParamBag) -> Result<R, TrellisError> {
        self.post_with(path, params, EncodingOptions::default()).await
    }

    /// `POST` with explicit encoding options.
    pub async fn post_with<R: DeserializeOwned>(
        &self,
        path: &str,
        params: ParamBag,
        options: EncodingOptions,
    ) -> Result<R, TrellisError> {
        self.call(HttpMethod::Post, path, params, options).await
    }

    /// `PUT` with `_`-joined parameters.
    pub async fn put<R: DeserializeOwned>(&self, path: &str, params: ParamBag) -> Result<R, TrellisError> {
        self.put_with(path, params, EncodingOptions::default()).await
    }

    /// `PUT` with explicit encoding options.
    pub async fn put_with<R: DeserializeOwned>(
        &self,
        path: &str,
        params: ParamBag,
        options: EncodingOptions,
    ) -> Result<R, TrellisError> {
        self.call(HttpMethod::Put, path, params, options).await
    }

    /// `DELETE` with `_`-joined parameters.
    pub async fn delete<R: DeserializeOwned>(&self, path: &str, params: ParamBag) -> Result<R, TrellisError> {
        self.delete_with(path, params, EncodingOptions::default()).await
    }

    /// `DELETE` with explicit encoding options.
    pub async fn delete_with<R: DeserializeOwned>(
        &self,
        path: &str,
        params: ParamBag,
        options: EncodingOptions,
    ) -> Result<R, TrellisError> {
        self.call(HttpMethod::Delete, path, params, options).await
    }

    /// `PUT` with query parameters plus a JSON body, for typed values such
    /// as custom field items.
    pub async fn put_json<R: DeserializeOwned>(
        &self,
        path: &str,
        query: ParamBag,
        body: serde_json::Value,
    ) -> Result<R, TrellisError> {
        validate_path(path)?;
        let descriptor = RequestDescriptor::with_json(HttpMethod::Put, path, query, body);
        self.dispatcher.dispatch(&descriptor).await
    }

    /// Sends a file with its sibling parameters as a multipart body.
    pub async fn upload<R: DeserializeOwned>(
        &self,
        method: HttpMethod,
        path: &str,
        fields: ParamBag,
        file: BinaryPart,
    ) -> Result<R, TrellisError> {
        validate_path(path)?;
        let descriptor = RequestDescriptor::multipart(method, path, fields, file);
        self.dispatcher.dispatch(&descriptor).await
    }

    /// Runs up to ten `GET` sub-requests in one call.
    ///
    /// Each URL is sent as one element of the comma-separated `urls`
    /// parameter; commas inside a URL are encoded so they do not split it.
    ///
    /// # Errors
    ///
    /// Returns `TrellisError::Validation` for an empty list or more than ten URLs.
    pub async fn batch(&self, urls: &[&str]) -> Result<Vec<serde_json::Value>, TrellisError> {
        if urls.is_empty() || urls.len() > 10 {
            return Err(TrellisError::validation(format!(
                "batch takes between 1 and 10 urls, got {}",
                urls.len()
            )));
        }
        let params = ParamBag::new().with("urls", urls.to_vec());
        self.get("/batch", params).await
    }

    /// Tests connectivity and credentials by fetching the token's member.
    ///
    /// # Errors
    ///
    /// Returns `TrellisError::ConnectionTest` describing the failure.
    pub async fn test_connection(&self) -> Result<(), TrellisError> {
        tracing::debug!("Testing connection to Trello API");

        let params = ParamBag::new().with("fields", "id");
        let result: Result<serde_json::Value, _> = self.get("/members/me", params).await;

        match result {
            Ok(_) => {
                tracing::info!("Connection test successful");
                Ok(())
            }
            Err(TrellisError::ClientError { status: 401, .. }) => Err(TrellisError::connection_test(
                "Authentication failed - verify TRELLO_KEY and TRELLO_TOKEN",
            )),
            Err(e) => Err(TrellisError::connection_test(
                self.dispatcher.sanitize(&e.to_string()),
            )),
        }
    }

    async fn call<R: DeserializeOwned>(
        &self,
        method: HttpMethod,
        path: &str,
        params: ParamBag,
        options: EncodingOptions,
    ) -> Result<R, TrellisError> {
        validate_path(path)?;
        let descriptor = RequestDescriptor::new(method, path, params).with_options(options);
        self.dispatcher.dispatch(&descriptor).await
    }
}
