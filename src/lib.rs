//! # Trellis
//!
//! Trellis is a client core for the Trello REST API.
//!
//! Resource-level methods (boards, lists, cards, ...) are thin: they pick a
//! verb and a path and hand over their parameters. Everything else lives
//! here:
//!
//! - **Parameter flattening**: nested parameters become the flat query
//!   string Trello expects (`prefs_permissionLevel=private`, comma-joined
//!   lists, `true`/`false`, ISO-8601 dates)
//! - **Resilient dispatch**: rate limits, server errors and network failures
//!   are retried with exponential backoff; client errors fail fast
//! - **Multipart uploads**: file-bearing calls move every parameter into the
//!   multipart body
//! - **Security**: the key and token are never logged or exposed in error
//!   messages
//!
//! ## Architecture
//!
//! - [`params`] - Typed, nested request parameters
//! - [`serializer`] - Flattening into query strings and multipart fields
//! - [`dispatcher`] - Request descriptors, outcome classification, retry loop
//! - [`transport`] - `reqwest` transport
//! - [`client`] - `TrelloClient` verb helpers
//! - [`config`] - Credentials and retry policy
//! - [`error`] - Error taxonomy with message sanitization
//!
//! ## Example
//!
//! ```ignore
//! use trellis::{Config, ParamBag, TrelloClient};
//!
//! async fn example() -> Result<(), trellis::TrellisError> {
//!     let config = Config::from_env()?;
//!     let client = TrelloClient::new(&config)?;
//!
//!     let lists: Vec<serde_json::Value> = client
//!         .get("/boards/5abbe4b7ddc1b351ef961414/lists", ParamBag::new().with("cards", "open"))
//!         .await?;
//!     println!("{} lists", lists.len());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod params;
pub mod serializer;
pub mod transport;

pub use client::{validate_id, TrelloClient};
pub use config::{Config, RetryPolicy};
pub use dispatcher::{Dispatcher, Encoding, HttpMethod, RequestDescriptor, Transport};
pub use error::TrellisError;
pub use params::{BinaryPart, ParamBag, ParamValue, Scalar};
pub use serializer::{serialize, EncodingOptions, NestingSeparator, SerializedQuery};
pub use transport::HttpTransport;
