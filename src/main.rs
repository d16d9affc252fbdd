//! Trellis - command line access to the Trello REST API
//!
//! Issues one API call and prints the decoded JSON payload on stdout.
//!
//! # Configuration
//!
//! Set the following environment variables (or use a `.env` file):
//!
//! - `TRELLO_KEY`: application key
//! - `TRELLO_TOKEN`: user token
//! - `TRELLO_BACKOFF_MS`, `TRELLO_MAX_RETRIES`, `TRELLO_BASE_URL`: optional
//!
//! # Usage
//!
//! ```bash
//! trellis get /members/me fields=username
//! trellis post /boards name="Test Board" defaultLists=false prefs.permissionLevel=private
//! trellis put /boards/abc prefs.background=blue --separator slash
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use trellis::{Config, EncodingOptions, HttpMethod, NestingSeparator, ParamBag, ParamValue, TrelloClient};

/// Send one request to the Trello API.
#[derive(Debug, Parser)]
#[command(name = "trellis", version, about)]
struct Cli {
    /// HTTP method: get, post, put or delete.
    method: HttpMethod,

    /// Path below the API root, e.g. /boards/abc/lists.
    path: String,

    /// Parameters as key=value; dotted keys nest (prefs.permissionLevel=private).
    #[arg(value_parser = parse_param)]
    params: Vec<(String, String)>,

    /// Separator for nested keys: underscore or slash.
    #[arg(long, default_value = "underscore")]
    separator: NestingSeparator,

    /// Skip the connection test before the call.
    #[arg(long)]
    no_check: bool,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got {:?}", raw))
}

/// Builds a nested bag from dotted `key=value` pairs.
///
/// `true`/`false` become booleans and an empty value becomes `Null`.
fn build_params(pairs: &[(String, String)]) -> ParamBag {
    let mut bag = ParamBag::new();
    for (key, value) in pairs {
        let segments: Vec<&str> = key.split('.').collect();
        insert_path(&mut bag, &segments, leaf_value(value));
    }
    bag
}

fn insert_path(bag: &mut ParamBag, segments: &[&str], value: ParamValue) {
    match segments {
        [] => {}
        [last] => bag.insert(*last, value),
        [head, rest @ ..] => {
            let mut child = match bag.remove(head) {
                Some(ParamValue::Nested(existing)) => existing,
                _ => ParamBag::new(),
            };
            insert_path(&mut child, rest, value);
            bag.insert(*head, child);
        }
    }
}

fn leaf_value(raw: &str) -> ParamValue {
    match raw {
        "" => ParamValue::Null,
        "true" => true.into(),
        "false" => false.into(),
        other => other.into(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore errors if not found)
    dotenvy::dotenv().ok();

    // stdout carries the payload; logs go to stderr
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trellis=info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::debug!(base_url = %config.base_url, "Configuration loaded");

    let client = TrelloClient::new(&config).context("Failed to create Trello client")?;

    if !cli.no_check {
        if let Err(e) = client.test_connection().await {
            tracing::warn!(error = %e, "Connection test failed, sending request anyway");
        }
    }

    let params = build_params(&cli.params);
    let options = EncodingOptions::new().with_separator(cli.separator);

    let payload: serde_json::Value = match cli.method {
        HttpMethod::Get => client.get_with(&cli.path, params, options).await,
        HttpMethod::Post => client.post_with(&cli.path, params, options).await,
        HttpMethod::Put => client.put_with(&cli.path, params, options).await,
        HttpMethod::Delete => client.delete_with(&cli.path, params, options).await,
    }
    .with_context(|| format!("{} {} failed", cli.method, cli.path))?;

    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("Failed to render response")?
    );

    Ok(())
}
