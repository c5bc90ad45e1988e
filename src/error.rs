use reqwest::StatusCode;
use thiserror::Error;

use crate::config::ConfigError;

/// Everything that can end a run early.
///
/// None of these are retried: the next scheduled run starts over from scratch.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration")]
    Config(#[from] ConfigError),

    #[error("failed to set up HTTP client")]
    HttpClient(#[source] reqwest::Error),

    #[error("failed to resolve public IPv6 address")]
    Resolution(#[source] Failure),

    #[error("failed to list DNS records for {domain}")]
    List {
        domain: String,
        #[source]
        source: Failure,
    },

    #[error("failed to write AAAA record for {name}")]
    Upsert {
        name: String,
        #[source]
        source: Failure,
    },
}

/// Why a single request to one of the remote services failed.
#[derive(Debug, Error)]
pub enum Failure {
    #[error("request failed")]
    Transport(#[from] reqwest::Error),

    /// The server answered, but not with a 2xx. The body is kept as-is since it usually explains what went wrong.
    #[error("server responded with {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("response was not valid JSON")]
    Malformed(#[from] serde_json::Error),

    #[error("'{0}' is not an IPv6 address")]
    NotIpv6(String),
}

impl Failure {
    /// Turns a non-success response into a [`Failure::Status`], reading its body for the error message.
    pub async fn from_response(res: reqwest::Response) -> Self {
        let status = res.status();
        Self::from_status(status, res.text().await)
    }

    /// The status is always kept, even when the body could not be read, since it is often all there is to go on.
    fn from_status(status: StatusCode, body: reqwest::Result<String>) -> Self {
        let body = match body {
            Ok(body) if body.trim().is_empty() => "<empty body>".to_string(),
            Ok(body) => body.trim().to_string(),
            Err(err) => format!("<unreadable body: {err}>"),
        };
        Failure::Status { status, body }
    }
}
