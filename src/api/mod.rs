mod client;
pub mod model;

use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue};

use crate::error::Failure;

pub use self::client::SpaceshipClient;
pub use self::model::{AaaaRecord, DnsRecord};

pub const BASE_URL: &str = "https://spaceship.dev/api/v1";

/// The only record type this program reads or writes.
pub const RECORD_TYPE: &str = "AAAA";

/// TTL given to records this program writes, unless overridden.
pub const DEFAULT_TTL: u32 = 1800;

/// How many records to ask for in one listing. Large enough that a typical domain fits in a single page.
pub const PAGE_SIZE: u32 = 100;

/// Somewhere DNS records for a domain can be read from and written to.
pub trait RecordStore {
    /// Lists every record currently configured on `domain`.
    async fn list_records(&self, domain: &str) -> Result<Vec<DnsRecord>, Failure>;

    /// Writes a single AAAA record. If `record.id` is set, that existing entry is replaced in place.
    async fn upsert_aaaa_record(&self, domain: &str, record: &AaaaRecord) -> Result<(), Failure>;
}

/// Builds a `reqwest` client with the headers and timeout every outgoing request from this program should have.
///
/// `accept` is the media type the remote side should answer with; some services pick their response format from it.
pub fn http_client(
    timeout: Duration,
    accept: &'static str,
    extra_headers: HeaderMap,
) -> reqwest::Result<reqwest::Client> {
    let ua_str = format!("{} {}", clap::crate_name!(), clap::crate_version!());

    let mut headers = HeaderMap::from_iter([(header::ACCEPT, HeaderValue::from_static(accept))]);
    if let Ok(ua) = HeaderValue::from_str(&ua_str) {
        headers.insert(header::USER_AGENT, ua);
    }
    headers.extend(extra_headers);

    reqwest::ClientBuilder::new()
        .default_headers(headers)
        .timeout(timeout)
        .build()
}
