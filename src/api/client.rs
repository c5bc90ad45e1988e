use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use super::model::{AaaaRecord, DnsRecord, ListResponse, UpsertRequest};
use super::{PAGE_SIZE, RecordStore};
use crate::config::{API_KEY_VAR, ConfigError, Credentials, SECRET_VAR};
use crate::error::{Error, Failure};

/// The access point to the Spaceship DNS API.
#[derive(Debug)]
pub struct SpaceshipClient {
    reqwest: reqwest::Client,
    base_url: String,
}

impl SpaceshipClient {
    /// Creates a client that authenticates every request with the given credentials.
    pub fn new(credentials: &Credentials, base_url: &str, timeout: Duration) -> Result<Self, Error> {
        let headers = HeaderMap::from_iter([
            (HeaderName::from_static("x-api-key"), auth_header(credentials.api_key(), API_KEY_VAR)?),
            (HeaderName::from_static("x-api-secret"), auth_header(credentials.secret(), SECRET_VAR)?),
        ]);

        let client = super::http_client(timeout, "application/json", headers).map_err(Error::HttpClient)?;

        Ok(Self {
            reqwest: client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn records_url(&self, domain: &str) -> String {
        format!("{}/dns/records/{domain}", self.base_url)
    }

    /// Sends a request and returns its body as text, turning anything other than a 2xx into a [`Failure`].
    async fn send(&self, req: reqwest::RequestBuilder) -> Result<String, Failure> {
        let res = req.send().await?;
        if !res.status().is_success() {
            return Err(Failure::from_response(res).await);
        }

        Ok(res.text().await?)
    }
}

impl RecordStore for SpaceshipClient {
    async fn list_records(&self, domain: &str) -> Result<Vec<DnsRecord>, Failure> {
        let req = self
            .reqwest
            .get(self.records_url(domain))
            .query(&[("take", PAGE_SIZE), ("skip", 0)]);

        // Parse the text ourselves instead of using `Response::json` so that a bad body is reported as malformed JSON
        // rather than as a transport error.
        let text = self.send(req).await?;
        let list: ListResponse = serde_json::from_str(&text)?;
        let records = list.into_records();

        if records.len() >= PAGE_SIZE as usize {
            log::warn!("{domain} has at least {PAGE_SIZE} records; only the first {PAGE_SIZE} were checked");
        }

        Ok(records)
    }

    async fn upsert_aaaa_record(&self, domain: &str, record: &AaaaRecord) -> Result<(), Failure> {
        let payload = UpsertRequest {
            force: true,
            items: std::slice::from_ref(record),
        };

        let req = self.reqwest.put(self.records_url(domain)).json(&payload);
        self.send(req).await?;
        Ok(())
    }
}

/// Wraps a credential in a header value that `reqwest` will never print.
fn auth_header(value: &str, var: &'static str) -> Result<HeaderValue, ConfigError> {
    let mut header = HeaderValue::from_str(value).map_err(|_| ConfigError::InvalidHeader(var))?;
    header.set_sensitive(true);
    Ok(header)
}
