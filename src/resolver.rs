use std::net::Ipv6Addr;
use std::time::Duration;

use reqwest::header::HeaderMap;

use crate::error::{Error, Failure};

/// Default address-echo service. It is only reachable over IPv6, so it can't answer with an IPv4 address.
pub const ECHO_URL: &str = "https://api6.ipify.org";

/// Something that can tell us this machine's current public IPv6 address.
pub trait AddressResolver {
    /// Returns the address exactly as the remote side reported it, minus surrounding whitespace.
    async fn resolve_public_ipv6(&self) -> Result<String, Failure>;
}

/// Asks a plain-text "what is my IP" service for our address.
#[derive(Debug)]
pub struct EchoResolver {
    reqwest: reqwest::Client,
    url: String,
}

impl EchoResolver {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, Error> {
        let client = crate::api::http_client(timeout, "text/plain", HeaderMap::new()).map_err(Error::HttpClient)?;
        Ok(Self {
            reqwest: client,
            url: url.to_string(),
        })
    }
}

impl AddressResolver for EchoResolver {
    async fn resolve_public_ipv6(&self) -> Result<String, Failure> {
        let res = self.reqwest.get(&self.url).send().await?;
        if !res.status().is_success() {
            return Err(Failure::from_response(res).await);
        }

        let body = res.text().await?;
        let addr = body.trim();

        // The text itself is what gets compared against the DNS record, so it is returned as-is rather than
        // re-formatted from the parsed address.
        if addr.parse::<Ipv6Addr>().is_err() {
            return Err(Failure::NotIpv6(addr.to_string()));
        }

        Ok(addr.to_string())
    }
}
