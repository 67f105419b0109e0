// # HTTP Resolvers
//
// This crate provides the HTTP-based collaborators of the change loop:
//
// - [`HttpAddressResolver`]: asks a public-IP echo service (e.g. ipify)
//   for the address the host is seen from
// - [`IpApiGeoResolver`]: looks the address up on an ip-api style JSON
//   endpoint
//
// Both make exactly one request per call with a 10 second timeout and never
// cache; the change loop decides when to ask again.

mod geo;

pub use geo::{DEFAULT_GEO_URL, IpApiGeoResolver};

use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;
use wanwatch_core::traits::AddressResolver;
use wanwatch_core::{Error, Result};

/// Default public-IP echo service (plain text body)
pub const DEFAULT_IP_URL: &str = "https://api.ipify.org";

/// Timeout for each request
pub(crate) const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))
}

/// Public-IP resolver backed by a plain-text echo endpoint
#[derive(Debug, Clone)]
pub struct HttpAddressResolver {
    /// URL to fetch the IP from
    url: String,

    client: reqwest::Client,
}

impl HttpAddressResolver {
    /// Create a resolver for `url` (e.g. "https://api.ipify.org")
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            url: url.into(),
            client: build_client(DEFAULT_HTTP_TIMEOUT)?,
        })
    }

    /// Replace the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = build_client(timeout)?;
        Ok(self)
    }

    /// Fetch current IP from the echo service
    async fn fetch_ip(&self) -> Result<IpAddr> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::network(format!("Request to {} failed: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::network(format!(
                "{} returned HTTP {}",
                self.url, status
            )));
        }

        let ip_text = response
            .text()
            .await
            .map_err(|e| Error::network(format!("Failed to read response: {}", e)))?;
        let ip_text = ip_text.trim();

        ip_text.parse().map_err(|_| {
            Error::provider(
                "http",
                format!("{} returned an invalid IP address: {:?}", self.url, ip_text),
            )
        })
    }
}

#[async_trait]
impl AddressResolver for HttpAddressResolver {
    async fn resolve(&self) -> Result<IpAddr> {
        let ip = self.fetch_ip().await?;
        tracing::debug!("Resolved public IP {} via {}", ip, self.url);
        Ok(ip)
    }

    fn source_name(&self) -> &str {
        &self.url
    }
}
