//! ip-api style geolocation
//!
//! `GET {base}/{ip}` returns a JSON object such as
//!
//! ```json
//! {"status": "success", "country": "Portugal", "countryCode": "PT",
//!  "region": "11", "regionName": "Lisbon", "city": "Lisbon", "org": "Example ISP"}
//! ```
//!
//! or `{"status": "fail", "message": "reserved range"}`.

use async_trait::async_trait;
use serde::Deserialize;
use std::net::IpAddr;
use wanwatch_core::traits::{GeoResolver, LocationInfo};
use wanwatch_core::{Error, Result};

use crate::{DEFAULT_HTTP_TIMEOUT, build_client};

/// Default geolocation endpoint
pub const DEFAULT_GEO_URL: &str = "http://ip-api.com/json";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpApiResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    region_name: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    country_code: Option<String>,
    #[serde(default)]
    org: Option<String>,
}

impl From<IpApiResponse> for LocationInfo {
    fn from(body: IpApiResponse) -> Self {
        LocationInfo {
            city: body.city,
            // Prefer the readable name over the region code
            region: body.region_name.or(body.region),
            country: body.country,
            country_code: body.country_code,
            org: body.org,
        }
    }
}

/// Geolocation via an ip-api compatible endpoint
#[derive(Debug, Clone)]
pub struct IpApiGeoResolver {
    base_url: String,
    client: reqwest::Client,
}

impl IpApiGeoResolver {
    /// Resolver for the public ip-api.com endpoint
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_GEO_URL)
    }

    /// Resolver for a compatible endpoint at `base_url`
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: build_client(DEFAULT_HTTP_TIMEOUT)?,
        })
    }
}

#[async_trait]
impl GeoResolver for IpApiGeoResolver {
    async fn locate(&self, ip: IpAddr) -> Result<LocationInfo> {
        let url = format!("{}/{}", self.base_url, ip);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::network(format!("Geolocation request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::network(format!(
                "Geolocation endpoint returned HTTP {}",
                response.status()
            )));
        }

        let body: IpApiResponse = response.json().await.map_err(|e| {
            Error::provider("ip-api", format!("Failed to parse geolocation response: {}", e))
        })?;

        if body.status.as_deref() == Some("fail") {
            return Err(Error::provider(
                "ip-api",
                format!(
                    "Lookup of {} failed: {}",
                    ip,
                    body.message.as_deref().unwrap_or("no message")
                ),
            ));
        }

        let location = LocationInfo::from(body);
        tracing::debug!("Located {} at {}", ip, location);
        Ok(location)
    }
}
