// # Cloudflare DNS Updater
//
// Keeps one Cloudflare A/AAAA record pointed at the host's public IP.
//
// ## Update Flow
//
// 1. Resolve the zone ID by zone name (skipped when a zone ID is configured)
// 2. Look up the record by fully-qualified name and type (A for IPv4,
//    AAAA for IPv6); the listing already carries the current content
// 3. If the content equals the target IP, return `Skipped`
// 4. Otherwise PUT the new content with a fixed TTL and proxying disabled
//
// Every failure along the way (transport error, timeout, non-2xx, empty
// result set, `success: false`) becomes `DnsUpdateOutcome::Failed` with a
// descriptive detail. There is no retry here; the next poll cycle compares
// again before writing.
//
// ## Security
//
// - The API token never appears in logs or in `Debug` output
// - Construction fails if the token is empty
//
// ## API Reference
//
// - List Zones: GET `/zones?name=...`
// - List DNS Records: GET `/zones/:zone_id/dns_records?name=...&type=...`
// - Update DNS Record: PUT `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;
use wanwatch_core::traits::{DnsUpdateOutcome, DnsUpdater};
use wanwatch_core::{Error, Result};

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Timeout for each API request
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// TTL written with every update
const RECORD_TTL: u32 = 120;

const PROVIDER: &str = "cloudflare";

/// Envelope of every Cloudflare v4 response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    code: i64,
    message: String,
}

impl<T> ApiResponse<T> {
    /// The result, or a provider error built from `errors`
    fn into_result(self, what: &str) -> Result<T> {
        if !self.success {
            let detail = self
                .errors
                .iter()
                .map(|e| format!("{} ({})", e.message, e.code))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(Error::provider(
                PROVIDER,
                format!("{} rejected: {}", what, detail),
            ));
        }
        self.result.ok_or_else(|| {
            Error::provider(PROVIDER, format!("{}: response has no result", what))
        })
    }
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
}

#[derive(Debug, Deserialize)]
struct DnsRecord {
    id: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct RecordUpdate<'a> {
    #[serde(rename = "type")]
    record_type: &'a str,
    name: &'a str,
    content: String,
    ttl: u32,
    proxied: bool,
}

/// Cloudflare DNS updater for a single record
pub struct CloudflareUpdater {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// Zone name, e.g. `example.com`
    zone_name: String,

    /// Fully-qualified record name, e.g. `home.example.com`
    record_name: String,

    /// Zone ID, looked up by `zone_name` when absent
    zone_id: Option<String>,

    client: reqwest::Client,

    base_url: String,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareUpdater")
            .field("api_token", &"<REDACTED>")
            .field("zone_name", &self.zone_name)
            .field("record_name", &self.record_name)
            .field("zone_id", &self.zone_id)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl CloudflareUpdater {
    /// Create an updater for `subdomain` within `zone_name`
    ///
    /// # Parameters
    ///
    /// - `api_token`: Cloudflare API token with Zone:DNS:Edit permissions
    /// - `zone_name`: The zone, e.g. `example.com`
    /// - `subdomain`: Record label(s) inside the zone; `@` or empty for the apex
    /// - `zone_id`: Optional zone ID, skips the zone lookup
    ///
    /// # Errors
    ///
    /// `Error::Config` if the token or zone is empty, or the HTTP client
    /// cannot be built.
    pub fn new(
        api_token: impl Into<String>,
        zone_name: impl Into<String>,
        subdomain: &str,
        zone_id: Option<String>,
    ) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.trim().is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }

        let zone_name = zone_name.into().trim().trim_end_matches('.').to_lowercase();
        if zone_name.is_empty() {
            return Err(Error::config("Cloudflare zone name cannot be empty"));
        }

        let client = build_client(DEFAULT_HTTP_TIMEOUT)?;

        Ok(Self {
            api_token,
            record_name: record_fqdn(&zone_name, subdomain),
            zone_name,
            zone_id: zone_id.filter(|id| !id.trim().is_empty()),
            client,
            base_url: CLOUDFLARE_API_BASE.to_string(),
        })
    }

    /// Point the updater at a different API root (tests, proxies)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Replace the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = build_client(timeout)?;
        Ok(self)
    }

    /// Zone name this updater manages a record in
    pub fn zone_name(&self) -> &str {
        &self.zone_name
    }

    /// Get the zone ID, from configuration or by name
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /zones?name=example.com
    /// Authorization: Bearer <token>
    /// ```
    async fn zone_id(&self) -> Result<String> {
        if let Some(ref zone_id) = self.zone_id {
            tracing::debug!("Using pre-configured zone ID");
            return Ok(zone_id.clone());
        }

        tracing::debug!("Looking up zone ID for {}", self.zone_name);

        let response = self
            .client
            .get(format!("{}/zones", self.base_url))
            .query(&[("name", self.zone_name.as_str())])
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(transport_error)?;

        let zones: Vec<Zone> = check_status(response, "Zone lookup")
            .await?
            .json::<ApiResponse<Vec<Zone>>>()
            .await
            .map_err(|e| Error::provider(PROVIDER, format!("Failed to parse zone list: {}", e)))?
            .into_result("Zone lookup")?;

        let zone = zones
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(format!("Zone not found: {}", self.zone_name)))?;

        tracing::debug!("Found zone ID: {}", zone.id);
        Ok(zone.id)
    }

    /// Find the managed record of `record_type` in the zone
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /zones/:zone_id/dns_records?name=home.example.com&type=A
    /// Authorization: Bearer <token>
    /// ```
    async fn find_record(&self, zone_id: &str, record_type: &str) -> Result<DnsRecord> {
        tracing::debug!(
            "Looking up record {} (type: {})",
            self.record_name,
            record_type
        );

        let response = self
            .client
            .get(format!("{}/zones/{}/dns_records", self.base_url, zone_id))
            .query(&[("name", self.record_name.as_str()), ("type", record_type)])
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(transport_error)?;

        let records: Vec<DnsRecord> = check_status(response, "Record lookup")
            .await?
            .json::<ApiResponse<Vec<DnsRecord>>>()
            .await
            .map_err(|e| {
                Error::provider(PROVIDER, format!("Failed to parse record list: {}", e))
            })?
            .into_result("Record lookup")?;

        records.into_iter().next().ok_or_else(|| {
            Error::not_found(format!(
                "DNS record not found: {} (type: {})",
                self.record_name, record_type
            ))
        })
    }

    /// Overwrite the record's content with `ip`
    ///
    /// # API Call
    ///
    /// ```http
    /// PUT /zones/:zone_id/dns_records/:record_id
    /// {"type": "A", "name": "home.example.com", "content": "203.0.113.5", "ttl": 120, "proxied": false}
    /// ```
    async fn write_record(
        &self,
        zone_id: &str,
        record: &DnsRecord,
        record_type: &str,
        ip: IpAddr,
    ) -> Result<()> {
        let payload = RecordUpdate {
            record_type,
            name: &self.record_name,
            content: ip.to_string(),
            ttl: RECORD_TTL,
            proxied: false,
        };

        let response = self
            .client
            .put(format!(
                "{}/zones/{}/dns_records/{}",
                self.base_url, zone_id, record.id
            ))
            .bearer_auth(&self.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(transport_error)?;

        let body: ApiResponse<serde_json::Value> = check_status(response, "Record update")
            .await?
            .json()
            .await
            .map_err(|e| {
                Error::provider(PROVIDER, format!("Failed to parse update response: {}", e))
            })?;
        body.into_result("Record update")?;

        Ok(())
    }

    async fn try_update(&self, target_ip: IpAddr) -> Result<DnsUpdateOutcome> {
        let record_type = match target_ip {
            IpAddr::V4(_) => "A",
            IpAddr::V6(_) => "AAAA",
        };

        let zone_id = self.zone_id().await?;
        let record = self.find_record(&zone_id, record_type).await?;

        if record.content.parse::<IpAddr>().ok() == Some(target_ip) {
            tracing::info!(
                "DNS record already has correct IP: {} -> {}",
                self.record_name,
                target_ip
            );
            return Ok(DnsUpdateOutcome::Skipped);
        }

        tracing::info!(
            "Updating DNS record: {} -> {} (was: {})",
            self.record_name,
            target_ip,
            record.content
        );
        self.write_record(&zone_id, &record, record_type, target_ip)
            .await?;

        Ok(DnsUpdateOutcome::Success)
    }
}

#[async_trait]
impl DnsUpdater for CloudflareUpdater {
    async fn update(&self, target_ip: IpAddr) -> DnsUpdateOutcome {
        match self.try_update(target_ip).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("Cloudflare update of {} failed: {}", self.record_name, e);
                DnsUpdateOutcome::failed(e.to_string())
            }
        }
    }

    fn record_name(&self) -> &str {
        &self.record_name
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

/// Fully-qualified record name for `subdomain` in `zone`
///
/// `@` and the empty string mean the zone apex; a subdomain that already
/// ends with the zone is taken as-is.
pub fn record_fqdn(zone: &str, subdomain: &str) -> String {
    let subdomain = subdomain.trim().trim_end_matches('.').to_lowercase();
    if subdomain.is_empty() || subdomain == "@" || subdomain == zone {
        zone.to_string()
    } else if subdomain.ends_with(&format!(".{}", zone)) {
        subdomain
    } else {
        format!("{}.{}", subdomain, zone)
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))
}

fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::network(format!("Cloudflare request timed out: {}", e))
    } else {
        Error::network(format!("HTTP request failed: {}", e))
    }
}

/// Map a non-2xx response to an error
async fn check_status(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read error response".to_string());

    Err(match status.as_u16() {
        401 | 403 => Error::provider(
            PROVIDER,
            format!(
                "Authentication failed: Invalid API token or insufficient permissions. Status: {}",
                status
            ),
        ),
        404 => Error::not_found(format!("{}: {} - {}", what, status, error_text)),
        409 => Error::provider(
            PROVIDER,
            format!("Conflict: Record is being updated by another process. Status: {}", status),
        ),
        429 => Error::provider(
            PROVIDER,
            format!("Rate limit exceeded. Status: {}", status),
        ),
        500..=599 => Error::network(format!(
            "Cloudflare server error (transient): {} - {}",
            status, error_text
        )),
        _ => Error::provider(
            PROVIDER,
            format!("{} failed: {} - {}", what, status, error_text),
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_token_is_rejected() {
        let err = CloudflareUpdater::new("", "example.com", "home", None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_empty_zone_is_rejected() {
        let err = CloudflareUpdater::new("token", " ", "home", None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_record_fqdn() {
        assert_eq!(record_fqdn("example.com", "@"), "example.com");
        assert_eq!(record_fqdn("example.com", ""), "example.com");
        assert_eq!(record_fqdn("example.com", "home"), "home.example.com");
        assert_eq!(record_fqdn("example.com", "Home.Lab"), "home.lab.example.com");
        assert_eq!(record_fqdn("example.com", "home.example.com."), "home.example.com");
    }

    #[test]
    fn test_provider_identity() {
        let updater = CloudflareUpdater::new("token", "Example.com.", "home", None).unwrap();
        assert_eq!(updater.provider_name(), "cloudflare");
        assert_eq!(updater.zone_name(), "example.com");
        assert_eq!(updater.record_name(), "home.example.com");
    }

    #[test]
    fn test_blank_zone_id_means_lookup() {
        let updater =
            CloudflareUpdater::new("token", "example.com", "@", Some("  ".to_string())).unwrap();
        assert_eq!(updater.zone_id, None);
    }

    #[test]
    fn test_api_token_not_exposed_in_debug() {
        let updater =
            CloudflareUpdater::new("secret_token_12345", "example.com", "home", None).unwrap();

        let debug_str = format!("{:?}", updater);
        assert!(!debug_str.contains("secret_token"));
        assert!(debug_str.contains("CloudflareUpdater"));
    }

    #[test]
    fn test_update_payload_shape() {
        let payload = RecordUpdate {
            record_type: "AAAA",
            name: "home.example.com",
            content: "2001:db8::1".to_string(),
            ttl: RECORD_TTL,
            proxied: false,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "AAAA",
                "name": "home.example.com",
                "content": "2001:db8::1",
                "ttl": 120,
                "proxied": false
            })
        );
    }

    #[test]
    fn test_unsuccessful_envelope_is_error() {
        let body: ApiResponse<Vec<Zone>> = serde_json::from_str(
            r#"{"success": false, "errors": [{"code": 9109, "message": "Invalid access token"}], "result": null}"#,
        )
        .unwrap();
        let err = body.into_result("Zone lookup").unwrap_err();
        assert!(err.to_string().contains("Invalid access token (9109)"));
    }
}
