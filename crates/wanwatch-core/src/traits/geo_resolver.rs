// # Geo Resolver Trait
//
// Maps an IP to a location descriptor. The location is cosmetic: it only
// feeds notification text and history records, so a failed lookup never
// gates a DNS update.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Placeholder rendered for any location field that is absent
pub const UNKNOWN: &str = "Unknown";

/// Location of an IP address; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
}

fn or_unknown(field: &Option<String>) -> &str {
    match field.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => value,
        _ => UNKNOWN,
    }
}

impl LocationInfo {
    /// Location with every field absent
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn city(&self) -> &str {
        or_unknown(&self.city)
    }

    pub fn region(&self) -> &str {
        or_unknown(&self.region)
    }

    pub fn country(&self) -> &str {
        or_unknown(&self.country)
    }

    pub fn country_code(&self) -> &str {
        or_unknown(&self.country_code)
    }

    pub fn org(&self) -> &str {
        or_unknown(&self.org)
    }

    /// Country name, falling back to the country code
    pub fn country_or_code(&self) -> &str {
        match self.country() {
            UNKNOWN => self.country_code(),
            country => country,
        }
    }

    /// True when no field carries a value
    pub fn is_unknown(&self) -> bool {
        [
            &self.city,
            &self.region,
            &self.country,
            &self.country_code,
            &self.org,
        ]
        .iter()
        .all(|field| or_unknown(field) == UNKNOWN)
    }
}

impl std::fmt::Display for LocationInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {} - {}", self.city(), self.region(), self.country_or_code())
    }
}

/// Trait for IP geolocation lookups
#[async_trait]
pub trait GeoResolver: Send + Sync {
    /// Look up the location of `ip`
    async fn locate(&self, ip: IpAddr) -> Result<LocationInfo, crate::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_fields_render_unknown() {
        let location = LocationInfo {
            city: Some("Lisbon".to_string()),
            region: Some("  ".to_string()),
            ..Default::default()
        };

        assert_eq!(location.city(), "Lisbon");
        assert_eq!(location.region(), UNKNOWN);
        assert_eq!(location.country(), UNKNOWN);
        assert_eq!(location.org(), UNKNOWN);
        assert_eq!(location.to_string(), "Lisbon, Unknown - Unknown");
        assert!(!location.is_unknown());
        assert!(LocationInfo::unknown().is_unknown());
    }

    #[test]
    fn test_country_falls_back_to_code() {
        let location = LocationInfo {
            country_code: Some("PT".to_string()),
            ..Default::default()
        };
        assert_eq!(location.country_or_code(), "PT");
    }

    #[test]
    fn test_absent_fields_are_omitted_from_json() {
        let location = LocationInfo {
            city: Some("Porto".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&location).unwrap();
        assert_eq!(json, r#"{"city":"Porto"}"#);

        let back: LocationInfo = serde_json::from_str("{}").unwrap();
        assert_eq!(back, LocationInfo::unknown());
    }
}
