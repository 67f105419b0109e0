// # Address Resolver Trait
//
// Defines the interface for discovering the host's current public IP.
//
// ## Implementations
//
// - HTTP echo endpoint: `wanwatch-ip-http` crate (`HttpAddressResolver`)
//
// ## Usage
//
// ```rust,ignore
// use wanwatch_core::AddressResolver;
//
// let resolver = /* AddressResolver implementation */;
// let ip = resolver.resolve().await?;
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::net::IpAddr;

use crate::traits::geo_resolver::LocationInfo;

/// One observation of the public address
///
/// Created by the change loop each cycle and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpSnapshot {
    /// The observed public IP
    pub ip: IpAddr,
    /// When the address was observed
    pub observed_at: DateTime<Utc>,
    /// Best-effort location of the address
    pub location: LocationInfo,
}

impl IpSnapshot {
    /// Create a snapshot observed now
    pub fn new(ip: IpAddr, location: LocationInfo) -> Self {
        Self {
            ip,
            observed_at: Utc::now(),
            location,
        }
    }

    /// Create a snapshot with an explicit observation time
    pub fn observed_at(ip: IpAddr, observed_at: DateTime<Utc>, location: LocationInfo) -> Self {
        Self {
            ip,
            observed_at,
            location,
        }
    }
}

/// Trait for public IP discovery
///
/// Implementations perform one bounded-timeout request per call. A transport
/// error, a non-2xx status or a body that is not an IP address is an error;
/// the change loop treats it as "no observation this cycle", never as a
/// change.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// Fetch the current public IP
    async fn resolve(&self) -> Result<IpAddr, crate::Error>;

    /// Name of the endpoint, for logging
    fn source_name(&self) -> &str;
}
