// # History Store Trait
//
// Defines the interface for the durable, append-only change history.
//
// ## Purpose
//
// The history is both the audit trail an operator inspects and the source
// of the "last known IP" the change loop compares against. The last entry
// whose DNS update did not fail defines the current IP; an empty history
// means first run.
//
// ## Implementations
//
// - File-based: pretty-printed JSON array with atomic replace
// - In-memory: tests and embedding

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::traits::address_resolver::IpSnapshot;
use crate::traits::dns_updater::{DnsUpdateOutcome, OutcomeKind};
use crate::traits::geo_resolver::LocationInfo;

/// One recorded change
///
/// Entries are never mutated once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// The observed public IP
    pub ip: IpAddr,
    /// Observation time (RFC 3339, UTC)
    pub timestamp: DateTime<Utc>,
    /// Best-effort location of `ip`
    #[serde(default)]
    pub location: LocationInfo,
    /// Outcome of the DNS update for this change
    pub dns_outcome: OutcomeKind,
    /// Failure detail when `dns_outcome` is `failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_error: Option<String>,
    /// IP of the entry this one follows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_ip: Option<IpAddr>,
    /// Platform label of the observing host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

impl HistoryEntry {
    /// Build an entry from a cycle's snapshot and DNS outcome
    pub fn new(snapshot: &IpSnapshot, outcome: &DnsUpdateOutcome) -> Self {
        Self {
            ip: snapshot.ip,
            timestamp: snapshot.observed_at,
            location: snapshot.location.clone(),
            dns_outcome: outcome.kind(),
            dns_error: outcome.detail().map(str::to_string),
            previous_ip: None,
            platform: None,
        }
    }

    /// Set the previous IP
    pub fn with_previous_ip(mut self, previous_ip: Option<IpAddr>) -> Self {
        self.previous_ip = previous_ip;
        self
    }

    /// Set the platform label
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    /// Reconstruct the DNS outcome
    pub fn outcome(&self) -> DnsUpdateOutcome {
        match self.dns_outcome {
            OutcomeKind::Success => DnsUpdateOutcome::Success,
            OutcomeKind::Skipped => DnsUpdateOutcome::Skipped,
            OutcomeKind::Failed => DnsUpdateOutcome::failed(
                self.dns_error.clone().unwrap_or_else(|| "unknown".to_string()),
            ),
        }
    }
}

/// Trait for history store implementations
///
/// # Ordering
///
/// Loaded entries are non-decreasing by `timestamp`. An appended entry
/// older than the last stored one is clamped to the last timestamp.
///
/// # Atomicity
///
/// A crash during `append()` leaves the store in its pre-append or its
/// fully-appended state, never truncated.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Load every entry, oldest first (empty if nothing was recorded)
    async fn load(&self) -> Result<Vec<HistoryEntry>, crate::Error>;

    /// Durably append one entry
    ///
    /// # Returns
    ///
    /// The entry as stored (its timestamp may have been clamped)
    async fn append(&self, entry: HistoryEntry) -> Result<HistoryEntry, crate::Error>;

    /// The most recent entry, if any
    async fn last_entry(&self) -> Result<Option<HistoryEntry>, crate::Error> {
        Ok(self.load().await?.pop())
    }

    /// The most recent entry whose DNS update did not fail
    ///
    /// A `failed` entry never becomes the comparison baseline, so the next
    /// poll retries the update for the same IP.
    async fn last_applied_entry(&self) -> Result<Option<HistoryEntry>, crate::Error> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .rev()
            .find(|entry| entry.dns_outcome != OutcomeKind::Failed))
    }

    /// The IP of the most recent entry; `None` triggers first-run behavior
    async fn last_ip(&self) -> Result<Option<IpAddr>, crate::Error> {
        Ok(self.last_entry().await?.map(|entry| entry.ip))
    }
}

/// Clamp `entry` so it does not precede `last`
pub(crate) fn enforce_order(last: Option<&HistoryEntry>, mut entry: HistoryEntry) -> HistoryEntry {
    if let Some(last) = last {
        if entry.timestamp < last.timestamp {
            tracing::warn!(
                "History entry timestamp {} precedes last entry {}; clamping",
                entry.timestamp,
                last.timestamp
            );
            entry.timestamp = last.timestamp;
        }
    }
    entry
}
