// # DNS Updater Trait
//
// Defines the interface for making a provider's DNS record match an IP.
//
// ## Implementations
//
// - Cloudflare: `wanwatch-cloudflare` crate
//
// ## Contract
//
// `update()` never returns an error and never panics. Every failure (zone
// not found, record not found, auth error, timeout) becomes
// `DnsUpdateOutcome::Failed` with a descriptive detail, which the change
// loop records in history. There is no retry at this layer: the next poll
// cycle compares again before writing, which makes a retry here redundant.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Result of one DNS update attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsUpdateOutcome {
    /// A write was issued and acknowledged by the provider
    Success,
    /// The record already held the target IP; nothing was written
    Skipped,
    /// The update could not be completed
    Failed {
        /// Human-readable reason
        detail: String,
    },
}

impl DnsUpdateOutcome {
    /// Create a failed outcome
    pub fn failed(detail: impl Into<String>) -> Self {
        Self::Failed {
            detail: detail.into(),
        }
    }

    /// The persisted discriminant of this outcome
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Success => OutcomeKind::Success,
            Self::Skipped => OutcomeKind::Skipped,
            Self::Failed { .. } => OutcomeKind::Failed,
        }
    }

    /// True only when the authoritative record actually moved
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Failure detail, if any
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Failed { detail } => Some(detail),
            _ => None,
        }
    }
}

impl std::fmt::Display for DnsUpdateOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed { detail } => write!(f, "failed: {}", detail),
            other => write!(f, "{}", other.kind()),
        }
    }
}

/// Persisted form of [`DnsUpdateOutcome`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    Success,
    Skipped,
    Failed,
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        })
    }
}

/// Trait for DNS updater implementations
///
/// # Idempotency
///
/// Implementations must read the record before writing and return
/// [`DnsUpdateOutcome::Skipped`] when it already matches, so calling
/// `update()` twice with the same IP performs at most one write.
///
/// # Timeouts
///
/// Every provider call must carry an explicit timeout; a timeout is a
/// `Failed` outcome.
#[async_trait]
pub trait DnsUpdater: Send + Sync {
    /// Ensure the managed record points at `target_ip`
    async fn update(&self, target_ip: IpAddr) -> DnsUpdateOutcome;

    /// Fully-qualified name of the managed record (for logging)
    fn record_name(&self) -> &str;

    /// Provider name (for logging)
    fn provider_name(&self) -> &'static str;
}
