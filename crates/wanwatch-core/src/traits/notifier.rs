// # Notifier Trait
//
// Defines the interface for human-facing change alerts.
//
// ## Implementations
//
// - Notification gateway (email and push channels): `wanwatch-notify`
// - Pushover (push channel): `wanwatch-notify`
//
// Backends are selected per cycle by name through the
// [`NotifierRegistry`](crate::registry::NotifierRegistry).
//
// ## Failure Semantics
//
// Notifications are fire-and-forget from the loop's point of view. A
// failed `notify()` is logged at the call site and never aborts the cycle,
// never blocks the history append and is never retried.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::config::NotifyConfig;
use crate::traits::geo_resolver::LocationInfo;

/// Delivery channel of a notifier
///
/// Ordering is dispatch order: email first, then push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Push,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Email => "email",
            Self::Push => "push",
        })
    }
}

/// Everything a notifier needs to describe a confirmed change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotice {
    /// The new public IP, now published in DNS
    pub ip: IpAddr,
    /// IP from the previous history entry, if any
    pub previous_ip: Option<IpAddr>,
    /// When the new IP was observed
    pub observed_at: DateTime<Utc>,
    /// Platform label of the host that made the observation
    pub platform: String,
    /// Best-effort location of the new IP
    pub location: LocationInfo,
    /// Time since the previous recorded change
    pub since_previous: Option<chrono::Duration>,
}

impl ChangeNotice {
    /// Humanized time since the previous change, or `"N/A"`
    pub fn elapsed_label(&self) -> String {
        self.since_previous
            .map(humanize_elapsed)
            .unwrap_or_else(|| "N/A".to_string())
    }

    /// Previous IP, or `"N/A"`
    pub fn previous_ip_label(&self) -> String {
        self.previous_ip
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "N/A".to_string())
    }
}

/// Render a duration as seconds, minutes, hours or days with two decimals
///
/// The unit is the largest one whose rounded value stays below the next
/// unit's threshold, e.g. 90 s renders as `"1.50 minutes"`.
pub fn humanize_elapsed(elapsed: chrono::Duration) -> String {
    let round2 = |v: f64| (v * 100.0).round() / 100.0;
    let secs = (elapsed.num_milliseconds().max(0) as f64) / 1000.0;

    if round2(secs) < 60.0 {
        format!("{:.2} seconds", round2(secs))
    } else if round2(secs / 60.0) < 60.0 {
        format!("{:.2} minutes", round2(secs / 60.0))
    } else if round2(secs / 3600.0) < 24.0 {
        format!("{:.2} hours", round2(secs / 3600.0))
    } else {
        format!("{:.2} days", round2(secs / 86_400.0))
    }
}

/// Trait for notification backends
///
/// One notifier delivers on exactly one [`Channel`].
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel this notifier delivers on
    fn channel(&self) -> Channel;

    /// Backend name (for logging)
    fn backend_name(&self) -> &'static str;

    /// Render and dispatch one notification
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The gateway acknowledged the message (2xx)
    /// - `Err(Error)`: Transport error or non-2xx; the detail carries the
    ///   response body
    async fn notify(&self, notice: &ChangeNotice) -> Result<(), crate::Error>;
}

/// Helper trait for constructing notifiers from cycle settings
pub trait NotifierFactory: Send + Sync {
    /// Build the notifiers this backend provides for `config`
    ///
    /// A backend may return several notifiers (one per channel) or none.
    fn create(&self, config: &NotifyConfig) -> Result<Vec<Box<dyn Notifier>>, crate::Error>;
}
