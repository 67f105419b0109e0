//! The change loop
//!
//! [`ChangeLoop`] polls the public IP on an interval and, when it differs
//! from the last recorded one, drives the DNS update, the notifications and
//! the history append.
//!
//! ## Cycle
//!
//! ```text
//!   settings ──► resolve ──► compare ──(same)──────────────────────► sleep
//!                                │
//!                             (changed)
//!                                ▼
//!                       geo ──► DNS update ──► notify* ──► record ──► sleep
//!
//!   * only when the DNS outcome is Success; email first, then push
//! ```
//!
//! ## Failure Handling
//!
//! - Settings invalid: cycle skipped, sleep for the last good interval
//! - Resolution failure: cycle ends, nothing recorded
//! - Geolocation failure: placeholder location
//! - DNS failure: recorded as `failed`, no notification; the next poll
//!   compares against the last non-failed entry and so retries the update
//! - Notification failure: logged, the other channel and the append still run
//! - History unreadable: compare against the last IP this process observed
//!
//! ## Shutdown
//!
//! The shutdown flag is checked at the top of a cycle, after resolution and
//! around the sleep, and it wakes the sleep early. Once the changed path
//! has started it runs to completion.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::config::{DEFAULT_INTERVAL_SECS, Settings, SettingsSource};
use crate::error::Result;
use crate::registry::NotifierRegistry;
use crate::traits::{
    AddressResolver, ChangeNotice, Channel, DnsUpdateOutcome, DnsUpdater, GeoResolver,
    HistoryEntry, HistoryStore, IpSnapshot, LocationInfo, OutcomeKind,
};

/// Capacity of the telemetry channel returned by [`ChangeLoop::new`]
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Telemetry emitted by the change loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopEvent {
    /// Loop started
    Started { platform: String },

    /// A cycle began
    CycleStarted,

    /// The public IP was resolved
    AddressResolved { ip: IpAddr },

    /// The IP matches the last recorded one
    AddressUnchanged { ip: IpAddr },

    /// The IP differs from the last recorded one (or nothing was recorded)
    AddressChanged {
        ip: IpAddr,
        previous_ip: Option<IpAddr>,
    },

    /// The DNS updater returned
    DnsUpdated {
        ip: IpAddr,
        outcome: DnsUpdateOutcome,
    },

    /// A notifier acknowledged a notification
    NotificationSent { channel: Channel },

    /// A notifier failed
    NotificationFailed { channel: Channel, error: String },

    /// A history entry was appended
    HistoryRecorded { ip: IpAddr, outcome: OutcomeKind },

    /// A cycle could not complete a step
    CycleFailed { error: String },

    /// Loop stopped
    Stopped { reason: StopReason },
}

/// Why [`ChangeLoop::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The settings have `enabled = false`
    Disabled,
    /// The shutdown flag was raised
    Shutdown,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Disabled => "disabled by settings",
            Self::Shutdown => "shutdown requested",
        })
    }
}

/// Outcome of one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleResult {
    /// True when the changed path ran
    pub ip_changed: bool,
    /// The resolved IP, if resolution succeeded
    pub ip: Option<IpAddr>,
    /// DNS outcome, present only on the changed path
    pub dns_outcome: Option<DnsUpdateOutcome>,
    /// Channels whose notifier acknowledged
    pub notifications_sent: BTreeSet<Channel>,
    /// Errors encountered, in order
    pub errors: Vec<String>,
}

/// Everything the change loop talks to
pub struct Collaborators {
    pub settings: Box<dyn SettingsSource>,
    pub resolver: Box<dyn AddressResolver>,
    pub geo: Box<dyn GeoResolver>,
    pub dns: Box<dyn DnsUpdater>,
    pub notifiers: Arc<NotifierRegistry>,
    pub history: Box<dyn HistoryStore>,
}

/// Last change this process itself observed
#[derive(Debug, Clone, Copy)]
struct Observed {
    ip: IpAddr,
    at: DateTime<Utc>,
}

/// Polling change loop
///
/// ## Lifecycle
///
/// 1. Create with [`ChangeLoop::new()`]
/// 2. Run with [`ChangeLoop::run()`] until shutdown or `enabled = false`
///
/// Only one loop may run against a history store; [`FileHistoryStore`]
/// enforces this with an instance lock.
///
/// [`FileHistoryStore`]: crate::history::FileHistoryStore
pub struct ChangeLoop {
    collaborators: Collaborators,
    platform: String,
    event_tx: mpsc::Sender<LoopEvent>,

    /// Fallback for comparisons while the history store is unreadable
    observed: Mutex<Option<Observed>>,

    /// When the IP was last successfully resolved; never persisted
    last_checked: Mutex<Option<DateTime<Utc>>>,
}

impl ChangeLoop {
    /// Create a change loop
    ///
    /// # Parameters
    ///
    /// - `collaborators`: Settings source, resolvers, DNS updater, notifier
    ///   registry and history store
    /// - `platform`: Label recorded with each change (see [`platform_label`])
    ///
    /// # Returns
    ///
    /// A tuple of (loop, event_receiver) where event_receiver yields loop events
    pub fn new(
        collaborators: Collaborators,
        platform: impl Into<String>,
    ) -> (Self, mpsc::Receiver<LoopEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let change_loop = Self {
            collaborators,
            platform: platform.into(),
            event_tx: tx,
            observed: Mutex::new(None),
            last_checked: Mutex::new(None),
        };

        (change_loop, rx)
    }

    /// Platform label recorded with each change
    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// When the public IP was last resolved by this process
    pub async fn last_checked(&self) -> Option<DateTime<Utc>> {
        *self.last_checked.lock().await
    }

    /// Run cycles until shutdown or until the settings disable the loop
    ///
    /// # Parameters
    ///
    /// - `shutdown`: Raise the flag (send `true`) to stop; a sleeping loop
    ///   wakes immediately
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<StopReason> {
        info!(
            "Change loop started (platform: {}, settings: {}, DNS: {} {})",
            self.platform,
            self.collaborators.settings.describe(),
            self.collaborators.dns.provider_name(),
            self.collaborators.dns.record_name()
        );
        self.emit_event(LoopEvent::Started {
            platform: self.platform.clone(),
        });

        let mut interval = Duration::from_secs(DEFAULT_INTERVAL_SECS);

        let reason = loop {
            if shutdown_requested(&shutdown) {
                break StopReason::Shutdown;
            }

            let loaded = self.collaborators.settings.load().await;
            if let Ok(settings) = &loaded
                && !settings.enabled()
            {
                info!("Change loop disabled by settings");
                break StopReason::Disabled;
            }

            match loaded.and_then(|settings| settings.validate().map(|()| settings)) {
                Ok(settings) => {
                    interval = settings.interval();

                    let result = self.cycle(&settings, Some(&shutdown)).await;
                    if !result.errors.is_empty() {
                        debug!("Cycle finished with {} error(s)", result.errors.len());
                    }
                }
                Err(e) => {
                    error!(
                        "Skipping cycle, settings from {} are invalid: {}",
                        self.collaborators.settings.describe(),
                        e
                    );
                    self.emit_event(LoopEvent::CycleFailed {
                        error: e.to_string(),
                    });
                }
            }

            if shutdown_requested(&shutdown) {
                break StopReason::Shutdown;
            }

            debug!("Sleeping for {}s", interval.as_secs());
            if sleep_or_shutdown(interval, &mut shutdown).await {
                break StopReason::Shutdown;
            }
        };

        info!("Change loop stopped: {}", reason);
        self.emit_event(LoopEvent::Stopped { reason });
        Ok(reason)
    }

    /// Execute a single cycle with the given settings
    pub async fn run_cycle(&self, settings: &Settings) -> CycleResult {
        self.cycle(settings, None).await
    }

    async fn cycle(
        &self,
        settings: &Settings,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> CycleResult {
        let mut result = CycleResult::default();
        self.emit_event(LoopEvent::CycleStarted);

        let ip = match self.collaborators.resolver.resolve().await {
            Ok(ip) => ip,
            Err(e) => {
                warn!(
                    "Failed to resolve public IP via {}: {}",
                    self.collaborators.resolver.source_name(),
                    e
                );
                self.fail(&mut result, format!("address resolution failed: {}", e));
                return result;
            }
        };
        result.ip = Some(ip);
        *self.last_checked.lock().await = Some(Utc::now());
        self.emit_event(LoopEvent::AddressResolved { ip });

        if shutdown.is_some_and(shutdown_requested) {
            info!("Shutdown requested, not acting on resolved IP {}", ip);
            return result;
        }

        let previous = self.previous_change().await;
        let previous_ip = previous.map(|p| p.ip);

        if previous_ip == Some(ip) {
            debug!("Public IP unchanged: {}", ip);
            self.emit_event(LoopEvent::AddressUnchanged { ip });
            return result;
        }

        result.ip_changed = true;
        match previous_ip {
            Some(prev) => info!("Public IP changed: {} -> {}", prev, ip),
            None => info!("No recorded IP, treating {} as a change", ip),
        }
        self.emit_event(LoopEvent::AddressChanged { ip, previous_ip });

        let observed_at = Utc::now();
        let location = match self.collaborators.geo.locate(ip).await {
            Ok(location) => location,
            Err(e) => {
                warn!("Geolocation of {} failed, using placeholder: {}", ip, e);
                LocationInfo::unknown()
            }
        };
        let snapshot = IpSnapshot::observed_at(ip, observed_at, location);

        let outcome = self.collaborators.dns.update(ip).await;
        match &outcome {
            DnsUpdateOutcome::Success => info!(
                "Updated {} -> {}",
                self.collaborators.dns.record_name(),
                ip
            ),
            DnsUpdateOutcome::Skipped => info!(
                "{} already points at {}, no write needed",
                self.collaborators.dns.record_name(),
                ip
            ),
            DnsUpdateOutcome::Failed { detail } => {
                error!(
                    "Failed to update {} -> {}: {}",
                    self.collaborators.dns.record_name(),
                    ip,
                    detail
                );
                result.errors.push(format!("DNS update failed: {}", detail));
            }
        }
        self.emit_event(LoopEvent::DnsUpdated {
            ip,
            outcome: outcome.clone(),
        });

        if !matches!(outcome, DnsUpdateOutcome::Failed { .. }) {
            *self.observed.lock().await = Some(Observed { ip, at: observed_at });
        }

        if outcome.is_success() {
            let notice = ChangeNotice {
                ip,
                previous_ip,
                observed_at,
                platform: self.platform.clone(),
                location: snapshot.location.clone(),
                since_previous: previous.map(|p| observed_at - p.at),
            };
            self.dispatch_notifications(settings, &notice, &mut result)
                .await;
        } else {
            debug!("DNS outcome is {}, not notifying", outcome.kind());
        }

        let entry = HistoryEntry::new(&snapshot, &outcome)
            .with_previous_ip(previous_ip)
            .with_platform(self.platform.clone());
        match self.collaborators.history.append(entry).await {
            Ok(stored) => {
                debug!("Recorded {} ({}) at {}", stored.ip, stored.dns_outcome, stored.timestamp);
                self.emit_event(LoopEvent::HistoryRecorded {
                    ip: stored.ip,
                    outcome: stored.dns_outcome,
                });
            }
            Err(e) => {
                error!("Failed to record change to {}: {}", ip, e);
                self.fail(&mut result, format!("history append failed: {}", e));
            }
        }

        result.dns_outcome = Some(outcome);
        result
    }

    /// The change to compare against
    ///
    /// Failed updates are skipped so the next poll retries them. Falls back
    /// to this process's own last applied observation when the history
    /// store cannot be read.
    async fn previous_change(&self) -> Option<Observed> {
        match self.collaborators.history.last_applied_entry().await {
            Ok(entry) => entry.map(|e| Observed {
                ip: e.ip,
                at: e.timestamp,
            }),
            Err(e) => {
                let observed = *self.observed.lock().await;
                warn!(
                    "History unavailable ({}), comparing against last observed IP {:?}",
                    e,
                    observed.map(|o| o.ip)
                );
                observed
            }
        }
    }

    async fn dispatch_notifications(
        &self,
        settings: &Settings,
        notice: &ChangeNotice,
        result: &mut CycleResult,
    ) {
        let notifiers = match self.collaborators.notifiers.build(&settings.notify) {
            Ok(notifiers) => notifiers,
            Err(e) => {
                error!("Cannot build notifiers: {}", e);
                self.fail(result, format!("notifier setup failed: {}", e));
                return;
            }
        };

        if notifiers.is_empty() {
            debug!("No notification backend configured");
            return;
        }

        for notifier in notifiers {
            let channel = notifier.channel();
            match notifier.notify(notice).await {
                Ok(()) => {
                    info!("Sent {} notification via {}", channel, notifier.backend_name());
                    result.notifications_sent.insert(channel);
                    self.emit_event(LoopEvent::NotificationSent { channel });
                }
                Err(e) => {
                    warn!(
                        "{} notification via {} failed: {}",
                        channel,
                        notifier.backend_name(),
                        e
                    );
                    result
                        .errors
                        .push(format!("{} notification failed: {}", channel, e));
                    self.emit_event(LoopEvent::NotificationFailed {
                        channel,
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    fn fail(&self, result: &mut CycleResult, error: String) {
        self.emit_event(LoopEvent::CycleFailed {
            error: error.clone(),
        });
        result.errors.push(error);
    }

    /// Emit a loop event, dropping it with a warning when the channel is full
    fn emit_event(&self, event: LoopEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping loop event");
        }
    }
}

/// Human-readable label for an OS name as reported by `std::env::consts::OS`
pub fn platform_label(os: &str) -> String {
    match os {
        "linux" => "Linux".to_string(),
        "macos" => "MacOS".to_string(),
        "windows" => "Windows".to_string(),
        other => other.to_string(),
    }
}

/// Label for the platform this binary was built for
pub fn current_platform() -> String {
    platform_label(std::env::consts::OS)
}

fn shutdown_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Sleep for `duration`; returns true if shutdown was requested meanwhile
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    let woken = tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = wait_for_shutdown(shutdown) => true,
    };
    woken || shutdown_requested(shutdown)
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            // Sender gone: the flag can never be raised
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_labels() {
        assert_eq!(platform_label("linux"), "Linux");
        assert_eq!(platform_label("macos"), "MacOS");
        assert_eq!(platform_label("windows"), "Windows");
        assert_eq!(platform_label("freebsd"), "freebsd");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_wakes_on_shutdown() {
        let (tx, mut rx) = watch::channel(false);

        let sleeper = tokio::spawn(async move {
            sleep_or_shutdown(Duration::from_secs(3600), &mut rx).await
        });
        tokio::task::yield_now().await;
        tx.send(true).unwrap();

        assert!(sleeper.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_without_sender_runs_to_completion() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);

        let start = tokio::time::Instant::now();
        assert!(!sleep_or_shutdown(Duration::from_secs(30), &mut rx).await);
        assert!(start.elapsed() >= Duration::from_secs(30));
    }
}
