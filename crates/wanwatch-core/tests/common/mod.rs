//! Test doubles and common utilities for change loop contract tests
//!
//! Every stub keeps its counters behind `Arc`, so a test can hand a clone
//! to the loop and still observe the calls afterwards.

#![allow(dead_code)]

use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use wanwatch_core::config::{GeneralSettings, NotifyConfig, Settings, StaticSettings};
use wanwatch_core::error::{Error, Result};
use wanwatch_core::traits::{
    AddressResolver, ChangeNotice, Channel, DnsUpdateOutcome, DnsUpdater, GeoResolver,
    HistoryEntry, HistoryStore, LocationInfo, Notifier, NotifierFactory,
};
use wanwatch_core::{ChangeLoop, Collaborators, LoopEvent, MemoryHistoryStore, NotifierRegistry};

pub const STUB_BACKEND: &str = "stub";

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

/// An address resolver whose answer the test can change between cycles
///
/// `None` makes `resolve()` fail.
#[derive(Clone)]
pub struct SharedResolver {
    current: Arc<Mutex<Option<IpAddr>>>,
    calls: Arc<AtomicUsize>,
}

impl SharedResolver {
    pub fn new(ip: IpAddr) -> Self {
        Self {
            current: Arc::new(Mutex::new(Some(ip))),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            current: Arc::new(Mutex::new(None)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set(&self, ip: Option<IpAddr>) {
        *self.current.lock().unwrap() = ip;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AddressResolver for SharedResolver {
    async fn resolve(&self) -> Result<IpAddr> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (*self.current.lock().unwrap()).ok_or_else(|| Error::network("echo endpoint returned 503"))
    }

    fn source_name(&self) -> &str {
        "stub-echo"
    }
}

/// A geo resolver that returns a fixed city or fails
#[derive(Clone)]
pub struct StubGeo {
    fail: bool,
    calls: Arc<AtomicUsize>,
}

impl StubGeo {
    pub fn new() -> Self {
        Self {
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeoResolver for StubGeo {
    async fn locate(&self, _ip: IpAddr) -> Result<LocationInfo> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::network("geo lookup timed out"));
        }
        Ok(LocationInfo {
            city: Some("Lisbon".to_string()),
            region: Some("Lisbon".to_string()),
            country: Some("Portugal".to_string()),
            country_code: Some("PT".to_string()),
            org: None,
        })
    }
}

/// A DNS updater that returns a scripted outcome and records its targets
#[derive(Clone)]
pub struct ScriptedDns {
    outcome: Arc<Mutex<DnsUpdateOutcome>>,
    targets: Arc<Mutex<Vec<IpAddr>>>,
    delay: Option<Duration>,
}

impl ScriptedDns {
    pub fn new(outcome: DnsUpdateOutcome) -> Self {
        Self {
            outcome: Arc::new(Mutex::new(outcome)),
            targets: Arc::new(Mutex::new(Vec::new())),
            delay: None,
        }
    }

    /// Take `delay` inside every update (use with paused time)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_outcome(&self, outcome: DnsUpdateOutcome) {
        *self.outcome.lock().unwrap() = outcome;
    }

    pub fn call_count(&self) -> usize {
        self.targets.lock().unwrap().len()
    }

    pub fn targets(&self) -> Vec<IpAddr> {
        self.targets.lock().unwrap().clone()
    }
}

#[async_trait]
impl DnsUpdater for ScriptedDns {
    async fn update(&self, target_ip: IpAddr) -> DnsUpdateOutcome {
        self.targets.lock().unwrap().push(target_ip);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcome.lock().unwrap().clone()
    }

    fn record_name(&self) -> &str {
        "home.example.com"
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

/// A notifier that counts calls and appends its channel to a shared log
#[derive(Clone)]
pub struct RecordingNotifier {
    channel: Channel,
    fail: bool,
    calls: Arc<AtomicUsize>,
    notices: Arc<Mutex<Vec<ChangeNotice>>>,
    dispatch_log: Arc<Mutex<Vec<Channel>>>,
}

impl RecordingNotifier {
    pub fn new(channel: Channel, dispatch_log: Arc<Mutex<Vec<Channel>>>) -> Self {
        Self {
            channel,
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
            notices: Arc::new(Mutex::new(Vec::new())),
            dispatch_log,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn notices(&self) -> Vec<ChangeNotice> {
        self.notices.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn channel(&self) -> Channel {
        self.channel
    }

    fn backend_name(&self) -> &'static str {
        STUB_BACKEND
    }

    async fn notify(&self, notice: &ChangeNotice) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.notices.lock().unwrap().push(notice.clone());
        self.dispatch_log.lock().unwrap().push(self.channel);
        if self.fail {
            return Err(Error::notification(
                self.channel.to_string(),
                "502 Bad Gateway",
            ));
        }
        Ok(())
    }
}

/// Factory handing out clones of the two recording notifiers
///
/// Returns push before email so the registry's ordering is exercised.
pub struct RecordingFactory {
    email: RecordingNotifier,
    push: RecordingNotifier,
}

impl NotifierFactory for RecordingFactory {
    fn create(&self, _config: &NotifyConfig) -> Result<Vec<Box<dyn Notifier>>> {
        Ok(vec![Box::new(self.push.clone()), Box::new(self.email.clone())])
    }
}

/// A history store whose reads and writes always fail
#[derive(Clone, Default)]
pub struct UnreadableHistoryStore {
    appends: Arc<AtomicUsize>,
}

impl UnreadableHistoryStore {
    pub fn append_count(&self) -> usize {
        self.appends.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HistoryStore for UnreadableHistoryStore {
    async fn load(&self) -> Result<Vec<HistoryEntry>> {
        Err(Error::persistence("history file is corrupted and no backup exists"))
    }

    async fn append(&self, _entry: HistoryEntry) -> Result<HistoryEntry> {
        self.appends.fetch_add(1, Ordering::SeqCst);
        Err(Error::persistence("refusing to overwrite corrupted history"))
    }
}

/// Settings with the stub backend and the given interval
pub fn stub_settings(interval_seconds: u64) -> Settings {
    Settings {
        general: GeneralSettings {
            enabled: true,
            interval_seconds,
        },
        notify: NotifyConfig {
            backend: STUB_BACKEND.to_string(),
            ..Default::default()
        },
    }
}

/// Handles to everything wired into a test loop
pub struct Harness {
    pub settings: StaticSettings,
    pub resolver: SharedResolver,
    pub geo: StubGeo,
    pub dns: ScriptedDns,
    pub email: RecordingNotifier,
    pub push: RecordingNotifier,
    pub dispatch_log: Arc<Mutex<Vec<Channel>>>,
}

impl Harness {
    pub fn new(resolved: IpAddr, outcome: DnsUpdateOutcome) -> Self {
        let dispatch_log = Arc::new(Mutex::new(Vec::new()));
        Self {
            settings: StaticSettings::new(stub_settings(60)),
            resolver: SharedResolver::new(resolved),
            geo: StubGeo::new(),
            dns: ScriptedDns::new(outcome),
            email: RecordingNotifier::new(Channel::Email, Arc::clone(&dispatch_log)),
            push: RecordingNotifier::new(Channel::Push, Arc::clone(&dispatch_log)),
            dispatch_log,
        }
    }

    pub fn failing_notifiers(mut self) -> Self {
        self.email = self.email.failing();
        self.push = self.push.failing();
        self
    }

    pub fn notification_count(&self) -> usize {
        self.email.call_count() + self.push.call_count()
    }

    pub fn dispatch_order(&self) -> Vec<Channel> {
        self.dispatch_log.lock().unwrap().clone()
    }

    /// Build a loop over `history`
    pub fn build(
        &self,
        history: impl HistoryStore + 'static,
    ) -> (ChangeLoop, mpsc::Receiver<LoopEvent>) {
        let registry = NotifierRegistry::new();
        registry.register_backend(
            STUB_BACKEND,
            Box::new(RecordingFactory {
                email: self.email.clone(),
                push: self.push.clone(),
            }),
        );

        ChangeLoop::new(
            Collaborators {
                settings: Box::new(self.settings.clone()),
                resolver: Box::new(self.resolver.clone()),
                geo: Box::new(self.geo.clone()),
                dns: Box::new(self.dns.clone()),
                notifiers: Arc::new(registry),
                history: Box::new(history),
            },
            "Linux",
        )
    }

    /// Build a loop over a fresh in-memory store, returning a view of it
    pub fn build_in_memory(&self) -> (ChangeLoop, mpsc::Receiver<LoopEvent>, MemoryHistoryStore) {
        let store = MemoryHistoryStore::new();
        let (change_loop, events) = self.build(store.clone());
        (change_loop, events, store)
    }
}

/// Drain every event currently queued
pub fn drain(events: &mut mpsc::Receiver<LoopEvent>) -> Vec<LoopEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}
