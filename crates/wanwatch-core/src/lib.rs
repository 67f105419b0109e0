// # wanwatch-core
//
// Core library for the wanwatch public-IP change loop.
//
// ## Architecture Overview
//
// - **AddressResolver**: Trait for discovering the current public IP
// - **GeoResolver**: Trait for best-effort IP geolocation
// - **DnsUpdater**: Trait for making a DNS record match an IP
// - **Notifier**: Trait for change alerts (email, push)
// - **HistoryStore**: Trait for the durable, append-only change history
// - **ChangeLoop**: Polls the IP and drives update, notify and record
// - **NotifierRegistry**: Plugin-based registry for notification backends
//
// Concrete HTTP resolvers, the Cloudflare updater and the notification
// backends live in their own crates; this crate only depends on the traits.

pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod lock;
pub mod registry;
pub mod traits;

// Re-export core types for convenience
pub use config::{
    NotifyConfig, Settings, SettingsSource, StaticSettings, TomlSettingsFile,
};
pub use engine::{
    ChangeLoop, Collaborators, CycleResult, LoopEvent, StopReason, current_platform,
    platform_label,
};
pub use error::{Error, Result};
pub use history::{FileHistoryStore, MemoryHistoryStore};
pub use lock::InstanceLock;
pub use registry::NotifierRegistry;
pub use traits::{
    AddressResolver, ChangeNotice, Channel, DnsUpdateOutcome, DnsUpdater, GeoResolver,
    HistoryEntry, HistoryStore, IpSnapshot, LocationInfo, Notifier, NotifierFactory,
    OutcomeKind,
};
