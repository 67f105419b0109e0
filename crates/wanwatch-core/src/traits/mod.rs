//! Collaborator traits for the change loop
//!
//! Every external dependency of the loop sits behind one of these traits:
//!
//! - [`AddressResolver`]: discover the current public IP
//! - [`GeoResolver`]: best-effort IP to location lookup
//! - [`DnsUpdater`]: make the provider's record match an IP
//! - [`Notifier`]: deliver a human-facing change alert
//! - [`HistoryStore`]: append-only log of observed changes

pub mod address_resolver;
pub mod geo_resolver;
pub mod dns_updater;
pub mod notifier;
pub mod history_store;

pub use address_resolver::{AddressResolver, IpSnapshot};
pub use geo_resolver::{GeoResolver, LocationInfo, UNKNOWN};
pub use dns_updater::{DnsUpdateOutcome, DnsUpdater, OutcomeKind};
pub use notifier::{ChangeNotice, Channel, Notifier, NotifierFactory, humanize_elapsed};
pub use history_store::{HistoryEntry, HistoryStore};
