// # Memory History Store
//
// In-memory implementation of HistoryStore.
//
// Nothing survives a restart: the first cycle of a new process sees an
// empty history and treats its observation as a change. Useful for tests
// and for embedding the change loop where persistence is handled elsewhere.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::history_store::{HistoryEntry, HistoryStore, enforce_order};

/// In-memory history store
///
/// Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistoryStore {
    inner: Arc<RwLock<Vec<HistoryEntry>>>,
}

impl MemoryHistoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `entries` (oldest first)
    pub fn with_entries(entries: Vec<HistoryEntry>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(entries)),
        }
    }

    /// Number of recorded entries
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn load(&self) -> Result<Vec<HistoryEntry>, Error> {
        Ok(self.inner.read().await.clone())
    }

    async fn append(&self, entry: HistoryEntry) -> Result<HistoryEntry, Error> {
        let mut entries = self.inner.write().await;
        let entry = enforce_order(entries.last(), entry);
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn last_entry(&self) -> Result<Option<HistoryEntry>, Error> {
        Ok(self.inner.read().await.last().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{DnsUpdateOutcome, IpSnapshot, LocationInfo};

    fn entry(ip: &str, timestamp: &str) -> HistoryEntry {
        let snapshot = IpSnapshot::observed_at(
            ip.parse().unwrap(),
            timestamp.parse().unwrap(),
            LocationInfo::unknown(),
        );
        HistoryEntry::new(&snapshot, &DnsUpdateOutcome::Success)
    }

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryHistoryStore::new();
        assert!(store.is_empty().await);
        assert_eq!(store.last_ip().await.unwrap(), None);

        store
            .append(entry("203.0.113.1", "2025-01-09T12:00:00Z"))
            .await
            .unwrap();
        store
            .append(entry("203.0.113.2", "2025-01-09T13:00:00Z"))
            .await
            .unwrap();

        assert_eq!(store.len().await, 2);
        assert_eq!(
            store.last_ip().await.unwrap(),
            Some("203.0.113.2".parse().unwrap())
        );
    }

    #[tokio::test]
    async fn test_last_applied_entry_skips_failed() {
        let failed = HistoryEntry::new(
            &IpSnapshot::observed_at(
                "203.0.113.2".parse().unwrap(),
                "2025-01-09T13:00:00Z".parse().unwrap(),
                LocationInfo::unknown(),
            ),
            &DnsUpdateOutcome::failed("timeout"),
        );
        let store = MemoryHistoryStore::with_entries(vec![
            entry("203.0.113.1", "2025-01-09T12:00:00Z"),
            failed,
        ]);

        let applied = store.last_applied_entry().await.unwrap().unwrap();
        assert_eq!(applied.ip, "203.0.113.1".parse::<std::net::IpAddr>().unwrap());
        assert_eq!(
            store.last_ip().await.unwrap(),
            Some("203.0.113.2".parse().unwrap())
        );

        let only_failed = MemoryHistoryStore::with_entries(vec![HistoryEntry::new(
            &IpSnapshot::new("203.0.113.3".parse().unwrap(), LocationInfo::unknown()),
            &DnsUpdateOutcome::failed("401 Unauthorized"),
        )]);
        assert_eq!(only_failed.last_applied_entry().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store_clones_share_entries() {
        let store = MemoryHistoryStore::new();
        let view = store.clone();

        store
            .append(entry("203.0.113.1", "2025-01-09T12:00:00Z"))
            .await
            .unwrap();

        assert_eq!(view.len().await, 1);
    }

    #[tokio::test]
    async fn test_memory_store_clamps_out_of_order_append() {
        let store = MemoryHistoryStore::new();
        store
            .append(entry("203.0.113.1", "2025-01-09T12:00:00Z"))
            .await
            .unwrap();
        let stored = store
            .append(entry("203.0.113.2", "2025-01-09T11:00:00Z"))
            .await
            .unwrap();

        assert_eq!(stored.timestamp, "2025-01-09T12:00:00Z".parse::<chrono::DateTime<chrono::Utc>>().unwrap());
        let entries = store.load().await.unwrap();
        assert!(entries.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }
}
