//! In-process rate-limit store with per-key expiry

use super::{KeyValueStore, RateRecord};
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

#[derive(Debug, Clone)]
struct MemoryEntry {
    record: RateRecord,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn fresh() -> Self {
        Self {
            record: RateRecord::default(),
            expires_at: None,
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }

    fn expire_in(&mut self, ttl_secs: u64) {
        self.expires_at = Some(Instant::now() + Duration::from_secs(ttl_secs));
    }
}

/// Process-local store; mutations hold the shard lock for the key
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, MemoryEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired keys; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        before.saturating_sub(self.entries.len())
    }

    /// Sweep expired keys every `every` until the store is dropped
    pub fn spawn_purger(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let removed = store.purge_expired();
                if removed > 0 {
                    debug!(removed, remaining = store.len(), "Purged expired rate-limit records");
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply `f` to the live entry for `key`, creating it if absent or expired
    fn upsert<T>(&self, key: &str, f: impl FnOnce(&mut MemoryEntry) -> T) -> T {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(MemoryEntry::fresh);
        if entry.is_expired() {
            *entry = MemoryEntry::fresh();
        }
        f(&mut entry)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn read_fields(&self, key: &str) -> Result<Option<RateRecord>> {
        // Remove in a separate step so no read guard is held
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => return Ok(Some(entry.record)),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired());
        }
        Ok(None)
    }

    async fn write_fields(&self, key: &str, record: RateRecord, ttl_secs: u64) -> Result<()> {
        self.upsert(key, |entry| {
            entry.record = record;
            entry.expire_in(ttl_secs);
        });
        Ok(())
    }

    async fn record_strike(&self, key: &str, now: i64, ttl_secs: u64) -> Result<i64> {
        let strikes = self.upsert(key, |entry| {
            entry.record.strikes += 1;
            entry.record.last = now;
            entry.expire_in(ttl_secs);
            entry.record.strikes
        });
        Ok(strikes)
    }

    async fn clear_strikes_if(&self, key: &str, expected_last: i64) -> Result<bool> {
        let Some(mut entry) = self.entries.get_mut(key) else {
            return Ok(false);
        };
        if entry.is_expired() || entry.record.last != expected_last {
            return Ok(false);
        }
        entry.record.strikes = 0;
        Ok(true)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: u64 = 600;

    #[tokio::test]
    async fn test_read_missing_key() {
        let store = MemoryStore::new();
        assert_eq!(store.read_fields("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let store = MemoryStore::new();
        let record = RateRecord { last: 1_000, strikes: 2 };
        store.write_fields("k", record, TTL).await.unwrap();
        assert_eq!(store.read_fields("k").await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_strike_creates_key_and_stamps_last() {
        let store = MemoryStore::new();
        assert_eq!(store.record_strike("k", 10, TTL).await.unwrap(), 1);
        assert_eq!(store.record_strike("k", 20, TTL).await.unwrap(), 2);
        assert_eq!(
            store.read_fields("k").await.unwrap(),
            Some(RateRecord { last: 20, strikes: 2 })
        );
    }

    #[tokio::test]
    async fn test_concurrent_strikes_are_not_lost() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for i in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.record_strike("k", i, TTL).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.read_fields("k").await.unwrap().unwrap().strikes, 50);
    }

    #[tokio::test]
    async fn test_clear_strikes_only_when_last_unchanged() {
        let store = MemoryStore::new();
        store.record_strike("k", 100, TTL).await.unwrap();
        store.record_strike("k", 100, TTL).await.unwrap();

        // Another writer struck again after our read of last = 100
        store.record_strike("k", 200, TTL).await.unwrap();
        assert!(!store.clear_strikes_if("k", 100).await.unwrap());
        assert_eq!(store.read_fields("k").await.unwrap().unwrap().strikes, 3);

        assert!(store.clear_strikes_if("k", 200).await.unwrap());
        assert_eq!(
            store.read_fields("k").await.unwrap(),
            Some(RateRecord { last: 200, strikes: 0 })
        );

        assert!(!store.clear_strikes_if("missing", 0).await.unwrap());
    }

    #[tokio::test]
    async fn test_expiry() {
        let store = MemoryStore::new();
        store.write_fields("k", RateRecord { last: 1, strikes: 1 }, 0).await.unwrap();

        assert_eq!(store.read_fields("k").await.unwrap(), None);
        assert!(store.is_empty());

        // A strike after expiry starts from a fresh record
        store.write_fields("j", RateRecord { last: 1, strikes: 5 }, 0).await.unwrap();
        assert_eq!(store.record_strike("j", 2, TTL).await.unwrap(), 1);
        assert!(!store.clear_strikes_if("gone", 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryStore::new();
        store.write_fields("a", RateRecord::default(), 0).await.unwrap();
        store.write_fields("b", RateRecord::default(), TTL).await.unwrap();

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_purger_reclaims_keys_never_read_again() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..1_000 {
            store.record_strike(&format!("chat:{}", i), 1, 0).await.unwrap();
        }
        store.record_strike("live", 1, TTL).await.unwrap();
        assert_eq!(store.len(), 1_001);

        let purger = store.spawn_purger(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(store.len(), 1);
        purger.abort();
    }

    #[tokio::test]
    async fn test_purger_stops_with_store() {
        let store = Arc::new(MemoryStore::new());
        let purger = store.spawn_purger(Duration::from_millis(10));
        drop(store);

        tokio::time::timeout(Duration::from_secs(1), purger)
            .await
            .expect("purger exits once the store is gone")
            .unwrap();
    }

    #[test]
    fn test_ping_and_backend() {
        let store = MemoryStore::new();
        tokio_test::assert_ok!(tokio_test::block_on(store.ping()));
        assert_eq!(store.backend(), "memory");
    }
}
