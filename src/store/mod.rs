//! Keyed backing stores for rate-limit records
//!
//! Two interchangeable backends share one contract:
//! - `MemoryStore`: process-local map with per-key expiry
//! - `RedisStore`: hash per key, shared across processes
//!
//! The backend is chosen once at startup by [`connect_store`].

pub mod memory;
pub mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use crate::config::StoreConfig;
use crate::error::Result;
use crate::metrics::METRICS;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Fields of a rate-limit record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordField {
    /// Epoch milliseconds of the last accepted or struck action
    Last,
    /// Consecutive rapid triggers
    Strikes,
}

impl RecordField {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordField::Last => "last",
            RecordField::Strikes => "strikes",
        }
    }
}

/// A rate-limit record as held by a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateRecord {
    pub last: i64,
    pub strikes: i64,
}

/// Keyed store of rate-limit records
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Backend name for logs
    fn backend(&self) -> &'static str;

    /// Read both fields; `None` if the key does not exist
    async fn read_fields(&self, key: &str) -> Result<Option<RateRecord>>;

    /// Overwrite both fields and refresh the expiry as one atomic step
    async fn write_fields(&self, key: &str, record: RateRecord, ttl_secs: u64) -> Result<()>;

    /// Add a strike, stamp `last = now` and refresh the expiry as one atomic
    /// step; returns the new strike count
    async fn record_strike(&self, key: &str, now: i64, ttl_secs: u64) -> Result<i64>;

    /// Zero the strikes only while `last` still equals `expected_last`
    ///
    /// Returns whether the record was changed. A strike written by another
    /// writer since the caller's read moves `last` and leaves it untouched.
    async fn clear_strikes_if(&self, key: &str, expected_last: i64) -> Result<bool>;

    /// Connectivity check
    async fn ping(&self) -> Result<()>;
}

/// Select the backing store once at startup
///
/// A configured but unreachable networked store degrades to the local map;
/// the degradation is logged once and never re-checked.
pub async fn connect_store(config: &StoreConfig) -> Arc<dyn KeyValueStore> {
    let Some(url) = config.redis_url.as_deref() else {
        info!("No networked store configured, using in-process rate-limit store");
        return local_store(config);
    };

    match RedisStore::connect(url, config.connect_timeout()).await {
        Ok(store) => {
            info!("Rate-limit store connected: backend={}", store.backend());
            Arc::new(store)
        }
        Err(e) => {
            METRICS.store_failovers.inc();
            warn!(
                error = %e,
                "Networked store unreachable, falling back to in-process rate-limit store"
            );
            local_store(config)
        }
    }
}

/// In-process store with a background sweep of expired records
fn local_store(config: &StoreConfig) -> Arc<dyn KeyValueStore> {
    let store = Arc::new(MemoryStore::new());
    store.spawn_purger(config.purge_interval());
    store
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_record_field_names() {
        assert_eq!(RecordField::Last.as_str(), "last");
        assert_eq!(RecordField::Strikes.as_str(), "strikes");
    }

    #[tokio::test]
    async fn test_connect_store_without_url_uses_memory() {
        let store = connect_store(&StoreConfig::default()).await;
        assert_eq!(store.backend(), "memory");
    }

    #[tokio::test]
    async fn test_connect_store_falls_back_when_unreachable() {
        let config = StoreConfig {
            // Nothing listens on port 1
            redis_url: Some("redis://127.0.0.1:1/".to_string()),
            connect_timeout_ms: 500,
            ..StoreConfig::default()
        };
        let store = connect_store(&config).await;
        assert_eq!(store.backend(), "memory");
        assert!(store.ping().await.is_ok());
        assert!(config.connect_timeout() <= Duration::from_millis(500));
    }
}
