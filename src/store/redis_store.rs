//! Networked rate-limit store backed by Redis hashes

use super::{KeyValueStore, RateRecord, RecordField};
use crate::error::{BotError, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Compare-and-clear: zero `strikes` only while `last` is unchanged
static CLEAR_STRIKES_IF_LAST: Lazy<redis::Script> = Lazy::new(|| {
    redis::Script::new(
        r#"
        if redis.call('HGET', KEYS[1], ARGV[1]) == ARGV[2] then
            redis.call('HSET', KEYS[1], ARGV[3], 0)
            return 1
        end
        return 0
        "#,
    )
});

fn ttl(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}

/// Redis store; one hash per key with fields `last` and `strikes`
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connect and check once; fails if the server does not answer in time
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(url)?;

        let manager = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| BotError::Timeout(format!("connecting to store after {:?}", timeout)))??;

        let store = Self { manager };
        tokio::time::timeout(timeout, store.ping())
            .await
            .map_err(|_| BotError::Timeout(format!("store ping after {:?}", timeout)))??;

        debug!("Connected to networked store");
        Ok(store)
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn read_fields(&self, key: &str) -> Result<Option<RateRecord>> {
        let mut conn = self.manager.clone();
        let fields: HashMap<String, i64> = conn.hgetall(key).await?;

        if fields.is_empty() {
            return Ok(None);
        }

        Ok(Some(RateRecord {
            last: fields.get(RecordField::Last.as_str()).copied().unwrap_or(0),
            strikes: fields.get(RecordField::Strikes.as_str()).copied().unwrap_or(0),
        }))
    }

    async fn write_fields(&self, key: &str, record: RateRecord, ttl_secs: u64) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: () = redis::pipe()
            .atomic()
            .hset(key, RecordField::Last.as_str(), record.last)
            .ignore()
            .hset(key, RecordField::Strikes.as_str(), record.strikes)
            .ignore()
            .expire(key, ttl(ttl_secs))
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn record_strike(&self, key: &str, now: i64, ttl_secs: u64) -> Result<i64> {
        let mut conn = self.manager.clone();
        let (strikes,): (i64,) = redis::pipe()
            .atomic()
            .hincr(key, RecordField::Strikes.as_str(), 1i64)
            .hset(key, RecordField::Last.as_str(), now)
            .ignore()
            .expire(key, ttl(ttl_secs))
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(strikes)
    }

    async fn clear_strikes_if(&self, key: &str, expected_last: i64) -> Result<bool> {
        let mut conn = self.manager.clone();
        let cleared: i64 = CLEAR_STRIKES_IF_LAST
            .key(key)
            .arg(RecordField::Last.as_str())
            .arg(expected_last)
            .arg(RecordField::Strikes.as_str())
            .invoke_async(&mut conn)
            .await?;
        Ok(cleared == 1)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
        if reply != "PONG" {
            return Err(BotError::Store(format!("unexpected ping reply: {}", reply)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_rejects_bad_url() {
        let result = RedisStore::connect("not a url", Duration::from_millis(200)).await;
        assert!(matches!(result, Err(BotError::Store(_))));
    }

    #[tokio::test]
    #[ignore = "requires a Redis server on localhost:6379"]
    async fn test_round_trip_against_server() {
        let store = RedisStore::connect("redis://127.0.0.1:6379/", Duration::from_secs(2))
            .await
            .unwrap();
        let key = format!("intake:test:{}", uuid::Uuid::new_v4());

        assert_eq!(store.read_fields(&key).await.unwrap(), None);
        assert_eq!(store.record_strike(&key, 42, 5).await.unwrap(), 1);
        assert_eq!(
            store.read_fields(&key).await.unwrap(),
            Some(RateRecord { last: 42, strikes: 1 })
        );

        assert_eq!(store.record_strike(&key, 43, 5).await.unwrap(), 2);
        assert!(!store.clear_strikes_if(&key, 42).await.unwrap());
        assert!(store.clear_strikes_if(&key, 43).await.unwrap());
        assert_eq!(
            store.read_fields(&key).await.unwrap(),
            Some(RateRecord { last: 43, strikes: 0 })
        );

        store.write_fields(&key, RateRecord { last: 50, strikes: 0 }, 5).await.unwrap();
        assert_eq!(
            store.read_fields(&key).await.unwrap(),
            Some(RateRecord { last: 50, strikes: 0 })
        );
    }
}
