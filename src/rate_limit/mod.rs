//! Per-chat throttling of start triggers
//!
//! Cooldown grows exponentially with the strike count,
//! `f(n) = min(base * 2^n, cap)`, and a quiet period longer than the
//! strike-reset window forgives all strikes.

pub mod cooldown;

pub use cooldown::{CooldownHandle, CooldownNotice};

use crate::config::{RateLimitConfig, StoreConfig};
use crate::error::Result;
use crate::models::ChatId;
use crate::store::{connect_store, KeyValueStore, RateRecord};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

/// Outcome of a rate-limit query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitStatus {
    pub is_limited: bool,
    pub remaining_ms: Option<u64>,
    pub strikes: Option<u32>,
}

impl LimitStatus {
    pub fn allowed() -> Self {
        Self {
            is_limited: false,
            remaining_ms: None,
            strikes: None,
        }
    }

    pub fn limited(remaining_ms: u64, strikes: u32) -> Self {
        Self {
            is_limited: true,
            remaining_ms: Some(remaining_ms),
            strikes: Some(strikes),
        }
    }
}

/// Capability set selected once at startup
#[async_trait]
pub trait RateLimit: Send + Sync {
    /// Read-only check, except that a stale record is normalized to zero strikes
    async fn query(&self, chat: ChatId) -> Result<LimitStatus>;

    /// Count one more strike and restart the cooldown window from now
    async fn strike(&self, chat: ChatId) -> Result<()>;

    /// Clear strikes and restart the window from now
    async fn reset(&self, chat: ChatId) -> Result<()>;

    fn backend(&self) -> &'static str;
}

/// Cooldown for a strike count, capped at `cap_ms`
pub fn cooldown_for(strikes: u32, base_ms: u64, cap_ms: u64) -> u64 {
    let factor = 1u64 << strikes.min(62);
    base_ms.saturating_mul(factor).min(cap_ms)
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Rate limiter over any keyed store
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
    key_prefix: String,
    base_ms: u64,
    cap_ms: u64,
    window_ms: u64,
    expiry_secs: u64,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &RateLimitConfig, key_prefix: &str) -> Self {
        Self {
            store,
            key_prefix: key_prefix.to_string(),
            base_ms: config.base_cooldown_ms,
            cap_ms: config.max_cooldown_ms,
            window_ms: config.strike_reset_ms,
            expiry_secs: config.strike_reset_secs(),
        }
    }

    fn key(&self, chat: ChatId) -> String {
        format!("{}{}", self.key_prefix, chat)
    }

    /// Cooldown for a strike count under this limiter's settings
    pub fn cooldown(&self, strikes: u32) -> u64 {
        cooldown_for(strikes, self.base_ms, self.cap_ms)
    }

    /// Evaluate a record at `now` (epoch ms)
    fn evaluate(&self, record: &RateRecord, now: i64) -> LimitStatus {
        let elapsed = u64::try_from(now - record.last).unwrap_or(0);
        if elapsed > self.window_ms {
            return LimitStatus::allowed();
        }

        let strikes = u32::try_from(record.strikes).unwrap_or(0);
        // A record without strikes carries no cooldown
        if strikes == 0 {
            return LimitStatus::allowed();
        }

        let cooldown = self.cooldown(strikes);
        if elapsed < cooldown {
            LimitStatus::limited(cooldown - elapsed, strikes)
        } else {
            LimitStatus::allowed()
        }
    }
}

#[async_trait]
impl RateLimit for RateLimiter {
    async fn query(&self, chat: ChatId) -> Result<LimitStatus> {
        let key = self.key(chat);
        let Some(record) = self.store.read_fields(&key).await? else {
            return Ok(LimitStatus::allowed());
        };

        let now = now_millis();
        let elapsed = u64::try_from(now - record.last).unwrap_or(0);
        if elapsed > self.window_ms && record.strikes != 0 {
            if self.store.clear_strikes_if(&key, record.last).await? {
                debug!(chat_id = %chat, strikes = record.strikes, "Strike window elapsed, strikes forgiven");
            } else {
                debug!(chat_id = %chat, "Record changed since read, strikes left in place");
            }
        }

        Ok(self.evaluate(&record, now))
    }

    async fn strike(&self, chat: ChatId) -> Result<()> {
        let key = self.key(chat);
        let strikes = self
            .store
            .record_strike(&key, now_millis(), self.expiry_secs)
            .await?;
        debug!(chat_id = %chat, strikes, "Strike recorded");
        Ok(())
    }

    async fn reset(&self, chat: ChatId) -> Result<()> {
        let key = self.key(chat);
        self.store
            .write_fields(&key, RateRecord { last: now_millis(), strikes: 0 }, self.expiry_secs)
            .await
    }

    fn backend(&self) -> &'static str {
        self.store.backend()
    }
}

/// Probe the configured store once and return the limiter over it
pub async fn build_rate_limiter(
    limits: &RateLimitConfig,
    store: &StoreConfig,
) -> Arc<dyn RateLimit> {
    let backing = connect_store(store).await;
    Arc::new(RateLimiter::new(backing, limits, &store.key_prefix))
}
