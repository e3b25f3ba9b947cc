//! Per-chat serialization of event handling

use crate::models::ChatId;
use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per chat; idle entries are evicted
pub struct ChatLocks {
    locks: Cache<ChatId, Arc<Mutex<()>>>,
}

impl ChatLocks {
    pub fn new(idle: Duration) -> Self {
        Self {
            locks: Cache::builder().time_to_idle(idle).build(),
        }
    }

    /// Wait until no other event for `chat` is in flight
    pub async fn acquire(&self, chat: ChatId) -> OwnedMutexGuard<()> {
        let lock = self.locks.get_with(chat, || Arc::new(Mutex::new(())));
        lock.lock_owned().await
    }
}

impl Default for ChatLocks {
    fn default() -> Self {
        Self::new(Duration::from_secs(30 * 60))
    }
}
