//! Keyed storage for intake sessions

use super::Session;
use crate::models::ChatId;
use dashmap::DashMap;

/// Keyed session storage, partitioned by chat
pub trait SessionStore: Send + Sync {
    fn get(&self, chat: ChatId) -> Option<Session>;

    /// Insert or replace the session for a chat
    fn set(&self, chat: ChatId, session: Session);

    /// Remove and return the session for a chat
    fn delete(&self, chat: ChatId) -> Option<Session>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-process session store
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: DashMap<ChatId, Session>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, chat: ChatId) -> Option<Session> {
        self.sessions.get(&chat).map(|entry| entry.value().clone())
    }

    fn set(&self, chat: ChatId, session: Session) {
        self.sessions.insert(chat, session);
    }

    fn delete(&self, chat: ChatId) -> Option<Session> {
        self.sessions.remove(&chat).map(|(_, session)| session)
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_delete() {
        let store = MemorySessionStore::new();
        assert!(store.is_empty());

        store.set(ChatId(1), Session::new());
        assert!(store.get(ChatId(1)).is_some());
        assert!(store.get(ChatId(2)).is_none());
        assert_eq!(store.len(), 1);

        assert!(store.delete(ChatId(1)).is_some());
        assert!(store.delete(ChatId(1)).is_none());
        assert!(store.is_empty());
    }
}
