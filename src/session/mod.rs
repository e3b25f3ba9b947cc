//! Per-chat intake sessions
//!
//! A session exists for a chat exactly while its intake flow is unfinished:
//! - `AwaitingEmail` after an admitted start trigger
//! - `AwaitingFile` once a syntactically valid email is captured
//! - removed after the file and email are relayed

pub mod store;
pub mod validation;

pub use store::{MemorySessionStore, SessionStore};
pub use validation::{is_allowed_spreadsheet, is_valid_email, spreadsheet_content_type};

use crate::models::ChatId;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// Stage of the intake flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    AwaitingEmail,
    AwaitingFile,
}

/// One chat's in-progress intake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub step: Step,
    pub email: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            step: Step::AwaitingEmail,
            email: None,
            started_at: Utc::now(),
        }
    }

    /// Milliseconds since the start trigger opened this intake
    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.started_at).num_milliseconds().max(0)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of feeding a text message to the tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextOutcome {
    /// No intake in progress
    NoSession,
    /// Email captured, now awaiting the file
    EmailCaptured(String),
    /// Input is not an email address; session unchanged
    InvalidEmail,
    /// A file is expected, not text; session unchanged
    AwaitingFile,
}

/// Result of checking a document against the tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    NoSession,
    /// Session exists but has not reached the file step
    OutOfOrder,
    /// Extension not in the allow-set; session unchanged
    InvalidType,
    /// The file may be relayed with this email
    Ready { email: String, file_name: String },
}

/// Owns the per-chat step state machine
pub struct SessionTracker {
    store: Arc<dyn SessionStore>,
}

impl SessionTracker {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Tracker over a fresh in-process store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySessionStore::new()))
    }

    /// Start (or restart) the flow; any previous session is discarded
    pub fn begin(&self, chat: ChatId) {
        if self.store.get(chat).is_some() {
            debug!(chat_id = %chat, "Discarding previous session on restart");
        }
        self.store.set(chat, Session::new());
    }

    pub fn get(&self, chat: ChatId) -> Option<Session> {
        self.store.get(chat)
    }

    /// Apply a text message to the chat's session
    pub fn submit_text(&self, chat: ChatId, text: &str) -> TextOutcome {
        let Some(mut session) = self.store.get(chat) else {
            return TextOutcome::NoSession;
        };

        match session.step {
            Step::AwaitingEmail => {
                if !is_valid_email(text) {
                    return TextOutcome::InvalidEmail;
                }
                let email = text.trim().to_string();
                session.email = Some(email.clone());
                session.step = Step::AwaitingFile;
                self.store.set(chat, session);
                debug!(chat_id = %chat, "Email captured, awaiting file");
                TextOutcome::EmailCaptured(email)
            }
            Step::AwaitingFile => TextOutcome::AwaitingFile,
        }
    }

    /// Check whether a document can be relayed; never mutates the session
    pub fn check_file(&self, chat: ChatId, file_name: Option<&str>) -> FileOutcome {
        let Some(session) = self.store.get(chat) else {
            return FileOutcome::NoSession;
        };

        let (Step::AwaitingFile, Some(email)) = (session.step, session.email) else {
            return FileOutcome::OutOfOrder;
        };

        match file_name {
            Some(name) if is_allowed_spreadsheet(name) => FileOutcome::Ready {
                email,
                file_name: name.to_string(),
            },
            _ => FileOutcome::InvalidType,
        }
    }

    /// Finish the flow after a successful relay
    pub fn complete(&self, chat: ChatId) -> Option<Session> {
        self.store.delete(chat)
    }

    /// Number of chats with an unfinished intake
    pub fn active(&self) -> usize {
        self.store.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAT: ChatId = ChatId(1001);

    #[test]
    fn test_text_without_session() {
        let tracker = SessionTracker::in_memory();
        assert_eq!(tracker.submit_text(CHAT, "user@example.com"), TextOutcome::NoSession);
        assert!(tracker.get(CHAT).is_none());
    }

    #[test]
    fn test_invalid_email_keeps_step() {
        let tracker = SessionTracker::in_memory();
        tracker.begin(CHAT);
        let before = tracker.get(CHAT).unwrap();

        assert_eq!(tracker.submit_text(CHAT, "not-an-email"), TextOutcome::InvalidEmail);

        let after = tracker.get(CHAT).unwrap();
        assert_eq!(before, after);
        assert_eq!(after.step, Step::AwaitingEmail);
        assert!(after.email.is_none());
    }

    #[test]
    fn test_valid_email_advances() {
        let tracker = SessionTracker::in_memory();
        tracker.begin(CHAT);

        assert_eq!(
            tracker.submit_text(CHAT, " user@example.com "),
            TextOutcome::EmailCaptured("user@example.com".to_string())
        );

        let session = tracker.get(CHAT).unwrap();
        assert_eq!(session.step, Step::AwaitingFile);
        assert_eq!(session.email.as_deref(), Some("user@example.com"));
    }

    #[test]
    fn test_text_while_awaiting_file() {
        let tracker = SessionTracker::in_memory();
        tracker.begin(CHAT);
        tracker.submit_text(CHAT, "user@example.com");

        assert_eq!(tracker.submit_text(CHAT, "other@example.com"), TextOutcome::AwaitingFile);
        assert_eq!(
            tracker.get(CHAT).unwrap().email.as_deref(),
            Some("user@example.com")
        );
    }

    #[test]
    fn test_file_checks() {
        let tracker = SessionTracker::in_memory();
        assert_eq!(tracker.check_file(CHAT, Some("a.csv")), FileOutcome::NoSession);

        tracker.begin(CHAT);
        assert_eq!(tracker.check_file(CHAT, Some("a.csv")), FileOutcome::OutOfOrder);

        tracker.submit_text(CHAT, "user@example.com");
        assert_eq!(tracker.check_file(CHAT, Some("notes.txt")), FileOutcome::InvalidType);
        assert_eq!(tracker.check_file(CHAT, None), FileOutcome::InvalidType);
        assert_eq!(tracker.get(CHAT).unwrap().step, Step::AwaitingFile);

        assert_eq!(
            tracker.check_file(CHAT, Some("Data.XLSX")),
            FileOutcome::Ready {
                email: "user@example.com".to_string(),
                file_name: "Data.XLSX".to_string(),
            }
        );
    }

    #[test]
    fn test_completed_session_reports_duration() {
        let tracker = SessionTracker::in_memory();
        tracker.begin(CHAT);
        std::thread::sleep(std::time::Duration::from_millis(5));

        let session = tracker.complete(CHAT).unwrap();
        assert!(session.elapsed_ms() >= 5);
        assert!(tracker.complete(CHAT).is_none());
    }

    #[test]
    fn test_restart_replaces_session() {
        let tracker = SessionTracker::in_memory();
        tracker.begin(CHAT);
        tracker.submit_text(CHAT, "user@example.com");

        tracker.begin(CHAT);
        let session = tracker.get(CHAT).unwrap();
        assert_eq!(session.step, Step::AwaitingEmail);
        assert!(session.email.is_none());
    }

    #[test]
    fn test_sessions_are_per_chat() {
        let tracker = SessionTracker::in_memory();
        tracker.begin(ChatId(1));
        tracker.begin(ChatId(2));
        tracker.submit_text(ChatId(1), "user@example.com");

        assert_eq!(tracker.get(ChatId(1)).unwrap().step, Step::AwaitingFile);
        assert_eq!(tracker.get(ChatId(2)).unwrap().step, Step::AwaitingEmail);

        tracker.complete(ChatId(1));
        assert!(tracker.get(ChatId(1)).is_none());
        assert_eq!(tracker.active(), 1);
    }
}
