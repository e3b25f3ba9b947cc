//! In-memory collaborators that record every call
//!
//! Used by unit and integration tests in place of the chat platform and
//! the SMTP server.

use crate::error::{BotError, Result};
use crate::mail::{MailRelay, OutgoingMail};
use crate::models::{ChatId, MessageId, ReplyMarkup};
use crate::transport::Transport;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

/// One recorded transport call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Send {
        chat: ChatId,
        text: String,
        markup: ReplyMarkup,
    },
    Edit {
        chat: ChatId,
        message: MessageId,
        text: String,
    },
    Delete {
        chat: ChatId,
        message: MessageId,
    },
    FileUrl {
        file_id: String,
    },
    Download {
        url: String,
    },
    Typing {
        chat: ChatId,
    },
}

/// Transport fake; files are served from an in-memory map
#[derive(Debug, Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<TransportCall>>,
    files: Mutex<HashMap<String, Bytes>>,
    next_message: AtomicI64,
    fail_sends: AtomicBool,
    fail_edits: AtomicBool,
    fail_deletes: AtomicBool,
    fail_downloads: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `content` for `file_id`
    pub fn add_file(&self, file_id: &str, content: impl Into<Bytes>) {
        self.files
            .lock()
            .unwrap()
            .insert(file_id.to_string(), content.into());
    }

    /// Make sends fail as if the user had blocked the bot
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Make edits fail as if the message had been deleted
    pub fn fail_edits(&self, fail: bool) {
        self.fail_edits.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_downloads(&self, fail: bool) {
        self.fail_downloads.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Texts of all sent messages, in order
    pub fn sent_texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Send { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Texts of all edits, in order
    pub fn edits(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Edit { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn deleted(&self) -> Vec<MessageId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Delete { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_message(&self, chat: ChatId, text: &str, markup: ReplyMarkup) -> Result<MessageId> {
        self.record(TransportCall::Send {
            chat,
            text: text.to_string(),
            markup,
        });
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(BotError::Api {
                method: "sendMessage".to_string(),
                code: Some(403),
                description: "Forbidden: bot was blocked by the user".to_string(),
            });
        }
        Ok(MessageId(self.next_message.fetch_add(1, Ordering::SeqCst) + 1))
    }

    async fn edit_message_text(&self, chat: ChatId, message: MessageId, text: &str) -> Result<()> {
        self.record(TransportCall::Edit {
            chat,
            message,
            text: text.to_string(),
        });
        if self.fail_edits.load(Ordering::SeqCst) {
            return Err(BotError::Api {
                method: "editMessageText".to_string(),
                code: Some(400),
                description: "Bad Request: message to edit not found".to_string(),
            });
        }
        Ok(())
    }

    async fn delete_message(&self, chat: ChatId, message: MessageId) -> Result<()> {
        self.record(TransportCall::Delete { chat, message });
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(BotError::Api {
                method: "deleteMessage".to_string(),
                code: Some(400),
                description: "Bad Request: message can't be deleted".to_string(),
            });
        }
        Ok(())
    }

    async fn file_download_url(&self, file_id: &str) -> Result<String> {
        self.record(TransportCall::FileUrl {
            file_id: file_id.to_string(),
        });
        Ok(format!("memory://files/{}", file_id))
    }

    async fn download_file(&self, url: &str) -> Result<Bytes> {
        self.record(TransportCall::Download {
            url: url.to_string(),
        });
        if self.fail_downloads.load(Ordering::SeqCst) {
            return Err(BotError::Download(format!("connection reset fetching {}", url)));
        }
        let file_id = url.trim_start_matches("memory://files/");
        self.files
            .lock()
            .unwrap()
            .get(file_id)
            .cloned()
            .ok_or_else(|| BotError::Download(format!("no such file: {}", file_id)))
    }

    async fn send_typing(&self, chat: ChatId) -> Result<()> {
        self.record(TransportCall::Typing { chat });
        Ok(())
    }
}

/// Mail relay fake
#[derive(Debug, Default)]
pub struct RecordingRelay {
    sent: Mutex<Vec<OutgoingMail>>,
    fail: AtomicBool,
}

impl RecordingRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailRelay for RecordingRelay {
    async fn send(&self, mail: OutgoingMail) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BotError::Relay("535 authentication failed".to_string()));
        }
        self.sent.lock().unwrap().push(mail);
        Ok(())
    }
}
