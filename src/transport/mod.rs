//! Chat transport abstraction
//!
//! The intake flow only talks to the chat platform through [`Transport`].
//! `TelegramClient` is the production implementation.

pub mod telegram;
pub mod telegram_models;

pub use telegram::{TelegramClient, TelegramClientConfig};

use crate::error::Result;
use crate::models::{ChatId, MessageId, ReplyMarkup};
use async_trait::async_trait;
use bytes::Bytes;

/// Outbound operations on the chat platform
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_message(&self, chat: ChatId, text: &str, markup: ReplyMarkup) -> Result<MessageId>;

    /// Fails if the message no longer exists; callers treat that as harmless
    async fn edit_message_text(&self, chat: ChatId, message: MessageId, text: &str) -> Result<()>;

    /// Best-effort
    async fn delete_message(&self, chat: ChatId, message: MessageId) -> Result<()>;

    /// Resolve a platform file id to a download URL
    async fn file_download_url(&self, file_id: &str) -> Result<String>;

    async fn download_file(&self, url: &str) -> Result<Bytes>;

    async fn send_typing(&self, chat: ChatId) -> Result<()>;
}
