//! Telegram Bot API wire types (the subset the bot uses)

use crate::models::{AttachmentKind, ChatId, InboundEvent, MessageId, Sender};
use serde::{Deserialize, Serialize};

/// `{ok, result, description}` envelope around every Bot API reply
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
    pub error_code: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub file_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub document: Option<Document>,
    #[serde(default)]
    pub photo: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub video: Option<serde_json::Value>,
    #[serde(default)]
    pub audio: Option<serde_json::Value>,
    #[serde(default)]
    pub voice: Option<serde_json::Value>,
    #[serde(default)]
    pub sticker: Option<serde_json::Value>,
}

/// Result of `getFile`
#[derive(Debug, Clone, Deserialize)]
pub struct File {
    pub file_id: String,
    #[serde(default)]
    pub file_path: Option<String>,
}

/// Whether `text` is the start command (`/start`, `/start@bot`, `/start payload`)
pub fn is_start_command(text: &str) -> bool {
    text.split_whitespace()
        .next()
        .map(|command| command.split('@').next() == Some("/start"))
        .unwrap_or(false)
}

impl Message {
    fn sender(&self) -> Sender {
        self.from
            .as_ref()
            .map(|user| Sender {
                first_name: user.first_name.clone(),
                last_name: user.last_name.clone(),
            })
            .unwrap_or_default()
    }

    fn attachment_kind(&self) -> Option<AttachmentKind> {
        if self.photo.is_some() {
            Some(AttachmentKind::Photo)
        } else if self.video.is_some() {
            Some(AttachmentKind::Video)
        } else if self.audio.is_some() {
            Some(AttachmentKind::Audio)
        } else if self.voice.is_some() {
            Some(AttachmentKind::Voice)
        } else if self.sticker.is_some() {
            Some(AttachmentKind::Sticker)
        } else {
            None
        }
    }
}

impl Update {
    /// Map to an intake event; `None` for updates the bot ignores
    pub fn into_event(self) -> Option<InboundEvent> {
        let message = self.message?;
        let chat = ChatId(message.chat.id);
        let id = MessageId(message.message_id);

        if let Some(text) = message.text.as_deref() {
            if is_start_command(text) {
                return Some(InboundEvent::Start {
                    chat,
                    message: id,
                    sender: message.sender(),
                });
            }
            return Some(InboundEvent::Text {
                chat,
                message: id,
                text: text.to_string(),
            });
        }

        if let Some(document) = message.document {
            return Some(InboundEvent::Document {
                chat,
                message: id,
                file_id: document.file_id,
                file_name: document.file_name,
            });
        }

        message
            .attachment_kind()
            .map(|kind| InboundEvent::UnsupportedAttachment {
                chat,
                message: id,
                kind,
            })
    }
}
