//! Platform-neutral identifiers and inbound events

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of one user's conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle of a message previously sent or received in a chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Optional keyboard attached to an outgoing message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplyMarkup {
    #[default]
    None,
    /// One-time, resized keyboard with a single `/start` button
    RestartKeyboard,
}

/// Who sent an inbound message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sender {
    pub first_name: String,
    pub last_name: Option<String>,
}

impl Sender {
    pub fn display_name(&self) -> String {
        match &self.last_name {
            Some(last) if !last.is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }
}

/// Kind of an attachment the bot does not accept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Photo,
    Video,
    Audio,
    Voice,
    Sticker,
    Other,
}

impl AttachmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentKind::Photo => "photo",
            AttachmentKind::Video => "video",
            AttachmentKind::Audio => "audio",
            AttachmentKind::Voice => "voice",
            AttachmentKind::Sticker => "sticker",
            AttachmentKind::Other => "other",
        }
    }
}

/// An inbound event routed to the intake flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// The start trigger (`/start`)
    Start {
        chat: ChatId,
        message: MessageId,
        sender: Sender,
    },
    /// Any other text message
    Text {
        chat: ChatId,
        message: MessageId,
        text: String,
    },
    /// A document attachment
    Document {
        chat: ChatId,
        message: MessageId,
        file_id: String,
        file_name: Option<String>,
    },
    /// Photos, stickers and other non-document attachments
    UnsupportedAttachment {
        chat: ChatId,
        message: MessageId,
        kind: AttachmentKind,
    },
}

impl InboundEvent {
    pub fn chat(&self) -> ChatId {
        match self {
            InboundEvent::Start { chat, .. }
            | InboundEvent::Text { chat, .. }
            | InboundEvent::Document { chat, .. }
            | InboundEvent::UnsupportedAttachment { chat, .. } => *chat,
        }
    }

    /// Label used for logging and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::Start { .. } => "start",
            InboundEvent::Text { .. } => "text",
            InboundEvent::Document { .. } => "document",
            InboundEvent::UnsupportedAttachment { .. } => "unsupported",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name() {
        let sender = Sender {
            first_name: "Ada".to_string(),
            last_name: Some("Lovelace".to_string()),
        };
        assert_eq!(sender.display_name(), "Ada Lovelace");

        let sender = Sender {
            first_name: "Ada".to_string(),
            last_name: None,
        };
        assert_eq!(sender.display_name(), "Ada");
    }

    #[test]
    fn test_event_chat_and_kind() {
        let event = InboundEvent::Document {
            chat: ChatId(42),
            message: MessageId(7),
            file_id: "f1".to_string(),
            file_name: Some("report.csv".to_string()),
        };
        assert_eq!(event.chat(), ChatId(42));
        assert_eq!(event.kind(), "document");
    }
}
