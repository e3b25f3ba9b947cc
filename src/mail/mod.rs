//! Mail relay of captured submissions
//!
//! The destination mailbox is fixed by configuration; users never choose it.

pub mod smtp;

pub use smtp::SmtpRelay;

use crate::config::MailConfig;
use crate::error::Result;
use crate::session::spreadsheet_content_type;
use async_trait::async_trait;
use bytes::Bytes;

/// File attached to a relayed mail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub content: Bytes,
}

/// A fully addressed mail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment: Attachment,
}

impl OutgoingMail {
    /// Submission of a captured email address and spreadsheet
    pub fn submission(config: &MailConfig, email: &str, file_name: &str, content: Bytes) -> Self {
        Self {
            from: format!("\"{}\" <{}>", config.from_name, config.smtp_user),
            to: config.to.clone(),
            subject: config.subject.clone(),
            body: crate::bot::messages::mail_body(email),
            attachment: Attachment {
                filename: file_name.to_string(),
                content_type: spreadsheet_content_type(file_name).to_string(),
                content,
            },
        }
    }
}

/// Hands a mail to the outbound mail system
#[async_trait]
pub trait MailRelay: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_addressing() {
        let config = MailConfig {
            smtp_user: "bot@example.com".to_string(),
            to: "desk@example.com".to_string(),
            ..MailConfig::default()
        };

        let mail = OutgoingMail::submission(
            &config,
            "user@example.com",
            "report.xlsx",
            Bytes::from_static(b"PK\x03\x04"),
        );

        assert_eq!(mail.from, "\"Telegram Bot\" <bot@example.com>");
        assert_eq!(mail.to, "desk@example.com");
        assert_eq!(mail.subject, "📎 New File Submission from Telegram Bot");
        assert_eq!(mail.body, "Email: user@example.com");
        assert_eq!(mail.attachment.filename, "report.xlsx");
        assert_eq!(
            mail.attachment.content_type,
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        );
    }
}
