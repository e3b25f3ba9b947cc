//! SMTP relay with retry

use super::{MailRelay, OutgoingMail};
use crate::config::MailConfig;
use crate::error::{BotError, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use rand::Rng;
use secrecy::ExposeSecret;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Port using implicit TLS rather than STARTTLS
const IMPLICIT_TLS_PORT: u16 = 465;

/// Relay over an authenticated SMTP submission server
pub struct SmtpRelay {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    retry_attempts: usize,
    retry_backoff: Duration,
}

impl SmtpRelay {
    pub fn new(config: &MailConfig) -> Result<Self> {
        let credentials = Credentials::new(
            config.smtp_user.clone(),
            config.smtp_pass.expose_secret().clone(),
        );

        let builder = if config.smtp_port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
        };

        let transport = builder
            .port(config.smtp_port)
            .credentials(credentials)
            .timeout(Some(config.timeout()))
            .build();

        Ok(Self {
            transport,
            retry_attempts: config.retry_attempts,
            retry_backoff: config.retry_backoff(),
        })
    }

    /// Exponential backoff with up to 10% jitter
    fn calculate_backoff(&self, attempt: usize) -> Duration {
        let multiplier = 2_u32.saturating_pow(attempt.saturating_sub(1) as u32);
        let base = self.retry_backoff.saturating_mul(multiplier);
        let jitter_ms = rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 10);
        base + Duration::from_millis(jitter_ms)
    }
}

/// Build the MIME message for a submission
pub fn build_message(mail: &OutgoingMail) -> Result<Message> {
    let from: Mailbox = mail
        .from
        .parse()
        .map_err(|e| BotError::Relay(format!("invalid sender {}: {}", mail.from, e)))?;
    let to: Mailbox = mail
        .to
        .parse()
        .map_err(|e| BotError::Relay(format!("invalid recipient {}: {}", mail.to, e)))?;
    let content_type = ContentType::parse(&mail.attachment.content_type)
        .map_err(|e| BotError::Relay(format!("invalid content type: {}", e)))?;

    let message = Message::builder()
        .from(from)
        .to(to)
        .subject(mail.subject.as_str())
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(mail.body.clone()))
                .singlepart(
                    Attachment::new(mail.attachment.filename.clone())
                        .body(mail.attachment.content.to_vec(), content_type),
                ),
        )?;

    Ok(message)
}

#[async_trait]
impl MailRelay for SmtpRelay {
    async fn send(&self, mail: OutgoingMail) -> Result<()> {
        let message = build_message(&mail)?;

        let mut attempt = 0;
        loop {
            attempt += 1;

            match self.transport.send(message.clone()).await {
                Ok(response) => {
                    info!(
                        attachment = %mail.attachment.filename,
                        bytes = mail.attachment.content.len(),
                        code = %response.code(),
                        "Submission relayed"
                    );
                    return Ok(());
                }
                Err(e) => {
                    if e.is_permanent() || attempt > self.retry_attempts {
                        error!("Mail relay failed after {} attempts: {}", attempt, e);
                        return Err(e.into());
                    }

                    let backoff = self.calculate_backoff(attempt);
                    warn!(
                        "Mail relay attempt {} failed: {}, retrying in {:?}",
                        attempt, e, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
            debug!("Retrying mail relay, attempt {}", attempt + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::Attachment as MailAttachment;
    use bytes::Bytes;

    fn sample_mail() -> OutgoingMail {
        OutgoingMail {
            from: "\"Telegram Bot\" <bot@example.com>".to_string(),
            to: "desk@example.com".to_string(),
            subject: "📎 New File Submission from Telegram Bot".to_string(),
            body: "Email: user@example.com".to_string(),
            attachment: MailAttachment {
                filename: "report.csv".to_string(),
                content_type: "text/csv".to_string(),
                content: Bytes::from_static(b"name,amount\nada,3\n"),
            },
        }
    }

    #[test]
    fn test_build_message() {
        let message = build_message(&sample_mail()).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("To: desk@example.com"));
        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("text/csv"));
        assert!(raw.contains("report.csv"));
    }

    #[test]
    fn test_build_message_rejects_bad_recipient() {
        let mut mail = sample_mail();
        mail.to = "not an address".to_string();
        assert!(matches!(build_message(&mail), Err(BotError::Relay(_))));
    }

    #[tokio::test]
    async fn test_backoff_grows() {
        let config = MailConfig {
            smtp_host: "localhost".to_string(),
            retry_backoff_ms: 200,
            ..MailConfig::default()
        };
        let relay = SmtpRelay::new(&config).unwrap();

        let first = relay.calculate_backoff(1);
        let second = relay.calculate_backoff(2);
        assert!(first >= Duration::from_millis(200) && first <= Duration::from_millis(220));
        assert!(second >= Duration::from_millis(400) && second <= Duration::from_millis(440));
    }

    #[tokio::test]
    #[ignore = "requires an SMTP server on localhost:2525"]
    async fn test_send_against_server() {
        let config = MailConfig {
            smtp_host: "localhost".to_string(),
            smtp_port: 2525,
            ..MailConfig::default()
        };
        let relay = SmtpRelay::new(&config).unwrap();
        relay.send(sample_mail()).await.unwrap();
    }
}
