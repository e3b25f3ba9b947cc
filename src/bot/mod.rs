//! Intake flow dispatch
//!
//! Routes inbound events to the rate limiter and the session tracker and
//! renders every outcome through the chat transport. Events for one chat
//! are handled to completion before the next one for that chat starts.

pub mod locks;
pub mod messages;

pub use locks::ChatLocks;

use crate::config::{AdmissionPolicy, Config, MailConfig};
use crate::error::Result;
use crate::mail::{MailRelay, OutgoingMail};
use crate::metrics::METRICS;
use crate::models::{AttachmentKind, ChatId, InboundEvent, MessageId, ReplyMarkup, Sender};
use crate::rate_limit::{CooldownHandle, CooldownNotice, LimitStatus, RateLimit};
use crate::session::{FileOutcome, SessionTracker, TextOutcome};
use crate::transport::Transport;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// What the bot did with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Start trigger admitted; a fresh session awaits the email
    Admitted,
    /// Start trigger rejected; a countdown is running
    Limited { remaining_ms: u64 },
    /// Text or file without an intake in progress
    NoSession,
    InvalidEmail,
    EmailCaptured,
    /// Text while a file is expected
    AwaitingFile,
    /// File before the email was captured
    OutOfOrder,
    InvalidFile,
    Relayed,
    RelayFailed,
    Unsupported,
}

/// Behavioral settings of the intake flow
#[derive(Debug, Clone)]
pub struct BotSettings {
    pub admission_policy: AdmissionPolicy,
    pub countdown_tick: Duration,
    pub notice_delete_delay: Duration,
    pub mail: MailConfig,
}

impl BotSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            admission_policy: config.rate_limit.admission_policy,
            countdown_tick: config.rate_limit.countdown_tick(),
            notice_delete_delay: config.rate_limit.notice_delete_delay(),
            mail: config.mail.clone(),
        }
    }
}

impl Default for BotSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// The intake bot
pub struct IntakeBot {
    transport: Arc<dyn Transport>,
    relay: Arc<dyn MailRelay>,
    limiter: Arc<dyn RateLimit>,
    sessions: SessionTracker,
    settings: BotSettings,
    notice: CooldownNotice,
    locks: ChatLocks,
    cooldowns: DashMap<ChatId, CooldownHandle>,
}

impl IntakeBot {
    pub fn new(
        transport: Arc<dyn Transport>,
        relay: Arc<dyn MailRelay>,
        limiter: Arc<dyn RateLimit>,
        sessions: SessionTracker,
        settings: BotSettings,
    ) -> Self {
        let notice = CooldownNotice::new(settings.countdown_tick, settings.notice_delete_delay);
        Self {
            transport,
            relay,
            limiter,
            sessions,
            settings,
            notice,
            locks: ChatLocks::default(),
            cooldowns: DashMap::new(),
        }
    }

    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    pub fn rate_limit_backend(&self) -> &'static str {
        self.limiter.backend()
    }

    /// Handle one event, logging instead of propagating failures
    pub async fn process(&self, event: InboundEvent) {
        let chat = event.chat();
        let kind = event.kind();
        match self.handle(event).await {
            Ok(outcome) => debug!(chat_id = %chat, kind, ?outcome, "Event handled"),
            Err(e) => error!(chat_id = %chat, kind, error = %e, "Event handling failed"),
        }
    }

    /// Handle one event to completion
    pub async fn handle(&self, event: InboundEvent) -> Result<Outcome> {
        let _guard = self.locks.acquire(event.chat()).await;
        METRICS.record_event(event.kind());

        let outcome = match event {
            InboundEvent::Start { chat, sender, .. } => self.on_start(chat, &sender).await,
            InboundEvent::Text { chat, message, text } => self.on_text(chat, message, &text).await,
            InboundEvent::Document {
                chat,
                message,
                file_id,
                file_name,
            } => self.on_document(chat, message, &file_id, file_name.as_deref()).await,
            InboundEvent::UnsupportedAttachment { chat, kind, .. } => {
                self.on_unsupported(chat, kind).await
            }
        };

        METRICS.active_sessions.set(self.sessions.active() as f64);
        outcome
    }

    async fn on_start(&self, chat: ChatId, sender: &Sender) -> Result<Outcome> {
        let status = match self.limiter.query(chat).await {
            Ok(status) => status,
            Err(e) => {
                METRICS.store_errors.with_label_values(&["query"]).inc();
                warn!(chat_id = %chat, error = %e, "Rate-limit query failed, admitting");
                LimitStatus::allowed()
            }
        };

        if status.is_limited {
            METRICS.record_start(false);
            self.strike(chat).await;

            let remaining_ms = status.remaining_ms.unwrap_or_default();
            info!(
                chat_id = %chat,
                strikes = status.strikes.unwrap_or_default(),
                remaining_ms,
                "Start trigger rate-limited"
            );

            METRICS.cooldown_notices.inc();
            let handle = self.notice.spawn(self.transport.clone(), chat, remaining_ms);
            self.cooldowns.retain(|_, handle| !handle.is_finished());
            self.cooldowns.insert(chat, handle);
            return Ok(Outcome::Limited { remaining_ms });
        }

        METRICS.record_start(true);
        self.strike(chat).await;

        self.sessions.begin(chat);
        self.typing(chat).await;
        let greeted = self
            .transport
            .send_message(chat, &messages::greeting(&sender.display_name()), ReplyMarkup::None)
            .await;

        // The start was admitted whether or not the greeting got through
        if self.settings.admission_policy == AdmissionPolicy::ForgiveAdmitted {
            if let Err(e) = self.limiter.reset(chat).await {
                METRICS.store_errors.with_label_values(&["reset"]).inc();
                warn!(chat_id = %chat, error = %e, "Rate-limit reset failed");
            }
        }
        greeted?;

        info!(chat_id = %chat, "Intake started");
        Ok(Outcome::Admitted)
    }

    async fn on_text(&self, chat: ChatId, message: MessageId, text: &str) -> Result<Outcome> {
        match self.sessions.submit_text(chat, text) {
            TextOutcome::NoSession => {
                self.delete_quietly(chat, message).await;
                self.transport
                    .send_message(chat, messages::PLEASE_START, ReplyMarkup::RestartKeyboard)
                    .await?;
                Ok(Outcome::NoSession)
            }
            TextOutcome::InvalidEmail => {
                METRICS.record_rejection("email");
                self.delete_quietly(chat, message).await;
                self.transport
                    .send_message(chat, messages::INVALID_EMAIL, ReplyMarkup::None)
                    .await?;
                Ok(Outcome::InvalidEmail)
            }
            TextOutcome::EmailCaptured(_) => {
                self.transport
                    .send_message(chat, messages::REQUEST_FILE, ReplyMarkup::None)
                    .await?;
                Ok(Outcome::EmailCaptured)
            }
            TextOutcome::AwaitingFile => {
                self.delete_quietly(chat, message).await;
                self.transport
                    .send_message(chat, messages::REQUEST_FILE, ReplyMarkup::RestartKeyboard)
                    .await?;
                Ok(Outcome::AwaitingFile)
            }
        }
    }

    async fn on_document(
        &self,
        chat: ChatId,
        message: MessageId,
        file_id: &str,
        file_name: Option<&str>,
    ) -> Result<Outcome> {
        match self.sessions.check_file(chat, file_name) {
            FileOutcome::NoSession => {
                self.transport
                    .send_message(chat, messages::PLEASE_START, ReplyMarkup::RestartKeyboard)
                    .await?;
                Ok(Outcome::NoSession)
            }
            FileOutcome::OutOfOrder => {
                self.transport
                    .send_message(chat, messages::FOLLOW_PROCESS, ReplyMarkup::RestartKeyboard)
                    .await?;
                Ok(Outcome::OutOfOrder)
            }
            FileOutcome::InvalidType => {
                METRICS.record_rejection("file_type");
                self.delete_quietly(chat, message).await;
                self.transport
                    .send_message(chat, messages::INVALID_FILE_TYPE, ReplyMarkup::None)
                    .await?;
                Ok(Outcome::InvalidFile)
            }
            FileOutcome::Ready { email, file_name } => {
                self.relay_file(chat, file_id, &email, &file_name).await
            }
        }
    }

    /// Download the file and mail it with the captured email
    ///
    /// The session is only removed once the relay succeeded.
    async fn relay_file(
        &self,
        chat: ChatId,
        file_id: &str,
        email: &str,
        file_name: &str,
    ) -> Result<Outcome> {
        self.typing(chat).await;
        let wait = self
            .transport
            .send_message(chat, messages::PLEASE_WAIT, ReplyMarkup::None)
            .await?;

        let start = Instant::now();
        let result = async {
            let url = self.transport.file_download_url(file_id).await?;
            let content = self.transport.download_file(&url).await?;
            let mail = OutgoingMail::submission(&self.settings.mail, email, file_name, content);
            self.relay.send(mail).await
        }
        .await;
        let elapsed = start.elapsed().as_secs_f64();

        self.delete_quietly(chat, wait).await;

        match result {
            Ok(()) => {
                METRICS.record_relay(true, elapsed);
                let intake_ms = self.sessions.complete(chat).map(|session| session.elapsed_ms());
                info!(chat_id = %chat, file_name, intake_ms, "Submission relayed, intake complete");
                self.transport
                    .send_message(chat, messages::RELAY_SUCCESS, ReplyMarkup::None)
                    .await?;
                Ok(Outcome::Relayed)
            }
            Err(e) => {
                METRICS.record_relay(false, elapsed);
                error!(chat_id = %chat, file_name, error = %e, "Relay failed, session kept");
                self.transport
                    .send_message(chat, messages::RELAY_FAILED, ReplyMarkup::None)
                    .await?;
                Ok(Outcome::RelayFailed)
            }
        }
    }

    async fn on_unsupported(&self, chat: ChatId, kind: AttachmentKind) -> Result<Outcome> {
        METRICS.record_rejection(kind.as_str());
        self.transport
            .send_message(chat, messages::UNSUPPORTED_ATTACHMENT, ReplyMarkup::None)
            .await?;
        Ok(Outcome::Unsupported)
    }

    async fn strike(&self, chat: ChatId) {
        if let Err(e) = self.limiter.strike(chat).await {
            METRICS.store_errors.with_label_values(&["strike"]).inc();
            warn!(chat_id = %chat, error = %e, "Rate-limit strike failed");
        }
    }

    async fn typing(&self, chat: ChatId) {
        if let Err(e) = self.transport.send_typing(chat).await {
            debug!(chat_id = %chat, error = %e, "Typing indicator failed");
        }
    }

    async fn delete_quietly(&self, chat: ChatId, message: MessageId) {
        if let Err(e) = self.transport.delete_message(chat, message).await {
            debug!(chat_id = %chat, message_id = %message, error = %e, "Could not delete message");
        }
    }

    /// Number of countdowns still running
    pub fn pending_cooldowns(&self) -> usize {
        self.cooldowns.iter().filter(|entry| !entry.is_finished()).count()
    }

    /// Stop all running countdowns
    pub fn shutdown(&self) {
        for entry in self.cooldowns.iter() {
            entry.cancel();
        }
        self.cooldowns.clear();
    }
}
