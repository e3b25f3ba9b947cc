//! Live cooldown countdown shown to a rate-limited chat

use crate::bot::messages;
use crate::models::{ChatId, MessageId, ReplyMarkup};
use crate::transport::Transport;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Spawns countdown notices
#[derive(Debug, Clone, Copy)]
pub struct CooldownNotice {
    tick: Duration,
    delete_delay: Duration,
}

impl CooldownNotice {
    pub fn new(tick: Duration, delete_delay: Duration) -> Self {
        Self { tick, delete_delay }
    }

    /// Whole seconds shown for a remaining cooldown, rounded up
    pub fn seconds_for(remaining_ms: u64) -> u64 {
        remaining_ms.div_ceil(1000)
    }

    /// Post the notice and count it down in a detached task
    ///
    /// The message is edited once per tick, replaced with the proceed
    /// notice when the count reaches zero, then deleted after the delay.
    pub fn spawn(
        &self,
        transport: Arc<dyn Transport>,
        chat: ChatId,
        remaining_ms: u64,
    ) -> CooldownHandle {
        let seconds = Self::seconds_for(remaining_ms).max(1);
        let notice = *self;
        let task = tokio::spawn(async move {
            notice.run(transport, chat, seconds).await;
        });
        CooldownHandle { chat, task }
    }

    async fn run(self, transport: Arc<dyn Transport>, chat: ChatId, seconds: u64) {
        let message = match transport
            .send_message(chat, &messages::cooldown(seconds), ReplyMarkup::None)
            .await
        {
            Ok(message) => message,
            Err(e) => {
                debug!(chat_id = %chat, error = %e, "Could not post cooldown notice");
                return;
            }
        };

        for left in (1..seconds).rev() {
            tokio::time::sleep(self.tick).await;
            edit_quietly(transport.as_ref(), chat, message, &messages::cooldown(left)).await;
        }

        tokio::time::sleep(self.tick).await;
        edit_quietly(transport.as_ref(), chat, message, messages::PROCEED).await;

        tokio::time::sleep(self.delete_delay).await;
        if let Err(e) = transport.delete_message(chat, message).await {
            debug!(chat_id = %chat, error = %e, "Cooldown notice already gone");
        }
    }
}

async fn edit_quietly(transport: &dyn Transport, chat: ChatId, message: MessageId, text: &str) {
    if let Err(e) = transport.edit_message_text(chat, message, text).await {
        debug!(chat_id = %chat, message_id = %message, error = %e, "Ignoring failed countdown edit");
    }
}

/// Owner's handle on a running countdown
#[derive(Debug)]
pub struct CooldownHandle {
    chat: ChatId,
    task: JoinHandle<()>,
}

impl CooldownHandle {
    pub fn chat(&self) -> ChatId {
        self.chat
    }

    /// Stop the countdown; the notice is left as it is
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the countdown to end (or be cancelled)
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            if !e.is_cancelled() {
                debug!(chat_id = %self.chat, error = %e, "Countdown task failed");
            }
        }
    }
}
