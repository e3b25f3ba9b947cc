//! Long-poll update loop

use crate::bot::IntakeBot;
use crate::error::Result;
use crate::transport::TelegramClient;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const MAX_POLL_BACKOFF: Duration = Duration::from_secs(30);

/// Delay before the next `getUpdates` after `failures` consecutive errors
fn poll_backoff(failures: u32) -> Duration {
    let secs = 1u64 << failures.saturating_sub(1).min(5);
    Duration::from_secs(secs).min(MAX_POLL_BACKOFF)
}

/// Poll for updates until `shutdown` resolves
///
/// Updates are handled one at a time in arrival order. Any webhook left
/// registered for the token is removed first, since Telegram refuses
/// `getUpdates` while one is set. Transient poll failures are retried with
/// backoff; a final rejection such as a revoked token ends the loop.
pub async fn run_polling<F>(client: &TelegramClient, bot: Arc<IntakeBot>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    client.delete_webhook().await?;
    let me = client.get_me().await?;
    info!(
        username = me.username.as_deref().unwrap_or(&me.first_name),
        "Bot is running in polling mode"
    );

    tokio::pin!(shutdown);
    let mut offset = 0i64;
    let mut failures = 0u32;

    loop {
        let polled = tokio::select! {
            _ = &mut shutdown => break,
            polled = client.get_updates(offset) => polled,
        };

        match polled {
            Ok(updates) => {
                failures = 0;
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    match update.into_event() {
                        Some(event) => bot.process(event).await,
                        None => debug!(offset, "Ignoring update without a supported message"),
                    }
                }
            }
            Err(e) if !e.is_transient() => {
                error!(error = %e, "getUpdates rejected, stopping polling");
                bot.shutdown();
                return Err(e);
            }
            Err(e) => {
                failures += 1;
                let delay = poll_backoff(failures);
                warn!(error = %e, failures, "getUpdates failed, retrying in {:?}", delay);
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    info!("Shutdown requested, stopping polling");
    bot.shutdown();
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::BotSettings;
    use crate::config::RateLimitConfig;
    use crate::rate_limit::RateLimiter;
    use crate::session::{SessionTracker, Step};
    use crate::store::MemoryStore;
    use crate::testing::RecordingRelay;
    use crate::error::BotError;
    use crate::models::ChatId;
    use crate::transport::TelegramClientConfig;
    use mockito::Matcher;
    use secrecy::SecretString;
    use serde_json::json;

    #[test]
    fn test_poll_backoff() {
        assert_eq!(poll_backoff(1), Duration::from_secs(1));
        assert_eq!(poll_backoff(2), Duration::from_secs(2));
        assert_eq!(poll_backoff(4), Duration::from_secs(8));
        assert_eq!(poll_backoff(50), MAX_POLL_BACKOFF);
    }

    #[tokio::test]
    async fn test_polls_and_dispatches_until_shutdown() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/bot1:t/deleteWebhook")
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true,"result":true}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/bot1:t/getMe")
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true,"result":{"id":1,"is_bot":true,"first_name":"Intake","username":"intake_bot"}}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/bot1:t/getUpdates")
            .match_body(Matcher::PartialJson(json!({ "offset": 0 })))
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"ok":true,"result":[{"update_id":40,"message":{"message_id":3,"chat":{"id":9},"from":{"id":9,"first_name":"Ada"},"text":"/start"}}]}"#,
            )
            .create_async()
            .await;
        let next_poll = server
            .mock("POST", "/bot1:t/getUpdates")
            .match_body(Matcher::PartialJson(json!({ "offset": 41 })))
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true,"result":[]}"#)
            .expect_at_least(1)
            .create_async()
            .await;
        server
            .mock("POST", Matcher::Regex(r"^/bot1:t/(sendMessage|sendChatAction)$".to_string()))
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true,"result":{"message_id":100,"chat":{"id":9}}}"#)
            .create_async()
            .await;

        let client = Arc::new(
            TelegramClient::new(TelegramClientConfig {
                api_url: server.url(),
                token: SecretString::new("1:t".to_string()),
                timeout: Duration::from_secs(5),
                poll_timeout_secs: 0,
            })
            .unwrap(),
        );
        let bot = Arc::new(IntakeBot::new(
            client.clone(),
            Arc::new(RecordingRelay::new()),
            Arc::new(RateLimiter::new(
                Arc::new(MemoryStore::new()),
                &RateLimitConfig::default(),
                "rl:",
            )),
            SessionTracker::in_memory(),
            BotSettings::default(),
        ));

        let shutdown = tokio::time::sleep(Duration::from_millis(300));
        run_polling(&client, bot.clone(), shutdown).await.unwrap();

        next_poll.assert_async().await;
        assert_eq!(bot.sessions().get(ChatId(9)).unwrap().step, Step::AwaitingEmail);
    }

    #[tokio::test]
    async fn test_rejected_token_stops_polling() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/bot1:t/deleteWebhook")
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true,"result":true}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/bot1:t/getMe")
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true,"result":{"id":1,"is_bot":true,"first_name":"Intake"}}"#)
            .create_async()
            .await;
        let polls = server
            .mock("POST", "/bot1:t/getUpdates")
            .with_status(401)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":false,"error_code":401,"description":"Unauthorized"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = Arc::new(
            TelegramClient::new(TelegramClientConfig {
                api_url: server.url(),
                token: SecretString::new("1:t".to_string()),
                timeout: Duration::from_secs(5),
                poll_timeout_secs: 0,
            })
            .unwrap(),
        );
        let bot = Arc::new(IntakeBot::new(
            client.clone(),
            Arc::new(RecordingRelay::new()),
            Arc::new(RateLimiter::new(
                Arc::new(MemoryStore::new()),
                &RateLimitConfig::default(),
                "rl:",
            )),
            SessionTracker::in_memory(),
            BotSettings::default(),
        ));

        let result = run_polling(&client, bot, std::future::pending::<()>()).await;

        assert!(matches!(result, Err(BotError::Api { code: Some(401), .. })));
        polls.assert_async().await;
    }
}
