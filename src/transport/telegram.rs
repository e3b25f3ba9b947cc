//! Telegram Bot API client

use super::telegram_models::{ApiResponse, File, Message, Update, User};
use super::Transport;
use crate::config::TelegramConfig;
use crate::error::{BotError, Result};
use crate::models::{ChatId, MessageId, ReplyMarkup};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Telegram client configuration
#[derive(Debug, Clone)]
pub struct TelegramClientConfig {
    pub api_url: String,
    pub token: SecretString,
    pub timeout: Duration,
    pub poll_timeout_secs: u64,
}

impl From<&TelegramConfig> for TelegramClientConfig {
    fn from(config: &TelegramConfig) -> Self {
        Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.bot_token.clone(),
            timeout: config.request_timeout(),
            poll_timeout_secs: config.poll_timeout_secs,
        }
    }
}

/// Bot API client over HTTPS
pub struct TelegramClient {
    http: Client,
    config: TelegramClientConfig,
}

impl TelegramClient {
    pub fn new(config: TelegramClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BotError::Internal(e.to_string()))?;

        Ok(Self { http, config })
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_url,
            self.config.token.expose_secret(),
            method
        )
    }

    fn file_url(&self, file_path: &str) -> String {
        format!(
            "{}/file/bot{}/{}",
            self.config.api_url,
            self.config.token.expose_secret(),
            file_path
        )
    }

    /// Call a Bot API method and unwrap the response envelope
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: Value,
        timeout: Option<Duration>,
    ) -> Result<T> {
        debug!("Calling Bot API method {}", method);

        let mut request = self.http.post(self.method_url(method)).json(&body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        // Request URLs carry the token; strip them from errors
        let response = request.send().await.map_err(|e| BotError::from(e.without_url()))?;

        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| BotError::Transport(format!("{} returned invalid JSON: {}", method, e.without_url())))?;

        match envelope {
            ApiResponse { ok: true, result: Some(result), .. } => Ok(result),
            ApiResponse { description, error_code, .. } => Err(BotError::Api {
                method: method.to_string(),
                code: error_code,
                description: match (error_code, description) {
                    (Some(code), Some(text)) => format!("{} {}", code, text),
                    (_, Some(text)) => text,
                    (Some(code), None) => code.to_string(),
                    (None, None) => "no description".to_string(),
                },
            }),
        }
    }

    /// Identity of the bot behind the token
    pub async fn get_me(&self) -> Result<User> {
        self.call("getMe", json!({}), None).await
    }

    /// Long-poll for updates after `offset`
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        let poll = self.config.poll_timeout_secs;
        self.call(
            "getUpdates",
            json!({
                "offset": offset,
                "timeout": poll,
                "allowed_updates": ["message"],
            }),
            Some(self.config.timeout + Duration::from_secs(poll)),
        )
        .await
    }

    pub async fn set_webhook(&self, url: &str, secret: Option<&SecretString>) -> Result<()> {
        let mut body = json!({ "url": url, "allowed_updates": ["message"] });
        if let Some(secret) = secret {
            body["secret_token"] = json!(secret.expose_secret());
        }
        let _: bool = self.call("setWebhook", body, None).await?;
        Ok(())
    }

    pub async fn delete_webhook(&self) -> Result<()> {
        let _: bool = self
            .call("deleteWebhook", json!({ "drop_pending_updates": false }), None)
            .await?;
        Ok(())
    }
}

fn reply_markup(markup: ReplyMarkup) -> Option<Value> {
    match markup {
        ReplyMarkup::None => None,
        ReplyMarkup::RestartKeyboard => Some(json!({
            "keyboard": [[{ "text": "/start" }]],
            "resize_keyboard": true,
            "one_time_keyboard": true,
        })),
    }
}

#[async_trait]
impl Transport for TelegramClient {
    async fn send_message(&self, chat: ChatId, text: &str, markup: ReplyMarkup) -> Result<MessageId> {
        let mut body = json!({ "chat_id": chat.0, "text": text });
        if let Some(markup) = reply_markup(markup) {
            body["reply_markup"] = markup;
        }
        let message: Message = self.call("sendMessage", body, None).await?;
        Ok(MessageId(message.message_id))
    }

    async fn edit_message_text(&self, chat: ChatId, message: MessageId, text: &str) -> Result<()> {
        // Returns the edited Message (or `true` for inline messages)
        let _: Value = self
            .call(
                "editMessageText",
                json!({ "chat_id": chat.0, "message_id": message.0, "text": text }),
                None,
            )
            .await?;
        Ok(())
    }

    async fn delete_message(&self, chat: ChatId, message: MessageId) -> Result<()> {
        let _: bool = self
            .call(
                "deleteMessage",
                json!({ "chat_id": chat.0, "message_id": message.0 }),
                None,
            )
            .await?;
        Ok(())
    }

    async fn file_download_url(&self, file_id: &str) -> Result<String> {
        let file: File = self.call("getFile", json!({ "file_id": file_id }), None).await?;
        let path = file.file_path.ok_or_else(|| {
            BotError::Download(format!("file {} has no download path", file.file_id))
        })?;
        Ok(self.file_url(&path))
    }

    async fn download_file(&self, url: &str) -> Result<Bytes> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| BotError::Download(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BotError::Download(format!("file server returned {}", status)));
        }

        response
            .bytes()
            .await
            .map_err(|e| BotError::Download(e.without_url().to_string()))
    }

    async fn send_typing(&self, chat: ChatId) -> Result<()> {
        let _: bool = self
            .call(
                "sendChatAction",
                json!({ "chat_id": chat.0, "action": "typing" }),
                None,
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const TOKEN: &str = "123:abc";

    fn client(server: &mockito::ServerGuard) -> TelegramClient {
        TelegramClient::new(TelegramClientConfig {
            api_url: server.url(),
            token: SecretString::new(TOKEN.to_string()),
            timeout: Duration::from_secs(5),
            poll_timeout_secs: 0,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_send_message_with_keyboard() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bot123:abc/sendMessage")
            .match_body(Matcher::PartialJson(json!({
                "chat_id": 42,
                "text": "Please type /start to begin.",
                "reply_markup": { "keyboard": [[{ "text": "/start" }]], "one_time_keyboard": true }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true,"result":{"message_id":77,"chat":{"id":42}}}"#)
            .create_async()
            .await;

        let id = client(&server)
            .send_message(ChatId(42), "Please type /start to begin.", ReplyMarkup::RestartKeyboard)
            .await
            .unwrap();

        assert_eq!(id, MessageId(77));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_api_error_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/bot123:abc/editMessageText")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":false,"error_code":400,"description":"Bad Request: message to edit not found"}"#)
            .create_async()
            .await;

        let result = client(&server)
            .edit_message_text(ChatId(42), MessageId(1), "3s")
            .await;

        match result {
            Err(BotError::Api { method, code, description }) => {
                assert_eq!(method, "editMessageText");
                assert_eq!(code, Some(400));
                assert!(description.contains("message to edit not found"));
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_file_download() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/bot123:abc/getFile")
            .match_body(Matcher::PartialJson(json!({ "file_id": "BQAC" })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true,"result":{"file_id":"BQAC","file_path":"documents/file_1.csv"}}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/file/bot123:abc/documents/file_1.csv")
            .with_status(200)
            .with_body("name,amount\nada,3\n")
            .create_async()
            .await;

        let client = client(&server);
        let url = client.file_download_url("BQAC").await.unwrap();
        assert!(url.ends_with("/file/bot123:abc/documents/file_1.csv"));

        let bytes = client.download_file(&url).await.unwrap();
        assert_eq!(&bytes[..], b"name,amount\nada,3\n");
    }

    #[tokio::test]
    async fn test_download_failure_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/file/bot123:abc/documents/missing.csv")
            .with_status(404)
            .create_async()
            .await;

        let client = client(&server);
        let url = client.file_url("documents/missing.csv");
        assert!(matches!(client.download_file(&url).await, Err(BotError::Download(_))));
    }

    #[tokio::test]
    async fn test_get_updates() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/bot123:abc/getUpdates")
            .match_body(Matcher::PartialJson(json!({ "offset": 5 })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"ok":true,"result":[{"update_id":5,"message":{"message_id":1,"chat":{"id":42},"text":"hi"}}]}"#,
            )
            .create_async()
            .await;

        let updates = client(&server).get_updates(5).await.unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].update_id, 5);
    }

    #[tokio::test]
    async fn test_errors_do_not_leak_token() {
        let client = TelegramClient::new(TelegramClientConfig {
            // Nothing listens on port 1
            api_url: "http://127.0.0.1:1".to_string(),
            token: SecretString::new(TOKEN.to_string()),
            timeout: Duration::from_secs(2),
            poll_timeout_secs: 0,
        })
        .unwrap();

        let err = client.send_typing(ChatId(1)).await.unwrap_err();
        assert!(!err.to_string().contains(TOKEN));
    }
}
