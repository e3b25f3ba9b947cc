//! Error types for the intake relay bot

use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, BotError>;

/// Errors raised by the bot's components
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Chat API rejected {method}: {description}")]
    Api {
        method: String,
        code: Option<i64>,
        description: String,
    },

    #[error("File download failed: {0}")]
    Download(String),

    #[error("Mail relay failed: {0}")]
    Relay(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BotError {
    /// Whether a caller may retry the failed operation
    ///
    /// API rejections are final except for flood control and server errors.
    pub fn is_transient(&self) -> bool {
        match self {
            BotError::Api { code, .. } => matches!(code, Some(429) | Some(500..=599)),
            BotError::Transport(_)
            | BotError::Download(_)
            | BotError::Relay(_)
            | BotError::Store(_)
            | BotError::Timeout(_) => true,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for BotError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BotError::Timeout(e.to_string())
        } else {
            BotError::Transport(e.to_string())
        }
    }
}

impl From<redis::RedisError> for BotError {
    fn from(e: redis::RedisError) -> Self {
        BotError::Store(e.to_string())
    }
}

impl From<config::ConfigError> for BotError {
    fn from(e: config::ConfigError) -> Self {
        BotError::Config(e.to_string())
    }
}

impl From<lettre::transport::smtp::Error> for BotError {
    fn from(e: lettre::transport::smtp::Error) -> Self {
        BotError::Relay(e.to_string())
    }
}

impl From<lettre::error::Error> for BotError {
    fn from(e: lettre::error::Error) -> Self {
        BotError::Relay(format!("Failed to build message: {}", e))
    }
}
