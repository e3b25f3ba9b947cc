//! Configuration loading
//!
//! Layers, lowest precedence first:
//! - serde defaults
//! - optional `config/default.{toml,yaml,json}` file
//! - `INTAKE__SECTION__FIELD` environment variables
//! - conventional variables (`BOT_TOKEN`, `SMTP_USER`, `REDIS_URL`, ...)

use crate::error::{BotError, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How updates reach the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BotMode {
    #[default]
    Polling,
    Webhook,
}

impl BotMode {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "polling" | "development" | "dev" => Some(BotMode::Polling),
            "webhook" | "production" | "prod" => Some(BotMode::Webhook),
            _ => None,
        }
    }
}

/// Telegram Bot API settings
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Bot token (env BOT_TOKEN)
    #[serde(default = "empty_secret")]
    pub bot_token: SecretString,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default)]
    pub mode: BotMode,

    /// Public base URL for webhook registration
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Value Telegram echoes in `X-Telegram-Bot-Api-Secret-Token`
    #[serde(default)]
    pub webhook_secret: Option<SecretString>,

    /// Long-poll timeout in seconds
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,

    /// HTTP request timeout in milliseconds (on top of the long-poll window)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn empty_secret() -> SecretString {
    SecretString::new(String::new())
}
fn default_api_url() -> String { "https://api.telegram.org".to_string() }
fn default_poll_timeout() -> u64 { 30 }
fn default_request_timeout_ms() -> u64 { 10_000 }

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: empty_secret(),
            api_url: default_api_url(),
            mode: BotMode::default(),
            webhook_url: None,
            webhook_secret: None,
            poll_timeout_secs: default_poll_timeout(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl TelegramConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// SMTP relay settings
#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    /// SMTP user, also used as the sender address
    #[serde(default)]
    pub smtp_user: String,

    #[serde(default = "empty_secret")]
    pub smtp_pass: SecretString,

    /// Fixed destination mailbox
    #[serde(default)]
    pub to: String,

    #[serde(default = "default_from_name")]
    pub from_name: String,

    #[serde(default = "default_subject")]
    pub subject: String,

    #[serde(default = "default_mail_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: usize,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_smtp_host() -> String { "smtp.gmail.com".to_string() }
fn default_smtp_port() -> u16 { 587 }
fn default_from_name() -> String { "Telegram Bot".to_string() }
fn default_subject() -> String { "📎 New File Submission from Telegram Bot".to_string() }
fn default_mail_timeout_ms() -> u64 { 15_000 }
fn default_retry_attempts() -> usize { 2 }
fn default_retry_backoff_ms() -> u64 { 500 }

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            smtp_user: String::new(),
            smtp_pass: empty_secret(),
            to: String::new(),
            from_name: default_from_name(),
            subject: default_subject(),
            timeout_ms: default_mail_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl MailConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// What happens to the admission strike once a start trigger is admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionPolicy {
    /// Reset the strike right after admission; only rejected triggers escalate
    #[default]
    ForgiveAdmitted,
    /// Keep the admission strike so rapid admitted triggers escalate too
    PunishRapid,
}

/// Start-trigger throttling
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_base_cooldown_ms")]
    pub base_cooldown_ms: u64,

    #[serde(default = "default_max_cooldown_ms")]
    pub max_cooldown_ms: u64,

    /// Quiet period after which strikes are forgiven
    #[serde(default = "default_strike_reset_ms")]
    pub strike_reset_ms: u64,

    #[serde(default)]
    pub admission_policy: AdmissionPolicy,

    /// Interval between countdown edits
    #[serde(default = "default_tick_ms")]
    pub countdown_tick_ms: u64,

    /// Delay before the "proceed" notice is removed
    #[serde(default = "default_notice_delete_ms")]
    pub notice_delete_delay_ms: u64,
}

fn default_base_cooldown_ms() -> u64 { 2_000 }
fn default_max_cooldown_ms() -> u64 { 60_000 }
fn default_strike_reset_ms() -> u64 { 600_000 }
fn default_tick_ms() -> u64 { 1_000 }
fn default_notice_delete_ms() -> u64 { 3_000 }

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            base_cooldown_ms: default_base_cooldown_ms(),
            max_cooldown_ms: default_max_cooldown_ms(),
            strike_reset_ms: default_strike_reset_ms(),
            admission_policy: AdmissionPolicy::default(),
            countdown_tick_ms: default_tick_ms(),
            notice_delete_delay_ms: default_notice_delete_ms(),
        }
    }
}

impl RateLimitConfig {
    pub fn countdown_tick(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_ms)
    }

    pub fn notice_delete_delay(&self) -> Duration {
        Duration::from_millis(self.notice_delete_delay_ms)
    }

    /// Strike-reset window in whole seconds, used as the store key expiry
    pub fn strike_reset_secs(&self) -> u64 {
        self.strike_reset_ms.div_ceil(1000)
    }
}

/// Rate-limit backing store
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Networked store; the in-process map is used when unset or unreachable
    #[serde(default)]
    pub redis_url: Option<String>,

    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// How often the in-process store sweeps expired records
    #[serde(default = "default_purge_interval_ms")]
    pub purge_interval_ms: u64,
}

fn default_key_prefix() -> String { "intake:ratelimit:".to_string() }
fn default_connect_timeout_ms() -> u64 { 3_000 }
fn default_purge_interval_ms() -> u64 { 60_000 }

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            key_prefix: default_key_prefix(),
            connect_timeout_ms: default_connect_timeout_ms(),
            purge_interval_ms: default_purge_interval_ms(),
        }
    }
}

impl StoreConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_millis(self.purge_interval_ms)
    }
}

/// Webhook server
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_max_body")]
    pub max_body_bytes: usize,
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8081 }
fn default_max_body() -> usize { 1024 * 1024 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body(),
        }
    }
}

/// Log output
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    /// `pretty` or `json`
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_level() -> String { "info".to_string() }
fn default_format() -> String { "pretty".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

impl Config {
    /// Load from the optional config file, `INTAKE__*` variables and
    /// conventional environment variables
    pub fn load() -> Result<Self> {
        let layered = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(
                config::Environment::with_prefix("INTAKE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let config: Config = layered.try_deserialize()?;
        let config = config.from_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply conventional environment variables on top of the loaded values
    pub fn from_env(mut self) -> Self {
        if let Ok(val) = std::env::var("BOT_TOKEN") {
            self.telegram.bot_token = SecretString::new(val);
        }

        if let Ok(val) = std::env::var("BOT_MODE") {
            if let Some(mode) = BotMode::parse(&val) {
                self.telegram.mode = mode;
            }
        }

        if let Ok(val) = std::env::var("WEBHOOK_URL") {
            self.telegram.webhook_url = Some(val);
        }

        if let Ok(val) = std::env::var("WEBHOOK_SECRET") {
            self.telegram.webhook_secret = Some(SecretString::new(val));
        }

        if let Ok(val) = std::env::var("PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }

        if let Ok(val) = std::env::var("SMTP_HOST") {
            self.mail.smtp_host = val;
        }

        if let Ok(val) = std::env::var("SMTP_PORT") {
            if let Ok(port) = val.parse() {
                self.mail.smtp_port = port;
            }
        }

        if let Ok(val) = std::env::var("SMTP_USER") {
            self.mail.smtp_user = val;
        }

        if let Ok(val) = std::env::var("SMTP_PASS") {
            self.mail.smtp_pass = SecretString::new(val);
        }

        if let Ok(val) = std::env::var("MAIL_TO") {
            self.mail.to = val;
        }

        if let Ok(val) = std::env::var("REDIS_URL") {
            if !val.is_empty() {
                self.store.redis_url = Some(val);
            }
        }

        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.level = val;
        }

        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.expose_secret().is_empty() {
            return Err(BotError::Config("bot token is not set (BOT_TOKEN)".to_string()));
        }

        if self.mail.to.trim().is_empty() {
            return Err(BotError::Config("destination mailbox is not set (MAIL_TO)".to_string()));
        }

        if self.mail.smtp_user.trim().is_empty() {
            return Err(BotError::Config("SMTP account is not set (SMTP_USER)".to_string()));
        }

        if self.telegram.mode == BotMode::Webhook && self.telegram.webhook_url.is_none() {
            return Err(BotError::Config(
                "webhook mode requires a public URL (WEBHOOK_URL)".to_string(),
            ));
        }

        if self.store.purge_interval_ms == 0 {
            return Err(BotError::Config("store purge interval must be positive".to_string()));
        }

        if self.rate_limit.base_cooldown_ms == 0 {
            return Err(BotError::Config("base cooldown must be positive".to_string()));
        }

        if self.rate_limit.max_cooldown_ms < self.rate_limit.base_cooldown_ms {
            return Err(BotError::Config(format!(
                "max cooldown {}ms is below base cooldown {}ms",
                self.rate_limit.max_cooldown_ms, self.rate_limit.base_cooldown_ms
            )));
        }

        Ok(())
    }
}
