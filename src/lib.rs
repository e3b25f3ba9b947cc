//! Chat intake bot
//!
//! Walks a chat user through a short intake (start trigger, email address,
//! spreadsheet upload) and relays the result to a fixed mailbox. Repeated
//! start triggers are throttled per chat with an escalating cooldown.

pub mod api;
pub mod bot;
pub mod config;
pub mod error;
pub mod mail;
pub mod metrics;
pub mod models;
pub mod polling;
pub mod rate_limit;
pub mod session;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transport;

pub use bot::{BotSettings, IntakeBot, Outcome};
pub use config::Config;
pub use error::{BotError, Result};
pub use models::{ChatId, InboundEvent, MessageId};
