use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::bot::IntakeBot;
use crate::metrics::METRICS;
use crate::transport::telegram_models::Update;

/// Header Telegram echoes the registered secret token in
pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Shared webhook state
#[derive(Clone)]
pub struct AppState {
    pub bot: Arc<IntakeBot>,
    /// Path segment the webhook is registered under
    pub path: String,
    pub secret: Option<SecretString>,
}

impl AppState {
    pub fn new(bot: Arc<IntakeBot>, token: &SecretString, secret: Option<SecretString>) -> Self {
        Self {
            bot,
            path: webhook_path(token),
            secret,
        }
    }
}

/// Webhook path segment derived from the bot token
///
/// Hex SHA-256 of the token, so the URL is unguessable without exposing it.
pub fn webhook_path(token: &SecretString) -> String {
    hex::encode(Sha256::digest(token.expose_secret().as_bytes()))
}

/// Receive one update
///
/// POST /webhook/:path
pub async fn receive_update(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if path != state.path {
        return StatusCode::NOT_FOUND;
    }

    if let Some(secret) = &state.secret {
        let presented = headers.get(SECRET_HEADER).and_then(|value| value.to_str().ok());
        if presented != Some(secret.expose_secret().as_str()) {
            warn!("Rejected webhook call with a missing or wrong secret token");
            return StatusCode::UNAUTHORIZED;
        }
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!("Malformed webhook payload: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };

    let update_id = update.update_id;
    match update.into_event() {
        Some(event) => state.bot.process(event).await,
        None => debug!(update_id, "Ignoring update without a supported message"),
    }

    StatusCode::OK
}

/// Liveness and a summary of in-memory state
///
/// GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "rate_limit_backend": state.bot.rate_limit_backend(),
        "active_sessions": state.bot.sessions().active(),
        "pending_cooldowns": state.bot.pending_cooldowns(),
    }))
}

/// Prometheus exposition
///
/// GET /metrics
pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        METRICS.export_prometheus(),
    )
}
