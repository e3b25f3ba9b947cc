use anyhow::Context;
use intake_relay_bot::{
    api::{build_webhook_routes, AppState},
    bot::{BotSettings, IntakeBot},
    config::{BotMode, Config, LoggingConfig},
    mail::SmtpRelay,
    polling::{run_polling, shutdown_signal},
    rate_limit::build_rate_limiter,
    session::SessionTracker,
    transport::{TelegramClient, TelegramClientConfig},
};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if logging.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load().context("Failed to load configuration")?;
    init_tracing(&config.logging);

    info!(mode = ?config.telegram.mode, "Starting intake bot");

    let limiter = build_rate_limiter(&config.rate_limit, &config.store).await;
    info!(backend = limiter.backend(), "Rate limiter ready");

    let client = Arc::new(
        TelegramClient::new(TelegramClientConfig::from(&config.telegram))
            .context("Failed to create Telegram client")?,
    );
    let relay = Arc::new(SmtpRelay::new(&config.mail).context("Failed to create SMTP relay")?);

    let bot = Arc::new(IntakeBot::new(
        client.clone(),
        relay,
        limiter,
        SessionTracker::in_memory(),
        BotSettings::from_config(&config),
    ));

    match config.telegram.mode {
        BotMode::Polling => {
            run_polling(&client, bot, shutdown_signal()).await?;
        }
        BotMode::Webhook => {
            let base_url = config
                .telegram
                .webhook_url
                .as_deref()
                .context("WEBHOOK_URL is required in webhook mode")?;

            // Without a configured secret, a per-run one still authenticates Telegram
            let secret = config
                .telegram
                .webhook_secret
                .clone()
                .unwrap_or_else(|| SecretString::new(Uuid::new_v4().simple().to_string()));

            let state = AppState::new(bot.clone(), &config.telegram.bot_token, Some(secret.clone()));
            let url = format!("{}/webhook/{}", base_url.trim_end_matches('/'), state.path);
            client
                .set_webhook(&url, Some(&secret))
                .await
                .context("Failed to register webhook")?;

            let app = build_webhook_routes(state, config.server.max_body_bytes);
            let addr = format!("{}:{}", config.server.host, config.server.port);
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("Failed to bind {}", addr))?;

            info!("Webhook server listening on {}", addr);
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            bot.shutdown();
        }
    }

    info!("Intake bot stopped");
    Ok(())
}
