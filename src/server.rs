//! Webhook HTTP server.
//!
//! Exposes the Telegram webhook endpoint and a health check. The webhook
//! path embeds the bot token, so only Telegram (which was told the full
//! URL via `setWebhook`) can reach the update handler. Each accepted
//! update is processed on its own task; the handler acknowledges
//! immediately so Telegram never redelivers a slow update.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::bot::Bot;
use crate::config::Config;
use crate::telegram::Update;

#[derive(Clone)]
struct AppState {
    bot: Bot,
    bot_token: Arc<String>,
}

/// Register the webhook with Telegram (when a public host is configured)
/// and serve until the process is terminated.
pub async fn run(config: &Config, bot: Bot) -> Result<()> {
    match config.webhook_url() {
        Some(url) => {
            bot.client()
                .set_webhook(&url)
                .await
                .context("webhook registration failed")?;
            // The full URL contains the token; log only the host.
            info!(host = config.webhook_host.as_deref(), "webhook registered");
        }
        None => warn!("WEBHOOK_HOST is not set, skipping webhook registration"),
    }

    let state = AppState {
        bot,
        bot_token: Arc::new(config.bot_token.clone()),
    };

    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/webhook/:token", post(webhook))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(%addr, "listening for webhook updates");

    axum::serve(listener, router)
        .await
        .context("webhook server terminated")?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn webhook(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(update): Json<Update>,
) -> StatusCode {
    if token != *state.bot_token {
        return StatusCode::NOT_FOUND;
    }

    let bot = state.bot.clone();
    tokio::spawn(async move {
        bot.handle_update(update).await;
    });

    StatusCode::OK
}
