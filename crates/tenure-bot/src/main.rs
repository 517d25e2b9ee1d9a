mod config;
mod handlers;
mod scheduler;
mod telegram;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use tenure_core::{InviteRegistry, MembershipRegistry, Service};

use crate::config::Config;
use crate::handlers::Bot;
use crate::telegram::TelegramClient;

/// Pause after a failed poll before trying again.
const POLL_BACKOFF: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tenure=debug,tenure_core=debug,tenure_store=info".into()),
        )
        .init();

    let config = Arc::new(Config::from_env()?);
    info!(
        "Managing chat {} with {} admins; retention {} days, sweep daily at {}",
        config.group_chat,
        config.admins.len(),
        config.retention_days,
        config.sweep_at.format("%H:%M")
    );

    let telegram = Arc::new(TelegramClient::new(&config.api_url, &config.bot_token)?);

    let invites = InviteRegistry::open(&config.invites_path, config.group_chat);
    let members = MembershipRegistry::open(&config.members_path);
    let service = Service::new(config.settings(), telegram.clone(), invites, members);
    let bot = Bot::new(service, telegram.clone(), config.clone());

    // Background sweep (daily at the configured local time)
    tokio::spawn(scheduler::run_sweep_loop(bot.clone(), config.sweep_at));

    bot.notify("🤖 Bot started successfully").await;
    info!("Starting update loop...");

    tokio::select! {
        _ = poll_updates(&bot, &telegram) => {}
        _ = shutdown_signal() => {}
    }

    Ok(())
}

/// Long-poll the Bot API and handle updates one at a time, in order.
async fn poll_updates(bot: &Bot, telegram: &TelegramClient) {
    let mut offset = 0;
    loop {
        match telegram.get_updates(offset).await {
            Ok(updates) => {
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    bot.handle_update(update).await;
                }
            }
            Err(e) => {
                warn!("Polling for updates failed: {}", e);
                tokio::time::sleep(POLL_BACKOFF).await;
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Could not install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
