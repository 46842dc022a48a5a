mod bootstrap;
mod cli_args;
mod ingress;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use shopbot_runtime::{RuntimeContext, ShopRuntime};
use shopbot_store::{JsonFileStore, StoreHandle, VoucherStore};
use shopbot_telegram::{MessengerTransport, TelegramBotClient, TelegramUpdatePoller};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::bootstrap::{
    bot_config_from_cli, init_tracing, media_library_from_cli, telegram_client_config,
    webhook_endpoint,
};
use crate::cli_args::Cli;
use crate::ingress::{
    build_webhook_router, run_consumer, run_poller, WebhookState, QUEUE_CAPACITY,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();
    run(cli).await
}

/// Wires the runtime from files and flags. The transport is injected.
fn build_runtime(cli: &Cli, transport: Arc<dyn MessengerTransport>) -> Result<ShopRuntime> {
    let config = bot_config_from_cli(cli)?;
    if config.notification_chat_id.is_none() {
        warn!("no notification group configured; dashboard and remote mirrors are disabled");
    }
    let store = StoreHandle::new(Arc::new(JsonFileStore::new(cli.stats_file.clone())));
    let vouchers = VoucherStore::new(cli.voucher_file.clone());
    let media = media_library_from_cli(cli)?;
    Ok(ShopRuntime::new(RuntimeContext::new(
        config, store, vouchers, transport, media,
    )))
}

async fn run(cli: Cli) -> Result<()> {
    let client = TelegramBotClient::new(telegram_client_config(&cli)?)?;
    let mut runtime = build_runtime(&cli, Arc::new(client.clone()))?;
    runtime.recover().await;

    let (sender, mut receiver) = mpsc::channel(QUEUE_CAPACITY);
    let producer = match cli.webhook_url.as_deref() {
        Some(base) if !base.trim().is_empty() => {
            let endpoint = webhook_endpoint(base);
            client
                .set_webhook(&endpoint, cli.webhook_secret.as_deref())
                .await
                .with_context(|| format!("failed to register webhook {endpoint}"))?;
            let bind = format!("0.0.0.0:{}", cli.port);
            let listener = TcpListener::bind(bind.as_str())
                .await
                .with_context(|| format!("failed to bind {bind}"))?;
            let app = build_webhook_router(Arc::new(WebhookState {
                queue: sender,
                secret: cli.webhook_secret.clone(),
            }));
            info!("webhook server listening: bind={} endpoint={}", bind, endpoint);
            tokio::spawn(async move {
                if let Err(error) = axum::serve(listener, app).await {
                    warn!("webhook server exited: error={error}");
                }
            })
        }
        _ => {
            client
                .delete_webhook()
                .await
                .context("failed to clear webhook before polling")?;
            info!(
                "long polling started: poll_timeout_secs={} backoff_ms={}",
                cli.poll_timeout_secs, cli.poll_interval_ms
            );
            tokio::spawn(run_poller(
                TelegramUpdatePoller::new(client, cli.poll_timeout_secs),
                sender,
                Duration::from_millis(cli.poll_interval_ms),
            ))
        }
    };

    tokio::select! {
        summary = run_consumer(&mut runtime, &mut receiver) => {
            info!(
                "consumer finished: handled={} ignored={} failed={}",
                summary.handled, summary.ignored, summary.failed
            );
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
        }
    }
    producer.abort();
    Ok(())
}
