use std::sync::Arc;

use anyhow::{bail, Context, Result};
use shopbot_runtime::{BotConfig, ManifestMediaLibrary, MediaLibrary, PayoutConfig};
use shopbot_store::PriceCatalogue;
use shopbot_telegram::TelegramClientConfig;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::cli_args::Cli;

pub(crate) fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

pub(crate) fn bot_config_from_cli(cli: &Cli) -> Result<BotConfig> {
    let raw_operator = cli.admin_user_id.trim();
    if raw_operator.is_empty() {
        bail!("--admin-user-id (ADMIN_USER_ID) is required");
    }
    let operator_id = raw_operator
        .parse::<i64>()
        .with_context(|| format!("admin user id must be numeric, got '{raw_operator}'"))?;
    let notification_chat_id = match cli.notification_group_id.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            raw.parse::<i64>()
                .with_context(|| format!("notification group id must be numeric, got '{raw}'"))?,
        ),
    };
    let catalogue = match cli.prices.as_deref() {
        Some(raw) if !raw.trim().is_empty() => PriceCatalogue::default()
            .with_overrides(raw)
            .context("invalid --prices overrides")?,
        _ => PriceCatalogue::default(),
    };
    Ok(BotConfig {
        operator_id,
        notification_chat_id,
        catalogue,
        payout: PayoutConfig {
            paypal_user: cli.paypal_user.trim().to_string(),
            btc_wallet: cli.btc_wallet.trim().to_string(),
            eth_wallet: cli.eth_wallet.trim().to_string(),
        },
        restore_placeholders: !cli.no_restore_placeholders,
    })
}

pub(crate) fn telegram_client_config(cli: &Cli) -> Result<TelegramClientConfig> {
    if cli.bot_token.trim().is_empty() {
        bail!("--bot-token (BOT_TOKEN) is required");
    }
    Ok(TelegramClientConfig {
        api_base: cli.telegram_api_base.clone(),
        bot_token: cli.bot_token.trim().to_string(),
        http_timeout_ms: cli.http_timeout_ms,
    })
}

pub(crate) fn media_library_from_cli(cli: &Cli) -> Result<Arc<dyn MediaLibrary>> {
    let library = match cli.media_manifest.as_deref() {
        Some(path) => ManifestMediaLibrary::load(path)?,
        None => ManifestMediaLibrary::default(),
    };
    Ok(Arc::new(library))
}

/// Webhook endpoint registered with Telegram for `base`.
pub(crate) fn webhook_endpoint(base: &str) -> String {
    format!("{}/webhooks/telegram", base.trim().trim_end_matches('/'))
}
