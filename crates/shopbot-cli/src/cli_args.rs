use std::path::PathBuf;

use clap::{ArgAction, Parser};

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "shopbot",
    about = "Telegram storefront bot with promotions, referrals and an operator console",
    version
)]
pub(crate) struct Cli {
    #[arg(
        long = "bot-token",
        env = "BOT_TOKEN",
        hide_env_values = true,
        default_value = "",
        help = "Telegram bot token"
    )]
    pub bot_token: String,

    #[arg(
        long = "admin-user-id",
        env = "ADMIN_USER_ID",
        default_value = "",
        help = "Telegram user id of the operator"
    )]
    pub admin_user_id: String,

    #[arg(
        long = "notification-group-id",
        env = "NOTIFICATION_GROUP_ID",
        help = "Chat holding the dashboard, the discount mirror and activity logs"
    )]
    pub notification_group_id: Option<String>,

    #[arg(long = "paypal-user", env = "PAYPAL_USER", default_value = "")]
    pub paypal_user: String,

    #[arg(long = "btc-wallet", env = "BTC_WALLET", default_value = "")]
    pub btc_wallet: String,

    #[arg(long = "eth-wallet", env = "ETH_WALLET", default_value = "")]
    pub eth_wallet: String,

    #[arg(
        long = "stats-file",
        env = "SHOPBOT_STATS_FILE",
        default_value = "stats.json",
        help = "Path of the persisted aggregate"
    )]
    pub stats_file: PathBuf,

    #[arg(
        long = "voucher-file",
        env = "SHOPBOT_VOUCHER_FILE",
        default_value = "vouchers.json"
    )]
    pub voucher_file: PathBuf,

    #[arg(
        long = "prices",
        env = "SHOPBOT_PRICES",
        help = "Base price overrides, e.g. bilder_10=5,videos_35=30"
    )]
    pub prices: Option<String>,

    #[arg(
        long = "media-manifest",
        env = "SHOPBOT_MEDIA_MANIFEST",
        help = "JSON manifest mapping {segment}_{preview|prices} to photo ids or URLs"
    )]
    pub media_manifest: Option<PathBuf>,

    #[arg(
        long = "webhook-url",
        env = "WEBHOOK_URL",
        help = "Public base URL; enables webhook mode instead of long polling"
    )]
    pub webhook_url: Option<String>,

    #[arg(long = "port", env = "PORT", default_value_t = 8080)]
    pub port: u16,

    #[arg(
        long = "webhook-secret",
        env = "SHOPBOT_WEBHOOK_SECRET",
        hide_env_values = true,
        help = "Secret required in X-Telegram-Bot-Api-Secret-Token"
    )]
    pub webhook_secret: Option<String>,

    #[arg(
        long = "telegram-api-base",
        env = "SHOPBOT_TELEGRAM_API_BASE",
        default_value = "https://api.telegram.org"
    )]
    pub telegram_api_base: String,

    #[arg(
        long = "http-timeout-ms",
        env = "SHOPBOT_HTTP_TIMEOUT_MS",
        default_value_t = 10_000,
        value_parser = parse_positive_u64
    )]
    pub http_timeout_ms: u64,

    #[arg(
        long = "poll-interval-ms",
        env = "SHOPBOT_POLL_INTERVAL_MS",
        default_value_t = 1_000,
        value_parser = parse_positive_u64,
        help = "Back-off after a failed getUpdates call"
    )]
    pub poll_interval_ms: u64,

    #[arg(
        long = "poll-timeout-secs",
        env = "SHOPBOT_POLL_TIMEOUT_SECS",
        default_value_t = 25
    )]
    pub poll_timeout_secs: u64,

    #[arg(
        long = "no-restore-placeholders",
        action = ArgAction::SetTrue,
        help = "Do not synthesize placeholder users when the dashboard reports more users than the local store"
    )]
    pub no_restore_placeholders: bool,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;

    #[test]
    fn unit_cli_defaults_and_flags_parse() {
        let cli = Cli::try_parse_from([
            "shopbot",
            "--bot-token",
            "123:abc",
            "--admin-user-id",
            "42",
            "--prices",
            "bilder_10=6",
            "--no-restore-placeholders",
        ])
        .expect("parse");
        assert_eq!(cli.bot_token, "123:abc");
        assert_eq!(cli.admin_user_id, "42");
        assert_eq!(cli.prices.as_deref(), Some("bilder_10=6"));
        assert!(cli.no_restore_placeholders);
        assert_eq!(cli.stats_file.to_string_lossy(), "stats.json");
        assert_eq!(cli.port, 8080);
    }

    #[test]
    fn regression_zero_poll_interval_is_rejected() {
        let error = Cli::try_parse_from(["shopbot", "--poll-interval-ms", "0"])
            .expect_err("zero interval must fail");
        assert!(error.to_string().contains("greater than 0"));
    }
}
