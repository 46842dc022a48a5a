use shopbot_store::PriceCatalogue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoCoin {
    Btc,
    Eth,
}

impl CryptoCoin {
    pub fn code(self) -> &'static str {
        match self {
            Self::Btc => "btc",
            Self::Eth => "eth",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "btc" => Some(Self::Btc),
            "eth" => Some(Self::Eth),
            _ => None,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Btc => "Bitcoin (BTC)",
            Self::Eth => "Ethereum (ETH)",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Where customers send money. Opaque to the engine.
pub struct PayoutConfig {
    pub paypal_user: String,
    pub btc_wallet: String,
    pub eth_wallet: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotConfig {
    pub operator_id: i64,
    /// Chat holding the dashboard, the discount mirror, and activity logs.
    /// Without it the bot runs but keeps no remote mirror.
    pub notification_chat_id: Option<i64>,
    pub catalogue: PriceCatalogue,
    pub payout: PayoutConfig,
    /// Synthesize placeholder users when the remote dashboard reports more
    /// users than the local store holds.
    pub restore_placeholders: bool,
}

impl BotConfig {
    pub fn new(operator_id: i64) -> Self {
        Self {
            operator_id,
            notification_chat_id: None,
            catalogue: PriceCatalogue::default(),
            payout: PayoutConfig::default(),
            restore_placeholders: true,
        }
    }

    pub fn is_operator(&self, user_id: i64) -> bool {
        user_id == self.operator_id
    }

    pub fn paypal_link(&self, price: u32) -> String {
        format!("https://paypal.me/{}/{price}", self.payout.paypal_user.trim())
    }

    pub fn wallet(&self, coin: CryptoCoin) -> &str {
        match coin {
            CryptoCoin::Btc => self.payout.btc_wallet.as_str(),
            CryptoCoin::Eth => self.payout.eth_wallet.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BotConfig, CryptoCoin, PayoutConfig};

    #[test]
    fn unit_paypal_link_and_wallet_lookup() {
        let config = BotConfig {
            payout: PayoutConfig {
                paypal_user: " shopowner ".to_string(),
                btc_wallet: "bc1q-test".to_string(),
                eth_wallet: "0xtest".to_string(),
            },
            ..BotConfig::new(1)
        };
        assert_eq!(config.paypal_link(8), "https://paypal.me/shopowner/8");
        assert_eq!(config.wallet(CryptoCoin::Eth), "0xtest");
        assert_eq!(CryptoCoin::parse("btc"), Some(CryptoCoin::Btc));
        assert!(config.is_operator(1));
        assert!(!config.is_operator(2));
    }
}
