use crate::models::ProviderKind;
use anyhow::{bail, Context, Result};
use ethers::types::Address;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Development,
    Testnet,
    Production,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    /// Absence is reported when the provider is first called, not at startup.
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub network: String,
    pub usdc_address: Address,
    pub reward_token_address: Address,
    pub reward_token_decimals: u8,
    /// Treasury receiving payments and bought-back tokens.
    pub recipient_address: Address,
    pub strict_verification: bool,
}

#[derive(Debug, Clone)]
pub struct BuybackConfig {
    pub percentage: f64,
    pub dust_floor_native: f64,
    pub wallet_private_key: Option<String>,
    pub router_address: Option<Address>,
    pub wrapped_native_address: Option<Address>,
    pub slippage_bps: u32,
    pub interval: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct PriceFeedConfig {
    pub url: String,
    pub native_id: String,
    pub reward_token_id: String,
    pub native_fallback_usd: f64,
}

impl PriceFeedConfig {
    fn validate(&self) -> Result<()> {
        if !self.url.starts_with("http") {
            bail!("PRICE_FEED_URL must be HTTP(S) URL");
        }
        if !self.native_fallback_usd.is_finite() || self.native_fallback_usd <= 0.0 {
            bail!("NATIVE_FALLBACK_PRICE_USD must be a positive price");
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub url: String,
    pub bucket: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub host: String,
    pub port: u16,

    pub chain: ChainConfig,
    pub buyback: BuybackConfig,
    pub price_feed: PriceFeedConfig,
    pub providers: HashMap<ProviderKind, ProviderConfig>,
    /// Re-hosting is disabled when unset.
    pub storage: Option<StorageConfig>,

    pub refund_wallet_private_key: Option<String>,
    pub refund_worker_interval: Duration,

    pub admin_token: Option<String>,
    pub upstream_timeout: Duration,
    pub payment_tracking_ttl: chrono::Duration,

    // Redis
    pub redis_url: String,
}

const DEFAULT_PROVIDER_BASE_URL: &str = "https://api.kie.ai";

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let environment = Self::parse_environment()?;

        let config = Self {
            environment: environment.clone(),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_or("PORT", 8080)?,

            chain: ChainConfig {
                rpc_url: std::env::var("PAYMENT_RPC_URL").context("PAYMENT_RPC_URL required")?,
                chain_id: Self::parse_or("CHAIN_ID", 8453)?,
                network: std::env::var("NETWORK_NAME").unwrap_or_else(|_| "base".to_string()),
                usdc_address: Self::parse_address("USDC_ADDRESS")?,
                reward_token_address: Self::parse_address("REWARD_TOKEN_ADDRESS")?,
                reward_token_decimals: Self::parse_or("REWARD_TOKEN_DECIMALS", 18)?,
                recipient_address: Self::parse_address("RECIPIENT_ADDRESS")?,
                strict_verification: Self::parse_or("STRICT_PAYMENT_VERIFICATION", true)?,
            },

            buyback: BuybackConfig {
                percentage: Self::parse_or("BUYBACK_PERCENTAGE", 10.0)?,
                dust_floor_native: Self::parse_or("BUYBACK_DUST_FLOOR", 0.001)?,
                wallet_private_key: std::env::var("BUYBACK_WALLET_PRIVATE_KEY").ok(),
                router_address: Self::parse_optional_address("SWAP_ROUTER_ADDRESS")?,
                wrapped_native_address: Self::parse_optional_address("WRAPPED_NATIVE_ADDRESS")?,
                slippage_bps: Self::parse_or("BUYBACK_SLIPPAGE_BPS", 300)?,
                interval: std::env::var("BUYBACK_INTERVAL_SECS")
                    .ok()
                    .map(|v| v.parse::<u64>().map(Duration::from_secs))
                    .transpose()
                    .context("Invalid BUYBACK_INTERVAL_SECS")?,
            },

            price_feed: PriceFeedConfig {
                url: std::env::var("PRICE_FEED_URL")
                    .unwrap_or_else(|_| "https://api.coingecko.com/api/v3".to_string()),
                native_id: std::env::var("NATIVE_PRICE_ID").unwrap_or_else(|_| "ethereum".to_string()),
                reward_token_id: std::env::var("REWARD_TOKEN_PRICE_ID")
                    .context("REWARD_TOKEN_PRICE_ID required")?,
                native_fallback_usd: Self::parse_or("NATIVE_FALLBACK_PRICE_USD", 4000.0)?,
            },

            providers: Self::provider_configs(),
            storage: Self::storage_config(),

            refund_wallet_private_key: std::env::var("REFUND_WALLET_PRIVATE_KEY").ok(),
            refund_worker_interval: Duration::from_secs(Self::parse_or("REFUND_WORKER_INTERVAL_SECS", 60)?),

            admin_token: std::env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty()),
            upstream_timeout: Duration::from_secs(Self::parse_or("UPSTREAM_TIMEOUT_SECS", 30)?),
            payment_tracking_ttl: chrono::Duration::hours(Self::parse_or("PAYMENT_TRACKING_TTL_HOURS", 24)?),

            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    fn parse_environment() -> Result<Environment> {
        let env = std::env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "development".to_string());

        match env.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testnet" | "test" => Ok(Environment::Testnet),
            "production" | "prod" => Ok(Environment::Production),
            _ => bail!("Unknown environment: {}", env),
        }
    }

    fn parse_or<T>(var: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match std::env::var(var) {
            Ok(raw) => raw.trim().parse().with_context(|| format!("Invalid {}", var)),
            Err(_) => Ok(default),
        }
    }

    fn parse_address(var: &str) -> Result<Address> {
        let addr_str = std::env::var(var)
            .with_context(|| format!("{} required", var))?;
        Address::from_str(&addr_str)
            .with_context(|| format!("Invalid address for {}", var))
    }

    fn parse_optional_address(var: &str) -> Result<Option<Address>> {
        match std::env::var(var) {
            Ok(_) => Self::parse_address(var).map(Some),
            Err(_) => Ok(None),
        }
    }

    fn provider_configs() -> HashMap<ProviderKind, ProviderConfig> {
        ProviderKind::ALL
            .into_iter()
            .map(|kind| {
                let prefix = kind.env_prefix();
                let config = ProviderConfig {
                    base_url: std::env::var(format!("{}_BASE_URL", prefix))
                        .unwrap_or_else(|_| DEFAULT_PROVIDER_BASE_URL.to_string()),
                    api_key: std::env::var(format!("{}_API_KEY", prefix))
                        .ok()
                        .filter(|key| !key.is_empty()),
                };
                (kind, config)
            })
            .collect()
    }

    fn storage_config() -> Option<StorageConfig> {
        Some(StorageConfig {
            url: std::env::var("STORAGE_URL").ok()?,
            bucket: std::env::var("STORAGE_BUCKET").unwrap_or_else(|_| "generations".to_string()),
            api_key: std::env::var("STORAGE_API_KEY").ok()?,
        })
    }

    fn validate(&self) -> Result<()> {
        if !self.chain.rpc_url.starts_with("http") {
            bail!("PAYMENT_RPC_URL must be HTTP(S) URL");
        }
        if !(0.0..=100.0).contains(&self.buyback.percentage) {
            bail!("BUYBACK_PERCENTAGE must be between 0 and 100");
        }
        self.price_feed.validate()?;
        if self.buyback.dust_floor_native < 0.0 {
            bail!("BUYBACK_DUST_FLOOR must not be negative");
        }
        if self.refund_worker_interval.is_zero() || self.buyback.interval.is_some_and(|i| i.is_zero()) {
            bail!("Worker intervals must be at least one second");
        }

        for key in [&self.buyback.wallet_private_key, &self.refund_wallet_private_key]
            .into_iter()
            .flatten()
        {
            if !key.starts_with("0x") {
                bail!("Wallet private keys must start with 0x");
            }
        }

        if self.environment == Environment::Production && self.admin_token.is_none() {
            tracing::warn!("ADMIN_TOKEN unset: administrative endpoints are unguarded");
        }

        let missing: Vec<&str> = self
            .providers
            .iter()
            .filter(|(_, p)| p.api_key.is_none())
            .map(|(kind, _)| kind.as_str())
            .collect();
        if !missing.is_empty() {
            tracing::warn!("Providers without API keys: {}", missing.join(", "));
        }

        tracing::info!(
            "Configuration validated for {:?} environment",
            self.environment
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(native_fallback_usd: f64) -> PriceFeedConfig {
        PriceFeedConfig {
            url: "https://api.coingecko.com/api/v3".to_string(),
            native_id: "ethereum".to_string(),
            reward_token_id: "reward".to_string(),
            native_fallback_usd,
        }
    }

    #[test]
    fn fallback_price_must_be_positive() {
        assert!(feed(4000.0).validate().is_ok());
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(feed(bad).validate().is_err(), "accepted {}", bad);
        }
    }

    #[test]
    fn price_feed_url_must_be_http() {
        let mut config = feed(4000.0);
        config.url = "ftp://prices".to_string();
        assert!(config.validate().is_err());
    }
}
