use crate::{config::PriceFeedConfig, error::GatewayError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use moka::future::Cache;
use std::collections::HashMap;
use std::time::Duration;

#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Spot USD price of the native coin. Falls back to a fixed price when the feed is down.
    async fn native_usd(&self) -> f64;

    /// Spot USD price of the reward token. No fallback.
    async fn reward_token_usd(&self) -> Result<f64, GatewayError>;
}

/// CoinGecko-style `simple/price` lookups with a short-lived cache.
pub struct HttpPriceFeed {
    client: reqwest::Client,
    config: PriceFeedConfig,
    cache: Cache<String, f64>,
}

impl HttpPriceFeed {
    pub fn new(config: PriceFeedConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let cache = Cache::builder()
            .max_capacity(16)
            .time_to_live(Duration::from_secs(30))
            .build();

        Ok(Self { client, config, cache })
    }

    async fn spot(&self, id: &str) -> Result<f64> {
        if let Some(price) = self.cache.get(id).await {
            tracing::debug!("Price cache hit for {}", id);
            return Ok(price);
        }

        let url = format!("{}/simple/price", self.config.url.trim_end_matches('/'));
        let quotes: HashMap<String, HashMap<String, f64>> = self
            .client
            .get(&url)
            .query(&[("ids", id), ("vs_currencies", "usd")])
            .send()
            .await
            .context("price feed unreachable")?
            .error_for_status()
            .context("price feed rejected request")?
            .json()
            .await
            .context("price feed returned malformed body")?;

        let price = quotes
            .get(id)
            .and_then(|q| q.get("usd"))
            .copied()
            .filter(|p| p.is_finite() && *p > 0.0)
            .with_context(|| format!("no usd quote for {}", id))?;

        self.cache.insert(id.to_string(), price).await;
        tracing::debug!("Spot price {} = ${}", id, price);
        Ok(price)
    }
}

#[async_trait]
impl PriceFeed for HttpPriceFeed {
    async fn native_usd(&self) -> f64 {
        match self.spot(&self.config.native_id).await {
            Ok(price) => price,
            Err(e) => {
                tracing::warn!(
                    "Native price lookup failed ({:#}), using fallback ${}",
                    e,
                    self.config.native_fallback_usd
                );
                self.config.native_fallback_usd
            }
        }
    }

    async fn reward_token_usd(&self) -> Result<f64, GatewayError> {
        self.spot(&self.config.reward_token_id)
            .await
            .map_err(|e| GatewayError::PriceUnavailable(format!("{:#}", e)))
    }
}
