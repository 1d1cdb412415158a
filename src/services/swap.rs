use crate::{
    contracts::{SignerClient, UniswapV2Router},
    error::GatewayError,
};
use async_trait::async_trait;
use chrono::Utc;
use ethers::types::{Address, U256};
use std::sync::Arc;
use std::time::Duration;

const SWAP_DEADLINE_SECS: i64 = 600;

#[async_trait]
pub trait SwapExecutor: Send + Sync {
    /// Spends `native_amount_wei` on the reward token in one transaction and
    /// returns the confirmed transaction hash.
    async fn buy_reward_token(&self, native_amount_wei: u128) -> Result<String, GatewayError>;
}

pub struct UniswapSwapExecutor {
    router: UniswapV2Router<SignerClient>,
    path: Vec<Address>,
    recipient: Address,
    slippage_bps: u32,
    timeout: Duration,
}

impl UniswapSwapExecutor {
    pub fn new(
        client: Arc<SignerClient>,
        router_address: Address,
        wrapped_native: Address,
        reward_token: Address,
        recipient: Address,
        slippage_bps: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            router: UniswapV2Router::new(router_address, client),
            path: vec![wrapped_native, reward_token],
            recipient,
            slippage_bps: slippage_bps.min(10_000),
            timeout,
        }
    }

    async fn swap(&self, amount_in: U256) -> Result<String, GatewayError> {
        let amounts = self
            .router
            .get_amounts_out(amount_in, self.path.clone())
            .call()
            .await
            .map_err(|e| GatewayError::BatchExecution(format!("quote failed: {}", e)))?;
        let expected_out = amounts
            .last()
            .copied()
            .ok_or_else(|| GatewayError::BatchExecution("router returned an empty quote".to_string()))?;
        let min_out = expected_out * U256::from(10_000 - self.slippage_bps) / U256::from(10_000u32);
        let deadline = U256::from((Utc::now().timestamp() + SWAP_DEADLINE_SECS) as u64);

        tracing::info!(
            "Swapping {} wei for at least {} reward token units",
            amount_in,
            min_out
        );

        let call = self
            .router
            .swap_exact_eth_for_tokens(min_out, self.path.clone(), self.recipient, deadline)
            .value(amount_in);
        let pending = call
            .send()
            .await
            .map_err(|e| GatewayError::BatchExecution(format!("swap submission failed: {}", e)))?;

        let receipt = pending
            .await
            .map_err(|e| GatewayError::BatchExecution(format!("swap receipt unavailable: {}", e)))?
            .ok_or_else(|| GatewayError::BatchExecution("swap transaction dropped".to_string()))?;

        if receipt.status != Some(1.into()) {
            return Err(GatewayError::BatchExecution(format!(
                "swap reverted: {:?}",
                receipt.transaction_hash
            )));
        }

        Ok(format!("{:?}", receipt.transaction_hash))
    }
}

#[async_trait]
impl SwapExecutor for UniswapSwapExecutor {
    async fn buy_reward_token(&self, native_amount_wei: u128) -> Result<String, GatewayError> {
        tokio::time::timeout(self.timeout, self.swap(U256::from(native_amount_wei)))
            .await
            .map_err(|_| GatewayError::Timeout("swap submission".to_string()))?
    }
}
