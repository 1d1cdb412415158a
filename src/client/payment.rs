use crate::contracts::{from_base_units, signer_client, to_base_units, u256_to_u128, SignerClient, IERC20};
use anyhow::{Context, Result};
use ethers::{
    prelude::*,
    types::{Address, U256},
};
use std::sync::Arc;

const USDC_DECIMALS: u8 = 6;

/// Pays generation quotes in USDC from a local wallet.
pub struct PaymentClient {
    provider: Arc<SignerClient>,
    usdc_address: Address,
}

impl PaymentClient {
    pub fn new(
        rpc_url: &str,
        private_key: &str,
        chain_id: u64,
        usdc_address: Address,
    ) -> Result<Self> {
        Ok(Self {
            provider: signer_client(rpc_url, private_key, chain_id)?,
            usdc_address,
        })
    }

    pub fn address(&self) -> Address {
        self.provider.address()
    }

    pub async fn send_usdc(&self, amount_usd: f64, recipient: Address) -> Result<H256> {
        if !amount_usd.is_finite() || amount_usd <= 0.0 {
            anyhow::bail!("Invalid USD amount: {}", amount_usd);
        }
        let amount = to_base_units(amount_usd, USDC_DECIMALS);

        tracing::info!("Sending {} USDC to {}", amount_usd, recipient);

        let usdc = IERC20::new(self.usdc_address, self.provider.clone());
        let balance = u256_to_u128(usdc.balance_of(self.provider.address()).call().await?);

        if balance < amount {
            anyhow::bail!(
                "Insufficient USDC balance: {} < {}",
                from_base_units(balance, USDC_DECIMALS),
                amount_usd
            );
        }

        let tx = usdc.transfer(recipient, U256::from(amount));
        let pending_tx = tx.send().await.context("Failed to send USDC transfer")?;

        tracing::info!("Transaction sent, waiting for confirmation...");

        let receipt = pending_tx
            .await
            .context("Failed to get transaction receipt")?
            .ok_or_else(|| anyhow::anyhow!("Transaction dropped"))?;

        if receipt.status != Some(1.into()) {
            anyhow::bail!("Transaction failed onchain");
        }

        tracing::info!("Payment confirmed: {:?}", receipt.transaction_hash);

        Ok(receipt.transaction_hash)
    }

    pub async fn usdc_balance(&self) -> Result<f64> {
        let usdc = IERC20::new(self.usdc_address, self.provider.clone());
        let balance = usdc.balance_of(self.provider.address()).call().await?;
        Ok(from_base_units(u256_to_u128(balance), USDC_DECIMALS))
    }
}
