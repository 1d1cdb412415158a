use crate::{
    config::ChainConfig,
    contracts::{to_base_units, u256_to_u128},
    error::GatewayError,
    models::{PaymentExpectation, PaymentMethod, PaymentVerification},
    services::PriceFeed,
};
use async_trait::async_trait;
use ethers::{
    prelude::*,
    providers::{Http, Provider},
    types::{Address, TransactionReceipt, H256},
    utils::keccak256,
};
use std::sync::Arc;
use std::time::Duration;

/// Reward-token payments are priced at spot, so allow this much drift.
const TOKEN_PRICE_TOLERANCE: f64 = 0.95;
const USDC_DECIMALS: u8 = 6;

#[async_trait]
pub trait PaymentVerifier: Send + Sync {
    async fn verify(
        &self,
        signature: &str,
        expectation: &PaymentExpectation,
    ) -> Result<PaymentVerification, GatewayError>;

    async fn healthy(&self) -> bool;
}

pub fn parse_signature(signature: &str) -> Result<H256, GatewayError> {
    let trimmed = signature.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let bytes = hex::decode(digits)
        .map_err(|e| GatewayError::InvalidPaymentProof(format!("Invalid tx hash: {}", e)))?;
    if bytes.len() != 32 {
        return Err(GatewayError::InvalidPaymentProof(format!(
            "Invalid tx hash: expected 32 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(H256::from_slice(&bytes))
}

/// Lowercase `0x`-prefixed form of a transaction hash. Every store key derived
/// from a payment uses this spelling.
pub fn canonical_signature(signature: &str) -> Result<String, GatewayError> {
    parse_signature(signature).map(|hash| format!("{:?}", hash))
}

pub struct EthereumPaymentVerifier {
    provider: Arc<Provider<Http>>,
    chain: ChainConfig,
    prices: Arc<dyn PriceFeed>,
    timeout: Duration,
}

impl EthereumPaymentVerifier {
    pub fn new(
        chain: ChainConfig,
        prices: Arc<dyn PriceFeed>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let provider = Arc::new(Provider::<Http>::try_from(chain.rpc_url.as_str())?);

        tracing::info!(
            "Payment verifier on {} (strict mode: {})",
            chain.network,
            chain.strict_verification
        );

        Ok(Self {
            provider,
            chain,
            prices,
            timeout,
        })
    }

    async fn receipt(&self, tx_hash: H256) -> Result<TransactionReceipt, GatewayError> {
        tokio::time::timeout(self.timeout, self.provider.get_transaction_receipt(tx_hash))
            .await
            .map_err(|_| GatewayError::Timeout("transaction receipt lookup".to_string()))?
            .map_err(|e| GatewayError::PaymentVerificationFailed(format!("RPC error: {}", e)))?
            .ok_or_else(|| GatewayError::PaymentVerificationFailed("Transaction not found".to_string()))
    }

    async fn expected_units(&self, expectation: &PaymentExpectation) -> Result<(Address, u128), GatewayError> {
        match expectation.method {
            PaymentMethod::Usdc => Ok((
                self.chain.usdc_address,
                to_base_units(expectation.amount_usd, USDC_DECIMALS),
            )),
            PaymentMethod::Token => {
                let price = self.prices.reward_token_usd().await?;
                let tokens = expectation.amount_usd / price * TOKEN_PRICE_TOLERANCE;
                Ok((
                    self.chain.reward_token_address,
                    to_base_units(tokens, self.chain.reward_token_decimals),
                ))
            }
        }
    }

    /// Sums ERC-20 transfers of `token` into the treasury.
    fn transferred_to_treasury(&self, receipt: &TransactionReceipt, token: Address) -> U256 {
        let transfer_topic = H256::from(keccak256("Transfer(address,address,uint256)"));

        receipt
            .logs
            .iter()
            .filter(|log| log.address == token)
            .filter(|log| log.topics.len() >= 3 && log.topics[0] == transfer_topic && log.data.len() == 32)
            .filter(|log| Address::from(log.topics[2]) == self.chain.recipient_address)
            .fold(U256::zero(), |total, log| {
                total.saturating_add(U256::from_big_endian(&log.data))
            })
    }
}

#[async_trait]
impl PaymentVerifier for EthereumPaymentVerifier {
    async fn verify(
        &self,
        signature: &str,
        expectation: &PaymentExpectation,
    ) -> Result<PaymentVerification, GatewayError> {
        let tx_hash = parse_signature(signature)?;
        let receipt = self.receipt(tx_hash).await?;
        let payer = Some(format!("{:?}", receipt.from));

        if receipt.status != Some(1.into()) {
            return Ok(PaymentVerification::rejected(signature, "Transaction failed"));
        }

        if !self.chain.strict_verification {
            tracing::info!("Payment {} confirmed on chain (amount not checked)", signature);
            return Ok(PaymentVerification::accepted(signature, payer, None));
        }

        let (token, expected) = self.expected_units(expectation).await?;
        let paid = u256_to_u128(self.transferred_to_treasury(&receipt, token));

        if paid == 0 {
            return Ok(PaymentVerification::rejected(
                signature,
                format!("No {} transfer to treasury found", expectation.method.as_str()),
            ));
        }
        if paid < expected {
            return Ok(PaymentVerification::rejected(
                signature,
                format!("Insufficient payment: {} < {}", paid, expected),
            ));
        }

        tracing::info!(
            "Payment verified: {} base units of {} from {} (tx: {})",
            paid,
            expectation.method.as_str(),
            receipt.from,
            signature
        );

        Ok(PaymentVerification::accepted(signature, payer, Some(paid)))
    }

    async fn healthy(&self) -> bool {
        matches!(
            tokio::time::timeout(self.timeout, self.provider.get_block_number()).await,
            Ok(Ok(_))
        )
    }
}
