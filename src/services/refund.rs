use crate::{
    config::ChainConfig,
    contracts::{from_base_units, to_base_units, u256_to_u128, SignerClient, IERC20},
    error::GatewayError,
    models::{PaymentMethod, RefundOrder, RefundRecord, RefundStatus},
    services::{canonical_signature, store::Store, PriceFeed},
};
use async_trait::async_trait;
use chrono::Utc;
use ethers::prelude::*;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const USDC_DECIMALS: u8 = 6;

/// On-chain side of a refund, executed from the dedicated refund wallet.
#[async_trait]
pub trait RefundChain: Send + Sync {
    fn funding_address(&self) -> String;

    async fn token_balance(&self, token: PaymentMethod, owner: &str) -> Result<u128, GatewayError>;

    /// Whether the recipient already exists on chain. Refunds never create accounts.
    async fn recipient_ready(&self, token: PaymentMethod, recipient: &str) -> Result<bool, GatewayError>;

    /// Broadcasts the transfer and returns its hash without waiting for inclusion.
    async fn submit_transfer(&self, token: PaymentMethod, recipient: &str, amount: u128) -> Result<String, GatewayError>;

    /// Waits for a broadcast transfer and requires a successful receipt.
    async fn confirm_transfer(&self, tx_hash: &str) -> Result<(), GatewayError>;
}

pub struct RefundEngine {
    store: Arc<dyn Store>,
    prices: Arc<dyn PriceFeed>,
    chain: Option<Arc<dyn RefundChain>>,
    reward_token_decimals: u8,
}

impl RefundEngine {
    pub fn new(
        store: Arc<dyn Store>,
        prices: Arc<dyn PriceFeed>,
        chain: Option<Arc<dyn RefundChain>>,
        reward_token_decimals: u8,
    ) -> Self {
        Self {
            store,
            prices,
            chain,
            reward_token_decimals,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.chain.is_some()
    }

    pub async fn refund(&self, order: &RefundOrder) -> Result<RefundRecord, GatewayError> {
        if !order.amount_usd.is_finite() || order.amount_usd <= 0.0 {
            return Err(GatewayError::BadRequest(format!(
                "refund amount must be positive, got {}",
                order.amount_usd
            )));
        }
        let original_signature = canonical_signature(&order.original_signature)?;
        let chain = self.chain.as_ref().ok_or_else(|| {
            GatewayError::Configuration("REFUND_WALLET_PRIVATE_KEY is not configured".to_string())
        })?;

        let (amount, decimals) = match order.payment_method {
            PaymentMethod::Token => {
                let price = self.prices.reward_token_usd().await?;
                (order.amount_usd / price, self.reward_token_decimals)
            }
            PaymentMethod::Usdc => (order.amount_usd, USDC_DECIMALS),
        };
        let units = to_base_units(amount, decimals);

        let mut record = RefundRecord {
            signature: None,
            user_wallet: order.user_wallet.clone(),
            amount: from_base_units(units, decimals),
            token: order.payment_method.as_str().to_string(),
            reason: order.reason.clone(),
            original_signature,
            status: RefundStatus::Processing,
            error: None,
            created_at: Utc::now(),
        };

        if !self.store.begin_refund(&record).await? {
            return Err(GatewayError::AlreadyRefunded(record.original_signature));
        }

        tracing::info!(
            "Refunding {} {} to {} for payment {} from {}",
            record.amount,
            record.token,
            order.user_wallet,
            record.original_signature,
            chain.funding_address()
        );

        if let Err(e) = self.preflight(chain.as_ref(), order, units).await {
            return Err(self.settle_failure(record, RefundStatus::Failed, e).await);
        }

        let tx_hash = match chain
            .submit_transfer(order.payment_method, &order.user_wallet, units)
            .await
        {
            Ok(tx_hash) => tx_hash,
            // A timed out broadcast may still have reached the mempool.
            Err(e @ GatewayError::Timeout(_)) => {
                return Err(self.settle_failure(record, RefundStatus::Submitted, e).await)
            }
            Err(e) => return Err(self.settle_failure(record, RefundStatus::Failed, e).await),
        };

        record.signature = Some(tx_hash.clone());
        record.status = RefundStatus::Submitted;
        self.store.finish_refund(&record).await?;

        if let Err(e) = chain.confirm_transfer(&tx_hash).await {
            return Err(self.settle_failure(record, RefundStatus::Submitted, e).await);
        }

        record.status = RefundStatus::Completed;
        self.store.finish_refund(&record).await?;
        tracing::info!("Refund completed: {}", tx_hash);
        Ok(record)
    }

    /// Records the outcome of a refund that did not complete and returns the caller's error.
    async fn settle_failure(
        &self,
        mut record: RefundRecord,
        status: RefundStatus,
        e: GatewayError,
    ) -> GatewayError {
        let message = match e {
            GatewayError::Refund(message) => message,
            other => other.to_string(),
        };
        record.status = status;
        record.error = Some(message.clone());
        if let Err(store_err) = self.store.finish_refund(&record).await {
            tracing::error!(
                "Refund for {} failed and could not be recorded: {}",
                record.original_signature,
                store_err
            );
        }
        match status {
            RefundStatus::Submitted => tracing::error!(
                "Refund for {} unconfirmed ({:?}), needs reconciliation: {}",
                record.original_signature,
                record.signature,
                message
            ),
            _ => tracing::warn!("Refund for {} failed: {}", record.original_signature, message),
        }
        GatewayError::Refund(message)
    }

    async fn preflight(
        &self,
        chain: &dyn RefundChain,
        order: &RefundOrder,
        units: u128,
    ) -> Result<(), GatewayError> {
        if units == 0 {
            return Err(GatewayError::Refund("amount rounds to zero".to_string()));
        }

        let balance = chain
            .token_balance(order.payment_method, &chain.funding_address())
            .await?;
        if balance < units {
            return Err(GatewayError::Refund(format!(
                "refund wallet balance {} below {}",
                balance, units
            )));
        }

        if !chain.recipient_ready(order.payment_method, &order.user_wallet).await? {
            return Err(GatewayError::Refund(format!(
                "recipient {} has no account on chain",
                order.user_wallet
            )));
        }
        Ok(())
    }
}

/// Drains the refund outbox through the engine.
pub struct RefundWorker {
    store: Arc<dyn Store>,
    engine: Arc<RefundEngine>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct DrainReport {
    pub completed: usize,
    pub failed: usize,
}

impl RefundWorker {
    pub fn new(store: Arc<dyn Store>, engine: Arc<RefundEngine>) -> Self {
        Self { store, engine }
    }

    /// Each request is attempted once. Its outcome lives on in the refund record.
    pub async fn drain(&self) -> Result<DrainReport, GatewayError> {
        let mut report = DrainReport::default();

        for request in self.store.refund_requests().await? {
            let signature = request.order.original_signature.clone();
            match self.engine.refund(&request.order).await {
                Ok(_) => report.completed += 1,
                Err(GatewayError::AlreadyRefunded(_)) => {
                    tracing::debug!("Payment {} was already refunded", signature);
                }
                Err(e @ GatewayError::Configuration(_)) => return Err(e),
                Err(e @ GatewayError::PriceUnavailable(_)) => {
                    tracing::warn!("Refund for {} deferred: {}", signature, e);
                    continue;
                }
                Err(e) => {
                    tracing::warn!("Refund for {} failed: {}", signature, e);
                    report.failed += 1;
                }
            }
            self.store.remove_refund_request(&signature).await?;
        }

        if report.completed + report.failed > 0 {
            tracing::info!(
                "Refund outbox drained: {} completed, {} failed",
                report.completed,
                report.failed
            );
        }
        Ok(report)
    }
}

pub struct EthereumRefundChain {
    client: Arc<SignerClient>,
    usdc: Address,
    reward_token: Address,
    timeout: Duration,
}

impl EthereumRefundChain {
    pub fn new(client: Arc<SignerClient>, chain: &ChainConfig, timeout: Duration) -> Self {
        Self {
            client,
            usdc: chain.usdc_address,
            reward_token: chain.reward_token_address,
            timeout,
        }
    }

    fn token(&self, token: PaymentMethod) -> IERC20<SignerClient> {
        let address = match token {
            PaymentMethod::Usdc => self.usdc,
            PaymentMethod::Token => self.reward_token,
        };
        IERC20::new(address, self.client.clone())
    }

    async fn bounded<T, F>(&self, what: &str, fut: F) -> Result<T, GatewayError>
    where
        F: std::future::Future<Output = Result<T, GatewayError>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| GatewayError::Timeout(what.to_string()))?
    }
}

fn parse_wallet(wallet: &str) -> Result<Address, GatewayError> {
    Address::from_str(wallet.trim())
        .map_err(|e| GatewayError::BadRequest(format!("invalid wallet {}: {}", wallet, e)))
}

fn rpc_failure(e: impl std::fmt::Display) -> GatewayError {
    GatewayError::Refund(format!("RPC error: {}", e))
}

#[async_trait]
impl RefundChain for EthereumRefundChain {
    fn funding_address(&self) -> String {
        format!("{:?}", self.client.address())
    }

    async fn token_balance(&self, token: PaymentMethod, owner: &str) -> Result<u128, GatewayError> {
        let owner = parse_wallet(owner)?;
        self.bounded("refund balance lookup", async {
            let balance = self
                .token(token)
                .balance_of(owner)
                .call()
                .await
                .map_err(rpc_failure)?;
            Ok(u256_to_u128(balance))
        })
        .await
    }

    async fn recipient_ready(&self, token: PaymentMethod, recipient: &str) -> Result<bool, GatewayError> {
        let recipient = parse_wallet(recipient)?;
        self.bounded("recipient lookup", async {
            let nonce = self
                .client
                .get_transaction_count(recipient, None)
                .await
                .map_err(rpc_failure)?;
            if !nonce.is_zero() {
                return Ok(true);
            }
            let native = self.client.get_balance(recipient, None).await.map_err(rpc_failure)?;
            if !native.is_zero() {
                return Ok(true);
            }
            let held = self
                .token(token)
                .balance_of(recipient)
                .call()
                .await
                .map_err(rpc_failure)?;
            Ok(!held.is_zero())
        })
        .await
    }

    async fn submit_transfer(&self, token: PaymentMethod, recipient: &str, amount: u128) -> Result<String, GatewayError> {
        let recipient = parse_wallet(recipient)?;
        self.bounded("refund transfer submission", async {
            let contract = self.token(token);
            let call = contract.transfer(recipient, U256::from(amount));
            let pending = call
                .send()
                .await
                .map_err(|e| GatewayError::Refund(format!("transfer submission failed: {}", e)))?;
            Ok(format!("{:?}", pending.tx_hash()))
        })
        .await
    }

    async fn confirm_transfer(&self, tx_hash: &str) -> Result<(), GatewayError> {
        let hash = H256::from_str(tx_hash)
            .map_err(|e| GatewayError::Refund(format!("invalid transfer hash {}: {}", tx_hash, e)))?;
        self.bounded("refund transfer receipt", async {
            let receipt = PendingTransaction::new(hash, self.client.provider())
                .await
                .map_err(|e| GatewayError::Refund(format!("transfer receipt unavailable: {}", e)))?
                .ok_or_else(|| GatewayError::Refund("transfer dropped".to_string()))?;

            if receipt.status != Some(1.into()) {
                return Err(GatewayError::Refund("transfer failed onchain".to_string()));
            }
            Ok(())
        })
        .await
    }
}
