//! Fee pooling: each verified payment owes a share to the buyback pool, and
//! the executor settles everything pending in a single swap.

use crate::{
    contracts::to_base_units,
    error::GatewayError,
    models::{BatchOutcome, BatchSettlement, BuybackBatch, BuybackContribution},
    services::{store::Store, PriceFeed, SwapExecutor},
};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const NATIVE_DECIMALS: u8 = 18;

pub struct BuybackQueue {
    store: Arc<dyn Store>,
    percentage: f64,
}

impl BuybackQueue {
    pub fn new(store: Arc<dyn Store>, percentage: f64) -> Self {
        Self { store, percentage }
    }

    /// The pool's share of a payment, rounded to 1e-8 USD.
    pub fn share_of(&self, payment_usd: f64) -> f64 {
        (payment_usd * self.percentage / 100.0 * 1e8).round() / 1e8
    }

    /// Queues the pool's share of a payment. Returns `None` when the payment was already queued.
    pub async fn contribute(
        &self,
        payment_signature: &str,
        generation_id: &str,
        payment_usd: f64,
    ) -> Result<Option<BuybackContribution>, GatewayError> {
        let contribution =
            BuybackContribution::new(payment_signature, generation_id, self.share_of(payment_usd));
        if !contribution.has_valid_amount() {
            return Err(GatewayError::QueueWrite(format!(
                "invalid contribution amount {} for payment {}",
                contribution.amount_usd, payment_signature
            )));
        }

        let inserted = self
            .store
            .enqueue_contribution(&contribution)
            .await
            .map_err(|e| GatewayError::QueueWrite(e.to_string()))?;

        if inserted {
            tracing::info!(
                "Queued buyback contribution {} of ${} for payment {}",
                contribution.id,
                contribution.amount_usd,
                payment_signature
            );
            Ok(Some(contribution))
        } else {
            tracing::debug!("Payment {} already has a buyback contribution", payment_signature);
            Ok(None)
        }
    }
}

pub struct BatchExecutor {
    store: Arc<dyn Store>,
    prices: Arc<dyn PriceFeed>,
    swap: Option<Arc<dyn SwapExecutor>>,
    dust_floor_native: f64,
    run_lock: Mutex<()>,
}

impl BatchExecutor {
    pub fn new(
        store: Arc<dyn Store>,
        prices: Arc<dyn PriceFeed>,
        swap: Option<Arc<dyn SwapExecutor>>,
        dust_floor_native: f64,
    ) -> Self {
        Self {
            store,
            prices,
            swap,
            dust_floor_native,
            run_lock: Mutex::new(()),
        }
    }

    /// Claims every pending contribution and settles them in one swap, or
    /// leaves them all pending.
    pub async fn run(&self) -> Result<BatchOutcome, GatewayError> {
        // Runs inside this process are serialised; the store claim covers other processes.
        let _guard = self.run_lock.lock().await;

        let claim_id = Uuid::new_v4().to_string();
        let claimed = self.store.claim_pending(&claim_id).await?;
        if claimed.is_empty() {
            tracing::debug!("No pending buyback contributions");
            return Ok(BatchOutcome::NothingPending);
        }

        let (valid, malformed): (Vec<_>, Vec<_>) =
            claimed.into_iter().partition(|c| c.has_valid_amount());
        let total_usd: f64 = valid.iter().map(|c| c.amount_usd).sum();
        let native_price = self.prices.native_usd().await;
        if !native_price.is_finite() || native_price <= 0.0 {
            self.release(&claim_id).await?;
            return Err(GatewayError::PriceUnavailable(format!(
                "native price {} cannot size a swap",
                native_price
            )));
        }
        let total_native = total_usd / native_price;

        tracing::info!(
            "Buyback claim {}: {} contributions, ${:.6} = {:.9} native at ${}",
            claim_id,
            valid.len(),
            total_usd,
            total_native,
            native_price
        );

        if valid.is_empty() || total_native < self.dust_floor_native {
            self.release(&claim_id).await?;
            tracing::info!(
                "Buyback skipped: {:.9} native is below the {} dust floor",
                total_native,
                self.dust_floor_native
            );
            return Ok(BatchOutcome::BelowDustFloor {
                total_usd,
                total_native,
                contributions: valid.len() + malformed.len(),
            });
        }

        let Some(swap) = &self.swap else {
            self.release(&claim_id).await?;
            return Err(GatewayError::Configuration(
                "buyback swap wallet is not configured".to_string(),
            ));
        };

        let tx_signature = match swap
            .buy_reward_token(to_base_units(total_native, NATIVE_DECIMALS))
            .await
        {
            Ok(signature) => signature,
            Err(e) => {
                tracing::error!("Buyback swap failed, releasing claim {}: {}", claim_id, e);
                self.release(&claim_id).await?;
                return Err(GatewayError::BatchExecution(e.to_string()));
            }
        };

        let executed_at = Utc::now();
        let settlement = BatchSettlement {
            batch_signature: tx_signature.clone(),
            processed_ids: valid.iter().map(|c| c.id.clone()).collect(),
            failed_ids: malformed.iter().map(|c| c.id.clone()).collect(),
            processed_at: executed_at,
        };

        if let Err(e) = self.store.settle_claim(&claim_id, &settlement).await {
            // The swap is on chain; releasing would spend these contributions twice.
            tracing::error!(
                "Swap {} confirmed but settlement of claim {} failed: {}; rows left claimed",
                tx_signature,
                claim_id,
                e
            );
            return Err(GatewayError::BatchExecution(format!(
                "swap {} confirmed but contributions were not marked: {}",
                tx_signature, e
            )));
        }

        let batch = BuybackBatch {
            id: claim_id,
            total_usd,
            total_native,
            tx_signature,
            contribution_ids: settlement.processed_ids,
            executed_at,
        };

        if let Err(e) = self.store.record_buyback(&batch).await {
            tracing::warn!("Buyback {} settled but not added to ledger: {}", batch.tx_signature, e);
        }

        tracing::info!(
            "Buyback executed: ${:.6} ({:.9} native) across {} contributions, tx {}",
            batch.total_usd,
            batch.total_native,
            batch.contribution_ids.len(),
            batch.tx_signature
        );

        Ok(BatchOutcome::Executed(batch))
    }

    async fn release(&self, claim_id: &str) -> Result<(), GatewayError> {
        let released = self.store.release_claim(claim_id).await?;
        tracing::debug!("Released {} contributions from claim {}", released, claim_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::MemoryStore;

    #[test]
    fn share_is_ten_percent_of_price() {
        let queue = BuybackQueue::new(Arc::new(MemoryStore::new()), 10.0);
        assert_eq!(queue.share_of(0.03), 0.003);
        assert_eq!(queue.share_of(0.40), 0.04);
    }
}
