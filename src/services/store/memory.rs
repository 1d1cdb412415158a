use super::{Store, StoreError, StoreResult};
use crate::models::{
    BatchSettlement, BuybackBatch, BuybackContribution, CanonicalState, ContributionStatus,
    GenerationTask, PaymentRecord, PaymentTracking, RefundRecord, RefundRequest, RefundStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

#[derive(Default)]
struct State {
    payments: HashMap<String, PaymentRecord>,
    dispatch_claims: HashSet<String>,
    tracking: HashMap<String, PaymentTracking>,
    generations: HashMap<String, GenerationTask>,
    contributions: HashMap<String, BuybackContribution>,
    contribution_by_signature: HashMap<String, String>,
    claims: HashMap<String, Vec<String>>,
    buybacks: Vec<BuybackBatch>,
    refund_outbox: Vec<RefundRequest>,
    refunds: HashMap<String, RefundRecord>,
}

/// Process-local store for development and tests. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> bool {
        true
    }

    async fn insert_payment(&self, record: &PaymentRecord) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        if state.payments.contains_key(&record.signature) {
            return Ok(false);
        }
        state.payments.insert(record.signature.clone(), record.clone());
        Ok(true)
    }

    async fn get_payment(&self, signature: &str) -> StoreResult<Option<PaymentRecord>> {
        Ok(self.state.lock().await.payments.get(signature).cloned())
    }

    async fn claim_dispatch(&self, signature: &str) -> StoreResult<bool> {
        Ok(self.state.lock().await.dispatch_claims.insert(signature.to_string()))
    }

    async fn release_dispatch(&self, signature: &str) -> StoreResult<()> {
        self.state.lock().await.dispatch_claims.remove(signature);
        Ok(())
    }

    async fn bind_task(&self, signature: &str, task_id: &str) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let record = state
            .payments
            .get_mut(signature)
            .ok_or_else(|| StoreError::NotFound(format!("payment {}", signature)))?;
        record.task_id = Some(task_id.to_string());
        Ok(())
    }

    async fn track_payment(&self, entry: &PaymentTracking) -> StoreResult<()> {
        self.state
            .lock()
            .await
            .tracking
            .insert(entry.external_task_id.clone(), entry.clone());
        Ok(())
    }

    async fn get_tracking(&self, external_task_id: &str) -> StoreResult<Option<PaymentTracking>> {
        let now = Utc::now();
        Ok(self
            .state
            .lock()
            .await
            .tracking
            .get(external_task_id)
            .filter(|entry| !entry.is_expired(now))
            .cloned())
    }

    async fn sweep_expired_tracking(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let mut state = self.state.lock().await;
        let before = state.tracking.len();
        state.tracking.retain(|_, entry| !entry.is_expired(now));
        Ok(before - state.tracking.len())
    }

    async fn record_generation(&self, task: &GenerationTask) -> StoreResult<()> {
        self.state
            .lock()
            .await
            .generations
            .insert(task.external_task_id.clone(), task.clone());
        Ok(())
    }

    async fn get_generation(&self, external_task_id: &str) -> StoreResult<Option<GenerationTask>> {
        Ok(self.state.lock().await.generations.get(external_task_id).cloned())
    }

    async fn annotate_terminal(&self, external_task_id: &str, state: CanonicalState) -> StoreResult<bool> {
        let mut guard = self.state.lock().await;
        match guard.generations.get_mut(external_task_id) {
            Some(task) if task.terminal_state.is_none() => {
                task.terminal_state = Some(state);
                task.terminal_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn enqueue_contribution(&self, contribution: &BuybackContribution) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        if state
            .contribution_by_signature
            .contains_key(&contribution.payment_signature)
        {
            return Ok(false);
        }
        state
            .contribution_by_signature
            .insert(contribution.payment_signature.clone(), contribution.id.clone());
        state
            .contributions
            .insert(contribution.id.clone(), contribution.clone());
        Ok(true)
    }

    async fn contributions(&self, status: ContributionStatus) -> StoreResult<Vec<BuybackContribution>> {
        let state = self.state.lock().await;
        let mut rows: Vec<_> = state
            .contributions
            .values()
            .filter(|c| c.status == status)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }

    async fn claim_pending(&self, claim_id: &str) -> StoreResult<Vec<BuybackContribution>> {
        let mut state = self.state.lock().await;
        let mut claimed = Vec::new();
        for contribution in state.contributions.values_mut() {
            if contribution.status == ContributionStatus::Pending {
                contribution.status = ContributionStatus::Claimed;
                claimed.push(contribution.clone());
            }
        }
        claimed.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        if !claimed.is_empty() {
            let ids = claimed.iter().map(|c| c.id.clone()).collect();
            state.claims.insert(claim_id.to_string(), ids);
        }
        Ok(claimed)
    }

    async fn release_claim(&self, claim_id: &str) -> StoreResult<usize> {
        let mut state = self.state.lock().await;
        let ids = state.claims.remove(claim_id).unwrap_or_default();
        for id in &ids {
            if let Some(contribution) = state.contributions.get_mut(id) {
                contribution.status = ContributionStatus::Pending;
            }
        }
        Ok(ids.len())
    }

    async fn settle_claim(&self, claim_id: &str, settlement: &BatchSettlement) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let held: HashSet<String> = state
            .claims
            .get(claim_id)
            .ok_or_else(|| StoreError::NotFound(format!("claim {}", claim_id)))?
            .iter()
            .cloned()
            .collect();

        // Validate the whole settlement before touching any row.
        if let Some(stray) = settlement
            .processed_ids
            .iter()
            .chain(&settlement.failed_ids)
            .find(|id| !held.contains(*id))
        {
            return Err(StoreError::Corrupt {
                key: claim_id.to_string(),
                reason: format!("contribution {} is not held by this claim", stray),
            });
        }

        for id in &settlement.processed_ids {
            if let Some(contribution) = state.contributions.get_mut(id) {
                contribution.status = ContributionStatus::Processed;
                contribution.batch_signature = Some(settlement.batch_signature.clone());
                contribution.processed_at = Some(settlement.processed_at);
            }
        }
        for id in &settlement.failed_ids {
            if let Some(contribution) = state.contributions.get_mut(id) {
                contribution.status = ContributionStatus::Failed;
                contribution.processed_at = Some(settlement.processed_at);
            }
        }
        state.claims.remove(claim_id);
        Ok(())
    }

    async fn record_buyback(&self, batch: &BuybackBatch) -> StoreResult<()> {
        self.state.lock().await.buybacks.push(batch.clone());
        Ok(())
    }

    async fn buybacks(&self) -> StoreResult<Vec<BuybackBatch>> {
        Ok(self.state.lock().await.buybacks.clone())
    }

    async fn enqueue_refund_request(&self, request: &RefundRequest) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let signature = &request.order.original_signature;
        if state
            .refund_outbox
            .iter()
            .any(|r| &r.order.original_signature == signature)
        {
            return Ok(false);
        }
        state.refund_outbox.push(request.clone());
        Ok(true)
    }

    async fn refund_requests(&self) -> StoreResult<Vec<RefundRequest>> {
        Ok(self.state.lock().await.refund_outbox.clone())
    }

    async fn remove_refund_request(&self, original_signature: &str) -> StoreResult<()> {
        self.state
            .lock()
            .await
            .refund_outbox
            .retain(|r| r.order.original_signature != original_signature);
        Ok(())
    }

    async fn begin_refund(&self, record: &RefundRecord) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.refunds.get(&record.original_signature) {
            if existing.status != RefundStatus::Failed {
                return Ok(false);
            }
        }
        state
            .refunds
            .insert(record.original_signature.clone(), record.clone());
        Ok(true)
    }

    async fn finish_refund(&self, record: &RefundRecord) -> StoreResult<()> {
        self.state
            .lock()
            .await
            .refunds
            .insert(record.original_signature.clone(), record.clone());
        Ok(())
    }

    async fn get_refund(&self, original_signature: &str) -> StoreResult<Option<RefundRecord>> {
        Ok(self.state.lock().await.refunds.get(original_signature).cloned())
    }
}
