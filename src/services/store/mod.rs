//! Durable state for payments, buyback contributions and refunds.
//!
//! Every operation that the orchestration relies on for exactly-once behaviour
//! (payment insert, dispatch claim, contribution claim and settlement, refund
//! start) is atomic in each backend.

pub mod memory;
pub mod redis_store;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

use crate::models::{
    BatchSettlement, BuybackBatch, BuybackContribution, CanonicalState, ContributionStatus,
    GenerationTask, PaymentRecord, PaymentTracking, RefundRecord, RefundRequest,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("redis: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    async fn ping(&self) -> bool;

    /// Inserts the payment unless one with the same signature exists. Returns `true` on insert.
    async fn insert_payment(&self, record: &PaymentRecord) -> StoreResult<bool>;
    async fn get_payment(&self, signature: &str) -> StoreResult<Option<PaymentRecord>>;
    /// Takes the single dispatch slot for a signature. Returns `false` if already held.
    async fn claim_dispatch(&self, signature: &str) -> StoreResult<bool>;
    async fn release_dispatch(&self, signature: &str) -> StoreResult<()>;
    async fn bind_task(&self, signature: &str, task_id: &str) -> StoreResult<()>;

    async fn track_payment(&self, entry: &PaymentTracking) -> StoreResult<()>;
    /// Expired entries are treated as absent even before the sweep removes them.
    async fn get_tracking(&self, external_task_id: &str) -> StoreResult<Option<PaymentTracking>>;
    async fn sweep_expired_tracking(&self, now: DateTime<Utc>) -> StoreResult<usize>;

    /// Appends to the generations ledger.
    async fn record_generation(&self, task: &GenerationTask) -> StoreResult<()>;
    async fn get_generation(&self, external_task_id: &str) -> StoreResult<Option<GenerationTask>>;
    /// Writes the terminal annotation once. Returns `false` if it was already set.
    async fn annotate_terminal(&self, external_task_id: &str, state: CanonicalState) -> StoreResult<bool>;

    /// Idempotent on `payment_signature`. Returns `true` on insert.
    async fn enqueue_contribution(&self, contribution: &BuybackContribution) -> StoreResult<bool>;
    async fn contributions(&self, status: ContributionStatus) -> StoreResult<Vec<BuybackContribution>>;
    /// Atomically flips every pending contribution to claimed under `claim_id`.
    async fn claim_pending(&self, claim_id: &str) -> StoreResult<Vec<BuybackContribution>>;
    /// Returns every contribution held by `claim_id` to pending.
    async fn release_claim(&self, claim_id: &str) -> StoreResult<usize>;
    /// Applies the settlement to every contribution held by `claim_id` at once.
    async fn settle_claim(&self, claim_id: &str, settlement: &BatchSettlement) -> StoreResult<()>;
    async fn record_buyback(&self, batch: &BuybackBatch) -> StoreResult<()>;
    async fn buybacks(&self) -> StoreResult<Vec<BuybackBatch>>;

    /// Outbox insert, idempotent on the original payment signature.
    async fn enqueue_refund_request(&self, request: &RefundRequest) -> StoreResult<bool>;
    async fn refund_requests(&self) -> StoreResult<Vec<RefundRequest>>;
    async fn remove_refund_request(&self, original_signature: &str) -> StoreResult<()>;
    /// Writes `record` (status processing) unless a processing or completed refund
    /// exists for the same original signature. Returns `true` when written.
    async fn begin_refund(&self, record: &RefundRecord) -> StoreResult<bool>;
    async fn finish_refund(&self, record: &RefundRecord) -> StoreResult<()>;
    async fn get_refund(&self, original_signature: &str) -> StoreResult<Option<RefundRecord>>;
}
