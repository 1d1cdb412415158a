use crate::models::PaymentMethod;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefundStatus {
    Processing,
    /// Broadcast but never confirmed. The transfer may still land, so it is not retried.
    Submitted,
    Completed,
    /// Nothing reached the chain.
    Failed,
}

/// At most one per original payment signature. Only a failed record may be retried in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRecord {
    pub signature: Option<String>,
    pub user_wallet: String,
    /// Token units in display precision.
    pub amount: f64,
    pub token: String,
    pub reason: String,
    pub original_signature: String,
    pub status: RefundStatus,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundOrder {
    pub user_wallet: String,
    pub amount_usd: f64,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    pub reason: String,
    pub original_signature: String,
}

/// Refund outbox entry, written when a paid task is seen to fail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub order: RefundOrder,
    pub external_task_id: Option<String>,
    pub created_at: DateTime<Utc>,
}
