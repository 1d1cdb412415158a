use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContributionStatus {
    Pending,
    /// Held by one executor run between claim and settlement.
    Claimed,
    Processed,
    Failed,
}

/// A fee share owed from one payment, awaiting batch settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuybackContribution {
    pub id: String,
    pub payment_signature: String,
    pub generation_id: String,
    pub amount_usd: f64,
    pub status: ContributionStatus,
    #[serde(default)]
    pub batch_signature: Option<String>,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl BuybackContribution {
    pub fn new(payment_signature: &str, generation_id: &str, amount_usd: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payment_signature: payment_signature.to_string(),
            generation_id: generation_id.to_string(),
            amount_usd,
            status: ContributionStatus::Pending,
            batch_signature: None,
            processed_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn has_valid_amount(&self) -> bool {
        self.amount_usd.is_finite() && self.amount_usd > 0.0
    }
}

/// The outcome of one swap, applied to every claimed contribution at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSettlement {
    pub batch_signature: String,
    pub processed_ids: Vec<String>,
    pub failed_ids: Vec<String>,
    pub processed_at: DateTime<Utc>,
}

/// Row in the `buybacks` ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuybackBatch {
    pub id: String,
    pub total_usd: f64,
    pub total_native: f64,
    pub tx_signature: String,
    pub contribution_ids: Vec<String>,
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BatchOutcome {
    NothingPending,
    BelowDustFloor {
        total_usd: f64,
        total_native: f64,
        contributions: usize,
    },
    Executed(BuybackBatch),
}
