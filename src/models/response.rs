use crate::models::{BatchOutcome, CanonicalState, MediaKind, NormalizedStatus, PaymentMethod, RefundRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    #[serde(default, rename = "type")]
    pub media_type: Option<MediaKind>,
    #[serde(default)]
    pub options: serde_json::Value,
    #[serde(default)]
    pub payment_signature: Option<String>,
    /// Echo of the quote's id. A fresh one is minted when absent.
    #[serde(default)]
    pub generation_id: Option<String>,
    #[serde(default)]
    pub user_wallet: Option<String>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub success: bool,
    pub task_id: String,
    pub model: String,
}

/// Body of the 402 answer to an unpaid generation request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentQuote {
    pub generation_id: String,
    pub amount: f64,
    pub currency: String,
    pub network: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TaskQuery {
    pub model: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusResponse {
    pub success: bool,
    pub state: CanonicalState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_urls: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<NormalizedStatus> for TaskStatusResponse {
    fn from(status: NormalizedStatus) -> Self {
        let result_urls = (!status.result_urls.is_empty()).then_some(status.result_urls);
        Self {
            success: true,
            state: status.state.client_visible(),
            result: result_urls.as_ref().and_then(|urls| urls.first().cloned()),
            result_urls,
            error: status.error,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    pub signature: String,
    pub generation_id: String,
    pub amount: f64,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub user_wallet: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VerifyPaymentResponse {
    pub success: bool,
    pub paid: bool,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BuybackExecuteResponse {
    pub success: bool,
    pub executed: bool,
    pub total_usd: f64,
    pub total_native: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    pub contributions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<BatchOutcome> for BuybackExecuteResponse {
    fn from(outcome: BatchOutcome) -> Self {
        match outcome {
            BatchOutcome::NothingPending => Self {
                success: true,
                executed: false,
                total_usd: 0.0,
                total_native: 0.0,
                signature: None,
                contributions: 0,
                reason: Some("no pending contributions".to_string()),
            },
            BatchOutcome::BelowDustFloor { total_usd, total_native, contributions } => Self {
                success: true,
                executed: false,
                total_usd,
                total_native,
                signature: None,
                contributions,
                reason: Some("below dust floor".to_string()),
            },
            BatchOutcome::Executed(batch) => Self {
                success: true,
                executed: true,
                total_usd: batch.total_usd,
                total_native: batch.total_native,
                contributions: batch.contribution_ids.len(),
                signature: Some(batch.tx_signature),
                reason: None,
            },
        }
    }
}

#[derive(Serialize, Debug)]
pub struct RefundResponse {
    pub success: bool,
    pub refund: RefundRecord,
}

#[derive(Serialize, Debug)]
pub struct RefundDrainResponse {
    pub success: bool,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub store: bool,
    pub payment_rpc: bool,
    pub timestamp: DateTime<Utc>,
}
