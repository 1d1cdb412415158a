use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Stable token, valued 1:1 with USD.
    #[default]
    Usdc,
    /// The reward token bought back by the buyback executor.
    Token,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Usdc => "usdc",
            PaymentMethod::Token => "token",
        }
    }
}

/// One verified payment. The transaction hash is the idempotency key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub signature: String,
    pub generation_id: String,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub user_wallet: Option<String>,
    pub amount_usd: f64,
    pub payment_method: PaymentMethod,
    pub timestamp: DateTime<Utc>,
}

/// Links a dispatched external task back to its payment for later refund lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentTracking {
    pub external_task_id: String,
    pub signature: String,
    pub user_wallet: Option<String>,
    pub amount_usd: f64,
    pub payment_method: PaymentMethod,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PaymentTracking {
    pub fn new(external_task_id: &str, payment: &PaymentRecord, ttl: Duration) -> Self {
        let created_at = Utc::now();
        Self {
            external_task_id: external_task_id.to_string(),
            signature: payment.signature.clone(),
            user_wallet: payment.user_wallet.clone(),
            amount_usd: payment.amount_usd,
            payment_method: payment.payment_method,
            created_at,
            expires_at: created_at + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// What a payment must look like to be accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentExpectation {
    pub amount_usd: f64,
    pub method: PaymentMethod,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentVerification {
    pub valid: bool,
    pub signature: String,
    pub reason: String,
    pub payer: Option<String>,
    pub amount_base_units: Option<u128>,
}

impl PaymentVerification {
    pub fn accepted(signature: &str, payer: Option<String>, amount_base_units: Option<u128>) -> Self {
        Self {
            valid: true,
            signature: signature.to_string(),
            reason: "Payment verified".to_string(),
            payer,
            amount_base_units,
        }
    }

    pub fn rejected(signature: &str, reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            signature: signature.to_string(),
            reason: reason.into(),
            payer: None,
            amount_base_units: None,
        }
    }
}
