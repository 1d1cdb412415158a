use crate::models::{PaymentQuote, ProviderKind};
use crate::services::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Payment required: {} {}", .0.amount, .0.currency)]
    PaymentRequired(PaymentQuote),

    #[error("Payment verification failed: {0}")]
    PaymentVerificationFailed(String),

    #[error("Invalid payment proof: {0}")]
    InvalidPaymentProof(String),

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{provider} request failed{}: {body}", .status.map(|s| format!(" with status {s}")).unwrap_or_default())]
    UpstreamProvider {
        provider: ProviderKind,
        status: Option<u16>,
        body: String,
    },

    #[error("Dispatch already in progress for payment {0}")]
    DispatchInProgress(String),

    #[error("Buyback contribution not queued: {0}")]
    QueueWrite(String),

    #[error("Buyback batch failed: {0}")]
    BatchExecution(String),

    #[error("Price unavailable: {0}")]
    PriceUnavailable(String),

    #[error("Refund already issued or in progress for {0}")]
    AlreadyRefunded(String),

    #[error("Refund failed: {0}")]
    Refund(String),

    #[error("RPC error: {0}")]
    Rpc(#[from] ethers::providers::ProviderError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    pub fn upstream(provider: ProviderKind, status: Option<u16>, body: impl Into<String>) -> Self {
        GatewayError::UpstreamProvider { provider, status, body: body.into() }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::PaymentRequired(_) | GatewayError::PaymentVerificationFailed(_) => {
                StatusCode::PAYMENT_REQUIRED
            }
            GatewayError::InvalidPaymentProof(_)
            | GatewayError::UnknownModel(_)
            | GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::DispatchInProgress(_) | GatewayError::AlreadyRefunded(_) => {
                StatusCode::CONFLICT
            }
            GatewayError::PriceUnavailable(_) | GatewayError::Rpc(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            GatewayError::PaymentRequired(_) => "PAYMENT_REQUIRED",
            GatewayError::PaymentVerificationFailed(_) => "PAYMENT_VERIFICATION_FAILED",
            GatewayError::InvalidPaymentProof(_) => "INVALID_PAYMENT_PROOF",
            GatewayError::UnknownModel(_) => "UNKNOWN_MODEL",
            GatewayError::BadRequest(_) => "BAD_REQUEST",
            GatewayError::Unauthorized => "UNAUTHORIZED",
            GatewayError::Configuration(_) => "CONFIGURATION_ERROR",
            GatewayError::UpstreamProvider { .. } => "UPSTREAM_PROVIDER_ERROR",
            GatewayError::DispatchInProgress(_) => "DISPATCH_IN_PROGRESS",
            GatewayError::QueueWrite(_) => "QUEUE_WRITE_FAILED",
            GatewayError::BatchExecution(_) => "BATCH_EXECUTION_FAILED",
            GatewayError::PriceUnavailable(_) => "PRICE_UNAVAILABLE",
            GatewayError::AlreadyRefunded(_) => "ALREADY_REFUNDED",
            GatewayError::Refund(_) => "REFUND_FAILED",
            GatewayError::Rpc(_) => "UPSTREAM_ERROR",
            GatewayError::Store(_) => "STORE_ERROR",
            GatewayError::Timeout(_) => "TIMEOUT",
            GatewayError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_code: String,
    pub timestamp: chrono::DateTime<Utc>,
    pub request_id: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if let GatewayError::PaymentRequired(quote) = self {
            tracing::debug!(generation_id = %quote.generation_id, "Payment required");
            return (status, Json(quote)).into_response();
        }

        let error_code = self.error_code();
        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            error_code: error_code.to_string(),
            timestamp: Utc::now(),
            request_id: Uuid::new_v4().to_string(),
        };

        if status.is_server_error() {
            tracing::error!(error = ?self, error_code = error_code, "Request failed");
        } else {
            tracing::warn!(error = %self, error_code = error_code, "Request rejected");
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_error_keeps_raw_body() {
        let err = GatewayError::upstream(ProviderKind::Runway, Some(422), r#"{"code":422,"msg":"bad prompt"}"#);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            err.to_string(),
            r#"runway request failed with status 422: {"code":422,"msg":"bad prompt"}"#
        );
    }

    #[test]
    fn payment_failures_map_to_402() {
        assert_eq!(
            GatewayError::PaymentVerificationFailed("not found".into()).status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            GatewayError::Configuration("missing key".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
