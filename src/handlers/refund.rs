use crate::{
    error::GatewayError,
    handlers::AppState,
    models::{RefundDrainResponse, RefundOrder, RefundResponse},
};
use axum::{extract::State, Json};

pub async fn create_refund(
    State(state): State<AppState>,
    Json(order): Json<RefundOrder>,
) -> Result<Json<RefundResponse>, GatewayError> {
    let refund = state.refunds.refund(&order).await?;
    Ok(Json(RefundResponse { success: true, refund }))
}

/// Drains the refund outbox on demand.
pub async fn process_refunds(
    State(state): State<AppState>,
) -> Result<Json<RefundDrainResponse>, GatewayError> {
    let report = state.refund_worker.drain().await?;
    Ok(Json(RefundDrainResponse {
        success: true,
        completed: report.completed,
        failed: report.failed,
    }))
}
