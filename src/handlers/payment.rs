use crate::{
    error::GatewayError,
    handlers::AppState,
    models::{VerifyPaymentRequest, VerifyPaymentResponse},
};
use axum::{extract::State, Json};

pub async fn verify_payment(
    State(state): State<AppState>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<Json<VerifyPaymentResponse>, GatewayError> {
    let paid = state.gateway.verify_payment(request).await?;
    Ok(Json(VerifyPaymentResponse { success: true, paid }))
}
