use crate::{error::GatewayError, handlers::AppState, models::BuybackExecuteResponse};
use axum::{extract::State, Json};

pub async fn execute_buyback(
    State(state): State<AppState>,
) -> Result<Json<BuybackExecuteResponse>, GatewayError> {
    let outcome = state.executor.run().await?;
    Ok(Json(outcome.into()))
}
