use crate::{
    handlers::AppState,
    models::HealthStatus,
    services::{PaymentVerifier, Store},
};
use axum::{extract::State, Json};
use chrono::Utc;

pub async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    let (store_ok, rpc_ok) = tokio::join!(state.store.ping(), state.verifier.healthy());

    let status = if store_ok && rpc_ok {
        "healthy"
    } else if store_ok {
        "degraded"
    } else {
        "unhealthy"
    };

    Json(HealthStatus {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: store_ok,
        payment_rpc: rpc_ok,
        timestamp: Utc::now(),
    })
}
