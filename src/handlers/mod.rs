pub mod buyback;
pub mod generate;
pub mod health;
pub mod payment;
pub mod refund;

pub use buyback::*;
pub use generate::*;
pub use health::*;
pub use payment::*;
pub use refund::*;

use crate::{
    middleware::{admin_guard_layer, AdminGuard},
    services::{BatchExecutor, GenerationGateway, PaymentVerifier, RefundEngine, RefundWorker, Store},
};
use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<GenerationGateway>,
    pub executor: Arc<BatchExecutor>,
    pub refunds: Arc<RefundEngine>,
    pub refund_worker: Arc<RefundWorker>,
    pub store: Arc<dyn Store>,
    pub verifier: Arc<dyn PaymentVerifier>,
    pub admin: Arc<AdminGuard>,
}

pub fn router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/buybacks/execute", post(execute_buyback))
        .route("/refunds", post(create_refund))
        .route("/refunds/process", post(process_refunds))
        .route_layer(axum_middleware::from_fn_with_state(
            state.admin.clone(),
            admin_guard_layer,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/generate", post(create_generation))
        .route("/generate/:task_id", get(get_generation))
        .route("/payment/verify", post(verify_payment))
        .merge(admin)
        .with_state(state)
}
