use crate::{
    error::GatewayError,
    handlers::AppState,
    models::{GenerateRequest, GenerateResponse, TaskQuery, TaskStatusResponse},
};
use axum::{
    extract::{Path, Query, State},
    Json,
};

pub async fn create_generation(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, GatewayError> {
    let response = state.gateway.generate(request).await?;
    Ok(Json(response))
}

pub async fn get_generation(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Query(query): Query<TaskQuery>,
) -> Result<Json<TaskStatusResponse>, GatewayError> {
    let status = state.gateway.task_status(&query.model, &task_id).await?;
    Ok(Json(status))
}
