use super::AppState;
use crate::{errors::ServiceError, services::costs::AddCostLineInput};
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i32,
}

/// Cost routes nested under a work order (`/work-orders/:id/costs`)
pub fn work_order_cost_routes() -> Router<AppState> {
    Router::new()
        .route("/:id/costs", get(list_lines).post(add_line))
        .route("/:id/costs/totals", get(totals))
}

/// Routes addressing a single cost line (`/cost-lines/:id`)
pub fn cost_line_routes() -> Router<AppState> {
    Router::new().route("/:id", put(update_quantity).delete(remove_line))
}

async fn add_line(
    State(state): State<AppState>,
    Path(work_order_id): Path<Uuid>,
    Json(input): Json<AddCostLineInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let line = state.services.costs.add_line(work_order_id, input).await?;
    Ok((StatusCode::CREATED, Json(line)))
}

async fn list_lines(
    State(state): State<AppState>,
    Path(work_order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let lines = state.services.costs.list_lines(work_order_id).await?;
    Ok(Json(lines))
}

async fn totals(
    State(state): State<AppState>,
    Path(work_order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let totals = state.services.costs.compute_totals(work_order_id).await?;
    Ok(Json(totals))
}

async fn update_quantity(
    State(state): State<AppState>,
    Path(line_id): Path<Uuid>,
    Json(request): Json<UpdateQuantityRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let line = state
        .services
        .costs
        .update_quantity(line_id, request.quantity)
        .await?;
    Ok(Json(line))
}

async fn remove_line(
    State(state): State<AppState>,
    Path(line_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.costs.remove_line(line_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
