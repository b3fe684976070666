use super::{AppState, CallingTechnician};
use crate::{
    errors::ServiceError,
    services::{
        documents::RenderedDocument,
        work_orders::{CreateWorkOrderInput, DeliveryInput, TechnicalSheetInput},
    },
};
use axum::{
    extract::{Json, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct ListWorkOrdersQuery {
    pub technician_id: Option<String>,
    pub client_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReceptionRequest {
    /// Defaults to now.
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct StatusChangeRequest {
    pub status: String,
    #[serde(default)]
    pub administrative_override: bool,
}

/// Creates the router for work order endpoints
pub fn work_order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_work_orders).post(create_work_order))
        .route("/:id", get(get_work_order))
        .route("/:id/intake", get(get_intake_view))
        .route("/:id/reception", post(confirm_reception))
        .route("/:id/status", put(change_status))
        .route("/:id/delivery", post(record_delivery))
        .route("/:id/technical-sheet", put(record_technical_sheet))
        .route("/:id/documents/intake", get(intake_document))
        .route("/:id/documents/delivery", get(delivery_document))
}

async fn create_work_order(
    State(state): State<AppState>,
    CallingTechnician(technician): CallingTechnician,
    Json(input): Json<CreateWorkOrderInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .work_orders
        .create_order(input, technician.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn list_work_orders(
    State(state): State<AppState>,
    Query(query): Query<ListWorkOrdersQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let orders = state
        .services
        .work_orders
        .list_filtered(query.technician_id.as_deref(), query.client_id.as_deref())
        .await?;
    Ok(Json(orders))
}

async fn get_work_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let detail = state.services.work_orders.get_detail(id).await?;
    Ok(Json(detail))
}

async fn get_intake_view(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let view = state.services.work_orders.get_intake_view(id).await?;
    Ok(Json(view))
}

async fn confirm_reception(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ReceptionRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .work_orders
        .confirm_reception(id, request.at)
        .await?;
    Ok(Json(order))
}

async fn change_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<StatusChangeRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .work_orders
        .change_status(id, &request.status, request.administrative_override)
        .await?;
    Ok(Json(order))
}

async fn record_delivery(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<DeliveryInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.work_orders.record_delivery(id, input).await?;
    Ok(Json(order))
}

async fn record_technical_sheet(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<TechnicalSheetInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let sheet = state
        .services
        .work_orders
        .record_technical_sheet(id, input)
        .await?;
    Ok(Json(sheet))
}

async fn intake_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let document = state.services.documents.render_intake(id).await?;
    Ok(document_response(document))
}

async fn delivery_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let document = state.services.documents.render_delivery(id).await?;
    Ok(document_response(document))
}

fn document_response(document: RenderedDocument) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, document.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", document.file_name),
            ),
        ],
        document.bytes,
    )
}
