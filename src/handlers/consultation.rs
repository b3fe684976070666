use super::{AppState, BearerToken};
use crate::{entities::OtpPurpose, errors::ServiceError};
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct RequestCodeRequest {
    #[validate(length(min = 1, max = 50))]
    pub client_id: String,
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyCodeRequest {
    #[validate(length(min = 1, max = 50))]
    pub client_id: String,
    #[validate(length(min = 1, max = 12))]
    pub code: String,
}

/// Public, unauthenticated consultation endpoints (`/public`)
pub fn consultation_routes() -> Router<AppState> {
    Router::new()
        .route("/otp", post(request_code))
        .route("/otp/verify", post(verify_code))
        .route("/orders", get(order_history))
        .route("/orders/:order_number", get(order_status))
}

async fn request_code(
    State(state): State<AppState>,
    Json(request): Json<RequestCodeRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    request.validate()?;
    let issued = state
        .services
        .otp
        .issue(
            &request.client_id,
            OtpPurpose::Consultation,
            Some(&request.email),
        )
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "A verification code was sent to the email on file",
            "expires_at": issued.expires_at,
        })),
    ))
}

/// Always 200: the body says whether the code was accepted and, if not, why.
async fn verify_code(
    State(state): State<AppState>,
    Json(request): Json<VerifyCodeRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    request.validate()?;
    let result = state
        .services
        .otp
        .validate(&request.client_id, OtpPurpose::Consultation, &request.code)
        .await?;
    Ok(Json(result))
}

async fn order_history(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> Result<impl IntoResponse, ServiceError> {
    let orders = state.services.consultation.order_history(&token).await?;
    Ok(Json(orders))
}

async fn order_status(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Path(order_number): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .consultation
        .order_status(&token, &order_number)
        .await?;
    Ok(Json(order))
}
