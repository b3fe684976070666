//! Repair Desk API Library
//!
//! Work order lifecycle, cost ledger and OTP-gated public consultation for a
//! repair shop, served over HTTP.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod clock;
pub mod config;
pub mod db;
pub mod documents;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod logging;
pub mod migrator;
pub mod notifications;
pub mod random;
pub mod services;

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::ConfigHandle,
    pub services: handlers::AppServices,
}

/// Liveness plus a database ping.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match db::check_connection(&state.db).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "database": "up",
                "timestamp": Utc::now().to_rfc3339(),
            })),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "degraded",
                "database": "down",
                "timestamp": Utc::now().to_rfc3339(),
            })),
        ),
    }
}

/// Versioned API routes, without state attached.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .nest(
            "/work-orders",
            handlers::work_orders::work_order_routes()
                .merge(handlers::costs::work_order_cost_routes()),
        )
        .nest("/cost-lines", handlers::costs::cost_line_routes())
        .nest("/public", handlers::consultation::consultation_routes())
}

/// Full application router with middleware.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_v1_routes())
        .layer(axum::middleware::from_fn(logging::logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
