pub mod consultation;
pub mod costs;
pub mod work_orders;

use crate::{
    clock::Clock,
    config::ConfigHandle,
    db::DbPool,
    documents::DocumentRenderer,
    errors::ServiceError,
    events::EventSender,
    notifications::NotificationDispatcher,
    random::SecureRandom,
    services::{
        ConsultationService, CostLedgerService, DocumentService, OtpService, WorkOrderService,
    },
};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use std::convert::Infallible;
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Header carrying the authenticated technician, set by the upstream gateway.
pub const TECHNICIAN_HEADER: &str = "x-technician-id";

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub work_orders: Arc<WorkOrderService>,
    pub costs: Arc<CostLedgerService>,
    pub otp: Arc<OtpService>,
    pub consultation: Arc<ConsultationService>,
    pub documents: Arc<DocumentService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        config: ConfigHandle,
        clock: Arc<dyn Clock>,
        random: Arc<dyn SecureRandom>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        renderer: Arc<dyn DocumentRenderer>,
    ) -> Self {
        let work_orders = Arc::new(WorkOrderService::new(
            db_pool.clone(),
            event_sender.clone(),
            config.clone(),
            clock.clone(),
        ));
        let costs = Arc::new(CostLedgerService::new(
            db_pool.clone(),
            event_sender.clone(),
            config.clone(),
            clock.clone(),
        ));
        let otp = Arc::new(OtpService::new(
            db_pool.clone(),
            event_sender,
            config,
            clock,
            random,
            dispatcher,
        ));
        let consultation = Arc::new(ConsultationService::new(db_pool, otp.clone()));
        let documents = Arc::new(DocumentService::new(
            work_orders.clone(),
            costs.clone(),
            renderer,
        ));

        Self {
            work_orders,
            costs,
            otp,
            consultation,
            documents,
        }
    }
}

/// Technician identity of the caller, if the gateway supplied one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallingTechnician(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for CallingTechnician
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(TECHNICIAN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        Ok(CallingTechnician(id))
    }
}

/// Consultation token from `Authorization: Bearer <token>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| BearerToken(t.to_string()))
            .ok_or_else(|| ServiceError::Unauthorized("missing bearer token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn parts_with(header: &str, value: &str) -> Parts {
        let (parts, _) = Request::builder()
            .header(header, value)
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[tokio::test]
    async fn technician_header_is_optional() {
        let mut parts = parts_with(TECHNICIAN_HEADER, " TEC1 ").await;
        let CallingTechnician(id) = CallingTechnician::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(id.as_deref(), Some("TEC1"));

        let (mut bare, _) = Request::builder().body(()).unwrap().into_parts();
        let CallingTechnician(id) = CallingTechnician::from_request_parts(&mut bare, &())
            .await
            .unwrap();
        assert_eq!(id, None);
    }

    #[tokio::test]
    async fn bearer_token_requires_scheme() {
        let mut parts = parts_with("authorization", "Bearer abc123").await;
        let BearerToken(token) = BearerToken::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(token, "abc123");

        let mut basic = parts_with("authorization", "Basic abc123").await;
        assert!(matches!(
            BearerToken::from_request_parts(&mut basic, &()).await,
            Err(ServiceError::Unauthorized(_))
        ));
    }
}
