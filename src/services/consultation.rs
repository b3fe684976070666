use crate::{
    entities::{work_order, Equipment, WorkOrder, WorkOrderStatus},
    errors::ServiceError,
    services::otp::OtpService,
};
use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

/// What a client sees about one of their orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicOrderView {
    pub order_number: String,
    pub status: WorkOrderStatus,
    pub equipment: String,
    pub service_type: String,
    pub reported_problem: String,
    pub created_at: DateTime<Utc>,
    pub reception_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Read-only order lookups for clients holding a consultation token.
#[derive(Clone)]
pub struct ConsultationService {
    db: Arc<DatabaseConnection>,
    otp: Arc<OtpService>,
}

impl ConsultationService {
    pub fn new(db: Arc<DatabaseConnection>, otp: Arc<OtpService>) -> Self {
        Self { db, otp }
    }

    /// Status of one order. Orders of other clients are reported as missing.
    #[instrument(skip(self, token))]
    pub async fn order_status(
        &self,
        token: &str,
        order_number: &str,
    ) -> Result<PublicOrderView, ServiceError> {
        let client_id = self.otp.resolve_token(token).await?;
        let order = WorkOrder::find()
            .filter(work_order::Column::OrderNumber.eq(order_number))
            .filter(work_order::Column::ClientId.eq(client_id.as_str()))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Work order", order_number))?;
        self.project(order).await
    }

    /// All orders of the token owner, newest first.
    #[instrument(skip(self, token))]
    pub async fn order_history(&self, token: &str) -> Result<Vec<PublicOrderView>, ServiceError> {
        let client_id = self.otp.resolve_token(token).await?;
        let orders = WorkOrder::find()
            .filter(work_order::Column::ClientId.eq(client_id.as_str()))
            .order_by_desc(work_order::Column::CreatedAt)
            .order_by_desc(work_order::Column::OrderNumber)
            .all(&*self.db)
            .await?;

        let mut views = Vec::with_capacity(orders.len());
        for order in orders {
            views.push(self.project(order).await?);
        }
        Ok(views)
    }

    async fn project(&self, order: work_order::Model) -> Result<PublicOrderView, ServiceError> {
        let equipment = Equipment::find_by_id(order.equipment_id.clone())
            .one(&*self.db)
            .await?
            .map(|e| e.description())
            .unwrap_or_default();
        Ok(PublicOrderView {
            order_number: order.order_number,
            status: order.status,
            equipment,
            service_type: order.service_type,
            reported_problem: order.reported_problem,
            created_at: order.created_at,
            reception_at: order.reception_at,
            delivered_at: order.delivered_at,
        })
    }
}
