use crate::{
    clock::Clock,
    config::ConfigHandle,
    entities::{
        cost_line::{self, line_subtotal},
        CatalogItem, CostLine, WorkOrder,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::work_orders::lock_mutable_order,
};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddCostLineInput {
    pub catalog_item_id: Uuid,
    pub quantity: i32,
}

/// Aggregate costs of an order. Never stored; computed on every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostTotals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl CostTotals {
    /// Sums line subtotals and applies `tax_rate`, rounding tax to cents.
    pub fn from_subtotals<I>(subtotals: I, tax_rate: Decimal) -> Self
    where
        I: IntoIterator<Item = Decimal>,
    {
        let subtotal: Decimal = subtotals.into_iter().sum();
        let tax = (subtotal * tax_rate).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        Self {
            subtotal,
            tax,
            total: subtotal + tax,
        }
    }
}

fn ensure_positive_quantity(quantity: i32) -> Result<(), ServiceError> {
    if quantity <= 0 {
        return Err(ServiceError::ValidationError(format!(
            "Quantity must be greater than zero, got {}",
            quantity
        )));
    }
    Ok(())
}

/// Cost lines of work orders and their totals.
#[derive(Clone)]
pub struct CostLedgerService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: ConfigHandle,
    clock: Arc<dyn Clock>,
}

impl CostLedgerService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: ConfigHandle,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
            clock,
        }
    }

    /// Adds a line priced from the catalog.
    ///
    /// Type, description and unit cost are copied from the catalog item as it
    /// is now; later catalog changes do not affect the line.
    #[instrument(skip(self, input), fields(catalog_item_id = %input.catalog_item_id, quantity = input.quantity))]
    pub async fn add_line(
        &self,
        work_order_id: Uuid,
        input: AddCostLineInput,
    ) -> Result<cost_line::Model, ServiceError> {
        ensure_positive_quantity(input.quantity)?;
        let now = self.clock.now();

        let txn = self.db.begin().await?;
        lock_mutable_order(&txn, work_order_id).await?;

        let item = CatalogItem::find_by_id(input.catalog_item_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Catalog item", input.catalog_item_id))?;
        if !item.active {
            return Err(ServiceError::Conflict(format!(
                "Catalog item {} is inactive",
                item.id
            )));
        }

        let last = CostLine::find()
            .filter(cost_line::Column::WorkOrderId.eq(work_order_id))
            .order_by_desc(cost_line::Column::Position)
            .one(&txn)
            .await?;
        let position = last.map(|l| l.position + 1).unwrap_or(1);

        let line = cost_line::ActiveModel {
            id: Set(Uuid::new_v4()),
            work_order_id: Set(work_order_id),
            position: Set(position),
            catalog_item_id: Set(item.id),
            item_type: Set(item.item_type),
            description: Set(item.description),
            unit_cost: Set(item.unit_cost),
            quantity: Set(input.quantity),
            subtotal: Set(line_subtotal(item.unit_cost, input.quantity)),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CostLineAdded {
                work_order_id,
                line_id: line.id,
                subtotal: line.subtotal,
            })
            .await;
        info!(line_id = %line.id, subtotal = %line.subtotal, "Cost line added");
        Ok(line)
    }

    /// Changes a line's quantity and recomputes its subtotal.
    #[instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        line_id: Uuid,
        quantity: i32,
    ) -> Result<cost_line::Model, ServiceError> {
        ensure_positive_quantity(quantity)?;
        let now = self.clock.now();

        let txn = self.db.begin().await?;
        let line = CostLine::find_by_id(line_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Cost line", line_id))?;
        lock_mutable_order(&txn, line.work_order_id).await?;

        let subtotal = line_subtotal(line.unit_cost, quantity);
        let mut active: cost_line::ActiveModel = line.into();
        active.quantity = Set(quantity);
        active.subtotal = Set(subtotal);
        active.updated_at = Set(now);
        let line = active.update(&txn).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CostLineUpdated {
                work_order_id: line.work_order_id,
                line_id: line.id,
                quantity,
                subtotal,
            })
            .await;
        Ok(line)
    }

    /// Deletes a line. Lines of closed orders are kept.
    #[instrument(skip(self))]
    pub async fn remove_line(&self, line_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        let line = CostLine::find_by_id(line_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Cost line", line_id))?;
        let work_order_id = line.work_order_id;
        lock_mutable_order(&txn, work_order_id).await?;

        line.delete(&txn).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CostLineRemoved {
                work_order_id,
                line_id,
            })
            .await;
        Ok(())
    }

    /// Lines of an order in insertion order.
    pub async fn list_lines(&self, work_order_id: Uuid) -> Result<Vec<cost_line::Model>, ServiceError> {
        self.ensure_order_exists(work_order_id).await?;
        let lines = CostLine::find()
            .filter(cost_line::Column::WorkOrderId.eq(work_order_id))
            .order_by_asc(cost_line::Column::Position)
            .all(&*self.db)
            .await?;
        Ok(lines)
    }

    /// Totals over the order's current lines, at the configured tax rate.
    #[instrument(skip(self))]
    pub async fn compute_totals(&self, work_order_id: Uuid) -> Result<CostTotals, ServiceError> {
        let lines = self.list_lines(work_order_id).await?;
        let tax_rate = self.config.current().await.work_orders.tax_rate;
        Ok(CostTotals::from_subtotals(
            lines.iter().map(|l| l.subtotal),
            tax_rate,
        ))
    }

    async fn ensure_order_exists(&self, work_order_id: Uuid) -> Result<(), ServiceError> {
        WorkOrder::find_by_id(work_order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Work order", work_order_id))?;
        Ok(())
    }
}
