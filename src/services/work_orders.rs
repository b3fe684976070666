use crate::{
    clock::Clock,
    config::ConfigHandle,
    entities::{
        client, equipment, order_sequence, order_sequence::WORK_ORDER_SEQUENCE, technical_sheet,
        technician, work_order, Client, Equipment, OrderSequence, TechnicalSheet, Technician,
        WorkOrder, WorkOrderStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Intake data captured when the equipment is received.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct IntakeFields {
    #[validate(length(max = 50))]
    pub contact_medium: Option<String>,
    #[validate(length(max = 100))]
    pub device_password: Option<String>,
    #[validate(length(max = 500))]
    pub accessories: Option<String>,
    #[validate(length(min = 1, max = 2000))]
    pub reported_problem: String,
    #[validate(length(max = 2000))]
    pub intake_observations: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Classification {
    #[validate(length(min = 1, max = 50))]
    pub service_type: String,
    #[validate(length(min = 1, max = 20))]
    pub priority: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateWorkOrderInput {
    #[validate(length(min = 1))]
    pub client_id: String,
    /// Falls back to the calling technician when absent.
    pub technician_id: Option<String>,
    #[validate(length(min = 1))]
    pub equipment_id: String,
    #[validate]
    pub intake: IntakeFields,
    #[validate]
    pub classification: Classification,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct DeliveryInput {
    #[validate(length(max = 4000))]
    pub diagnosis: Option<String>,
    #[validate(length(max = 4000))]
    pub recommendations: Option<String>,
    #[validate(length(max = 50))]
    pub modality: Option<String>,
    /// Defaults to now.
    pub delivered_at: Option<DateTime<Utc>>,
    #[validate(length(max = 50))]
    pub invoice_number: Option<String>,
    #[validate(length(max = 50))]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub technician_signed: bool,
    #[serde(default)]
    pub client_signed: bool,
    #[serde(default)]
    pub received_satisfied: bool,
    #[validate(length(min = 1, max = 50))]
    pub service_type: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub priority: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TechnicalSheetInput {
    #[validate(length(min = 1, max = 50))]
    pub sheet_number: String,
    #[validate(length(min = 1, max = 4000))]
    pub findings: String,
    #[validate(length(max = 4000))]
    pub components: Option<String>,
    #[validate(length(max = 4000))]
    pub observations: Option<String>,
}

/// Read-only projection of the intake receipt.
#[derive(Debug, Clone, Serialize)]
pub struct IntakeView {
    pub id: Uuid,
    pub order_number: String,
    pub status: WorkOrderStatus,
    pub created_at: DateTime<Utc>,
    pub client: client::Model,
    pub technician: technician::Model,
    pub equipment: equipment::Model,
    pub contact_medium: Option<String>,
    pub device_password: Option<String>,
    pub accessories: Option<String>,
    pub reported_problem: String,
    pub intake_observations: Option<String>,
    pub conditions_accepted: bool,
    pub service_type: String,
    pub priority: String,
}

/// Full order snapshot; `technical_sheet` is `None` when no sheet was recorded.
#[derive(Debug, Clone, Serialize)]
pub struct WorkOrderDetail {
    #[serde(flatten)]
    pub order: work_order::Model,
    pub client: client::Model,
    pub technician: technician::Model,
    pub equipment: equipment::Model,
    pub technical_sheet: Option<technical_sheet::Model>,
}

/// Formats the human-facing order number, e.g. `OT-00042`.
pub fn format_order_number(prefix: &str, width: usize, value: i64) -> String {
    format!("{}{:0width$}", prefix, value, width = width)
}

/// Rejects any mutation of a closed order.
pub fn ensure_mutable(order: &work_order::Model) -> Result<(), ServiceError> {
    if order.status.is_terminal() {
        return Err(ServiceError::Conflict(format!(
            "Work order {} is closed",
            order.order_number
        )));
    }
    Ok(())
}

/// Re-reads the order under an exclusive row lock and checks it is still mutable.
///
/// Must run inside a transaction for the lock to mean anything.
pub(crate) async fn lock_mutable_order<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<work_order::Model, ServiceError> {
    let order = WorkOrder::find_by_id(id)
        .lock_exclusive()
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Work order", id))?;
    ensure_mutable(&order)?;
    Ok(order)
}

/// Service for the work order lifecycle: intake, progress, delivery.
#[derive(Clone)]
pub struct WorkOrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: ConfigHandle,
    clock: Arc<dyn Clock>,
}

impl WorkOrderService {
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

    /// Creates a work order in PENDING state.
    ///
    /// `actor_technician_id` is the identity of the caller; it is used when the
    /// input names no technician. The order number comes from an atomic counter
    /// bumped inside the same transaction as the insert.
    #[instrument(skip(self, input), fields(client_id = %input.client_id))]
    pub async fn create_order(
        &self,
        input: CreateWorkOrderInput,
        actor_technician_id: Option<&str>,
    ) -> Result<work_order::Model, ServiceError> {
        input.validate()?;

        let technician_id = input
            .technician_id
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| actor_technician_id.map(str::to_string))
            .ok_or_else(|| {
                ServiceError::ValidationError(
                    "technician_id is required when the caller is not a technician".to_string(),
                )
            })?;

        let db = &*self.db;
        let client = Client::find_by_id(input.client_id.clone())
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Client", &input.client_id))?;
        Technician::find_by_id(technician_id.clone())
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Technician", &technician_id))?;
        let equipment = Equipment::find_by_id(input.equipment_id.clone())
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Equipment", &input.equipment_id))?;

        if equipment.client_id != client.id {
            return Err(ServiceError::ValidationError(format!(
                "Equipment {} does not belong to client {}",
                equipment.id, client.id
            )));
        }

        let cfg = self.config.current().await;
        let now = self.clock.now();

        let txn = db.begin().await?;
        let sequence = next_sequence_value(&txn, WORK_ORDER_SEQUENCE).await?;
        let order_number = format_order_number(
            &cfg.work_orders.number_prefix,
            cfg.work_orders.number_width,
            sequence,
        );

        let intake = input.intake;
        let order = work_order::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_number: Set(order_number),
            client_id: Set(client.id),
            technician_id: Set(technician_id),
            equipment_id: Set(equipment.id),
            contact_medium: Set(intake.contact_medium),
            device_password: Set(intake.device_password),
            accessories: Set(intake.accessories),
            reported_problem: Set(intake.reported_problem),
            intake_observations: Set(intake.intake_observations),
            conditions_accepted: Set(true),
            reception_at: Set(None),
            reception_technician_signed: Set(false),
            reception_client_signed: Set(false),
            service_type: Set(input.classification.service_type),
            priority: Set(input.classification.priority),
            status: Set(WorkOrderStatus::Pending),
            diagnosis: Set(None),
            recommendations: Set(None),
            modality: Set(None),
            delivered_at: Set(None),
            invoice_number: Set(None),
            payment_method: Set(None),
            delivery_technician_signed: Set(false),
            delivery_client_signed: Set(false),
            received_satisfied: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::WorkOrderCreated {
                work_order_id: order.id,
                order_number: order.order_number.clone(),
                client_id: order.client_id.clone(),
                technician_id: order.technician_id.clone(),
            })
            .await;

        info!(order_number = %order.order_number, "Work order created");
        Ok(order)
    }

    /// Returns the intake projection of an order.
    #[instrument(skip(self))]
    pub async fn get_intake_view(&self, id: Uuid) -> Result<IntakeView, ServiceError> {
        let (order, client, technician, equipment) = self.load_with_parties(id).await?;
        Ok(IntakeView {
            id: order.id,
            order_number: order.order_number,
            status: order.status,
            created_at: order.created_at,
            client,
            technician,
            equipment,
            contact_medium: order.contact_medium,
            device_password: order.device_password,
            accessories: order.accessories,
            reported_problem: order.reported_problem,
            intake_observations: order.intake_observations,
            conditions_accepted: order.conditions_accepted,
            service_type: order.service_type,
            priority: order.priority,
        })
    }

    /// Returns the full order, its parties and its technical sheet, if any.
    #[instrument(skip(self))]
    pub async fn get_detail(&self, id: Uuid) -> Result<WorkOrderDetail, ServiceError> {
        let (order, client, technician, equipment) = self.load_with_parties(id).await?;
        let technical_sheet = TechnicalSheet::find()
            .filter(technical_sheet::Column::WorkOrderId.eq(id))
            .one(&*self.db)
            .await?;
        Ok(WorkOrderDetail {
            order,
            client,
            technician,
            equipment,
            technical_sheet,
        })
    }

    pub async fn get_order(&self, id: Uuid) -> Result<work_order::Model, ServiceError> {
        WorkOrder::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Work order", id))
    }

    /// All orders, newest first.
    pub async fn list_orders(&self) -> Result<Vec<work_order::Model>, ServiceError> {
        self.list_filtered(None, None).await
    }

    pub async fn list_by_technician(
        &self,
        technician_id: &str,
    ) -> Result<Vec<work_order::Model>, ServiceError> {
        self.list_filtered(Some(technician_id), None).await
    }

    pub async fn list_by_client(
        &self,
        client_id: &str,
    ) -> Result<Vec<work_order::Model>, ServiceError> {
        self.list_filtered(None, Some(client_id)).await
    }

    /// Lists orders matching the optional filters, newest first.
    pub async fn list_filtered(
        &self,
        technician_id: Option<&str>,
        client_id: Option<&str>,
    ) -> Result<Vec<work_order::Model>, ServiceError> {
        let mut query = WorkOrder::find();
        if let Some(technician_id) = technician_id {
            query = query.filter(work_order::Column::TechnicianId.eq(technician_id));
        }
        if let Some(client_id) = client_id {
            query = query.filter(work_order::Column::ClientId.eq(client_id));
        }
        let orders = query
            .order_by_desc(work_order::Column::CreatedAt)
            .order_by_desc(work_order::Column::OrderNumber)
            .all(&*self.db)
            .await?;
        Ok(orders)
    }

    /// Records reception: timestamp plus both reception signatures.
    #[instrument(skip(self))]
    pub async fn confirm_reception(
        &self,
        id: Uuid,
        at: Option<DateTime<Utc>>,
    ) -> Result<work_order::Model, ServiceError> {
        let now = self.clock.now();
        let txn = self.db.begin().await?;
        let order = lock_mutable_order(&txn, id).await?;
        if order.reception_at.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Reception of work order {} is already confirmed",
                order.order_number
            )));
        }

        let reception_at = at.unwrap_or(now);
        let mut active: work_order::ActiveModel = order.into();
        active.reception_at = Set(Some(reception_at));
        active.reception_technician_signed = Set(true);
        active.reception_client_signed = Set(true);
        active.updated_at = Set(now);
        let order = active.update(&txn).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::ReceptionConfirmed {
                work_order_id: order.id,
                at: reception_at,
            })
            .await;
        Ok(order)
    }

    /// Moves an open order to another non-terminal status.
    ///
    /// Backward moves need `administrative_override`. CLOSED is only reachable
    /// through [`WorkOrderService::record_delivery`].
    #[instrument(skip(self))]
    pub async fn change_status(
        &self,
        id: Uuid,
        status: &str,
        administrative_override: bool,
    ) -> Result<work_order::Model, ServiceError> {
        let target = WorkOrderStatus::from_str(status.trim()).map_err(|_| {
            ServiceError::ValidationError(format!("Unknown work order status '{}'", status))
        })?;
        if target == WorkOrderStatus::Closed {
            return Err(ServiceError::ValidationError(
                "Orders are closed by recording the delivery".to_string(),
            ));
        }

        let now = self.clock.now();
        let txn = self.db.begin().await?;
        let order = lock_mutable_order(&txn, id).await?;
        let from = order.status;
        if from == target {
            txn.commit().await?;
            return Ok(order);
        }
        if target < from && !administrative_override {
            return Err(ServiceError::Conflict(format!(
                "Work order {} cannot move back from {} to {} without an administrative override",
                order.order_number, from, target
            )));
        }

        let mut active: work_order::ActiveModel = order.into();
        active.status = Set(target);
        active.updated_at = Set(now);
        let order = active.update(&txn).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::StatusChanged {
                work_order_id: order.id,
                from,
                to: target,
                administrative_override,
            })
            .await;
        info!(order_number = %order.order_number, %from, to = %target, "Work order status changed");
        Ok(order)
    }

    /// Creates or replaces the order's technical sheet.
    #[instrument(skip(self, input))]
    pub async fn record_technical_sheet(
        &self,
        id: Uuid,
        input: TechnicalSheetInput,
    ) -> Result<technical_sheet::Model, ServiceError> {
        input.validate()?;
        let now = self.clock.now();

        let txn = self.db.begin().await?;
        lock_mutable_order(&txn, id).await?;
        let existing = TechnicalSheet::find()
            .filter(technical_sheet::Column::WorkOrderId.eq(id))
            .one(&txn)
            .await?;

        let sheet = match existing {
            Some(sheet) => {
                let mut active: technical_sheet::ActiveModel = sheet.into();
                active.sheet_number = Set(input.sheet_number);
                active.findings = Set(input.findings);
                active.components = Set(input.components);
                active.observations = Set(input.observations);
                active.updated_at = Set(now);
                active.update(&txn).await?
            }
            None => {
                technical_sheet::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    work_order_id: Set(id),
                    sheet_number: Set(input.sheet_number),
                    findings: Set(input.findings),
                    components: Set(input.components),
                    observations: Set(input.observations),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await?
            }
        };
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::TechnicalSheetRecorded {
                work_order_id: id,
                sheet_number: sheet.sheet_number.clone(),
            })
            .await;
        Ok(sheet)
    }

    /// Records the delivery and closes the order.
    ///
    /// Closed orders are rejected with `Conflict`. Cost lines are not touched.
    #[instrument(skip(self, input))]
    pub async fn record_delivery(
        &self,
        id: Uuid,
        input: DeliveryInput,
    ) -> Result<work_order::Model, ServiceError> {
        input.validate()?;
        let now = self.clock.now();
        let delivered_at = input.delivered_at.unwrap_or(now);

        let txn = self.db.begin().await?;
        let order = lock_mutable_order(&txn, id).await?;

        let mut active: work_order::ActiveModel = order.into();
        active.diagnosis = Set(input.diagnosis);
        active.recommendations = Set(input.recommendations);
        active.modality = Set(input.modality);
        active.delivered_at = Set(Some(delivered_at));
        active.invoice_number = Set(input.invoice_number);
        active.payment_method = Set(input.payment_method);
        active.delivery_technician_signed = Set(input.technician_signed);
        active.delivery_client_signed = Set(input.client_signed);
        active.received_satisfied = Set(input.received_satisfied);
        if let Some(service_type) = input.service_type {
            active.service_type = Set(service_type);
        }
        if let Some(priority) = input.priority {
            active.priority = Set(priority);
        }
        active.status = Set(WorkOrderStatus::Closed);
        active.updated_at = Set(now);
        let order = active.update(&txn).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::Delivered {
                work_order_id: order.id,
                delivered_at,
            })
            .await;
        info!(order_number = %order.order_number, "Work order delivered and closed");
        Ok(order)
    }

    async fn load_with_parties(
        &self,
        id: Uuid,
    ) -> Result<
        (
            work_order::Model,
            client::Model,
            technician::Model,
            equipment::Model,
        ),
        ServiceError,
    > {
        let db = &*self.db;
        let order = self.get_order(id).await?;
        let client = Client::find_by_id(order.client_id.clone())
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Client", &order.client_id))?;
        let technician = Technician::find_by_id(order.technician_id.clone())
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Technician", &order.technician_id))?;
        let equipment = Equipment::find_by_id(order.equipment_id.clone())
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Equipment", &order.equipment_id))?;
        Ok((order, client, technician, equipment))
    }
}

/// Bumps a named counter and returns the new value.
///
/// The increment is a single `UPDATE ... SET value = value + 1`, so concurrent
/// transactions serialize on the row instead of racing on a read.
async fn next_sequence_value<C: ConnectionTrait>(conn: &C, name: &str) -> Result<i64, ServiceError> {
    let updated = OrderSequence::update_many()
        .col_expr(
            order_sequence::Column::Value,
            Expr::col(order_sequence::Column::Value).add(1),
        )
        .filter(order_sequence::Column::Name.eq(name))
        .exec(conn)
        .await?;

    if updated.rows_affected == 0 {
        order_sequence::ActiveModel {
            name: Set(name.to_string()),
            value: Set(1),
        }
        .insert(conn)
        .await?;
        return Ok(1);
    }

    let row = OrderSequence::find_by_id(name.to_string())
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::InternalError(format!("Sequence {} vanished", name)))?;
    Ok(row.value)
}
