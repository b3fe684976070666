use crate::{
    documents::{
        CostLineSummary, DeliverySummary, DocumentRenderer, DocumentSummary, EquipmentSummary,
        IntakeSummary, PartySummary,
    },
    entities::{client, equipment, technician},
    errors::ServiceError,
    services::{costs::CostLedgerService, work_orders::WorkOrderService},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// A rendered document ready to be sent to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedDocument {
    pub file_name: String,
    pub content_type: &'static str,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

/// Assembles intake and delivery summaries and hands them to the renderer.
#[derive(Clone)]
pub struct DocumentService {
    work_orders: Arc<WorkOrderService>,
    costs: Arc<CostLedgerService>,
    renderer: Arc<dyn DocumentRenderer>,
}

fn parties(
    client: &client::Model,
    technician: &technician::Model,
) -> PartySummary {
    PartySummary {
        client_id: client.id.clone(),
        client_name: client.name.clone(),
        client_email: client.email.clone(),
        client_phone: client.phone.clone(),
        technician_id: technician.id.clone(),
        technician_name: technician.name.clone(),
    }
}

fn equipment_summary(equipment: &equipment::Model) -> EquipmentSummary {
    EquipmentSummary {
        id: equipment.id.clone(),
        kind: equipment.kind.clone(),
        brand: equipment.brand.clone(),
        model: equipment.model_name.clone(),
        serial_number: equipment.serial_number.clone(),
    }
}

impl DocumentService {
    pub fn new(
        work_orders: Arc<WorkOrderService>,
        costs: Arc<CostLedgerService>,
        renderer: Arc<dyn DocumentRenderer>,
    ) -> Self {
        Self {
            work_orders,
            costs,
            renderer,
        }
    }

    /// Builds the intake summary of an order.
    pub async fn intake_summary(&self, id: Uuid) -> Result<IntakeSummary, ServiceError> {
        let view = self.work_orders.get_intake_view(id).await?;
        Ok(IntakeSummary {
            order_number: view.order_number,
            created_at: view.created_at,
            status: view.status,
            parties: parties(&view.client, &view.technician),
            equipment: equipment_summary(&view.equipment),
            contact_medium: view.contact_medium,
            accessories: view.accessories,
            reported_problem: view.reported_problem,
            intake_observations: view.intake_observations,
            service_type: view.service_type,
            priority: view.priority,
            conditions_accepted: view.conditions_accepted,
        })
    }

    /// Builds the delivery summary with a totals snapshot taken now.
    pub async fn delivery_summary(&self, id: Uuid) -> Result<DeliverySummary, ServiceError> {
        let detail = self.work_orders.get_detail(id).await?;
        let lines = self.costs.list_lines(id).await?;
        let totals = self.costs.compute_totals(id).await?;

        let order = detail.order;
        Ok(DeliverySummary {
            order_number: order.order_number,
            status: order.status,
            parties: parties(&detail.client, &detail.technician),
            equipment: equipment_summary(&detail.equipment),
            reported_problem: order.reported_problem,
            diagnosis: order.diagnosis,
            recommendations: order.recommendations,
            modality: order.modality,
            delivered_at: order.delivered_at,
            invoice_number: order.invoice_number,
            payment_method: order.payment_method,
            technician_signed: order.delivery_technician_signed,
            client_signed: order.delivery_client_signed,
            received_satisfied: order.received_satisfied,
            lines: lines
                .into_iter()
                .map(|l| CostLineSummary {
                    position: l.position,
                    item_type: l.item_type,
                    description: l.description,
                    unit_cost: l.unit_cost,
                    quantity: l.quantity,
                    subtotal: l.subtotal,
                })
                .collect(),
            subtotal: totals.subtotal,
            tax: totals.tax,
            total: totals.total,
        })
    }

    #[instrument(skip(self))]
    pub async fn render_intake(&self, id: Uuid) -> Result<RenderedDocument, ServiceError> {
        let summary = DocumentSummary::Intake(self.intake_summary(id).await?);
        self.render(summary).await
    }

    #[instrument(skip(self))]
    pub async fn render_delivery(&self, id: Uuid) -> Result<RenderedDocument, ServiceError> {
        let summary = DocumentSummary::Delivery(self.delivery_summary(id).await?);
        self.render(summary).await
    }

    async fn render(&self, summary: DocumentSummary) -> Result<RenderedDocument, ServiceError> {
        let bytes = self.renderer.render(&summary).await?;
        let file_name = summary.file_name(self.renderer.extension());
        info!(%file_name, size = bytes.len(), "Document rendered");
        Ok(RenderedDocument {
            file_name,
            content_type: self.renderer.content_type(),
            bytes,
        })
    }
}
