//! Document summaries and the renderer seam.
//!
//! The domain assembles plain snapshots; turning them into a PDF (or any
//! other format) is the renderer's job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entities::{CatalogItemType, WorkOrderStatus};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Rendering engine failed: {0}")]
    Engine(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartySummary {
    pub client_id: String,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: Option<String>,
    pub technician_id: String,
    pub technician_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentSummary {
    pub id: String,
    pub kind: String,
    pub brand: String,
    pub model: String,
    pub serial_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostLineSummary {
    pub position: i32,
    pub item_type: CatalogItemType,
    pub description: String,
    pub unit_cost: Decimal,
    pub quantity: i32,
    pub subtotal: Decimal,
}

/// Intake receipt handed to the client when the equipment is left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntakeSummary {
    pub order_number: String,
    pub created_at: DateTime<Utc>,
    pub status: WorkOrderStatus,
    pub parties: PartySummary,
    pub equipment: EquipmentSummary,
    pub contact_medium: Option<String>,
    pub accessories: Option<String>,
    pub reported_problem: String,
    pub intake_observations: Option<String>,
    pub service_type: String,
    pub priority: String,
    pub conditions_accepted: bool,
}

/// Delivery certificate; totals are a snapshot taken at render time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliverySummary {
    pub order_number: String,
    pub status: WorkOrderStatus,
    pub parties: PartySummary,
    pub equipment: EquipmentSummary,
    pub reported_problem: String,
    pub diagnosis: Option<String>,
    pub recommendations: Option<String>,
    pub modality: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub invoice_number: Option<String>,
    pub payment_method: Option<String>,
    pub technician_signed: bool,
    pub client_signed: bool,
    pub received_satisfied: bool,
    pub lines: Vec<CostLineSummary>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "document", rename_all = "snake_case")]
pub enum DocumentSummary {
    Intake(IntakeSummary),
    Delivery(DeliverySummary),
}

impl DocumentSummary {
    pub fn file_name(&self, extension: &str) -> String {
        match self {
            DocumentSummary::Intake(s) => format!("intake-{}.{}", s.order_number, extension),
            DocumentSummary::Delivery(s) => format!("delivery-{}.{}", s.order_number, extension),
        }
    }
}

#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    /// MIME type of the bytes produced by [`DocumentRenderer::render`].
    fn content_type(&self) -> &'static str;

    /// File extension matching the content type, without the dot.
    fn extension(&self) -> &'static str;

    async fn render(&self, summary: &DocumentSummary) -> Result<Vec<u8>, RenderError>;
}

/// Renders summaries as pretty-printed JSON.
#[derive(Debug, Clone, Default)]
pub struct JsonDocumentRenderer;

#[async_trait]
impl DocumentRenderer for JsonDocumentRenderer {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn extension(&self) -> &'static str {
        "json"
    }

    async fn render(&self, summary: &DocumentSummary) -> Result<Vec<u8>, RenderError> {
        Ok(serde_json::to_vec_pretty(summary)?)
    }
}
