//! Audit events.
//!
//! Every successful mutating operation sends one [`Event`]; the audit
//! subscriber ([`process_events`]) writes them out as structured records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::{OtpPurpose, WorkOrderStatus};

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a sender together with its receiving end.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the subscriber is gone.
    pub async fn send_or_log(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.send(event).await {
            warn!(event = name, error = %e, "Audit event dropped");
        }
    }
}

/// Why an OTP validation was turned down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OtpRejection {
    NotFound,
    PurposeMismatch,
    Expired,
    Locked,
    Incorrect,
    AlreadyUsed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    WorkOrderCreated {
        work_order_id: Uuid,
        order_number: String,
        client_id: String,
        technician_id: String,
    },
    ReceptionConfirmed {
        work_order_id: Uuid,
        at: DateTime<Utc>,
    },
    StatusChanged {
        work_order_id: Uuid,
        from: WorkOrderStatus,
        to: WorkOrderStatus,
        administrative_override: bool,
    },
    TechnicalSheetRecorded {
        work_order_id: Uuid,
        sheet_number: String,
    },
    Delivered {
        work_order_id: Uuid,
        delivered_at: DateTime<Utc>,
    },
    CostLineAdded {
        work_order_id: Uuid,
        line_id: Uuid,
        subtotal: Decimal,
    },
    CostLineUpdated {
        work_order_id: Uuid,
        line_id: Uuid,
        quantity: i32,
        subtotal: Decimal,
    },
    CostLineRemoved {
        work_order_id: Uuid,
        line_id: Uuid,
    },
    OtpIssued {
        user_id: String,
        purpose: OtpPurpose,
        challenge_id: Uuid,
    },
    OtpValidated {
        user_id: String,
        challenge_id: Uuid,
    },
    OtpRejected {
        user_id: String,
        reason: OtpRejection,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::WorkOrderCreated { .. } => "work_order.created",
            Event::ReceptionConfirmed { .. } => "work_order.reception_confirmed",
            Event::StatusChanged { .. } => "work_order.status_changed",
            Event::TechnicalSheetRecorded { .. } => "work_order.technical_sheet_recorded",
            Event::Delivered { .. } => "work_order.delivered",
            Event::CostLineAdded { .. } => "cost_line.added",
            Event::CostLineUpdated { .. } => "cost_line.updated",
            Event::CostLineRemoved { .. } => "cost_line.removed",
            Event::OtpIssued { .. } => "otp.issued",
            Event::OtpValidated { .. } => "otp.validated",
            Event::OtpRejected { .. } => "otp.rejected",
        }
    }
}

/// Audit subscriber: drains the channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        let name = event.name();
        match serde_json::to_string(&event) {
            Ok(payload) => info!(target: "audit", event = name, %payload, "audit"),
            Err(e) => warn!(target: "audit", event = name, error = %e, "unserializable audit event"),
        }
    }

    info!("Event processing loop stopped");
}
