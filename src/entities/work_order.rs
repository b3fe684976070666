use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Work order lifecycle state.
///
/// Forward order is the declaration order; `Closed` is terminal.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum WorkOrderStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "IN_DIAGNOSIS")]
    InDiagnosis,
    #[sea_orm(string_value = "IN_REPAIR")]
    InRepair,
    #[sea_orm(string_value = "READY")]
    Ready,
    #[sea_orm(string_value = "CLOSED")]
    Closed,
}

impl WorkOrderStatus {
    pub fn is_terminal(self) -> bool {
        self == WorkOrderStatus::Closed
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "work_orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub order_number: String,

    pub client_id: String,
    pub technician_id: String,
    pub equipment_id: String,

    // Intake, fixed at creation.
    #[sea_orm(nullable)]
    pub contact_medium: Option<String>,
    #[sea_orm(nullable)]
    pub device_password: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub accessories: Option<String>,
    #[sea_orm(column_type = "Text")]
    pub reported_problem: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub intake_observations: Option<String>,
    pub conditions_accepted: bool,

    // Reception gate.
    #[sea_orm(nullable)]
    pub reception_at: Option<DateTime<Utc>>,
    pub reception_technician_signed: bool,
    pub reception_client_signed: bool,

    pub service_type: String,
    pub priority: String,
    pub status: WorkOrderStatus,

    // Delivery, filled at entrega.
    #[sea_orm(column_type = "Text", nullable)]
    pub diagnosis: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub recommendations: Option<String>,
    #[sea_orm(nullable)]
    pub modality: Option<String>,
    #[sea_orm(nullable)]
    pub delivered_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub invoice_number: Option<String>,
    #[sea_orm(nullable)]
    pub payment_method: Option<String>,
    pub delivery_technician_signed: bool,
    pub delivery_client_signed: bool,
    pub received_satisfied: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::client::Entity",
        from = "Column::ClientId",
        to = "super::client::Column::Id"
    )]
    Client,
    #[sea_orm(
        belongs_to = "super::technician::Entity",
        from = "Column::TechnicianId",
        to = "super::technician::Column::Id"
    )]
    Technician,
    #[sea_orm(
        belongs_to = "super::equipment::Entity",
        from = "Column::EquipmentId",
        to = "super::equipment::Column::Id"
    )]
    Equipment,
    #[sea_orm(has_many = "super::cost_line::Entity")]
    CostLines,
    #[sea_orm(has_one = "super::technical_sheet::Entity")]
    TechnicalSheet,
}

impl Related<super::client::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Client.def()
    }
}

impl Related<super::technician::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Technician.def()
    }
}

impl Related<super::equipment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Equipment.def()
    }
}

impl Related<super::cost_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CostLines.def()
    }
}

impl Related<super::technical_sheet::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TechnicalSheet.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!(
            WorkOrderStatus::from_str("in_diagnosis").unwrap(),
            WorkOrderStatus::InDiagnosis
        );
        assert_eq!(
            WorkOrderStatus::from_str("READY").unwrap(),
            WorkOrderStatus::Ready
        );
        assert!(WorkOrderStatus::from_str("WAITING_PARTS").is_err());
    }

    #[test]
    fn status_displays_as_stored() {
        assert_eq!(WorkOrderStatus::InRepair.to_string(), "IN_REPAIR");
        assert_eq!(WorkOrderStatus::Closed.to_string(), "CLOSED");
    }

    #[test]
    fn forward_order_follows_declaration() {
        assert!(WorkOrderStatus::Pending < WorkOrderStatus::InDiagnosis);
        assert!(WorkOrderStatus::InRepair < WorkOrderStatus::Ready);
        assert!(WorkOrderStatus::Closed.is_terminal());
        assert!(!WorkOrderStatus::Ready.is_terminal());
    }
}
