//! sea-orm entities for the repair desk schema.

pub mod catalog_item;
pub mod client;
pub mod cost_line;
pub mod equipment;
pub mod order_sequence;
pub mod otp_challenge;
pub mod technical_sheet;
pub mod technician;
pub mod work_order;

pub use catalog_item::{CatalogItemType, Entity as CatalogItem};
pub use client::Entity as Client;
pub use cost_line::Entity as CostLine;
pub use equipment::Entity as Equipment;
pub use order_sequence::Entity as OrderSequence;
pub use otp_challenge::{Entity as OtpChallenge, OtpPurpose};
pub use technical_sheet::Entity as TechnicalSheet;
pub use technician::Entity as Technician;
pub use work_order::{Entity as WorkOrder, WorkOrderStatus};
