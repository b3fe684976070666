pub mod consultation;
pub mod costs;
pub mod documents;
pub mod otp;
pub mod work_orders;

pub use consultation::ConsultationService;
pub use costs::{CostLedgerService, CostTotals};
pub use documents::DocumentService;
pub use otp::OtpService;
pub use work_orders::WorkOrderService;
