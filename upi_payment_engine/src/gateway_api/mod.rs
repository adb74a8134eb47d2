//! The public APIs of the payment engine. Each API owns one slice of the flow: payment
//! creation and verification, payment links, and bank statement reconciliation. They are thin,
//! backend-generic orchestrators; the hard invariants live at the storage boundary.
pub mod payment_flow_api;
pub mod payment_link_api;
pub mod reconciliation_api;

pub use payment_flow_api::{CreatedPayment, PaymentFlowApi};
pub use payment_link_api::{PaymentLinkApi, ResolvedLink};
pub use reconciliation_api::{ReconciliationApi, ReconciliationSummary};
