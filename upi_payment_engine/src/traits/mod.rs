//! The behaviour contracts that storage backends must implement to drive the payment engine.
//!
//! Each concern gets its own trait so that the APIs in [`crate::gateway_api`] can state exactly
//! which slice of the store they need:
//! * [`PaymentGatewayDatabase`]: the payment ledger itself (creation, lookup, the state machine).
//! * [`LinkManagement`]: payment link lifecycle.
//! * [`StatementManagement`]: bank statement upload bookkeeping.
//! * [`WebhookJournal`]: delivery-attempt bookkeeping owned by the webhook dispatcher.
mod link_management;
mod payment_gateway_database;
mod statement_management;
mod webhook_journal;

pub use link_management::LinkManagement;
pub use payment_gateway_database::{PaymentGatewayDatabase, PaymentGatewayError};
pub use statement_management::StatementManagement;
pub use webhook_journal::WebhookJournal;
