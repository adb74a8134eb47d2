//! UPI Payment Engine
//!
//! The UPI Payment Engine is a service that lets merchants accept and track UPI and bank-transfer
//! payments. This library contains the core logic for the payment engine. It is provider-agnostic.
//!
//! The library is divided into two main sections:
//! 1. Database management and control. Currently, Sqlite is the supported backend. You should
//!    never need to access the database directly. Instead, use the public API provided by the
//!    payment engine. The exception is the data types used in the database. These are defined in
//!    the [`db_types`] module and are public.
//! 2. The payment engine public API ([`PaymentFlowApi`], [`PaymentLinkApi`] and
//!    [`ReconciliationApi`]). These provide the public-facing functionality of the engine:
//!    payment lifecycle management, shareable payment links, and bank statement reconciliation.
//!    Specific backends need to implement the traits in the [`traits`] module in order to act as
//!    a backend for the payment server.
//!
//! The engine also provides a set of events that can be subscribed to. These events are emitted
//! when a payment reaches a terminal state. A simple actor framework is used so that you can
//! easily hook into these events and perform custom actions; the [`webhook`] module uses exactly
//! this mechanism to deliver signed merchant notifications.
mod gateway_api;
#[cfg(feature = "sqlite")]
mod sqlite;

pub mod db_types;
pub mod events;
pub mod helpers;
pub mod statement;
pub mod traits;
pub mod webhook;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use gateway_api::{
    CreatedPayment,
    PaymentFlowApi,
    PaymentLinkApi,
    ReconciliationApi,
    ReconciliationSummary,
    ResolvedLink,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{LinkManagement, PaymentGatewayDatabase, PaymentGatewayError, StatementManagement, WebhookJournal};
