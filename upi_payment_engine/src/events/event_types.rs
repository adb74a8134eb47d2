use serde::Serialize;

use crate::db_types::Payment;

/// Fired exactly once when a payment transitions `PENDING` → `CONFIRMED`. The wrapped payment is
/// the post-transition record, UTR and verifier included.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentConfirmedEvent {
    pub payment: Payment,
}

impl PaymentConfirmedEvent {
    pub fn new(payment: Payment) -> Self {
        Self { payment }
    }
}

/// Fired exactly once when a payment transitions `PENDING` → `DECLINED`.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentDeclinedEvent {
    pub payment: Payment,
}

impl PaymentDeclinedEvent {
    pub fn new(payment: Payment) -> Self {
        Self { payment }
    }
}

#[derive(Debug, Clone)]
pub enum EventType {
    PaymentConfirmed(PaymentConfirmedEvent),
    PaymentDeclined(PaymentDeclinedEvent),
}
