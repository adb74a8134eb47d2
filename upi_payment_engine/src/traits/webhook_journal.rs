use std::future::Future;

use upg_common::Secret;

use crate::{db_types::Payment, traits::PaymentGatewayError};

/// Delivery bookkeeping for the webhook dispatcher, which is the only writer of these fields.
/// Counters are mutated via conditional updates at the storage boundary, never via in-process
/// shared state, so multiple service instances stay consistent.
///
/// The methods are spelled out as `impl Future + Send` rather than `async fn` because the
/// dispatcher runs inside spawned event-handler tasks, which need the futures to be `Send`.
pub trait WebhookJournal: Clone {
    /// Increments the payment's delivery-attempt counter and records the latest response or
    /// error text. `delivered` latches to true once any attempt succeeds.
    fn record_delivery_attempt(
        &self,
        payment_id: i64,
        response: &str,
        delivered: bool,
    ) -> impl Future<Output = Result<(), PaymentGatewayError>> + Send;

    /// The signing secret for the given merchant's webhooks.
    fn fetch_webhook_secret(
        &self,
        merchant_id: &str,
    ) -> impl Future<Output = Result<Secret<String>, PaymentGatewayError>> + Send;

    /// Terminal payments whose notification has not been delivered and whose attempt counter is
    /// still below the ceiling. The input for the redelivery sweep.
    fn fetch_undelivered(
        &self,
        max_attempts: i64,
        limit: i64,
    ) -> impl Future<Output = Result<Vec<Payment>, PaymentGatewayError>> + Send;
}
