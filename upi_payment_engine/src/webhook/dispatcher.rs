use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use log::*;
use reqwest::Client;
use tokio::sync::watch;

use crate::{
    db_types::Payment,
    traits::{PaymentGatewayError, WebhookJournal},
    webhook::{sign_payload, WebhookConfig, WebhookOutcome, WebhookPayload, SIGNATURE_HEADER},
};

/// Delivers signed outcome notifications to merchant callback URLs.
///
/// One `deliver` call owns the full retry schedule for one payment: up to `max_attempts`
/// POSTs with exponentially growing delays in between, each attempt journaled on the payment
/// row as it happens. A per-payment claim keeps attempts strictly sequential even when a
/// redelivery sweep runs while a hook-triggered delivery is still backing off. The shutdown
/// channel cuts the backoff wait short, so a service restart is never blocked on a sleeping
/// dispatcher; the redelivery sweep finishes the job after the restart.
pub struct WebhookDispatcher<B> {
    db: B,
    client: Client,
    config: WebhookConfig,
    shutdown: watch::Receiver<bool>,
    /// Payment ids with a delivery loop currently running. Shared across clones, so the hook
    /// closures and the sweep see the same claims.
    in_flight: Arc<Mutex<HashSet<i64>>>,
}

impl<B: Clone> Clone for WebhookDispatcher<B> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            client: self.client.clone(),
            config: self.config.clone(),
            shutdown: self.shutdown.clone(),
            in_flight: self.in_flight.clone(),
        }
    }
}

impl<B> WebhookDispatcher<B>
where B: WebhookJournal
{
    pub fn new(
        db: B,
        config: WebhookConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, PaymentGatewayError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .danger_accept_invalid_certs(config.danger_accept_invalid_certs)
            .build()
            .map_err(|e| PaymentGatewayError::DeliveryFailure(format!("Could not build HTTP client: {e}")))?;
        Ok(Self { db, client, config, shutdown, in_flight: Arc::new(Mutex::new(HashSet::new())) })
    }

    /// Delivers the outcome notification for a settled payment, retrying on failure. Errors
    /// are logged and journaled rather than returned; nothing upstream can do better than the
    /// retry schedule already does. A payment with a delivery already in flight is skipped,
    /// so at most one attempt sequence runs per payment at a time.
    pub async fn deliver(&self, payment: Payment) {
        if !self.claim(payment.id) {
            debug!("📣️ A delivery for payment {} is already in flight. Skipping", payment.fingerprint);
            return;
        }
        self.run_delivery(&payment).await;
        self.release(payment.id);
    }

    async fn run_delivery(&self, payment: &Payment) {
        let Some(outcome) = WebhookOutcome::for_status(payment.status) else {
            warn!("📣️ Payment {} is still pending. There is no outcome to deliver", payment.fingerprint);
            return;
        };
        let secret = match self.db.fetch_webhook_secret(&payment.merchant_id).await {
            Ok(secret) => secret,
            Err(e) => {
                error!("📣️ Cannot sign webhook for payment {}: {e}", payment.fingerprint);
                return;
            },
        };
        let payload = WebhookPayload::for_payment(payment, outcome);
        let body = match serde_json::to_string(&payload) {
            Ok(body) => body,
            Err(e) => {
                error!("📣️ Cannot serialize webhook payload for payment {}: {e}", payment.fingerprint);
                return;
            },
        };
        let signature = sign_payload(secret.reveal(), &body);
        for attempt in 1..=self.config.max_attempts {
            debug!(
                "📣️ Delivering webhook for payment {} to {} (attempt {attempt}/{})",
                payment.fingerprint, payment.callback_url, self.config.max_attempts
            );
            let response = self
                .client
                .post(&payment.callback_url)
                .header("Content-Type", "application/json")
                .header(SIGNATURE_HEADER, &signature)
                .body(body.clone())
                .send()
                .await;
            let (delivered, summary) = match response {
                Ok(res) if res.status().is_success() => (true, format!("HTTP {}", res.status())),
                Ok(res) => (false, format!("HTTP {}", res.status())),
                Err(e) => (false, e.to_string()),
            };
            if let Err(e) = self.db.record_delivery_attempt(payment.id, &summary, delivered).await {
                error!("📣️ Could not journal delivery attempt for payment {}: {e}", payment.fingerprint);
            }
            if delivered {
                info!("📣️ Webhook for payment {} delivered on attempt {attempt}", payment.fingerprint);
                return;
            }
            warn!("📣️ Webhook attempt {attempt} for payment {} failed: {summary}", payment.fingerprint);
            if attempt < self.config.max_attempts && !self.backoff(attempt).await {
                info!("📣️ Shutdown requested. Abandoning delivery for payment {}", payment.fingerprint);
                return;
            }
        }
        error!(
            "📣️ Webhook for payment {} failed after {} attempts. Giving up until the next redelivery sweep",
            payment.fingerprint, self.config.max_attempts
        );
    }

    /// Re-attempts delivery for settled payments that never got their notification through.
    /// Returns the number of payments swept.
    pub async fn redeliver_unsent(&self, limit: i64) -> Result<usize, PaymentGatewayError> {
        let unsent = self.db.fetch_undelivered(self.config.max_attempts as i64, limit).await?;
        if unsent.is_empty() {
            return Ok(0);
        }
        info!("📣️ Redelivery sweep: {} undelivered notifications", unsent.len());
        let count = unsent.len();
        for payment in unsent {
            self.deliver(payment).await;
        }
        Ok(count)
    }

    fn claim(&self, payment_id: i64) -> bool {
        self.in_flight.lock().map(|mut claims| claims.insert(payment_id)).unwrap_or(false)
    }

    fn release(&self, payment_id: i64) {
        if let Ok(mut claims) = self.in_flight.lock() {
            claims.remove(&payment_id);
        }
    }

    /// Sleeps out the backoff for the given attempt number. Returns false if a shutdown signal
    /// interrupted the wait.
    async fn backoff(&self, attempt: u32) -> bool {
        let delay = self.config.retry_delay * 2u32.saturating_pow(attempt - 1);
        trace!("📣️ Backing off for {delay:?}");
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = shutdown.changed() => !*shutdown.borrow(),
        }
    }
}
