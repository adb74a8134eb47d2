//! Merchant webhook notifications.
//!
//! When a payment reaches a terminal state, the merchant is told about it with a signed HTTP
//! POST to the payment's callback URL. Delivery is at-least-once with bounded retries; the
//! attempt counter and last response live on the payment row, so a redelivery sweep can pick
//! up where a crashed dispatcher left off.
mod dispatcher;
mod signer;

use std::{env, time::Duration};

use log::*;
use serde::{Deserialize, Serialize};
use upg_common::parse_boolean_flag;

use crate::{
    db_types::{Payment, PaymentStatus},
    events::EventHooks,
    traits::WebhookJournal,
};

pub use dispatcher::WebhookDispatcher;
pub use signer::{sign_payload, verify_signature};

/// The signature travels in this header, hex-encoded.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY_SECS: u64 = 60;
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// The outcome a webhook announces. The wire codes are fixed: 2 for a confirmed payment,
/// 3 for a declined one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Confirmed,
    Declined,
}

impl WebhookOutcome {
    pub fn code(&self) -> u8 {
        match self {
            WebhookOutcome::Confirmed => 2,
            WebhookOutcome::Declined => 3,
        }
    }

    /// The outcome for a settled payment. `None` while the payment is still pending, since
    /// there is nothing to announce yet.
    pub fn for_status(status: PaymentStatus) -> Option<Self> {
        match status {
            PaymentStatus::Confirmed => Some(WebhookOutcome::Confirmed),
            PaymentStatus::Declined => Some(WebhookOutcome::Declined),
            PaymentStatus::Pending => None,
        }
    }
}

/// The webhook body. The amount goes out as a decimal rupee string, not paise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub reference_id: String,
    pub status: u8,
    pub remarks: String,
    pub amount: String,
}

impl WebhookPayload {
    pub fn for_payment(payment: &Payment, outcome: WebhookOutcome) -> Self {
        Self {
            reference_id: payment.fingerprint.clone(),
            status: outcome.code(),
            remarks: payment.remarks.clone().unwrap_or_default(),
            amount: payment.amount.to_rupee_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Attempts per payment before delivery is abandoned to the redelivery sweep / operator.
    pub max_attempts: u32,
    /// Base delay between attempts; doubles after each failure.
    pub retry_delay: Duration,
    pub request_timeout: Duration,
    /// When set, certificate errors on merchant endpoints are ignored. For test rigs only.
    pub danger_accept_invalid_certs: bool,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            danger_accept_invalid_certs: false,
        }
    }
}

impl WebhookConfig {
    /// Loads the configuration from `UPG_WEBHOOK_*` environment variables, falling back to the
    /// defaults for anything unset or unparseable.
    pub fn from_env_or_default() -> Self {
        let defaults = Self::default();
        let max_attempts = env::var("UPG_WEBHOOK_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_attempts);
        let retry_delay = env::var("UPG_WEBHOOK_RETRY_DELAY_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.retry_delay);
        let request_timeout = env::var("UPG_WEBHOOK_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);
        let danger_accept_invalid_certs =
            parse_boolean_flag(env::var("UPG_WEBHOOK_ACCEPT_INVALID_CERTS").ok(), false);
        if danger_accept_invalid_certs {
            warn!("📣️ Webhook dispatcher will accept invalid TLS certificates. Never do this in production!");
        }
        Self { max_attempts, retry_delay, request_timeout, danger_accept_invalid_certs }
    }
}

/// Wires the dispatcher into the payment lifecycle hooks, so every terminal transition results
/// in exactly one delivery job.
pub fn register_dispatcher_hooks<B>(dispatcher: WebhookDispatcher<B>, hooks: &mut EventHooks)
where B: WebhookJournal + Send + Sync + 'static {
    let on_confirmed = dispatcher.clone();
    hooks.on_payment_confirmed(move |event| {
        let dispatcher = on_confirmed.clone();
        Box::pin(async move {
            dispatcher.deliver(event.payment).await;
        })
    });
    hooks.on_payment_declined(move |event| {
        let dispatcher = dispatcher.clone();
        Box::pin(async move {
            dispatcher.deliver(event.payment).await;
        })
    });
}
