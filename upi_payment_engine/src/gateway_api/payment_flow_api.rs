use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use serde::Serialize;

use crate::{
    db_types::{
        MerchantProfile,
        NewPayment,
        Payment,
        PaymentKey,
        PaymentMethod,
        PaymentStatus,
        PaymentType,
        VerificationMethod,
        MAX_METADATA_BYTES,
    },
    events::{EventProducers, PaymentConfirmedEvent, PaymentDeclinedEvent},
    helpers::{is_valid_utr, new_fingerprint, upi_collection_uri},
    traits::{PaymentGatewayDatabase, PaymentGatewayError},
};

/// How many fresh fingerprints to try before giving up on an insert. With a salted 96-bit
/// token, reaching this limit means something is broken, not unlucky.
const MAX_FINGERPRINT_ATTEMPTS: u32 = 3;

/// The result of a payment creation request: the stored payment and, for UPI deposits, the
/// ready-to-render collection URI.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedPayment {
    pub payment: Payment,
    pub upi_uri: Option<String>,
}

/// `PaymentFlowApi` is the primary API for the payment lifecycle: creation, UTR capture, and
/// the two terminal transitions (confirm and decline). Terminal transitions fire the
/// corresponding event hooks exactly once, after the storage transition has committed.
pub struct PaymentFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for PaymentFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentFlowApi")
    }
}

impl<B: Clone> Clone for PaymentFlowApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), producers: self.producers.clone() }
    }
}

impl<B> PaymentFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> PaymentFlowApi<B>
where B: PaymentGatewayDatabase
{
    /// Submit a new payment request.
    ///
    /// Validation runs in order: the amount must be positive, the metadata blob must fit, the
    /// merchant must exist, and the amount must sit inside the merchant's bounds for the
    /// payment type. If the merchant already has a `PENDING` payment for the same reference,
    /// that payment is returned as-is rather than creating a duplicate, so client retries are
    /// harmless.
    pub async fn create_payment(&self, payment: NewPayment) -> Result<CreatedPayment, PaymentGatewayError> {
        if !payment.amount.is_positive() {
            return Err(PaymentGatewayError::ValidationError(format!(
                "Payment amount must be positive, but got {}",
                payment.amount
            )));
        }
        if let Some(metadata) = &payment.metadata {
            let size = serde_json::to_string(metadata)
                .map_err(|e| PaymentGatewayError::ValidationError(e.to_string()))?
                .len();
            if size > MAX_METADATA_BYTES {
                return Err(PaymentGatewayError::ValidationError(format!(
                    "Metadata is {size} bytes, which exceeds the {MAX_METADATA_BYTES} byte limit"
                )));
            }
        }
        let merchant = self.db.fetch_merchant(&payment.merchant_id).await?;
        let (min, max) = merchant.bounds_for(payment.payment_type);
        if payment.amount < min || payment.amount > max {
            return Err(PaymentGatewayError::AmountOutOfRange {
                payment_type: payment.payment_type,
                amount: payment.amount,
                min,
                max,
            });
        }
        // A UPI deposit is unusable without a collection URI, so the merchant's handle is
        // checked here, before anything is persisted.
        if payment.payment_method == PaymentMethod::Upi &&
            payment.payment_type == PaymentType::Deposit &&
            merchant.upi_id.is_none()
        {
            return Err(PaymentGatewayError::ValidationError(format!(
                "Merchant {} has no UPI handle configured and cannot accept UPI deposits",
                merchant.id
            )));
        }
        if let Some(existing) =
            self.db.fetch_pending_payment_for_reference(&payment.merchant_id, &payment.reference).await?
        {
            info!(
                "🔄️💳️ Merchant {} re-submitted reference [{}]. Returning pending payment {}",
                payment.merchant_id, payment.reference, existing.fingerprint
            );
            let upi_uri = collection_uri_for(&merchant, &existing)?;
            return Ok(CreatedPayment { payment: existing, upi_uri });
        }
        let stored = self.insert_with_fresh_fingerprint(payment).await?;
        debug!("🔄️💳️ Payment {} created for merchant {}", stored.fingerprint, stored.merchant_id);
        let upi_uri = collection_uri_for(&merchant, &stored)?;
        Ok(CreatedPayment { payment: stored, upi_uri })
    }

    async fn insert_with_fresh_fingerprint(&self, payment: NewPayment) -> Result<Payment, PaymentGatewayError> {
        for attempt in 1..=MAX_FINGERPRINT_ATTEMPTS {
            let fingerprint = new_fingerprint(&payment.merchant_id, &payment.reference);
            match self.db.insert_payment(payment.clone(), &fingerprint).await {
                Ok(stored) => return Ok(stored),
                Err(PaymentGatewayError::DuplicateFingerprint(fp)) => {
                    warn!("🔄️💳️ Fingerprint collision on {fp} (attempt {attempt}). Regenerating");
                },
                Err(e) => return Err(e),
            }
        }
        Err(PaymentGatewayError::FingerprintConflict(MAX_FINGERPRINT_ATTEMPTS))
    }

    /// Confirms a payment against its settlement evidence. `key` may be the internal id or the
    /// fingerprint. Fires the payment-confirmed hooks once the transition has committed.
    pub async fn verify_payment(
        &self,
        key: PaymentKey,
        utr: &str,
        verified_by: &str,
        method: VerificationMethod,
        remarks: Option<&str>,
    ) -> Result<Payment, PaymentGatewayError> {
        // Operators transcribe whatever the bank shows them, so no format is imposed here,
        // but an empty UTR is no evidence at all (and would squat the unique utr slot).
        if utr.trim().is_empty() {
            return Err(PaymentGatewayError::ValidationError(
                "A UTR is required to confirm a payment".to_string(),
            ));
        }
        trace!("🔄️✅️ Payment {key} is being marked as confirmed");
        let id = self.resolve_key(&key).await?;
        let payment = self.db.confirm_payment(id, utr, verified_by, method, remarks).await?;
        debug!("🔄️✅️ Payment {} confirmed by {verified_by} ({method})", payment.fingerprint);
        self.call_payment_confirmed_hook(&payment).await;
        Ok(payment)
    }

    /// Declines a payment, recording who rejected it and why. Fires the payment-declined hooks
    /// once the transition has committed.
    pub async fn decline_payment(
        &self,
        key: PaymentKey,
        declined_by: &str,
        remarks: &str,
    ) -> Result<Payment, PaymentGatewayError> {
        trace!("🔄️❌️ Payment {key} is being marked as declined");
        let id = self.resolve_key(&key).await?;
        let payment = self.db.decline_payment(id, declined_by, remarks).await?;
        debug!("🔄️❌️ Payment {} declined by {declined_by}", payment.fingerprint);
        self.call_payment_declined_hook(&payment).await;
        Ok(payment)
    }

    /// Records customer-submitted UTR evidence on a pending payment. The status does not
    /// change; the UTR is a hint for the reconciliation matcher.
    pub async fn store_utr(&self, key: PaymentKey, utr: &str) -> Result<Payment, PaymentGatewayError> {
        if !is_valid_utr(utr) {
            return Err(PaymentGatewayError::ValidationError(format!(
                "{utr} is not a valid UTR. Expected 12-22 alphanumeric characters"
            )));
        }
        let id = self.resolve_key(&key).await?;
        let payment = self.db.store_utr(id, utr).await?;
        debug!("🔄️💳️ UTR {utr} recorded on payment {}", payment.fingerprint);
        Ok(payment)
    }

    pub async fn fetch_payment(&self, key: PaymentKey) -> Result<Option<Payment>, PaymentGatewayError> {
        match key {
            PaymentKey::Id(id) => self.db.fetch_payment(id).await,
            PaymentKey::Fingerprint(fp) => self.db.fetch_payment_by_fingerprint(&fp).await,
        }
    }

    /// The operator work queue: pending payments created since the cutoff, optionally scoped
    /// to one merchant.
    pub async fn pending_payments(
        &self,
        merchant_id: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<Payment>, PaymentGatewayError> {
        self.db.fetch_pending_payments(merchant_id, since).await
    }

    /// Re-fires the terminal event for an already-settled payment, so the webhook dispatcher
    /// gets another go at delivering the notification. Refuses to run on a pending payment.
    pub async fn resend_notification(&self, fingerprint: &str) -> Result<Payment, PaymentGatewayError> {
        let payment = self
            .db
            .fetch_payment_by_fingerprint(fingerprint)
            .await?
            .ok_or_else(|| PaymentGatewayError::PaymentNotFound(fingerprint.to_string()))?;
        match payment.status {
            PaymentStatus::Confirmed => self.call_payment_confirmed_hook(&payment).await,
            PaymentStatus::Declined => self.call_payment_declined_hook(&payment).await,
            PaymentStatus::Pending => {
                return Err(PaymentGatewayError::InvalidStateTransition(format!(
                    "Payment {fingerprint} is still pending and has no outcome to notify"
                )))
            },
        }
        info!("🔄️📣️ Notification for payment {fingerprint} re-queued");
        Ok(payment)
    }

    async fn resolve_key(&self, key: &PaymentKey) -> Result<i64, PaymentGatewayError> {
        match key {
            PaymentKey::Id(id) => Ok(*id),
            PaymentKey::Fingerprint(fp) => {
                let payment = self
                    .db
                    .fetch_payment_by_fingerprint(fp)
                    .await?
                    .ok_or_else(|| PaymentGatewayError::PaymentNotFound(fp.clone()))?;
                Ok(payment.id)
            },
        }
    }

    async fn call_payment_confirmed_hook(&self, payment: &Payment) {
        for emitter in &self.producers.payment_confirmed_producer {
            trace!("🔄️✅️ Notifying payment confirmed hook subscribers");
            let event = PaymentConfirmedEvent::new(payment.clone());
            emitter.publish_event(event).await;
        }
    }

    async fn call_payment_declined_hook(&self, payment: &Payment) {
        for emitter in &self.producers.payment_declined_producer {
            trace!("🔄️❌️ Notifying payment declined hook subscribers");
            let event = PaymentDeclinedEvent::new(payment.clone());
            emitter.publish_event(event).await;
        }
    }
}

/// The UPI collection URI for a payment, when one applies. Only UPI deposits get a URI, and
/// the merchant must have a UPI handle configured for them.
fn collection_uri_for(merchant: &MerchantProfile, payment: &Payment) -> Result<Option<String>, PaymentGatewayError> {
    if payment.payment_method != PaymentMethod::Upi || payment.payment_type != PaymentType::Deposit {
        return Ok(None);
    }
    let upi_id = merchant.upi_id.as_deref().ok_or_else(|| {
        PaymentGatewayError::ValidationError(format!(
            "Merchant {} has no UPI handle configured and cannot accept UPI deposits",
            merchant.id
        ))
    })?;
    let payee = merchant.upi_name.as_deref().unwrap_or(&merchant.name);
    Ok(Some(upi_collection_uri(upi_id, payee, payment.amount, &payment.fingerprint)))
}
