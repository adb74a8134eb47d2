use chrono::{DateTime, Utc};
use thiserror::Error;
use upg_common::Paisa;

use crate::db_types::{MerchantProfile, NewPayment, Payment, PaymentType, VerificationMethod};

/// The payment ledger contract. Backends enforce the hard invariants (unique fingerprint,
/// unique UTR, no transition out of a terminal state) at the storage boundary with unique
/// constraints and conditional updates, so they hold under concurrent callers and across
/// multiple service instances.
#[allow(async_fn_in_trait)]
pub trait PaymentGatewayDatabase: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Fetches the merchant profile for the given merchant id.
    async fn fetch_merchant(&self, merchant_id: &str) -> Result<MerchantProfile, PaymentGatewayError>;

    /// Inserts a new payment with the given fingerprint and initial status `PENDING`.
    ///
    /// A fingerprint collision surfaces as [`PaymentGatewayError::DuplicateFingerprint`]; the
    /// caller is expected to regenerate and retry a bounded number of times.
    async fn insert_payment(&self, payment: NewPayment, fingerprint: &str) -> Result<Payment, PaymentGatewayError>;

    async fn fetch_payment(&self, id: i64) -> Result<Option<Payment>, PaymentGatewayError>;

    async fn fetch_payment_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Payment>, PaymentGatewayError>;

    /// Returns the still-`PENDING` payment for the given (merchant, reference) pair, if one
    /// exists. Used as the idempotency lookup so that client retries do not double-charge.
    async fn fetch_pending_payment_for_reference(
        &self,
        merchant_id: &str,
        reference: &str,
    ) -> Result<Option<Payment>, PaymentGatewayError>;

    /// Transitions the payment `PENDING` → `CONFIRMED` in a single conditional update, stamping
    /// the UTR evidence, verifier identity and verification method.
    ///
    /// Fails with [`PaymentGatewayError::InvalidStateTransition`] if the payment is already
    /// terminal (the record is not mutated), and with [`PaymentGatewayError::DuplicateUtr`] if
    /// the UTR is already bound to another payment.
    async fn confirm_payment(
        &self,
        id: i64,
        utr: &str,
        verified_by: &str,
        method: VerificationMethod,
        remarks: Option<&str>,
    ) -> Result<Payment, PaymentGatewayError>;

    /// Transitions the payment `PENDING` → `DECLINED`, recording who declined it and why.
    async fn decline_payment(&self, id: i64, declined_by: &str, remarks: &str) -> Result<Payment, PaymentGatewayError>;

    /// Records customer-submitted UTR evidence on a still-`PENDING` payment without changing
    /// its status. The stored UTR is what the reconciliation matcher keys on first.
    async fn store_utr(&self, id: i64, utr: &str) -> Result<Payment, PaymentGatewayError>;

    /// Pending payments created since the given cutoff, optionally filtered by merchant.
    /// The operator work queue.
    async fn fetch_pending_payments(
        &self,
        merchant_id: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<Payment>, PaymentGatewayError>;

    /// All pending deposits, the candidate set for bank statement reconciliation.
    async fn fetch_pending_deposits(&self) -> Result<Vec<Payment>, PaymentGatewayError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), PaymentGatewayError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum PaymentGatewayError {
    #[error("We have an internal database engine error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("Invalid request: {0}")]
    ValidationError(String),
    #[error("{payment_type} amount {amount} must be between {min} and {max}")]
    AmountOutOfRange { payment_type: PaymentType, amount: Paisa, min: Paisa, max: Paisa },
    #[error("The requested merchant {0} does not exist")]
    MerchantNotFound(String),
    #[error("The requested payment {0} does not exist")]
    PaymentNotFound(String),
    #[error("Illegal payment status change. {0}")]
    InvalidStateTransition(String),
    #[error("UTR {0} is already bound to another payment")]
    DuplicateUtr(String),
    #[error("Cannot insert payment, since the fingerprint {0} already exists")]
    DuplicateFingerprint(String),
    #[error("Could not generate an unused fingerprint after {0} attempts")]
    FingerprintConflict(u32),
    #[error("The requested payment link {0} does not exist")]
    LinkNotFound(i64),
    #[error("Payment link {0} has expired")]
    LinkExpired(i64),
    #[error("Payment link {0} has already been used")]
    LinkAlreadyUsed(i64),
    #[error("Payment link {0} cannot be used in its current state")]
    LinkInvalidState(i64),
    #[error("The requested statement upload {0} does not exist")]
    UploadNotFound(i64),
    #[error("Statement upload {0} has already been processed")]
    UploadAlreadyProcessed(i64),
    #[error("Could not parse the bank statement: {0}")]
    StatementParseError(String),
    #[error("Webhook delivery failed permanently: {0}")]
    DeliveryFailure(String),
}

impl From<sqlx::Error> for PaymentGatewayError {
    fn from(e: sqlx::Error) -> Self {
        PaymentGatewayError::DatabaseError(e.to_string())
    }
}
