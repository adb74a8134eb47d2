use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, Type};
use thiserror::Error;
use upg_common::{Paisa, Secret, INR_CURRENCY_CODE};

/// Payments store merchant-supplied metadata verbatim, but the blob is size-bounded so a
/// misbehaving client cannot bloat the store.
pub const MAX_METADATA_BYTES: usize = 4096;

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ConversionError(String);

//--------------------------------------   PaymentStatus    ----------------------------------------------------------
/// The payment lifecycle. `Pending` is the only initial state; `Confirmed` and `Declined` are
/// terminal and no transition ever leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentStatus {
    #[sqlx(rename = "PENDING")]
    #[serde(rename = "PENDING")]
    Pending,
    #[sqlx(rename = "CONFIRMED")]
    #[serde(rename = "CONFIRMED")]
    Confirmed,
    #[sqlx(rename = "DECLINED")]
    #[serde(rename = "DECLINED")]
    Declined,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Confirmed | PaymentStatus::Declined)
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "PENDING"),
            PaymentStatus::Confirmed => write!(f, "CONFIRMED"),
            PaymentStatus::Declined => write!(f, "DECLINED"),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "CONFIRMED" => Ok(Self::Confirmed),
            "DECLINED" => Ok(Self::Declined),
            s => Err(ConversionError(format!("Invalid payment status: {s}"))),
        }
    }
}

impl From<String> for PaymentStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid payment status: {value}. But this conversion cannot fail. Defaulting to PENDING");
            PaymentStatus::Pending
        })
    }
}

//--------------------------------------    PaymentType     ----------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentType {
    #[sqlx(rename = "DEPOSIT")]
    #[serde(rename = "DEPOSIT")]
    Deposit,
    #[sqlx(rename = "WITHDRAWAL")]
    #[serde(rename = "WITHDRAWAL")]
    Withdrawal,
}

impl Display for PaymentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentType::Deposit => write!(f, "DEPOSIT"),
            PaymentType::Withdrawal => write!(f, "WITHDRAWAL"),
        }
    }
}

impl FromStr for PaymentType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEPOSIT" => Ok(Self::Deposit),
            "WITHDRAWAL" => Ok(Self::Withdrawal),
            s => Err(ConversionError(format!("Invalid payment type: {s}. Must be DEPOSIT or WITHDRAWAL"))),
        }
    }
}

//--------------------------------------   PaymentMethod    ----------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[sqlx(rename = "UPI")]
    #[serde(rename = "UPI")]
    Upi,
    #[sqlx(rename = "BANK_TRANSFER")]
    #[serde(rename = "BANK_TRANSFER")]
    BankTransfer,
}

impl Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::Upi => write!(f, "UPI"),
            PaymentMethod::BankTransfer => write!(f, "BANK_TRANSFER"),
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UPI" => Ok(Self::Upi),
            "BANK_TRANSFER" => Ok(Self::BankTransfer),
            s => Err(ConversionError(format!("Invalid payment method: {s}. Must be UPI or BANK_TRANSFER"))),
        }
    }
}

//------------------------------------  VerificationMethod  ----------------------------------------------------------
/// Records *how* a payment reached a terminal state: an operator decision, or an automatic match
/// by the bank statement reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum VerificationMethod {
    #[sqlx(rename = "MANUAL")]
    #[serde(rename = "MANUAL")]
    Manual,
    #[sqlx(rename = "AUTO")]
    #[serde(rename = "AUTO")]
    Auto,
}

impl Display for VerificationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationMethod::Manual => write!(f, "MANUAL"),
            VerificationMethod::Auto => write!(f, "AUTO"),
        }
    }
}

//--------------------------------------      Payment       ----------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Payment {
    pub id: i64,
    pub merchant_id: String,
    /// The merchant-supplied reference. Not unique; the fingerprint is the unique handle.
    pub reference: String,
    /// The system-generated, globally unique transaction fingerprint. Immutable after creation.
    pub fingerprint: String,
    pub payment_type: PaymentType,
    pub payment_method: PaymentMethod,
    pub amount: Paisa,
    pub currency: String,
    pub status: PaymentStatus,
    /// The bank-issued Unique Transaction Reference proving settlement. Unique across all
    /// payments once set.
    pub utr: Option<String>,
    pub account_name: Option<String>,
    pub account_number: Option<String>,
    pub bank: Option<String>,
    pub bank_ifsc: Option<String>,
    /// Opaque merchant metadata, stored as a JSON string and passed through unmodified.
    pub metadata: Option<String>,
    pub verified_by: Option<String>,
    pub verification_method: Option<VerificationMethod>,
    pub remarks: Option<String>,
    pub callback_url: String,
    pub delivered: bool,
    pub delivery_attempts: i64,
    pub last_delivery_response: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The metadata blob parsed back into JSON, if present and well-formed.
    pub fn metadata_json(&self) -> Option<Value> {
        self.metadata.as_deref().and_then(|m| serde_json::from_str(m).ok())
    }
}

//--------------------------------------     PaymentKey     ----------------------------------------------------------
/// Payments can be addressed by their internal id (operator surfaces) or by fingerprint
/// (merchant surfaces).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentKey {
    Id(i64),
    Fingerprint(String),
}

impl From<i64> for PaymentKey {
    fn from(id: i64) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for PaymentKey {
    fn from(fp: &str) -> Self {
        Self::Fingerprint(fp.to_string())
    }
}

impl Display for PaymentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentKey::Id(id) => write!(f, "#{id}"),
            PaymentKey::Fingerprint(fp) => write!(f, "{fp}"),
        }
    }
}

//--------------------------------------     NewPayment     ----------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub merchant_id: String,
    pub reference: String,
    pub payment_type: PaymentType,
    pub payment_method: PaymentMethod,
    pub amount: Paisa,
    pub currency: String,
    /// Where the outcome webhook for this payment will be delivered.
    pub callback_url: String,
    pub account_name: Option<String>,
    pub account_number: Option<String>,
    pub bank: Option<String>,
    pub bank_ifsc: Option<String>,
    pub metadata: Option<Value>,
}

impl NewPayment {
    pub fn new(
        merchant_id: impl Into<String>,
        reference: impl Into<String>,
        payment_type: PaymentType,
        payment_method: PaymentMethod,
        amount: Paisa,
        callback_url: impl Into<String>,
    ) -> Self {
        Self {
            merchant_id: merchant_id.into(),
            reference: reference.into(),
            payment_type,
            payment_method,
            amount,
            currency: INR_CURRENCY_CODE.to_string(),
            callback_url: callback_url.into(),
            account_name: None,
            account_number: None,
            bank: None,
            bank_ifsc: None,
            metadata: None,
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn with_account(
        mut self,
        name: impl Into<String>,
        number: impl Into<String>,
        bank: impl Into<String>,
        ifsc: impl Into<String>,
    ) -> Self {
        self.account_name = Some(name.into());
        self.account_number = Some(number.into());
        self.bank = Some(bank.into());
        self.bank_ifsc = Some(ifsc.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

//--------------------------------------  MerchantProfile   ----------------------------------------------------------
/// The slice of the merchant record the engine needs: webhook credentials, the active UPI
/// collection handle, and the per-type amount bounds. Merchant administration itself is an
/// external collaborator; the engine only ever reads these rows.
#[derive(Debug, Clone, FromRow)]
pub struct MerchantProfile {
    pub id: String,
    pub name: String,
    webhook_secret: String,
    pub callback_url: Option<String>,
    pub upi_id: Option<String>,
    pub upi_name: Option<String>,
    pub min_deposit: Paisa,
    pub max_deposit: Paisa,
    pub min_withdrawal: Paisa,
    pub max_withdrawal: Paisa,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MerchantProfile {
    /// The configured (min, max) bounds for the given payment type. Deposits and withdrawals
    /// have independent bounds.
    pub fn bounds_for(&self, payment_type: PaymentType) -> (Paisa, Paisa) {
        match payment_type {
            PaymentType::Deposit => (self.min_deposit, self.max_deposit),
            PaymentType::Withdrawal => (self.min_withdrawal, self.max_withdrawal),
        }
    }

    pub fn webhook_secret(&self) -> Secret<String> {
        Secret::new(self.webhook_secret.clone())
    }
}

//--------------------------------------    NewMerchant     ----------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewMerchant {
    pub id: String,
    pub name: String,
    pub webhook_secret: String,
    pub callback_url: Option<String>,
    pub upi_id: Option<String>,
    pub upi_name: Option<String>,
    pub min_deposit: Paisa,
    pub max_deposit: Paisa,
    pub min_withdrawal: Paisa,
    pub max_withdrawal: Paisa,
}

//--------------------------------------     LinkStatus     ----------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum LinkStatus {
    #[sqlx(rename = "ACTIVE")]
    #[serde(rename = "ACTIVE")]
    Active,
    #[sqlx(rename = "COMPLETED")]
    #[serde(rename = "COMPLETED")]
    Completed,
    #[sqlx(rename = "EXPIRED")]
    #[serde(rename = "EXPIRED")]
    Expired,
}

impl Display for LinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkStatus::Active => write!(f, "ACTIVE"),
            LinkStatus::Completed => write!(f, "COMPLETED"),
            LinkStatus::Expired => write!(f, "EXPIRED"),
        }
    }
}

//--------------------------------------    PaymentLink     ----------------------------------------------------------
/// A short-lived, amount-bound token that resolves to a payment creation flow. Expiry is lazy:
/// the stored status may still read `ACTIVE` after `expires_at`, and every read/use site must
/// treat such links as expired.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PaymentLink {
    pub id: i64,
    pub merchant_id: String,
    pub reference: String,
    pub amount: Paisa,
    pub currency: String,
    pub description: Option<String>,
    pub status: LinkStatus,
    pub payment_id: Option<i64>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentLink {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

//--------------------------------------  NewPaymentLink    ----------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewPaymentLink {
    pub merchant_id: String,
    pub reference: String,
    pub amount: Paisa,
    pub currency: String,
    pub description: Option<String>,
    pub expires_at: DateTime<Utc>,
}

//----------------------------------- BankStatementUpload   ----------------------------------------------------------
/// One uploaded bank statement. Created with `processed = false`; the reconciliation matcher
/// mutates the record exactly once, setting `processed = true` and the matched count after a
/// full pass. The flag doubles as the idempotency guard for re-running reconciliation.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BankStatementUpload {
    pub id: i64,
    pub uploaded_by: String,
    pub file_name: String,
    pub file_ref: String,
    pub processed: bool,
    pub matched_transactions: i64,
    pub uploaded_at: DateTime<Utc>,
}

//----------------------------------- NewStatementUpload    ----------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewStatementUpload {
    pub uploaded_by: String,
    pub file_name: String,
    pub file_ref: String,
}
