use std::fmt::Debug;

use chrono::{Duration, Utc};
use log::*;
use serde::Serialize;
use upg_common::Paisa;

use crate::{
    db_types::{LinkStatus, NewPaymentLink, PaymentLink, PaymentType},
    helpers::upi_collection_uri,
    traits::{LinkManagement, PaymentGatewayDatabase, PaymentGatewayError},
};

/// A resolved, still-usable payment link together with the merchant-facing UPI collection URI
/// for it (when the merchant has a UPI handle). The URI carries the link reference as its
/// transaction note; once the payer completes the flow, the created payment gets its own URI
/// keyed on the fingerprint.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedLink {
    pub link: PaymentLink,
    pub upi_uri: Option<String>,
}

/// `PaymentLinkApi` manages shareable payment links. A link is a pre-validated, amount-bound
/// invitation to pay that expires on a deadline. Expiry is lazy: no background job flips
/// links over, every read and use site checks `expires_at` itself and persists the `EXPIRED`
/// status opportunistically when it notices.
pub struct PaymentLinkApi<B> {
    db: B,
}

impl<B> Debug for PaymentLinkApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentLinkApi")
    }
}

impl<B: Clone> Clone for PaymentLinkApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone() }
    }
}

impl<B> PaymentLinkApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> PaymentLinkApi<B>
where B: PaymentGatewayDatabase + LinkManagement
{
    /// Creates a new payment link for the merchant. The amount is validated against the
    /// merchant's deposit bounds up front, so a link can never invite an amount the merchant
    /// would reject at payment time.
    pub async fn create_link(
        &self,
        merchant_id: &str,
        reference: &str,
        amount: Paisa,
        currency: &str,
        description: Option<String>,
        ttl: Duration,
    ) -> Result<PaymentLink, PaymentGatewayError> {
        if ttl <= Duration::zero() {
            return Err(PaymentGatewayError::ValidationError(format!(
                "Payment link lifetime must be positive, but got {ttl}"
            )));
        }
        let merchant = self.db.fetch_merchant(merchant_id).await?;
        let (min, max) = merchant.bounds_for(PaymentType::Deposit);
        if amount < min || amount > max {
            return Err(PaymentGatewayError::AmountOutOfRange {
                payment_type: PaymentType::Deposit,
                amount,
                min,
                max,
            });
        }
        let link = NewPaymentLink {
            merchant_id: merchant_id.to_string(),
            reference: reference.to_string(),
            amount,
            currency: currency.to_string(),
            description,
            expires_at: Utc::now() + ttl,
        };
        let link = self.db.insert_link(link).await?;
        debug!("🔗️ Link #{} created for merchant {merchant_id}, expiring at {}", link.id, link.expires_at);
        Ok(link)
    }

    /// Resolves a link for presentation or use. Returns the link only while it is usable:
    /// completed links fail with [`PaymentGatewayError::LinkAlreadyUsed`], lapsed ones with
    /// [`PaymentGatewayError::LinkExpired`].
    pub async fn resolve_link(&self, id: i64) -> Result<ResolvedLink, PaymentGatewayError> {
        let link = self.db.fetch_link(id).await?.ok_or(PaymentGatewayError::LinkNotFound(id))?;
        match link.status {
            LinkStatus::Completed => Err(PaymentGatewayError::LinkAlreadyUsed(id)),
            LinkStatus::Expired => Err(PaymentGatewayError::LinkExpired(id)),
            LinkStatus::Active if link.is_expired_at(Utc::now()) => {
                // Persist what we noticed. Best effort only; the lazy check is authoritative.
                if self.db.expire_link(id).await?.is_some() {
                    debug!("🔗️ Link #{id} lapsed and has been marked expired");
                }
                Err(PaymentGatewayError::LinkExpired(id))
            },
            LinkStatus::Active => {
                let merchant = self.db.fetch_merchant(&link.merchant_id).await?;
                let upi_uri = merchant.upi_id.as_deref().map(|upi_id| {
                    let payee = merchant.upi_name.as_deref().unwrap_or(&merchant.name);
                    upi_collection_uri(upi_id, payee, link.amount, &link.reference)
                });
                Ok(ResolvedLink { link, upi_uri })
            },
        }
    }

    /// Binds a freshly-created payment to the link and marks it used. The bind only succeeds
    /// against a link that is still `ACTIVE` and unexpired at the moment of the update, so two
    /// racing payers cannot both consume the same link.
    pub async fn bind_payment(&self, id: i64, payment_id: i64) -> Result<PaymentLink, PaymentGatewayError> {
        let now = Utc::now();
        match self.db.complete_link(id, payment_id, now).await? {
            Some(link) => {
                debug!("🔗️ Link #{id} completed by payment #{payment_id}");
                Ok(link)
            },
            None => {
                let link = self.db.fetch_link(id).await?.ok_or(PaymentGatewayError::LinkNotFound(id))?;
                match link.status {
                    LinkStatus::Completed => Err(PaymentGatewayError::LinkAlreadyUsed(id)),
                    LinkStatus::Expired => Err(PaymentGatewayError::LinkExpired(id)),
                    LinkStatus::Active if link.is_expired_at(now) => {
                        let _ = self.db.expire_link(id).await?;
                        Err(PaymentGatewayError::LinkExpired(id))
                    },
                    LinkStatus::Active => Err(PaymentGatewayError::LinkInvalidState(id)),
                }
            },
        }
    }
}
