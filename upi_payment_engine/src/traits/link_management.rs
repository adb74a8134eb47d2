use chrono::{DateTime, Utc};

use crate::{
    db_types::{NewPaymentLink, PaymentLink},
    traits::PaymentGatewayError,
};

/// Payment link lifecycle at the storage boundary. Expiry is lazy, so the interesting
/// operations are conditional updates: a link can only complete while it is `ACTIVE` *and*
/// unexpired, checked in the same statement that mutates it.
#[allow(async_fn_in_trait)]
pub trait LinkManagement: Clone {
    async fn insert_link(&self, link: NewPaymentLink) -> Result<PaymentLink, PaymentGatewayError>;

    async fn fetch_link(&self, id: i64) -> Result<Option<PaymentLink>, PaymentGatewayError>;

    /// Opportunistically persists `EXPIRED` on an `ACTIVE` link that is past its expiry.
    /// Returns the updated link, or `None` if the link was not `ACTIVE` (correctness never
    /// depends on this write; reads treat expiry lazily regardless).
    async fn expire_link(&self, id: i64) -> Result<Option<PaymentLink>, PaymentGatewayError>;

    /// Binds the payment to the link and marks it `COMPLETED`, iff the link is `ACTIVE` and
    /// `expires_at` is still in the future at `now`. Returns `None` when the condition fails.
    async fn complete_link(
        &self,
        id: i64,
        payment_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<PaymentLink>, PaymentGatewayError>;
}
