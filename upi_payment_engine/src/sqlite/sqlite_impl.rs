//! `SqliteDatabase` is a concrete implementation of a UPI payment engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`traits`](crate::traits)
//! module.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqlitePool;
use upg_common::Secret;

use super::db::{db_url, links, merchants, new_pool, payments, statements};
use crate::{
    db_types::{
        BankStatementUpload,
        MerchantProfile,
        NewPayment,
        NewPaymentLink,
        NewStatementUpload,
        Payment,
        PaymentLink,
        VerificationMethod,
    },
    traits::{LinkManagement, PaymentGatewayDatabase, PaymentGatewayError, StatementManagement, WebhookJournal},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database instance using the URL from the `UPG_DATABASE_URL` environment
    /// variable, or the default if it is not set.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        debug!("🗃️ Connected to database {url}");
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl PaymentGatewayDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn fetch_merchant(&self, merchant_id: &str) -> Result<MerchantProfile, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        merchants::fetch_merchant(merchant_id, &mut conn)
            .await?
            .ok_or_else(|| PaymentGatewayError::MerchantNotFound(merchant_id.to_string()))
    }

    async fn insert_payment(&self, payment: NewPayment, fingerprint: &str) -> Result<Payment, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let payment = payments::insert_payment(payment, fingerprint, &mut conn).await?;
        debug!("🗃️ Payment {} has been saved in the DB with id {}", payment.fingerprint, payment.id);
        Ok(payment)
    }

    async fn fetch_payment(&self, id: i64) -> Result<Option<Payment>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_payment(id, &mut conn).await
    }

    async fn fetch_payment_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Payment>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_payment_by_fingerprint(fingerprint, &mut conn).await
    }

    async fn fetch_pending_payment_for_reference(
        &self,
        merchant_id: &str,
        reference: &str,
    ) -> Result<Option<Payment>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_pending_payment_for_reference(merchant_id, reference, &mut conn).await
    }

    async fn confirm_payment(
        &self,
        id: i64,
        utr: &str,
        verified_by: &str,
        method: VerificationMethod,
        remarks: Option<&str>,
    ) -> Result<Payment, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let payment = payments::confirm_payment(id, utr, verified_by, method, remarks, &mut conn).await?;
        debug!("🗃️ Payment #{id} confirmed by {verified_by} ({method}) with UTR {utr}");
        Ok(payment)
    }

    async fn decline_payment(&self, id: i64, declined_by: &str, remarks: &str) -> Result<Payment, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let payment = payments::decline_payment(id, declined_by, remarks, &mut conn).await?;
        debug!("🗃️ Payment #{id} declined by {declined_by}");
        Ok(payment)
    }

    async fn store_utr(&self, id: i64, utr: &str) -> Result<Payment, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        payments::store_utr(id, utr, &mut conn).await
    }

    async fn fetch_pending_payments(
        &self,
        merchant_id: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<Payment>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_pending_payments(merchant_id, since, &mut conn).await
    }

    async fn fetch_pending_deposits(&self) -> Result<Vec<Payment>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_pending_deposits(&mut conn).await
    }

    async fn close(&mut self) -> Result<(), PaymentGatewayError> {
        self.pool.close().await;
        Ok(())
    }
}

impl LinkManagement for SqliteDatabase {
    async fn insert_link(&self, link: NewPaymentLink) -> Result<PaymentLink, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let link = links::insert_link(link, &mut conn).await?;
        debug!("🗃️ Payment link #{} created for merchant {}", link.id, link.merchant_id);
        Ok(link)
    }

    async fn fetch_link(&self, id: i64) -> Result<Option<PaymentLink>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        links::fetch_link(id, &mut conn).await
    }

    async fn expire_link(&self, id: i64) -> Result<Option<PaymentLink>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        links::expire_link(id, &mut conn).await
    }

    async fn complete_link(
        &self,
        id: i64,
        payment_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<PaymentLink>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        links::complete_link(id, payment_id, now, &mut conn).await
    }
}

impl StatementManagement for SqliteDatabase {
    async fn insert_upload(&self, upload: NewStatementUpload) -> Result<BankStatementUpload, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let upload = statements::insert_upload(upload, &mut conn).await?;
        debug!("🗃️ Statement upload #{} ({}) registered", upload.id, upload.file_name);
        Ok(upload)
    }

    async fn fetch_upload(&self, id: i64) -> Result<Option<BankStatementUpload>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        statements::fetch_upload(id, &mut conn).await
    }

    async fn mark_upload_processed(&self, id: i64, matched: i64) -> Result<BankStatementUpload, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        statements::mark_upload_processed(id, matched, &mut conn).await
    }

    async fn fetch_uploads(&self, limit: i64, offset: i64) -> Result<Vec<BankStatementUpload>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        statements::fetch_uploads(limit, offset, &mut conn).await
    }
}

impl WebhookJournal for SqliteDatabase {
    async fn record_delivery_attempt(
        &self,
        payment_id: i64,
        response: &str,
        delivered: bool,
    ) -> Result<(), PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        payments::record_delivery_attempt(payment_id, response, delivered, &mut conn).await
    }

    async fn fetch_webhook_secret(&self, merchant_id: &str) -> Result<Secret<String>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        merchants::fetch_webhook_secret(merchant_id, &mut conn).await
    }

    async fn fetch_undelivered(&self, max_attempts: i64, limit: i64) -> Result<Vec<Payment>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_undelivered(max_attempts, limit, &mut conn).await
    }
}
