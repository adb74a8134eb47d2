use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewPaymentLink, PaymentLink},
    traits::PaymentGatewayError,
};

pub async fn insert_link(link: NewPaymentLink, conn: &mut SqliteConnection) -> Result<PaymentLink, PaymentGatewayError> {
    let link = sqlx::query_as(
        r#"
            INSERT INTO payment_links (merchant_id, reference, amount, currency, description, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(link.merchant_id)
    .bind(link.reference)
    .bind(link.amount)
    .bind(link.currency)
    .bind(link.description)
    .bind(link.expires_at)
    .fetch_one(conn)
    .await?;
    Ok(link)
}

pub async fn fetch_link(id: i64, conn: &mut SqliteConnection) -> Result<Option<PaymentLink>, PaymentGatewayError> {
    let link = sqlx::query_as(r#"SELECT * FROM payment_links WHERE id = ?"#).bind(id).fetch_optional(conn).await?;
    Ok(link)
}

/// Best-effort persistence of lazy expiry. Only flips `ACTIVE` links, so a completed link is
/// never clobbered by a stale expiry sweep.
pub async fn expire_link(id: i64, conn: &mut SqliteConnection) -> Result<Option<PaymentLink>, PaymentGatewayError> {
    let link = sqlx::query_as(
        r#"
            UPDATE payment_links SET status = 'EXPIRED', updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND status = 'ACTIVE'
            RETURNING *;
        "#,
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(link)
}

pub async fn complete_link(
    id: i64,
    payment_id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentLink>, PaymentGatewayError> {
    let link = sqlx::query_as(
        r#"
            UPDATE payment_links SET status = 'COMPLETED', payment_id = $2, updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND status = 'ACTIVE' AND datetime(expires_at) > datetime($3)
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(payment_id)
    .bind(now)
    .fetch_optional(conn)
    .await?;
    Ok(link)
}
