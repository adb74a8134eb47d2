use sqlx::SqliteConnection;
use upg_common::Secret;

use crate::{
    db_types::{MerchantProfile, NewMerchant},
    traits::PaymentGatewayError,
};

pub async fn fetch_merchant(
    merchant_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<MerchantProfile>, PaymentGatewayError> {
    let merchant =
        sqlx::query_as(r#"SELECT * FROM merchants WHERE id = ?"#).bind(merchant_id).fetch_optional(conn).await?;
    Ok(merchant)
}

pub async fn fetch_webhook_secret(
    merchant_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Secret<String>, PaymentGatewayError> {
    let (secret,): (String,) = sqlx::query_as(r#"SELECT webhook_secret FROM merchants WHERE id = ?"#)
        .bind(merchant_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| PaymentGatewayError::MerchantNotFound(merchant_id.to_string()))?;
    Ok(Secret::new(secret))
}

pub async fn insert_merchant(
    merchant: NewMerchant,
    conn: &mut SqliteConnection,
) -> Result<MerchantProfile, PaymentGatewayError> {
    let merchant = sqlx::query_as(
        r#"
            INSERT INTO merchants (
                id, name, webhook_secret, callback_url, upi_id, upi_name,
                min_deposit, max_deposit, min_withdrawal, max_withdrawal
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *;
        "#,
    )
    .bind(merchant.id)
    .bind(merchant.name)
    .bind(merchant.webhook_secret)
    .bind(merchant.callback_url)
    .bind(merchant.upi_id)
    .bind(merchant.upi_name)
    .bind(merchant.min_deposit)
    .bind(merchant.max_deposit)
    .bind(merchant.min_withdrawal)
    .bind(merchant.max_withdrawal)
    .fetch_one(conn)
    .await?;
    Ok(merchant)
}
