use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{NewPayment, Payment, VerificationMethod},
    traits::PaymentGatewayError,
};

/// Delivery responses are journaled for the operator view; long upstream error pages get cut
/// down to this many characters.
const MAX_RESPONSE_LEN: usize = 255;

pub async fn insert_payment(
    payment: NewPayment,
    fingerprint: &str,
    conn: &mut SqliteConnection,
) -> Result<Payment, PaymentGatewayError> {
    let metadata = match &payment.metadata {
        Some(m) => Some(serde_json::to_string(m).map_err(|e| PaymentGatewayError::ValidationError(e.to_string()))?),
        None => None,
    };
    let payment = sqlx::query_as(
        r#"
            INSERT INTO payments (
                merchant_id, reference, fingerprint, payment_type, payment_method, amount, currency,
                callback_url, account_name, account_number, bank, bank_ifsc, metadata
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *;
        "#,
    )
    .bind(payment.merchant_id)
    .bind(payment.reference)
    .bind(fingerprint)
    .bind(payment.payment_type)
    .bind(payment.payment_method)
    .bind(payment.amount)
    .bind(payment.currency)
    .bind(payment.callback_url)
    .bind(payment.account_name)
    .bind(payment.account_number)
    .bind(payment.bank)
    .bind(payment.bank_ifsc)
    .bind(metadata)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => {
            PaymentGatewayError::DuplicateFingerprint(fingerprint.to_string())
        },
        _ => PaymentGatewayError::from(e),
    })?;
    Ok(payment)
}

pub async fn fetch_payment(id: i64, conn: &mut SqliteConnection) -> Result<Option<Payment>, PaymentGatewayError> {
    let payment = sqlx::query_as(r#"SELECT * FROM payments WHERE id = ?"#).bind(id).fetch_optional(conn).await?;
    Ok(payment)
}

pub async fn fetch_payment_by_fingerprint(
    fingerprint: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, PaymentGatewayError> {
    let payment = sqlx::query_as(r#"SELECT * FROM payments WHERE fingerprint = ?"#)
        .bind(fingerprint)
        .fetch_optional(conn)
        .await?;
    Ok(payment)
}

pub async fn fetch_pending_payment_for_reference(
    merchant_id: &str,
    reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, PaymentGatewayError> {
    let payment = sqlx::query_as(
        r#"
            SELECT * FROM payments
            WHERE merchant_id = $1 AND reference = $2 AND status = 'PENDING'
            ORDER BY id DESC LIMIT 1;
        "#,
    )
    .bind(merchant_id)
    .bind(reference)
    .fetch_optional(conn)
    .await?;
    Ok(payment)
}

/// Classifies a conditional-update miss: the row either does not exist, or exists in a state
/// the update refused to touch.
async fn no_rows_reason(id: i64, conn: &mut SqliteConnection) -> PaymentGatewayError {
    match fetch_payment(id, conn).await {
        Ok(Some(p)) => PaymentGatewayError::InvalidStateTransition(format!(
            "Payment #{id} is {} and cannot be modified",
            p.status
        )),
        Ok(None) => PaymentGatewayError::PaymentNotFound(format!("#{id}")),
        Err(e) => e,
    }
}

pub async fn confirm_payment(
    id: i64,
    utr: &str,
    verified_by: &str,
    method: VerificationMethod,
    remarks: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Payment, PaymentGatewayError> {
    let result = sqlx::query_as(
        r#"
            UPDATE payments
            SET status = 'CONFIRMED', utr = $2, verified_by = $3, verification_method = $4, remarks = $5,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND status = 'PENDING'
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(utr)
    .bind(verified_by)
    .bind(method)
    .bind(remarks)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => PaymentGatewayError::DuplicateUtr(utr.to_string()),
        _ => PaymentGatewayError::from(e),
    })?;
    match result {
        Some(payment) => Ok(payment),
        None => Err(no_rows_reason(id, conn).await),
    }
}

pub async fn decline_payment(
    id: i64,
    declined_by: &str,
    remarks: &str,
    conn: &mut SqliteConnection,
) -> Result<Payment, PaymentGatewayError> {
    let result = sqlx::query_as(
        r#"
            UPDATE payments
            SET status = 'DECLINED', verified_by = $2, verification_method = 'MANUAL', remarks = $3,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND status = 'PENDING'
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(declined_by)
    .bind(remarks)
    .fetch_optional(&mut *conn)
    .await?;
    match result {
        Some(payment) => Ok(payment),
        None => Err(no_rows_reason(id, conn).await),
    }
}

pub async fn store_utr(id: i64, utr: &str, conn: &mut SqliteConnection) -> Result<Payment, PaymentGatewayError> {
    let result = sqlx::query_as(
        r#"
            UPDATE payments SET utr = $2, updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND status = 'PENDING'
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(utr)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => PaymentGatewayError::DuplicateUtr(utr.to_string()),
        _ => PaymentGatewayError::from(e),
    })?;
    match result {
        Some(payment) => Ok(payment),
        None => Err(no_rows_reason(id, conn).await),
    }
}

pub async fn fetch_pending_payments(
    merchant_id: Option<&str>,
    since: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Payment>, PaymentGatewayError> {
    // created_at defaults to CURRENT_TIMESTAMP ("YYYY-MM-DD HH:MM:SS") while a bound DateTime
    // encodes as RFC3339, so both sides go through datetime() to compare as instants.
    let mut builder = QueryBuilder::new("SELECT * FROM payments WHERE status = 'PENDING' AND datetime(created_at) >= datetime(");
    builder.push_bind(since);
    builder.push(")");
    if let Some(merchant_id) = merchant_id {
        builder.push(" AND merchant_id = ");
        builder.push_bind(merchant_id);
    }
    builder.push(" ORDER BY created_at ASC");
    let payments = builder.build_query_as().fetch_all(conn).await?;
    Ok(payments)
}

pub async fn fetch_pending_deposits(conn: &mut SqliteConnection) -> Result<Vec<Payment>, PaymentGatewayError> {
    let payments = sqlx::query_as(
        r#"SELECT * FROM payments WHERE status = 'PENDING' AND payment_type = 'DEPOSIT' ORDER BY created_at ASC"#,
    )
    .fetch_all(conn)
    .await?;
    Ok(payments)
}

pub async fn record_delivery_attempt(
    payment_id: i64,
    response: &str,
    delivered: bool,
    conn: &mut SqliteConnection,
) -> Result<(), PaymentGatewayError> {
    let response = response.chars().take(MAX_RESPONSE_LEN).collect::<String>();
    let result = sqlx::query(
        r#"
            UPDATE payments
            SET delivery_attempts = delivery_attempts + 1,
                last_delivery_response = $2,
                delivered = delivered OR $3,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1;
        "#,
    )
    .bind(payment_id)
    .bind(response)
    .bind(delivered)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(PaymentGatewayError::PaymentNotFound(format!("#{payment_id}")));
    }
    Ok(())
}

pub async fn fetch_undelivered(
    max_attempts: i64,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Payment>, PaymentGatewayError> {
    let payments = sqlx::query_as(
        r#"
            SELECT * FROM payments
            WHERE status IN ('CONFIRMED', 'DECLINED') AND delivered = 0 AND delivery_attempts < $1
            ORDER BY updated_at ASC LIMIT $2;
        "#,
    )
    .bind(max_attempts)
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(payments)
}
