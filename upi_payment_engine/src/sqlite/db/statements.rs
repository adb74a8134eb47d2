use sqlx::SqliteConnection;

use crate::{
    db_types::{BankStatementUpload, NewStatementUpload},
    traits::PaymentGatewayError,
};

pub async fn insert_upload(
    upload: NewStatementUpload,
    conn: &mut SqliteConnection,
) -> Result<BankStatementUpload, PaymentGatewayError> {
    let upload = sqlx::query_as(
        r#"
            INSERT INTO bank_statement_uploads (uploaded_by, file_name, file_ref)
            VALUES ($1, $2, $3)
            RETURNING *;
        "#,
    )
    .bind(upload.uploaded_by)
    .bind(upload.file_name)
    .bind(upload.file_ref)
    .fetch_one(conn)
    .await?;
    Ok(upload)
}

pub async fn fetch_upload(
    id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<BankStatementUpload>, PaymentGatewayError> {
    let upload =
        sqlx::query_as(r#"SELECT * FROM bank_statement_uploads WHERE id = ?"#).bind(id).fetch_optional(conn).await?;
    Ok(upload)
}

pub async fn mark_upload_processed(
    id: i64,
    matched: i64,
    conn: &mut SqliteConnection,
) -> Result<BankStatementUpload, PaymentGatewayError> {
    let result = sqlx::query_as(
        r#"
            UPDATE bank_statement_uploads SET processed = 1, matched_transactions = $2
            WHERE id = $1 AND processed = 0
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(matched)
    .fetch_optional(&mut *conn)
    .await?;
    match result {
        Some(upload) => Ok(upload),
        None => match fetch_upload(id, conn).await? {
            Some(_) => Err(PaymentGatewayError::UploadAlreadyProcessed(id)),
            None => Err(PaymentGatewayError::UploadNotFound(id)),
        },
    }
}

pub async fn fetch_uploads(
    limit: i64,
    offset: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<BankStatementUpload>, PaymentGatewayError> {
    let uploads = sqlx::query_as(
        r#"SELECT * FROM bank_statement_uploads ORDER BY uploaded_at DESC, id DESC LIMIT $1 OFFSET $2"#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(conn)
    .await?;
    Ok(uploads)
}
