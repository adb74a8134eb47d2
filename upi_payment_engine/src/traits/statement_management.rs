use crate::{
    db_types::{BankStatementUpload, NewStatementUpload},
    traits::PaymentGatewayError,
};

/// Bank statement upload bookkeeping. An upload record is written once on upload and mutated
/// exactly once more by the reconciliation matcher; the `processed` flag is the idempotency
/// guard for the whole pass.
#[allow(async_fn_in_trait)]
pub trait StatementManagement: Clone {
    async fn insert_upload(&self, upload: NewStatementUpload) -> Result<BankStatementUpload, PaymentGatewayError>;

    async fn fetch_upload(&self, id: i64) -> Result<Option<BankStatementUpload>, PaymentGatewayError>;

    /// Sets `processed = true` and the matched count, iff the upload has not been processed
    /// yet. Fails with [`PaymentGatewayError::UploadAlreadyProcessed`] otherwise, so two racing
    /// reconciliation passes cannot both complete.
    async fn mark_upload_processed(&self, id: i64, matched: i64) -> Result<BankStatementUpload, PaymentGatewayError>;

    /// Recent uploads, newest first. The operator listing.
    async fn fetch_uploads(&self, limit: i64, offset: i64) -> Result<Vec<BankStatementUpload>, PaymentGatewayError>;
}
