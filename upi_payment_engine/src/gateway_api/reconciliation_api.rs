use std::fmt::Debug;

use log::*;
use serde::Serialize;

use crate::{
    db_types::{BankStatementUpload, NewStatementUpload, Payment, PaymentKey, VerificationMethod},
    gateway_api::PaymentFlowApi,
    helpers::reference_token,
    statement::{NormalizedRow, StatementExtractor},
    traits::{PaymentGatewayDatabase, PaymentGatewayError, StatementManagement},
};

/// The outcome of one reconciliation pass over an uploaded statement.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ReconciliationSummary {
    pub upload_id: i64,
    pub total_rows: usize,
    pub matched: usize,
    pub ambiguous: usize,
    pub unmatched: usize,
}

/// `ReconciliationApi` matches uploaded bank statement rows against pending deposits and
/// confirms the unambiguous matches automatically.
///
/// Matching is deliberately conservative. A row confirms a payment only when the evidence is
/// unambiguous:
/// 1. the row's UTR (or narrative) carries a UTR the customer already submitted against
///    exactly one pending deposit, or
/// 2. exactly one pending deposit has the row's amount, after narrowing any amount ties by
///    looking for the payment's reference or account number in the row narrative.
///
/// Anything else is left for an operator. A matched payment goes through the normal confirm
/// transition, so the webhook hooks fire exactly as they would for a manual verification.
pub struct ReconciliationApi<B> {
    api: PaymentFlowApi<B>,
}

impl<B> Debug for ReconciliationApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconciliationApi")
    }
}

impl<B> ReconciliationApi<B> {
    pub fn new(api: PaymentFlowApi<B>) -> Self {
        Self { api }
    }
}

impl<B> ReconciliationApi<B>
where B: PaymentGatewayDatabase + StatementManagement
{
    /// Registers a new statement upload, unprocessed.
    pub async fn register_upload(&self, upload: NewStatementUpload) -> Result<BankStatementUpload, PaymentGatewayError> {
        self.api.db().insert_upload(upload).await
    }

    pub async fn fetch_upload(&self, id: i64) -> Result<Option<BankStatementUpload>, PaymentGatewayError> {
        self.api.db().fetch_upload(id).await
    }

    /// Recent uploads, newest first.
    pub async fn uploads(&self, limit: i64, offset: i64) -> Result<Vec<BankStatementUpload>, PaymentGatewayError> {
        self.api.db().fetch_uploads(limit, offset).await
    }

    /// Runs a full reconciliation pass for the given upload.
    ///
    /// The upload's `processed` flag is the idempotency guard: a second pass over the same
    /// upload fails with [`PaymentGatewayError::UploadAlreadyProcessed`] before any matching
    /// happens. Each confirmed match removes the payment from the candidate set, so one
    /// statement row never settles two payments and vice versa.
    pub async fn reconcile<E: StatementExtractor>(
        &self,
        upload_id: i64,
        extractor: &E,
        data: &[u8],
    ) -> Result<ReconciliationSummary, PaymentGatewayError> {
        let upload =
            self.api.db().fetch_upload(upload_id).await?.ok_or(PaymentGatewayError::UploadNotFound(upload_id))?;
        if upload.processed {
            return Err(PaymentGatewayError::UploadAlreadyProcessed(upload_id));
        }
        let rows = extractor.extract_rows(data)?;
        let mut pending = self.api.db().fetch_pending_deposits().await?;
        info!(
            "🏦️ Reconciling upload #{upload_id} ({}): {} rows against {} pending deposits",
            upload.file_name,
            rows.len(),
            pending.len()
        );
        let mut summary = ReconciliationSummary {
            upload_id,
            total_rows: rows.len(),
            matched: 0,
            ambiguous: 0,
            unmatched: 0,
        };
        for (n, row) in rows.iter().enumerate() {
            match find_match(row, &pending) {
                MatchOutcome::Matched(i, utr) => {
                    let payment = pending.remove(i);
                    let remarks = format!("Auto-matched against row {} of statement upload #{upload_id}", n + 1);
                    match self
                        .api
                        .verify_payment(
                            PaymentKey::Id(payment.id),
                            &utr,
                            &upload.uploaded_by,
                            VerificationMethod::Auto,
                            Some(&remarks),
                        )
                        .await
                    {
                        Ok(p) => {
                            info!("🏦️ Payment {} auto-confirmed with UTR {utr}", p.fingerprint);
                            summary.matched += 1;
                        },
                        Err(e) => {
                            // Lost a race with a manual verification or another pass.
                            warn!("🏦️ Could not confirm payment {}: {e}", payment.fingerprint);
                            summary.unmatched += 1;
                        },
                    }
                },
                MatchOutcome::Ambiguous(count) => {
                    info!(
                        "🏦️ Row {} of upload #{upload_id} matches {count} pending deposits. Leaving for an operator",
                        n + 1
                    );
                    summary.ambiguous += 1;
                },
                MatchOutcome::NoEvidence => {
                    trace!("🏦️ Row {} of upload #{upload_id} carries no evidence, leaving for an operator", n + 1);
                    summary.unmatched += 1;
                },
                MatchOutcome::NoMatch => {
                    summary.unmatched += 1;
                },
            }
        }
        self.api.db().mark_upload_processed(upload_id, summary.matched as i64).await?;
        info!(
            "🏦️ Upload #{upload_id} processed: {}/{} rows matched, {} ambiguous",
            summary.matched, summary.total_rows, summary.ambiguous
        );
        Ok(summary)
    }
}

enum MatchOutcome {
    /// Index of the single matching payment and the UTR to stamp on it as evidence.
    Matched(usize, String),
    Ambiguous(usize),
    /// A single candidate by amount, but the row has nothing usable as evidence.
    NoEvidence,
    NoMatch,
}

/// Applies the matching rules to one row against the remaining candidate set, returning the
/// index of the single matching payment if there is one.
fn find_match(row: &NormalizedRow, pending: &[Payment]) -> MatchOutcome {
    // Rule 1: the row carries a UTR the customer already submitted. The stored UTR is its own
    // evidence, so the row does not need a parseable UTR of its own.
    if let Some((i, stored)) = pending.iter().enumerate().find_map(|(i, p)| {
        p.utr
            .as_deref()
            .filter(|stored| row.utr.as_deref() == Some(*stored) || row.narrative.contains(*stored))
            .map(|stored| (i, stored.to_string()))
    }) {
        return MatchOutcome::Matched(i, stored);
    }
    // Rule 2: match by exact amount, narrowing ties by reference or account number.
    let by_amount: Vec<usize> =
        pending.iter().enumerate().filter(|(_, p)| p.amount == row.amount).map(|(i, _)| i).collect();
    let narrowed: Vec<usize> = by_amount
        .iter()
        .copied()
        .filter(|&i| {
            let p = &pending[i];
            row.narrative.contains(p.reference.as_str())
                || p.account_number.as_deref().is_some_and(|acc| row.narrative.contains(acc))
        })
        .collect();
    let candidates = if narrowed.is_empty() { by_amount } else { narrowed };
    match candidates.as_slice() {
        [] => MatchOutcome::NoMatch,
        [i] => {
            // An amount-only confirmation still needs transaction evidence to stamp on the
            // payment: the row's UTR, or failing that a reference-like token from the narrative.
            match row.utr.clone().or_else(|| reference_token(&row.narrative)) {
                Some(utr) => MatchOutcome::Matched(*i, utr),
                None => MatchOutcome::NoEvidence,
            }
        },
        many => MatchOutcome::Ambiguous(many.len()),
    }
}
