//! Bank statement parsing.
//!
//! Banks cannot agree on a statement format, so parsing is a pluggable seam: a
//! [`StatementExtractor`] turns raw uploaded bytes into [`NormalizedRow`]s, and everything
//! downstream (the reconciliation matcher in particular) only ever sees normalized rows.
mod columns;
mod csv;
mod excel;

use chrono::NaiveDate;
use upg_common::Paisa;

use crate::traits::PaymentGatewayError;

pub use csv::CsvStatementExtractor;
pub use excel::ExcelStatementExtractor;

/// One credit row from a bank statement, reduced to the fields the matcher cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRow {
    pub date: Option<NaiveDate>,
    /// The full narrative text of the row, used for substring matching against payment
    /// references and account numbers.
    pub narrative: String,
    pub amount: Paisa,
    /// The bank's UTR for the row, if one could be extracted.
    pub utr: Option<String>,
}

/// Parses an uploaded statement into normalized rows. Implementations skip rows they cannot
/// make sense of (logging them) rather than failing the whole upload; a statement that yields
/// no rows at all is an error.
pub trait StatementExtractor {
    fn extract_rows(&self, data: &[u8]) -> Result<Vec<NormalizedRow>, PaymentGatewayError>;
}
