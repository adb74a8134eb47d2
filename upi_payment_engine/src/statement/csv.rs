use log::*;

use crate::{
    helpers::{extract_amount, extract_utr, is_valid_utr},
    statement::{
        columns::{amount_from, date_from, looks_like_header, map_columns, ColumnMap},
        NormalizedRow,
        StatementExtractor,
    },
    traits::PaymentGatewayError,
};

/// Extractor for comma-separated statements, the lowest common denominator of bank exports.
///
/// If the first line looks like a header it is used to locate the date, amount and reference
/// columns; otherwise each row is scanned positionally. Rows that yield no positive amount are
/// logged and skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvStatementExtractor;

impl StatementExtractor for CsvStatementExtractor {
    fn extract_rows(&self, data: &[u8]) -> Result<Vec<NormalizedRow>, PaymentGatewayError> {
        let text = std::str::from_utf8(data)
            .map_err(|e| PaymentGatewayError::StatementParseError(format!("Statement is not valid UTF-8: {e}")))?;
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty()).peekable();
        let columns = match lines.peek() {
            Some(first) if looks_like_header(first) => {
                let map = map_columns(&split_line(first));
                let _ = lines.next();
                map
            },
            Some(_) => ColumnMap::default(),
            None => return Err(PaymentGatewayError::StatementParseError("Statement is empty".to_string())),
        };
        let mut rows = Vec::new();
        for (n, line) in lines.enumerate() {
            let cells = split_line(line);
            let narrative = cells.join(" ");
            // Prefer a dedicated amount cell; fall back to currency-marked text in the narrative.
            let Some(amount) = amount_from(&cells, &columns).or_else(|| extract_amount(&narrative)) else {
                warn!("🏦️ Skipping statement row {}: no positive amount found", n + 1);
                continue;
            };
            let utr = columns
                .reference
                .and_then(|i| cells.get(i))
                .filter(|c| is_valid_utr(c))
                .cloned()
                .or_else(|| extract_utr(&narrative));
            let date = date_from(&cells, &columns);
            rows.push(NormalizedRow { date, narrative, amount, utr });
        }
        if rows.is_empty() {
            return Err(PaymentGatewayError::StatementParseError("No usable rows in statement".to_string()));
        }
        Ok(rows)
    }
}

/// Splits a CSV line on commas, honouring double-quoted cells.
fn split_line(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in line.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                cells.push(current.trim().to_string());
                current = String::new();
            },
            c => current.push(c),
        }
    }
    cells.push(current.trim().to_string());
    cells
}
