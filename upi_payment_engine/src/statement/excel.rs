use std::io::Cursor;

use calamine::{Data, Reader, Xlsx};
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

/// Extractor for Excel (`.xlsx`) statements. The first sheet is taken to be the statement;
/// header detection and column mapping work as for CSV, after rendering each cell to text.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExcelStatementExtractor;

impl StatementExtractor for ExcelStatementExtractor {
    fn extract_rows(&self, data: &[u8]) -> Result<Vec<NormalizedRow>, PaymentGatewayError> {
        let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(data)).map_err(|e| {
            PaymentGatewayError::StatementParseError(format!("Statement is not a valid Excel workbook: {e}"))
        })?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| PaymentGatewayError::StatementParseError("Workbook has no sheets".to_string()))?
            .map_err(|e| PaymentGatewayError::StatementParseError(format!("Could not read the first sheet: {e}")))?;
        let mut sheet_rows = range
            .rows()
            .map(|r| r.iter().map(cell_text).collect::<Vec<_>>())
            .filter(|cells| cells.iter().any(|c| !c.is_empty()))
            .peekable();
        let columns = match sheet_rows.peek() {
            Some(first) if looks_like_header(&first.join(" ")) => {
                let map = map_columns(first);
                let _ = sheet_rows.next();
                map
            },
            Some(_) => ColumnMap::default(),
            None => return Err(PaymentGatewayError::StatementParseError("Statement is empty".to_string())),
        };
        let mut rows = Vec::new();
        for (n, cells) in sheet_rows.enumerate() {
            let narrative = cells.join(" ");
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

/// Renders a cell to the text form the column mappers expect. Whole-number floats lose the
/// trailing ".0" so numeric UTR and amount cells read as they do in a CSV export.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        Data::Float(f) => format!("{f:.2}"),
        Data::Int(i) => i.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod test {
    use chrono::NaiveDate;
    use upg_common::Paisa;

    use super::*;

    const STATEMENT: &[u8] = include_bytes!("../../tests/data/statement.xlsx");

    #[test]
    fn parses_excel_statement() {
        let rows = ExcelStatementExtractor.extract_rows(STATEMENT).unwrap();
        // The charges row has no amount and is skipped
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].amount, Paisa::from(150_000));
        assert_eq!(rows[0].utr.as_deref(), Some("AXIS12345678901"));
        assert_eq!(rows[0].date, Some(NaiveDate::from_ymd_opt(2024, 8, 12).unwrap()));
        assert_eq!(rows[1].amount, Paisa::from(25_050));
        assert_eq!(rows[1].utr.as_deref(), Some("UTR998877665544"));
        assert!(rows[1].narrative.contains("order-77"));
    }

    #[test]
    fn garbage_is_not_a_workbook() {
        let err = ExcelStatementExtractor.extract_rows(b"not a workbook").unwrap_err();
        assert!(matches!(err, PaymentGatewayError::StatementParseError(_)));
    }
}
