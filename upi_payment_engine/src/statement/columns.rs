//! Header detection and column mapping shared by the tabular statement extractors.

use chrono::NaiveDate;
use upg_common::Paisa;

use crate::helpers::parse_money;

pub(crate) const DATE_FORMATS: [&str; 4] = ["%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d", "%d/%m/%y"];

#[derive(Debug, Default)]
pub(crate) struct ColumnMap {
    pub date: Option<usize>,
    pub amount: Vec<usize>,
    pub reference: Option<usize>,
}

pub(crate) fn looks_like_header(text: &str) -> bool {
    let lower = text.to_lowercase();
    ["date", "amount", "narration", "description", "particulars"].iter().any(|k| lower.contains(k))
}

pub(crate) fn map_columns(cells: &[String]) -> ColumnMap {
    let mut map = ColumnMap::default();
    for (i, cell) in cells.iter().enumerate() {
        let name = cell.to_lowercase();
        if map.date.is_none() && name.contains("date") {
            map.date = Some(i);
        }
        if name.contains("amount") || name.contains("credit") || name == "amt" {
            map.amount.push(i);
        }
        if map.reference.is_none() && (name.contains("utr") || name.contains("ref") || name.contains("txn")) {
            map.reference = Some(i);
        }
    }
    map
}

pub(crate) fn amount_from(cells: &[String], columns: &ColumnMap) -> Option<Paisa> {
    if columns.amount.is_empty() {
        cells.iter().find_map(|c| parse_money(c))
    } else {
        columns.amount.iter().find_map(|&i| cells.get(i).and_then(|c| parse_money(c)))
    }
}

pub(crate) fn date_from(cells: &[String], columns: &ColumnMap) -> Option<NaiveDate> {
    let candidates: Vec<&String> = match columns.date {
        Some(i) => cells.get(i).into_iter().collect(),
        None => cells.iter().collect(),
    };
    for cell in candidates {
        for fmt in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(cell, fmt) {
                return Some(date);
            }
        }
    }
    None
}
