//! CSV parsing with per-column type inference.

use std::collections::HashSet;

use sqlgate_core::{SqlType, TypeField};

use crate::error::ConnectorError;

/// Parsed CSV: header fields plus rows, empty cells as `None`.
pub type CsvData = (Vec<TypeField>, Vec<Vec<Option<String>>>);

/// Parses `content` (UTF-8, header row first).
///
/// Each column is typed over its non-empty cells: all integers give
/// `BIGINT`, all numbers `DOUBLE`, all `true`/`false` `BOOLEAN`, anything
/// else `VARCHAR`.
pub fn parse_csv(content: &[u8]) -> Result<CsvData, ConnectorError> {
    let mut rdr = ::csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(content);
    let headers: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if headers.is_empty() || headers.iter().all(String::is_empty) {
        return Err(ConnectorError::InvalidData("CSV has no header row".into()));
    }
    let mut seen = HashSet::new();
    for (i, h) in headers.iter().enumerate() {
        if h.is_empty() {
            return Err(ConnectorError::InvalidData(format!(
                "CSV column {} has an empty name",
                i + 1
            )));
        }
        if !seen.insert(h.to_uppercase()) {
            return Err(ConnectorError::InvalidData(format!(
                "duplicate CSV column '{}'",
                h
            )));
        }
    }

    let mut rows = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record?;
        if record.len() != headers.len() {
            return Err(ConnectorError::InvalidData(format!(
                "CSV row {} has {} values, expected {}",
                line + 1,
                record.len(),
                headers.len()
            )));
        }
        let row: Vec<Option<String>> = record
            .iter()
            .map(|cell| {
                if cell.is_empty() {
                    None
                } else {
                    Some(cell.to_string())
                }
            })
            .collect();
        rows.push(row);
    }

    let fields = headers
        .into_iter()
        .enumerate()
        .map(|(i, name)| TypeField::new(name, infer_column(&rows, i)))
        .collect();
    Ok((fields, rows))
}

fn infer_column(rows: &[Vec<Option<String>>], col: usize) -> SqlType {
    let mut cells = rows.iter().filter_map(|r| r[col].as_deref()).peekable();
    if cells.peek().is_none() {
        return SqlType::Varchar;
    }
    let (mut int, mut num, mut boolean) = (true, true, true);
    for cell in cells {
        let cell = cell.trim();
        int = int && cell.parse::<i64>().is_ok();
        num = num && cell.parse::<f64>().map(f64::is_finite).unwrap_or(false);
        boolean = boolean && (cell.eq_ignore_ascii_case("true") || cell.eq_ignore_ascii_case("false"));
        if !int && !num && !boolean {
            return SqlType::Varchar;
        }
    }
    if int {
        SqlType::Bigint
    } else if num {
        SqlType::Double
    } else if boolean {
        SqlType::Boolean
    } else {
        SqlType::Varchar
    }
}
