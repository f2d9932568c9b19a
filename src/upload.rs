//! CSV ingestion for dashboard uploads.
//!
//! The first row is the header and the first column is the row index. Each
//! remaining column is typed as a whole: it becomes int, float, bool, or
//! datetime only when every non-empty cell parses as that type, otherwise it
//! stays text.

use chrono::{NaiveDate, NaiveDateTime};
use tracing::info;

use crate::core::{DashError, Result};
use crate::payload::{Payload, Value};

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// An uploaded file after parsing.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub payload: Payload,
}

/// Parses an uploaded CSV file into a payload.
pub fn parse_upload(file_name: &str, bytes: &[u8]) -> Result<Upload> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| DashError::Csv(format!("{} is not valid UTF-8: {}", file_name, e)))?;
    let payload = parse_csv(text)?;
    info!(
        "Parsed upload {} ({} columns, {} rows)",
        file_name,
        payload.columns().len(),
        payload.row_count()
    );
    Ok(Upload {
        file_name: file_name.to_string(),
        payload,
    })
}

/// Parses CSV text whose first column is the row index.
pub fn parse_csv(text: &str) -> Result<Payload> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut records = split_records(text)?.into_iter();

    let (_, header) = records
        .next()
        .ok_or_else(|| DashError::Csv("file is empty".to_string()))?;
    if header.len() < 2 {
        return Err(DashError::Csv(
            "expected an index column and at least one data column".to_string(),
        ));
    }
    let columns: Vec<String> = header[1..].iter().map(|h| h.trim().to_string()).collect();

    let mut index = Vec::new();
    let mut raw_columns: Vec<Vec<String>> = vec![Vec::new(); columns.len()];
    for (line, record) in records {
        if record.len() != header.len() {
            return Err(DashError::Csv(format!(
                "line {} has {} fields, expected {}",
                line,
                record.len(),
                header.len()
            )));
        }
        let mut fields = record.into_iter();
        index.push(fields.next().unwrap_or_default());
        for (column, field) in raw_columns.iter_mut().zip(fields) {
            column.push(field);
        }
    }

    let typed: Vec<Vec<Value>> = raw_columns.iter().map(|c| type_column(c)).collect();
    let rows: Vec<Vec<Value>> = (0..index.len())
        .map(|r| typed.iter().map(|column| column[r].clone()).collect())
        .collect();

    Payload::new(columns, rows)?.with_index(index)
}

/// Converts one column of raw cells, choosing the narrowest type that fits
/// every non-empty cell.
fn type_column(cells: &[String]) -> Vec<Value> {
    let present = || cells.iter().map(|c| c.trim()).filter(|c| !c.is_empty());
    let convert = |parse: &dyn Fn(&str) -> Option<Value>| -> Vec<Value> {
        cells
            .iter()
            .map(|c| {
                let c = c.trim();
                if c.is_empty() {
                    Value::Null
                } else {
                    parse(c).unwrap_or(Value::Null)
                }
            })
            .collect()
    };

    if present().all(|c| c.parse::<i64>().is_ok()) {
        convert(&|c| c.parse().ok().map(Value::Int))
    } else if present().all(|c| c.parse::<f64>().is_ok()) {
        convert(&|c| c.parse().ok().map(Value::Float))
    } else if present().all(|c| parse_bool(c).is_some()) {
        convert(&|c| parse_bool(c).map(Value::Bool))
    } else if present().all(|c| parse_datetime(c).is_some()) {
        convert(&|c| parse_datetime(c).map(Value::DateTime))
    } else {
        cells
            .iter()
            .map(|c| {
                if c.trim().is_empty() {
                    Value::Null
                } else {
                    Value::Text(c.clone())
                }
            })
            .collect()
    }
}

fn parse_bool(cell: &str) -> Option<bool> {
    match cell.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn parse_datetime(cell: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(cell, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(cell, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Splits CSV text into records, returning each with its starting line number.
///
/// Supports double-quoted fields with `""` escapes and embedded newlines,
/// and LF or CRLF line endings. Blank lines are skipped.
fn split_records(text: &str) -> Result<Vec<(usize, Vec<String>)>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut record_line = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                if !(record.len() == 1 && record[0].is_empty()) {
                    records.push((record_line, std::mem::take(&mut record)));
                } else {
                    record.clear();
                }
                line += 1;
                record_line = line;
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(DashError::Csv(format!(
            "unterminated quoted field starting on line {}",
            record_line
        )));
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push((record_line, record));
    }
    Ok(records)
}
