//! JSON decoder for the bus positions endpoint.
//!
//! The endpoint answers with a tabular document:
//! `{"COLUMNS": ["DATAHORA", "ORDEM", ...], "DATA": [[...], ...]}`.
//! When it has nothing to report it still answers 200, with
//! `{"COLUMNS": ["MENSAGEM"], "DATA": [["<message>"]]}`.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::error::GrabError;
use crate::types::{BusRecord, ParsedSnapshot};

/// The only column of a message-only payload.
pub const SENTINEL_COLUMN: &str = "MENSAGEM";

/// Cells a row needs before it can become a [`BusRecord`].
pub const ROW_WIDTH: usize = 7;

const MAX_LOGGED_REJECTS: usize = 3;

#[derive(Deserialize)]
struct RawDocument {
    #[serde(rename = "COLUMNS")]
    columns: Vec<String>,
    #[serde(rename = "DATA")]
    data: Vec<Value>,
}

/// Why a single row was not accepted.
#[derive(Debug, Error, PartialEq)]
pub enum RowError {
    #[error("row is not an array")]
    NotAnArray,
    #[error("row has {0} cells, expected at least 7")]
    TooShort(usize),
    #[error("cell {0} is not text")]
    BadText(usize),
    #[error("cell {0} is not a finite number")]
    BadNumber(usize),
}

/// Decodes a complete response body.
///
/// # Errors
///
/// - [`GrabError::Parse`] if the body is not JSON or lacks `COLUMNS`/`DATA`.
/// - [`GrabError::Sentinel`] if the body is a message-only payload.
pub fn parse_snapshot(bytes: &[u8]) -> Result<ParsedSnapshot, GrabError> {
    let doc: RawDocument = serde_json::from_slice(bytes)?;

    if is_sentinel(&doc.columns) {
        return Err(GrabError::Sentinel(sentinel_message(&doc.data)));
    }

    let mut rows = Vec::with_capacity(doc.data.len());
    let mut rejected_rows = 0;

    for (i, row) in doc.data.iter().enumerate() {
        match BusRecord::from_row(row) {
            Ok(record) => rows.push(record),
            Err(e) => {
                if rejected_rows < MAX_LOGGED_REJECTS {
                    debug!(row = i, error = %e, "Rejected row");
                }
                rejected_rows += 1;
            }
        }
    }

    if rejected_rows > 0 {
        debug!(rejected_rows, accepted = rows.len(), "Some rows were rejected");
    }

    Ok(ParsedSnapshot {
        columns: doc.columns,
        rows,
        rejected_rows,
    })
}

fn is_sentinel(columns: &[String]) -> bool {
    columns.len() == 1 && columns[0] == SENTINEL_COLUMN
}

/// The message lives at `DATA[0][0]`.
fn sentinel_message(data: &[Value]) -> String {
    match data.first().and_then(Value::as_array).and_then(|r| r.first()) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

impl BusRecord {
    /// Builds a record from one positional `DATA` row.
    ///
    /// Ids may arrive as strings or numbers; coordinates, speed and heading
    /// may arrive as numbers or numeric strings. Cells past the seventh are
    /// ignored.
    pub fn from_row(row: &Value) -> Result<Self, RowError> {
        let cells = row.as_array().ok_or(RowError::NotAnArray)?;
        if cells.len() < ROW_WIDTH {
            return Err(RowError::TooShort(cells.len()));
        }

        Ok(BusRecord {
            timestamp: text(&cells[0], 0, false)?,
            vehicle_id: text(&cells[1], 1, false)?,
            line_id: text(&cells[2], 2, true)?,
            lat: number(&cells[3], 3)?,
            lon: number(&cells[4], 4)?,
            speed: number(&cells[5], 5)?,
            heading: number(&cells[6], 6)?,
        })
    }
}

fn text(cell: &Value, idx: usize, allow_null: bool) -> Result<String, RowError> {
    match cell {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null if allow_null => Ok(String::new()),
        _ => Err(RowError::BadText(idx)),
    }
}

fn number(cell: &Value, idx: usize) -> Result<f64, RowError> {
    let value = match cell {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace('\u{2212}', "-").parse::<f64>().ok(),
        _ => None,
    };
    value
        .filter(|v| v.is_finite())
        .ok_or(RowError::BadNumber(idx))
}
