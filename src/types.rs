//! Data types shared by the decoder, indexer and emitter.

use serde::Serialize;
use std::collections::HashMap;

use crate::status::Status;

/// One vehicle position, decoded from a positional
/// `[timestamp, vehicleId, lineId, latitude, longitude, speed, heading]` row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusRecord {
    pub timestamp: String,
    pub vehicle_id: String,
    /// Empty when the vehicle is not running a line.
    pub line_id: String,
    pub lat: f64,
    pub lon: f64,
    pub speed: f64,
    pub heading: f64,
}

/// A decoded response body: the advertised columns plus every accepted row,
/// in document order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedSnapshot {
    #[serde(rename = "COLUMNS")]
    pub columns: Vec<String>,
    #[serde(rename = "DATA")]
    pub rows: Vec<BusRecord>,
    /// Rows dropped because they did not have the expected shape.
    #[serde(rename = "rejectedRows")]
    pub rejected_rows: usize,
}

/// Line id to every record on that line.
pub type LineIndex = HashMap<String, Vec<BusRecord>>;

/// Vehicle id to the single surviving record for that vehicle.
pub type OrderIndex = HashMap<String, BusRecord>;

/// Everything handed downstream after a successful cycle.
///
/// Built once per cycle and never touched again; the poller keeps no
/// reference after emitting it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub data: LineIndex,
    pub json: ParsedSnapshot,
    pub orders: OrderIndex,
    /// Local time of this successful update, human readable.
    pub last_update: String,
    pub last_status: Status,
}
