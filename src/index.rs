//! Builds the by-line and by-vehicle views over a decoded snapshot.

use crate::types::{BusRecord, LineIndex, OrderIndex};

/// Builds both indexes in one pass over `rows`, walking from the last row to
/// the first.
///
/// Each line's records therefore appear in reverse document order, and when a
/// vehicle shows up more than once the record nearest the top of the document
/// is the one kept in the [`OrderIndex`].
pub fn build_indexes(rows: &[BusRecord]) -> (LineIndex, OrderIndex) {
    let mut lines = LineIndex::new();
    let mut orders = OrderIndex::new();

    for bus in rows.iter().rev() {
        lines.entry(bus.line_id.clone()).or_default().push(bus.clone());
        orders.insert(bus.vehicle_id.clone(), bus.clone());
    }

    (lines, orders)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus(timestamp: &str, vehicle: &str, line: &str) -> BusRecord {
        BusRecord {
            timestamp: timestamp.to_string(),
            vehicle_id: vehicle.to_string(),
            line_id: line.to_string(),
            lat: -22.9,
            lon: -43.2,
            speed: 10.0,
            heading: 1.0,
        }
    }

    #[test]
    fn test_empty_rows() {
        let (lines, orders) = build_indexes(&[]);
        assert!(lines.is_empty());
        assert!(orders.is_empty());
    }

    #[test]
    fn test_two_buses_on_one_line() {
        let rows = vec![bus("t1", "101", "550"), bus("t2", "102", "550")];
        let (lines, orders) = build_indexes(&rows);

        assert_eq!(lines["550"].len(), 2);
        assert_eq!(orders["101"], rows[0]);
        assert_eq!(orders["102"], rows[1]);
    }

    #[test]
    fn test_line_sequence_is_reverse_document_order() {
        let rows = vec![
            bus("t1", "101", "550"),
            bus("t2", "102", "550"),
            bus("t3", "103", "550"),
        ];
        let (lines, _) = build_indexes(&rows);

        let seen: Vec<_> = lines["550"].iter().map(|b| b.vehicle_id.as_str()).collect();
        assert_eq!(seen, vec!["103", "102", "101"]);
    }

    #[test]
    fn test_duplicate_vehicle_keeps_earliest_row() {
        let rows = vec![
            bus("t1", "101", "550"),
            bus("t2", "202", "474"),
            bus("t3", "101", "550"),
        ];
        let (lines, orders) = build_indexes(&rows);

        assert_eq!(orders.len(), 2);
        assert_eq!(orders["101"].timestamp, "t1");
        // Duplicates still count toward their line.
        assert_eq!(lines["550"].len(), 2);
    }

    #[test]
    fn test_every_row_lands_in_exactly_one_line() {
        let rows = vec![
            bus("t1", "101", "550"),
            bus("t2", "102", ""),
            bus("t3", "103", "474"),
            bus("t4", "104", "550"),
            bus("t5", "101", "474"),
        ];
        let (lines, orders) = build_indexes(&rows);

        let total: usize = lines.values().map(Vec::len).sum();
        assert_eq!(total, rows.len());
        assert_eq!(lines[""].len(), 1);
        assert_eq!(orders.len(), 4);
    }
}
