use serde::Serialize;

use crate::types::Snapshot;

/// Summary counts over one snapshot, for logs and the CLI.
#[derive(Debug, Default, Serialize, PartialEq)]
pub struct SnapshotStats {
    pub total_rows: usize,
    pub rejected_rows: usize,
    pub lines: usize,
    pub vehicles: usize,
    pub without_line: usize,
    pub busiest_line: Option<String>,
    pub busiest_line_rows: usize,
}

impl SnapshotStats {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut s = SnapshotStats {
            total_rows: snapshot.json.rows.len(),
            rejected_rows: snapshot.json.rejected_rows,
            vehicles: snapshot.orders.len(),
            ..Default::default()
        };

        for (line, buses) in &snapshot.data {
            if line.is_empty() {
                s.without_line += buses.len();
                continue;
            }

            s.lines += 1;

            // ties go to the smaller line id so the summary is stable
            let busier = buses.len() > s.busiest_line_rows
                || (buses.len() == s.busiest_line_rows
                    && s.busiest_line.as_deref().is_some_and(|b| line.as_str() < b));
            if busier {
                s.busiest_line = Some(line.clone());
                s.busiest_line_rows = buses.len();
            }
        }

        s
    }

    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    /// Share of rows that carried no line id.
    pub fn without_line_pct(&self) -> f64 {
        Self::pct(self.without_line, self.total_rows)
    }
}
