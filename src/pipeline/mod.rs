//! The two sweeps that produce record and recovered tuples: a whole-file page
//! sweep over the main database file, and a frame-by-frame sweep over an optional
//! WAL sidecar (spec.md §2 "Data flow").

pub mod main_file;
pub mod wal;

use crate::model::{RecordTuple, RecoveredTuple};

/// What one pipeline run produced, before classification.
#[derive(Debug, Default)]
pub struct SweepOutput {
    pub records: Vec<RecordTuple>,
    pub recovered: Vec<RecoveredTuple>,
}

impl SweepOutput {
    pub fn extend(&mut self, other: SweepOutput) {
        self.records.extend(other.records);
        self.recovered.extend(other.recovered);
    }
}
