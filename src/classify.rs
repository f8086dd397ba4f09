//! Assigns a record status to every row in the unified record stream by comparing
//! frame versions of the same page (spec.md §4.12). Runs after both pipelines have
//! produced their `RecordTuple`s; two passes are needed because the second pass
//! needs the Active set fully known first (grounded in the original tool's
//! `recordclassify.py`, which computes one `max_frame` per page before
//! reclassifying every row on it).

use std::collections::HashMap;

use crate::model::{RecordStatus, RecordTuple};
use crate::source::PageNum;
use crate::value::Value;

/// Reclassifies `records` in place. Rows already marked `Freelist` (spec.md §4.10c)
/// are left untouched — that status is assigned at decode time, not by this pass.
pub fn classify(records: &mut [RecordTuple]) {
    let mut max_frame_by_page: HashMap<PageNum, u32> = HashMap::new();
    for r in records.iter() {
        if matches!(r.record_status, RecordStatus::Freelist) {
            continue;
        }
        let ord = r.frame_number.as_ordinal();
        let entry = max_frame_by_page.entry(r.page_number).or_insert(0);
        if ord > *entry {
            *entry = ord;
        }
    }

    // First pass: mark every row at its page's max frame Active.
    for r in records.iter_mut() {
        if matches!(r.record_status, RecordStatus::Freelist) {
            continue;
        }
        let max_frame = max_frame_by_page.get(&r.page_number).copied().unwrap_or(0);
        if r.frame_number.as_ordinal() == max_frame {
            r.record_status = RecordStatus::Active;
        }
    }

    // Build the Active lookup (page, rowid) -> values, now that it is fully known.
    let mut active: HashMap<(PageNum, i64), Vec<Value>> = HashMap::new();
    for r in records.iter() {
        if matches!(r.record_status, RecordStatus::Active) {
            active.insert((r.page_number, r.rowid), r.values.clone());
        }
    }

    // Second pass: every earlier-frame row is Deleted, Modified/Reused ID, or
    // Duplicate relative to its page's Active counterpart, if any.
    for r in records.iter_mut() {
        if matches!(r.record_status, RecordStatus::Freelist | RecordStatus::Active) {
            continue;
        }
        match active.get(&(r.page_number, r.rowid)) {
            None => r.record_status = RecordStatus::Deleted,
            Some(active_values) => {
                if columns_match(active_values, &r.values) {
                    r.record_status = RecordStatus::Duplicate;
                } else {
                    r.record_status = RecordStatus::ModifiedReusedId;
                }
            }
        }
    }
}

fn columns_match(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.classifier_eq(y))
}
