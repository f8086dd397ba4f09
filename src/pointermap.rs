//! Predicts pointer-map page numbers for auto-vacuum databases (spec.md §4.5). This
//! crate never decodes pointer-map page contents (that is an explicit non-goal); it
//! only needs to know which page numbers are pointer maps so the page classifier can
//! route around them.

use crate::model::PointerMapSet;
use crate::source::PageNum;

/// Generates `k * (floor(page_size / 5) + 1) + 2` for `k = 0, 1, 2, …` until the
/// total page count is exceeded. Returns an empty set when auto-vacuum is disabled.
pub fn predict(page_size: u32, auto_vacuum_enabled: bool, page_count: u32) -> PointerMapSet {
    let mut pages = std::collections::HashSet::new();
    if !auto_vacuum_enabled {
        return PointerMapSet::new(pages);
    }
    let stride = (page_size / 5) + 1;
    let mut k: u64 = 0;
    loop {
        let candidate = k * stride as u64 + 2;
        if candidate > page_count as u64 {
            break;
        }
        pages.insert(candidate as PageNum);
        k += 1;
    }
    PointerMapSet::new(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_auto_vacuum_yields_empty_set() {
        let set = predict(4096, false, 1000);
        assert!(!set.contains(2));
    }

    #[test]
    fn test_first_pointer_map_is_page_two() {
        let set = predict(4096, true, 2000);
        assert!(set.contains(2));
    }

    #[test]
    fn test_subsequent_pointer_maps_spaced_by_stride() {
        // page_size=4096 -> stride = 4096/5 + 1 = 820
        let set = predict(4096, true, 2000);
        assert!(set.contains(2));
        assert!(set.contains(822));
        assert!(!set.contains(3));
    }

    #[test]
    fn test_stops_at_page_count() {
        let set = predict(4096, true, 2);
        assert!(set.contains(2));
        assert!(!set.contains(822));
    }
}
