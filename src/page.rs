//! Classifies a page image by combining its first byte with the derived
//! freelist and pointer-map sets built during initialization (spec.md §4.3).

use crate::model::{FreelistSet, PointerMapSet};
use crate::source::PageNum;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    Page1Schema,
    TableInterior,
    TableLeaf,
    IndexInterior,
    IndexLeaf,
    Overflow,
    ZeroedEmpty,
    FreelistTrunk,
    FreelistLeaf,
    PointerMap,
    Unknown,
}

impl PageType {
    pub fn label(&self) -> &'static str {
        match self {
            PageType::Page1Schema => "Page1Schema",
            PageType::TableInterior => "TableInterior",
            PageType::TableLeaf => "TableLeaf",
            PageType::IndexInterior => "IndexInterior",
            PageType::IndexLeaf => "IndexLeaf",
            PageType::Overflow => "Overflow",
            PageType::ZeroedEmpty => "ZeroedEmpty",
            PageType::FreelistTrunk => "FreelistTrunk",
            PageType::FreelistLeaf => "FreelistLeaf",
            PageType::PointerMap => "PointerMap",
            PageType::Unknown => "Unknown",
        }
    }

    pub fn is_table_leaf_like(&self) -> bool {
        matches!(self, PageType::TableLeaf)
    }

    pub fn is_btree(&self) -> bool {
        matches!(
            self,
            PageType::Page1Schema
                | PageType::TableInterior
                | PageType::TableLeaf
                | PageType::IndexInterior
                | PageType::IndexLeaf
        )
    }
}

const SQLITE_MAGIC_PREFIX: &[u8] = b"SQLite format 3\0";

/// Classifies `page_image` per the priority rules in spec.md §4.3: page 1's magic
/// string wins over everything else, then pointer-map/freelist membership (which
/// require context the first byte alone cannot provide), then the first byte, then
/// an all-zero page is reported empty rather than unknown.
pub fn classify(
    page_image: &[u8],
    page_number: PageNum,
    auto_vacuum_enabled: bool,
    pointer_map_set: &PointerMapSet,
    freelist_set: &FreelistSet,
) -> PageType {
    if page_image.len() >= SQLITE_MAGIC_PREFIX.len() && &page_image[0..16] == SQLITE_MAGIC_PREFIX {
        return PageType::Page1Schema;
    }
    if auto_vacuum_enabled && pointer_map_set.contains(page_number) {
        return PageType::PointerMap;
    }
    if freelist_set.is_trunk(page_number) {
        return PageType::FreelistTrunk;
    }
    if freelist_set.is_leaf(page_number) {
        return PageType::FreelistLeaf;
    }
    match page_image.first() {
        Some(0x02) => PageType::IndexInterior,
        Some(0x05) => PageType::TableInterior,
        Some(0x0a) => PageType::IndexLeaf,
        Some(0x0d) => PageType::TableLeaf,
        Some(0x00) => {
            if page_image.iter().all(|b| *b == 0) {
                PageType::ZeroedEmpty
            } else {
                PageType::Overflow
            }
        }
        _ => PageType::Unknown,
    }
}
