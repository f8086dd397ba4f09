//! Sweeps every page of the main database file once, dispatching on page type
//! (spec.md §4.10). Per-page and per-cell failures are logged and skipped; the
//! sweep never aborts on them (spec.md §4.13).

use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

use super::SweepOutput;
use crate::btree::{btree_view, header as btree_header};
use crate::cell::{self, OverflowSource};
use crate::model::{FrameNumber, PageToTable, RecordStatus, RecordTuple, ResidueKind, RecoveredTuple};
use crate::page::{self, PageType};
use crate::residue;
use crate::source::{PageNum, PageSource};

/// Lets the cell decoder fetch overflow pages from the same `PageSource` the sweep
/// is iterating, without the borrow-checker conflict of holding two mutable
/// borrows of the source at once (a small free function would alias `source`).
struct SourceOverflow<'a> {
    source: &'a mut PageSource,
}

impl<'a> OverflowSource for SourceOverflow<'a> {
    fn read_page(&mut self, page_number: u32) -> Option<Vec<u8>> {
        self.source.read_page(page_number as PageNum).ok().map(|s| s.to_vec())
    }
}

pub fn run(
    source: &mut PageSource,
    source_file_name: &str,
    auto_vacuum_enabled: bool,
    pointer_map_set: &crate::model::PointerMapSet,
    freelist_set: &crate::model::FreelistSet,
    page_to_table: &PageToTable,
) -> SweepOutput {
    let page_size = source.page_size() as u64;
    let page_count = source.page_count();
    let mut out = SweepOutput::default();

    for page_number in 1..=page_count {
        let image = match source.read_page(page_number) {
            Ok(img) => img.to_vec(),
            Err(e) => {
                log::warn!("page {}: could not be read: {}", page_number, e);
                continue;
            }
        };

        let page_type = page::classify(&image, page_number, auto_vacuum_enabled, pointer_map_set, freelist_set);
        log::trace!("page {}: classified as {:?}", page_number, page_type);

        match page_type {
            PageType::Page1Schema | PageType::PointerMap => {
                // Classify only; no records, no residue.
            }
            PageType::FreelistTrunk => {
                scavenge_freelist_trunk(&image, page_number, source_file_name, &mut out);
            }
            PageType::FreelistLeaf => {
                if image.first() == Some(&0x0d) {
                    decode_leaf_cells(
                        source,
                        &image,
                        page_number,
                        page_size,
                        source_file_name,
                        "freelist",
                        RecordStatus::Freelist,
                        &mut out,
                    );
                }
                scavenge_btree_like(&image, page_number, source_file_name, page_type, None, &mut out);
            }
            PageType::TableLeaf => {
                let table_name = page_to_table.get(page_number).unwrap_or("unknown").to_string();
                decode_leaf_cells(
                    source,
                    &image,
                    page_number,
                    page_size,
                    source_file_name,
                    &table_name,
                    RecordStatus::Deleted, // placeholder; classify() assigns the real status
                    &mut out,
                );
                scavenge_btree_like(&image, page_number, source_file_name, page_type, Some(table_name), &mut out);
            }
            PageType::TableInterior | PageType::IndexInterior | PageType::IndexLeaf => {
                scavenge_btree_like(&image, page_number, source_file_name, page_type, None, &mut out);
            }
            PageType::ZeroedEmpty | PageType::Overflow => {
                // Nothing to recover: zeroed pages are empty, overflow pages are
                // reassembled only as part of the cell that owns them.
            }
            PageType::Unknown => {
                log::warn!("page {}: unrecognized page type, skipped", page_number);
            }
        }
    }

    out
}

#[allow(clippy::too_many_arguments)]
fn decode_leaf_cells(
    source: &mut PageSource,
    image: &[u8],
    page_number: PageNum,
    page_size: u64,
    source_file_name: &str,
    table_name: &str,
    status: RecordStatus,
    out: &mut SweepOutput,
) {
    let (area, adjust) = btree_view(image, page_number);
    let header = match btree_header::read_header(area) {
        Ok(h) => h,
        Err(e) => {
            log::warn!("page {}: bad B-tree header: {}", page_number, e);
            return;
        }
    };
    let max_page_number = source.page_count() as u32;
    for pointer in btree_header::cell_pointers(area, &header) {
        let cell_start = match (pointer as usize).checked_sub(adjust) {
            Some(v) if v < area.len() => v,
            _ => {
                log::warn!("page {}: cell pointer {} out of range", page_number, pointer);
                continue;
            }
        };
        let file_offset = (page_number - 1) as u64 * page_size + pointer as u64;
        let mut overflow = SourceOverflow { source };
        let decoded = match cell::decode(&area[cell_start..], page_size, max_page_number, Some(&mut overflow)) {
            Ok(d) => d,
            Err(e) => {
                log::warn!("page {} offset {}: {}", page_number, file_offset, e);
                continue;
            }
        };
        out.records.push(RecordTuple {
            source_file_name: source_file_name.to_string(),
            frame_number: FrameNumber::MainFile,
            page_number,
            record_status: status,
            table_name: table_name.to_string(),
            file_offset_of_cell: file_offset,
            rowid: decoded.rowid,
            values: decoded.values,
            partial: decoded.partial,
        });
    }
}

fn scavenge_btree_like(
    image: &[u8],
    page_number: PageNum,
    source_file_name: &str,
    page_type: PageType,
    table_name: Option<String>,
    out: &mut SweepOutput,
) {
    let (area, adjust) = btree_view(image, page_number);
    let header = match btree_header::read_header(area) {
        Ok(h) => h,
        Err(_) => return,
    };
    let base = page_number.saturating_sub(1) as u64 * image.len() as u64;

    for (offset, text) in residue::scavenge_btree_unallocated(area, header.byte_len(), header.cell_count, header.cell_content_start) {
        out.recovered.push(RecoveredTuple {
            source_file_name: source_file_name.to_string(),
            frame_number: FrameNumber::MainFile,
            page_number,
            page_type_label: page_type.label().to_string(),
            table_name: table_name.clone(),
            kind: ResidueKind::PageUnallocatedSpace,
            file_offset: base + (offset + adjust) as u64,
            printable_string: text,
        });
    }
    for (offset, text) in residue::scavenge_freeblocks(area, header.first_freeblock) {
        out.recovered.push(RecoveredTuple {
            source_file_name: source_file_name.to_string(),
            frame_number: FrameNumber::MainFile,
            page_number,
            page_type_label: page_type.label().to_string(),
            table_name: table_name.clone(),
            kind: ResidueKind::Freeblock,
            file_offset: base + (offset + adjust) as u64,
            printable_string: text,
        });
    }
}

fn scavenge_freelist_trunk(image: &[u8], page_number: PageNum, source_file_name: &str, out: &mut SweepOutput) {
    let mut c = Cursor::new(image);
    let _next_trunk = c.read_u32::<BigEndian>().unwrap_or(0);
    let leaf_count = c.read_u32::<BigEndian>().unwrap_or(0);
    let base = page_number.saturating_sub(1) as u64 * image.len() as u64;
    for (offset, text) in residue::scavenge_freelist_trunk(image, leaf_count) {
        out.recovered.push(RecoveredTuple {
            source_file_name: source_file_name.to_string(),
            frame_number: FrameNumber::MainFile,
            page_number,
            page_type_label: PageType::FreelistTrunk.label().to_string(),
            table_name: None,
            kind: ResidueKind::PageUnallocatedSpace,
            file_offset: base + offset as u64,
            printable_string: text,
        });
    }
}
