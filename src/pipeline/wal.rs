//! Sweeps a WAL sidecar frame by frame (spec.md §4.11). A WAL page image never
//! carries an overflow chain of its own — overflow pages live only in the main
//! file — so cell decoding here always runs in the "don't follow overflow"
//! variant, leaving rows whose payload exceeds the initial threshold `partial`.

use std::collections::HashSet;

use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

use super::SweepOutput;
use crate::btree::{btree_view, header as btree_header, traverse};
use crate::cell;
use crate::header::{WalHeader, WAL_FRAME_HEADER_LEN, WAL_HEADER_LEN};
use crate::model::{
    FrameNumber, FreelistSet, PageToTable, PointerMapSet, RecordStatus, RecordTuple, ResidueKind,
    RecoveredTuple, TableMap,
};
use crate::page::{self, PageType};
use crate::residue;
use crate::source::{PageNum, PageSource};

struct FrameEntry {
    frame_number: u32,
    target_page: PageNum,
    image: Vec<u8>,
}

/// Reads every frame in file order, tolerating a trailing short frame (the WAL was
/// truncated mid-write) by stopping rather than erroring.
fn read_frames(source: &mut PageSource, wal_header: &WalHeader) -> Vec<FrameEntry> {
    let page_size = wal_header.page_size as usize;
    let frame_len = WAL_FRAME_HEADER_LEN + page_size;
    let mut frames = Vec::new();
    let mut frame_number = 1u32;
    let mut offset = WAL_HEADER_LEN as u64;

    while offset + frame_len as u64 <= source.file_len() {
        let header_bytes = match source.read_at(offset, WAL_FRAME_HEADER_LEN) {
            Ok(b) => b,
            Err(_) => break,
        };
        let mut c = Cursor::new(&header_bytes);
        let target_page = match c.read_u32::<BigEndian>() {
            Ok(v) => v as PageNum,
            Err(_) => break,
        };
        let image = match source.read_at(offset + WAL_FRAME_HEADER_LEN as u64, page_size) {
            Ok(b) => b,
            Err(_) => break,
        };
        if target_page == 0 {
            log::warn!("WAL frame {}: page number 0, skipped", frame_number);
        } else {
            frames.push(FrameEntry { frame_number, target_page, image });
        }
        offset += frame_len as u64;
        frame_number += 1;
    }
    frames
}

/// Resolves the table owning `target_page` as seen at `frame_idx` (spec.md §4.11):
/// a known root page or an already-mapped main-file leaf settles it immediately;
/// otherwise walk earlier frames looking for an interior page whose children
/// include the page in question, climbing toward a root one hop at a time.
fn resolve_table_for_wal_page(
    target_page: PageNum,
    frame_idx: usize,
    frames: &[FrameEntry],
    table_map: &TableMap,
    page_to_table: &PageToTable,
) -> Option<String> {
    if let Some(name) = table_map.table_for_root_page(target_page) {
        return Some(name.to_string());
    }
    if let Some(name) = page_to_table.get(target_page) {
        return Some(name.to_string());
    }

    let mut visited = HashSet::new();
    let mut current_page = target_page;
    let mut current_idx = frame_idx;

    loop {
        if !visited.insert(current_page) {
            return None;
        }
        let mut found = None;
        for idx in (0..current_idx).rev() {
            let frame = &frames[idx];
            let (area, adjust) = btree_view(&frame.image, frame.target_page);
            let Ok(header) = btree_header::read_header(area) else { continue };
            if header.page_type != PageType::TableInterior {
                continue;
            }
            let children = traverse::child_pointers(area, &header, adjust);
            if children.contains(&(current_page as u32)) {
                found = Some((frame.target_page, idx));
                break;
            }
        }
        match found {
            Some((parent_page, parent_idx)) => {
                if let Some(name) = table_map.table_for_root_page(parent_page) {
                    return Some(name.to_string());
                }
                if let Some(name) = page_to_table.get(parent_page) {
                    return Some(name.to_string());
                }
                current_page = parent_page;
                current_idx = parent_idx;
            }
            None => return None,
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub fn run(
    source: &mut PageSource,
    source_file_name: &str,
    wal_header: &WalHeader,
    main_page_count: u32,
    auto_vacuum_enabled: bool,
    pointer_map_set: &PointerMapSet,
    freelist_set: &FreelistSet,
    table_map: &TableMap,
    page_to_table: &PageToTable,
) -> SweepOutput {
    let frames = read_frames(source, wal_header);
    let page_size = wal_header.page_size as u64;
    let mut out = SweepOutput::default();

    for (idx, frame) in frames.iter().enumerate() {
        let page_type = page::classify(
            &frame.image,
            frame.target_page,
            auto_vacuum_enabled,
            pointer_map_set,
            freelist_set,
        );
        let fnum = FrameNumber::Wal(frame.frame_number);
        log::trace!(
            "WAL frame {}: targets page {}, classified as {:?}",
            frame.frame_number,
            frame.target_page,
            page_type
        );

        match page_type {
            PageType::Page1Schema | PageType::PointerMap => {}
            PageType::FreelistTrunk => {
                scavenge_freelist_trunk(&frame.image, frame.target_page, fnum, source_file_name, &mut out);
            }
            PageType::FreelistLeaf => {
                if frame.image.first() == Some(&0x0d) {
                    decode_leaf_cells(
                        &frame.image,
                        frame.target_page,
                        page_size,
                        main_page_count,
                        fnum,
                        source_file_name,
                        "freelist",
                        RecordStatus::Freelist,
                        &mut out,
                    );
                }
                scavenge_btree_like(&frame.image, frame.target_page, fnum, source_file_name, page_type, None, &mut out);
            }
            PageType::TableLeaf => {
                let table_name =
                    resolve_table_for_wal_page(frame.target_page, idx, &frames, table_map, page_to_table)
                        .unwrap_or_else(|| "unknown".to_string());
                decode_leaf_cells(
                    &frame.image,
                    frame.target_page,
                    page_size,
                    main_page_count,
                    fnum,
                    source_file_name,
                    &table_name,
                    RecordStatus::Deleted, // placeholder; classify() assigns the real status
                    &mut out,
                );
                scavenge_btree_like(
                    &frame.image,
                    frame.target_page,
                    fnum,
                    source_file_name,
                    page_type,
                    Some(table_name),
                    &mut out,
                );
            }
            PageType::TableInterior | PageType::IndexInterior | PageType::IndexLeaf => {
                scavenge_btree_like(&frame.image, frame.target_page, fnum, source_file_name, page_type, None, &mut out);
            }
            PageType::ZeroedEmpty | PageType::Overflow | PageType::Unknown => {}
        }
    }

    out
}

#[allow(clippy::too_many_arguments)]
fn decode_leaf_cells(
    image: &[u8],
    page_number: PageNum,
    page_size: u64,
    max_page_number: u32,
    frame_number: FrameNumber,
    source_file_name: &str,
    table_name: &str,
    status: RecordStatus,
    out: &mut SweepOutput,
) {
    let (area, adjust) = btree_view(image, page_number);
    let header = match btree_header::read_header(area) {
        Ok(h) => h,
        Err(e) => {
            log::warn!("WAL page {}: bad B-tree header: {}", page_number, e);
            return;
        }
    };
    for pointer in btree_header::cell_pointers(area, &header) {
        let cell_start = match (pointer as usize).checked_sub(adjust) {
            Some(v) if v < area.len() => v,
            _ => {
                log::warn!("WAL page {}: cell pointer {} out of range", page_number, pointer);
                continue;
            }
        };
        let decoded = match cell::decode(&area[cell_start..], page_size, max_page_number, None) {
            Ok(d) => d,
            Err(e) => {
                log::warn!("WAL page {} cell at {}: {}", page_number, cell_start, e);
                continue;
            }
        };
        out.records.push(RecordTuple {
            source_file_name: source_file_name.to_string(),
            frame_number,
            page_number,
            record_status: status,
            table_name: table_name.to_string(),
            file_offset_of_cell: pointer as u64,
            rowid: decoded.rowid,
            values: decoded.values,
            partial: decoded.partial,
        });
    }
}

fn scavenge_btree_like(
    image: &[u8],
    page_number: PageNum,
    frame_number: FrameNumber,
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

    for (offset, text) in residue::scavenge_btree_unallocated(area, header.byte_len(), header.cell_count, header.cell_content_start) {
        out.recovered.push(RecoveredTuple {
            source_file_name: source_file_name.to_string(),
            frame_number,
            page_number,
            page_type_label: page_type.label().to_string(),
            table_name: table_name.clone(),
            kind: ResidueKind::PageUnallocatedSpace,
            file_offset: (offset + adjust) as u64,
            printable_string: text,
        });
    }
    for (offset, text) in residue::scavenge_freeblocks(area, header.first_freeblock) {
        out.recovered.push(RecoveredTuple {
            source_file_name: source_file_name.to_string(),
            frame_number,
            page_number,
            page_type_label: page_type.label().to_string(),
            table_name: table_name.clone(),
            kind: ResidueKind::Freeblock,
            file_offset: (offset + adjust) as u64,
            printable_string: text,
        });
    }
}

fn scavenge_freelist_trunk(
    image: &[u8],
    page_number: PageNum,
    frame_number: FrameNumber,
    source_file_name: &str,
    out: &mut SweepOutput,
) {
    let mut c = Cursor::new(image);
    let _next_trunk = c.read_u32::<BigEndian>().unwrap_or(0);
    let leaf_count = c.read_u32::<BigEndian>().unwrap_or(0);
    for (offset, text) in residue::scavenge_freelist_trunk(image, leaf_count) {
        out.recovered.push(RecoveredTuple {
            source_file_name: source_file_name.to_string(),
            frame_number,
            page_number,
            page_type_label: PageType::FreelistTrunk.label().to_string(),
            table_name: None,
            kind: ResidueKind::PageUnallocatedSpace,
            file_offset: offset as u64,
            printable_string: text,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PointerMapSet, TableDef};

    fn wal_header(page_size: u32) -> WalHeader {
        WalHeader {
            page_size,
            checkpoint_sequence: 0,
            salt1: 1,
            salt2: 2,
        }
    }

    fn leaf_page_with_cell(page_size: usize, rowid: i64, value: i64) -> Vec<u8> {
        let mut page = vec![0_u8; page_size];
        let mut payload = crate::varint::encode(2); // header length
        payload.extend(crate::varint::encode(1)); // serial type: 1-byte int
        payload.push(value as u8);
        let mut cell = crate::varint::encode(payload.len() as u64);
        cell.extend(crate::varint::encode(rowid as u64));
        cell.extend_from_slice(&payload);
        let cell_offset = page_size - cell.len();
        page[cell_offset..].copy_from_slice(&cell);
        page[0] = 0x0d;
        page[3..5].copy_from_slice(&1u16.to_be_bytes());
        page[5..7].copy_from_slice(&(cell_offset as u16).to_be_bytes());
        page[8..10].copy_from_slice(&(cell_offset as u16).to_be_bytes());
        page
    }

    fn build_wal_bytes(page_size: u32, frames: &[(u32, Vec<u8>)]) -> Vec<u8> {
        let mut buf = vec![0_u8; WAL_HEADER_LEN];
        buf[0..4].copy_from_slice(&0x377f_0682u32.to_be_bytes());
        buf[8..12].copy_from_slice(&page_size.to_be_bytes());
        for (target_page, image) in frames {
            let mut header = vec![0_u8; WAL_FRAME_HEADER_LEN];
            header[0..4].copy_from_slice(&target_page.to_be_bytes());
            buf.extend_from_slice(&header);
            buf.extend_from_slice(image);
        }
        buf
    }

    #[test]
    fn test_wal_only_page_resolved_via_root_page_lookup() {
        let page_size = 512usize;
        let leaf = leaf_page_with_cell(page_size, 1, 42);
        let wal_bytes = build_wal_bytes(512, &[(2, leaf)]);
        let mut source = PageSource::from_bytes(wal_bytes, page_size).unwrap();
        let wh = wal_header(512);

        let mut table_map = TableMap::default();
        table_map.insert(TableDef {
            name: "t".into(),
            root_page: 2,
            sql: String::new(),
            columns: vec![],
        });
        let page_to_table = PageToTable::default();
        let pointer_map = PointerMapSet::default();
        let freelist = FreelistSet::default();

        let out = run(&mut source, "main.db-wal", &wh, 10, false, &pointer_map, &freelist, &table_map, &page_to_table);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].table_name, "t");
        assert_eq!(out.records[0].rowid, 1);
        assert!(matches!(out.records[0].frame_number, FrameNumber::Wal(1)));
    }

    #[test]
    fn test_wal_never_follows_overflow_marks_partial() {
        let page_size = 32usize;
        // A payload-length varint declaring far more bytes than actually follow.
        let mut cell = crate::varint::encode(500);
        cell.extend(crate::varint::encode(1)); // rowid
        cell.extend(crate::varint::encode(2)); // header length
        cell.extend(crate::varint::encode(1)); // serial type: 1-byte int
        cell.push(7);
        let mut page = vec![0_u8; page_size];
        let cell_offset = page_size - cell.len();
        page[cell_offset..].copy_from_slice(&cell);
        page[0] = 0x0d;
        page[3..5].copy_from_slice(&1u16.to_be_bytes());
        page[5..7].copy_from_slice(&(cell_offset as u16).to_be_bytes());
        page[8..10].copy_from_slice(&(cell_offset as u16).to_be_bytes());

        let wal_bytes = build_wal_bytes(page_size as u32, &[(2, page)]);
        let mut source = PageSource::from_bytes(wal_bytes, page_size).unwrap();
        let wh = wal_header(page_size as u32);
        let mut table_map = TableMap::default();
        table_map.insert(TableDef {
            name: "t".into(),
            root_page: 2,
            sql: String::new(),
            columns: vec![],
        });
        let page_to_table = PageToTable::default();
        let pointer_map = PointerMapSet::default();
        let freelist = FreelistSet::default();

        let out = run(&mut source, "main.db-wal", &wh, 10, false, &pointer_map, &freelist, &table_map, &page_to_table);
        assert_eq!(out.records.len(), 1);
        assert!(out.records[0].partial);
    }
}
