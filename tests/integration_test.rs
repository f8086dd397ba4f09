//! Pipeline-level tests that assemble small synthetic SQLite main files (and, for
//! a couple of scenarios, a WAL sidecar) byte-by-byte and run the full extraction
//! through `sqlite_forensics::run`.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use sqlite_forensics::{ExtractionOptions, ExtractionResult};

const MAGIC: &[u8] = b"SQLite format 3\0";

fn encode_varint(mut v: u64) -> Vec<u8> {
    let mut bytes = vec![(v & 0x7f) as u8];
    v >>= 7;
    while v > 0 {
        bytes.push(((v & 0x7f) as u8) | 0x80);
        v >>= 7;
    }
    bytes.reverse();
    bytes
}

fn build_record_cell(rowid: i64, columns: &[(i64, Vec<u8>)]) -> Vec<u8> {
    let serial_types: Vec<u8> = columns.iter().flat_map(|(st, _)| encode_varint(*st as u64)).collect();
    let header_len = 1 + serial_types.len();
    assert!(header_len < 128, "test fixture assumes a one-byte header-length varint");
    let mut payload = encode_varint(header_len as u64);
    payload.extend_from_slice(&serial_types);
    for (_, body) in columns {
        payload.extend_from_slice(body);
    }
    let mut cell = encode_varint(payload.len() as u64);
    cell.extend(encode_varint(rowid as u64));
    cell.extend(payload);
    cell
}

fn int_column(value: i64) -> (i64, Vec<u8>) {
    (1, vec![value as u8])
}

fn text_column(s: &str) -> (i64, Vec<u8>) {
    (13 + 2 * s.len() as i64, s.as_bytes().to_vec())
}

fn schema_row_cell(rowid: i64, name: &str, root_page: i64, sql: &str) -> Vec<u8> {
    build_record_cell(
        rowid,
        &[
            text_column("table"),
            text_column(name),
            text_column(name),
            int_column(root_page),
            text_column(sql),
        ],
    )
}

/// Lays `cells` into a plain B-tree leaf page (table leaf, header at byte 0).
fn build_leaf_page(page_size: usize, cells: &[Vec<u8>]) -> Vec<u8> {
    let mut page = vec![0_u8; page_size];
    let mut content_off = page_size;
    let mut pointers = Vec::new();
    for cell in cells {
        content_off -= cell.len();
        page[content_off..content_off + cell.len()].copy_from_slice(cell);
        pointers.push(content_off as u16);
    }
    page[0] = 0x0d;
    page[3..5].copy_from_slice(&(cells.len() as u16).to_be_bytes());
    page[5..7].copy_from_slice(&(content_off as u16).to_be_bytes());
    let mut ptr_off = 8;
    for p in &pointers {
        page[ptr_off..ptr_off + 2].copy_from_slice(&p.to_be_bytes());
        ptr_off += 2;
    }
    page
}

fn build_interior_page(page_size: usize, children: &[u32], rightmost: u32) -> Vec<u8> {
    let mut page = vec![0_u8; page_size];
    page[0] = 0x05;
    page[3..5].copy_from_slice(&(children.len() as u16).to_be_bytes());
    page[8..12].copy_from_slice(&rightmost.to_be_bytes());
    let mut content_off = page_size;
    let mut pointers = Vec::new();
    for child in children {
        content_off -= 4;
        page[content_off..content_off + 4].copy_from_slice(&child.to_be_bytes());
        pointers.push(content_off as u16);
    }
    page[5..7].copy_from_slice(&(content_off as u16).to_be_bytes());
    let mut ptr_off = 12;
    for p in &pointers {
        page[ptr_off..ptr_off + 2].copy_from_slice(&p.to_be_bytes());
        ptr_off += 2;
    }
    page
}

/// Builds page 1: the 100-byte file header plus the schema table's own B-tree
/// leaf (header starting at byte 100, per spec.md §3's page-1 offset rule).
#[allow(clippy::too_many_arguments)]
fn build_page1(
    page_size: usize,
    page_count: u32,
    schema_cells: &[Vec<u8>],
    first_freelist_trunk: u32,
    freelist_page_count: u32,
) -> Vec<u8> {
    let mut page = vec![0_u8; page_size];
    page[0..16].copy_from_slice(MAGIC);
    let page_size_field: u16 = if page_size == 65536 { 1 } else { page_size as u16 };
    page[16..18].copy_from_slice(&page_size_field.to_be_bytes());
    page[24..28].copy_from_slice(&1u32.to_be_bytes());
    page[28..32].copy_from_slice(&page_count.to_be_bytes());
    page[32..36].copy_from_slice(&first_freelist_trunk.to_be_bytes());
    page[36..40].copy_from_slice(&freelist_page_count.to_be_bytes());
    page[56..60].copy_from_slice(&1u32.to_be_bytes()); // utf-8

    let mut content_off = page_size;
    let mut pointers = Vec::new();
    for cell in schema_cells {
        content_off -= cell.len();
        page[content_off..content_off + cell.len()].copy_from_slice(cell);
        pointers.push(content_off as u16);
    }
    page[100] = 0x0d;
    page[103..105].copy_from_slice(&(schema_cells.len() as u16).to_be_bytes());
    page[105..107].copy_from_slice(&(content_off as u16).to_be_bytes());
    let mut ptr_off = 108;
    for p in &pointers {
        page[ptr_off..ptr_off + 2].copy_from_slice(&p.to_be_bytes());
        ptr_off += 2;
    }
    page
}

fn build_overflow_chain(payload_tail: &[u8], page_size: usize, first_page_num: u32) -> Vec<Vec<u8>> {
    let per_page = page_size - 4;
    let chunks: Vec<&[u8]> = payload_tail.chunks(per_page).collect();
    let mut pages = Vec::new();
    for (i, chunk) in chunks.iter().enumerate() {
        let mut page = vec![0_u8; page_size];
        let next = if i + 1 < chunks.len() { first_page_num + i as u32 + 1 } else { 0 };
        page[0..4].copy_from_slice(&next.to_be_bytes());
        page[4..4 + chunk.len()].copy_from_slice(chunk);
        pages.push(page);
    }
    pages
}

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn write_temp_file(bytes: &[u8], label: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "sqlite-forensics-integration-{}-{}-{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed),
        label
    ));
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(bytes).unwrap();
    path
}

fn run_extraction(main_pages: Vec<Vec<u8>>, wal_bytes: Option<Vec<u8>>, classify: bool) -> ExtractionResult {
    let main_bytes: Vec<u8> = main_pages.into_iter().flatten().collect();
    let main_path = write_temp_file(&main_bytes, "main.db");
    let wal_path = wal_bytes.map(|b| write_temp_file(&b, "main.db-wal"));
    let options = ExtractionOptions {
        main_path: main_path.clone(),
        wal_path: wal_path.clone(),
        classify,
        keyword: None,
    };
    let result = sqlite_forensics::run(&options).expect("extraction should not hit a fatal error");
    let _ = std::fs::remove_file(&main_path);
    if let Some(p) = &wal_path {
        let _ = std::fs::remove_file(p);
    }
    result
}

#[test]
fn test_empty_database_no_tables_no_wal() {
    let page1 = build_page1(512, 1, &[], 0, 0);
    let result = run_extraction(vec![page1], None, true);
    assert!(result.records.is_empty());
    assert!(result.recovered.is_empty());
}

#[test]
fn test_single_table_three_rows_no_overflow() {
    let sql = "CREATE TABLE t(a INTEGER, b TEXT)";
    let page1 = build_page1(512, 2, &[schema_row_cell(1, "t", 2, sql)], 0, 0);
    let row_cells = vec![
        build_record_cell(1, &[int_column(1), text_column("a")]),
        build_record_cell(2, &[int_column(2), text_column("bb")]),
        build_record_cell(3, &[int_column(3), text_column("ccc")]),
    ];
    let page2 = build_leaf_page(512, &row_cells);

    let result = run_extraction(vec![page1, page2], None, true);
    assert_eq!(result.records.len(), 3);
    for (i, record) in result.records.iter().enumerate() {
        assert_eq!(record.table_name, "t");
        assert_eq!(record.rowid, (i + 1) as i64);
        assert!(matches!(record.record_status, sqlite_forensics::model::RecordStatus::Active));
    }
}

#[test]
fn test_overflow_row_reassembles_full_blob() {
    let page_size = 1024_usize;
    let blob = vec![b'Q'; 10_240];
    let sql = "CREATE TABLE t(x BLOB)";
    let page1 = build_page1(page_size, 12, &[schema_row_cell(1, "t", 2, sql)], 0, 0);

    let columns = [(12 + 2 * blob.len() as i64, blob.clone())];
    let serial_types: Vec<u8> = columns.iter().flat_map(|(st, _)| encode_varint(*st as u64)).collect();
    let header_len = 1 + serial_types.len();
    let mut record_payload = encode_varint(header_len as u64);
    record_payload.extend_from_slice(&serial_types);
    record_payload.extend_from_slice(&blob);

    let thresholds = sqlite_forensics::cell::Thresholds::for_page_size(page_size as u64);
    let initial_len = thresholds.initial_len(record_payload.len() as u64) as usize;

    let mut cell = encode_varint(record_payload.len() as u64);
    cell.extend(encode_varint(1)); // rowid
    cell.extend_from_slice(&record_payload[0..initial_len]);
    cell.extend_from_slice(&3u32.to_be_bytes()); // first overflow page

    let page2 = build_leaf_page(page_size, &[cell]);
    let overflow_pages = build_overflow_chain(&record_payload[initial_len..], page_size, 3);

    let mut pages = vec![page1, page2];
    pages.extend(overflow_pages);

    let result = run_extraction(pages, None, false);
    assert_eq!(result.records.len(), 1);
    assert!(!result.records[0].partial);
    match &result.records[0].values[0] {
        sqlite_forensics::value::Value::Blob(b) => assert_eq!(b.len(), 10_240),
        other => panic!("expected a blob, got {:?}", other),
    }
}

#[test]
fn test_deleted_row_observable_in_freeblock() {
    let page_size = 512_usize;
    let sql = "CREATE TABLE t(a INTEGER, b TEXT)";
    let page1 = build_page1(page_size, 2, &[schema_row_cell(1, "t", 2, sql)], 0, 0);

    let surviving = build_record_cell(2, &[int_column(2), text_column("keep")]);
    let mut page2 = build_leaf_page(page_size, &[surviving]);

    // A freeblock left behind by the deleted row, holding its printable text column.
    let freeblock_offset = 200_usize;
    page2[1..3].copy_from_slice(&(freeblock_offset as u16).to_be_bytes()); // first_freeblock
    page2[freeblock_offset..freeblock_offset + 2].copy_from_slice(&0u16.to_be_bytes()); // next
    page2[freeblock_offset + 2..freeblock_offset + 4].copy_from_slice(&12u16.to_be_bytes()); // length incl. header
    page2[freeblock_offset + 4..freeblock_offset + 12].copy_from_slice(b"oldvalue");

    let result = run_extraction(vec![page1, page2], None, true);
    assert_eq!(result.records.len(), 1);
    assert!(matches!(result.records[0].record_status, sqlite_forensics::model::RecordStatus::Active));

    let freeblock_hit = result
        .recovered
        .iter()
        .find(|r| matches!(r.kind, sqlite_forensics::model::ResidueKind::Freeblock))
        .expect("expected a freeblock recovery");
    assert_eq!(freeblock_hit.printable_string, "oldvalue");
}

#[test]
fn test_wal_supersedes_main_with_modification() {
    let page_size = 512_usize;
    let sql = "CREATE TABLE t(a INTEGER, b TEXT)";
    let page1 = build_page1(page_size, 2, &[schema_row_cell(1, "t", 2, sql)], 0, 0);
    let old_row = build_record_cell(1, &[int_column(1), text_column("old")]);
    let page2 = build_leaf_page(page_size, &[old_row]);

    let new_row = build_record_cell(1, &[int_column(1), text_column("new")]);
    let new_page2 = build_leaf_page(page_size, &[new_row]);

    let mut wal = vec![0_u8; 32];
    wal[0..4].copy_from_slice(&0x377f_0682u32.to_be_bytes());
    wal[8..12].copy_from_slice(&(page_size as u32).to_be_bytes());
    let mut frame_header = vec![0_u8; 24];
    frame_header[0..4].copy_from_slice(&2u32.to_be_bytes()); // targets page 2
    wal.extend_from_slice(&frame_header);
    wal.extend_from_slice(&new_page2);

    let result = run_extraction(vec![page1, page2], Some(wal), true);
    assert_eq!(result.records.len(), 2);

    let main_row = result
        .records
        .iter()
        .find(|r| matches!(r.frame_number, sqlite_forensics::model::FrameNumber::MainFile))
        .unwrap();
    let wal_row = result
        .records
        .iter()
        .find(|r| matches!(r.frame_number, sqlite_forensics::model::FrameNumber::Wal(_)))
        .unwrap();

    assert!(matches!(main_row.record_status, sqlite_forensics::model::RecordStatus::ModifiedReusedId));
    assert!(matches!(wal_row.record_status, sqlite_forensics::model::RecordStatus::Active));
    assert_eq!(wal_row.values[1], sqlite_forensics::value::Value::Text("new".into()));
}

#[test]
fn test_wal_only_page_resolved_via_back_walk() {
    let page_size = 512_usize;
    let sql = "CREATE TABLE u(v INTEGER)";
    let page1 = build_page1(page_size, 9, &[schema_row_cell(1, "u", 9, sql)], 0, 0);
    let mut pages = vec![page1];
    for _ in 2..9 {
        pages.push(vec![0_u8; page_size]); // unrelated pages, not part of this scenario
    }
    pages.push(build_leaf_page(page_size, &[])); // page 9: table u's current (pre-WAL) root

    let interior_frame_image = build_interior_page(page_size, &[17], 0);
    let leaf_row = build_record_cell(5, &[int_column(42)]);
    let leaf_frame_image = build_leaf_page(page_size, &[leaf_row]);

    let mut wal = vec![0_u8; 32];
    wal[0..4].copy_from_slice(&0x377f_0682u32.to_be_bytes());
    wal[8..12].copy_from_slice(&(page_size as u32).to_be_bytes());

    let mut frame1_header = vec![0_u8; 24];
    frame1_header[0..4].copy_from_slice(&9u32.to_be_bytes());
    wal.extend_from_slice(&frame1_header);
    wal.extend_from_slice(&interior_frame_image);

    let mut frame2_header = vec![0_u8; 24];
    frame2_header[0..4].copy_from_slice(&17u32.to_be_bytes());
    wal.extend_from_slice(&frame2_header);
    wal.extend_from_slice(&leaf_frame_image);

    let result = run_extraction(pages, Some(wal), false);
    let leaf_record = result
        .records
        .iter()
        .find(|r| r.page_number == 17)
        .expect("expected a record decoded from the WAL-only page");
    assert_eq!(leaf_record.table_name, "u");
    assert!(matches!(leaf_record.frame_number, sqlite_forensics::model::FrameNumber::Wal(2)));
}
