//! Forensic extractor for SQLite main database files and WAL sidecars. Given a
//! main file and, optionally, its WAL, reconstructs logical records (allocated
//! rows and recoverable residue) without executing the SQLite engine.
//!
//! The core is a file-format decoder and reconstruction pipeline: header reading,
//! page classification, B-tree traversal, cell decoding with overflow reassembly,
//! freelist/pointer-map bookkeeping, a WAL frame walker, and a record classifier
//! that compares superseded frames against the latest frame for the same page.
//! Argument parsing, progress logging frameworks beyond `log`, CSV/relational
//! output emitters, and keyword search over extracted records are external
//! collaborators and stay out of this crate.

pub mod btree;
pub mod cell;
pub mod classify;
pub mod error;
pub mod freelist;
pub mod header;
pub mod model;
pub mod page;
pub mod pipeline;
pub mod pointermap;
pub mod residue;
pub mod schema;
pub mod serial_type;
pub mod source;
pub mod value;
pub mod varint;

use std::cell::RefCell;
use std::path::{Path, PathBuf};

pub use error::Error;
pub use model::{RecordTuple, RecoveredTuple};

use source::PageNum;

/// Configuration for one extraction run. `keyword` is accepted and threaded
/// through for an external keyword-search collaborator; this crate never
/// searches it itself.
pub struct ExtractionOptions {
    pub main_path: PathBuf,
    pub wal_path: Option<PathBuf>,
    pub classify: bool,
    pub keyword: Option<String>,
}

/// What one extraction run produced.
#[derive(Debug, Default)]
pub struct ExtractionResult {
    pub records: Vec<RecordTuple>,
    pub recovered: Vec<RecoveredTuple>,
}

/// Lets the cell decoder pull overflow pages from a `PageSource` shared with a
/// `read_page` closure over the same source; both are alive for the duration of
/// schema reading, so the source is held behind a `RefCell` rather than two
/// independent `&mut` borrows.
struct SharedSourceOverflow<'a>(&'a RefCell<source::PageSource>);

impl<'a> cell::OverflowSource for SharedSourceOverflow<'a> {
    fn read_page(&mut self, page_number: u32) -> Option<Vec<u8>> {
        self.0.borrow_mut().read_page(page_number as PageNum).ok().map(|s| s.to_vec())
    }
}

/// Runs a full extraction: headers, schema, derived maps, the main-file sweep, an
/// optional WAL sweep, and classification (spec.md §2 "Data flow").
pub fn run(options: &ExtractionOptions) -> Result<ExtractionResult, Error> {
    let mut header_file = std::fs::File::open(&options.main_path).map_err(source::Error::Io)?;
    let db_header = header::read_db_header(&mut header_file)?;
    drop(header_file);

    let page_size = db_header.page_size as usize;
    let main_source = source::PageSource::open(&options.main_path, page_size)?;
    let max_page_number = main_source.page_count() as u32;
    let main_cell = RefCell::new(main_source);

    let freelist_set = if db_header.first_freelist_trunk == 0 {
        model::FreelistSet::default()
    } else {
        let page_count = main_cell.borrow().page_count();
        let result = freelist::walk(db_header.first_freelist_trunk as PageNum, page_count, |pn| {
            main_cell.borrow_mut().read_page(pn).ok().map(|s| s.to_vec())
        })?;
        for skipped in &result.skipped {
            log::warn!(
                "freelist trunk {}: leaf entry {} is out of range",
                skipped.trunk_page,
                skipped.leaf_page_value
            );
        }
        result.set
    };

    let pointer_map_set = pointermap::predict(db_header.page_size, db_header.auto_vacuum_enabled(), max_page_number);

    let table_map = {
        let read_page = |pn: PageNum| main_cell.borrow_mut().read_page(pn).ok().map(|s| s.to_vec());
        schema::read_table_map(page_size as u64, max_page_number, read_page, SharedSourceOverflow(&main_cell))
    };

    let mut page_to_table = model::PageToTable::default();
    for table in table_map.iter() {
        let table_name = table.name.clone();
        let _ = btree::traverse::walk_leaves(
            table.root_page,
            |pn| main_cell.borrow_mut().read_page(pn).ok().map(|s| s.to_vec()),
            |pn| page_to_table.insert(pn, table_name.clone()),
        );
    }

    // spec.md §3 invariant I3: a page in the freelist is never also reachable from a
    // live table B-tree. Violations are logged, not fatal (spec.md §4.13).
    for page in freelist_set.all_pages() {
        if let Some(table_name) = page_to_table.get(page) {
            log::warn!("page {} is in the freelist but also reachable from table '{}'s B-tree", page, table_name);
        }
    }

    let main_file_name = file_name_or_default(&options.main_path);
    let mut output = ExtractionResult::default();
    let mut source = main_cell.into_inner();

    let sweep = pipeline::main_file::run(
        &mut source,
        &main_file_name,
        db_header.auto_vacuum_enabled(),
        &pointer_map_set,
        &freelist_set,
        &page_to_table,
    );
    output.records.extend(sweep.records);
    output.recovered.extend(sweep.recovered);

    if let Some(wal_path) = &options.wal_path {
        let mut wal_file = std::fs::File::open(wal_path).map_err(source::Error::Io)?;
        let wal_header = header::read_wal_header(&mut wal_file)?;
        drop(wal_file);
        let mut wal_source = source::PageSource::open(wal_path, wal_header.page_size as usize)?;
        let wal_file_name = file_name_or_default(wal_path);
        let wal_sweep = pipeline::wal::run(
            &mut wal_source,
            &wal_file_name,
            &wal_header,
            max_page_number,
            db_header.auto_vacuum_enabled(),
            &pointer_map_set,
            &freelist_set,
            &table_map,
            &page_to_table,
        );
        output.records.extend(wal_sweep.records);
        output.recovered.extend(wal_sweep.recovered);
    }

    if options.classify {
        classify::classify(&mut output.records);
    }

    if options.keyword.is_some() {
        log::debug!(
            "a keyword was supplied but this crate does not search extracted records itself; \
             pass the keyword and this run's output to an external search collaborator"
        );
    }

    Ok(output)
}

fn file_name_or_default(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
