//! Derived entities (spec.md §3) built once during an initialization pass and then
//! read only for the remainder of a run, plus the two output tuple shapes (spec.md §6).

use std::collections::{HashMap, HashSet};

use crate::source::PageNum;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub declared_type: String,
}

/// One discovered table: its root page and its column list in declaration order.
#[derive(Debug, Clone)]
pub struct TableDef {
    pub name: String,
    pub root_page: PageNum,
    pub sql: String,
    pub columns: Vec<ColumnDef>,
}

/// Table name → root page and schema, per spec.md's `TableMap`.
#[derive(Debug, Clone, Default)]
pub struct TableMap {
    by_name: HashMap<String, TableDef>,
    by_root_page: HashMap<PageNum, String>,
}

impl TableMap {
    pub fn insert(&mut self, table: TableDef) {
        self.by_root_page.insert(table.root_page, table.name.clone());
        self.by_name.insert(table.name.clone(), table);
    }

    pub fn get(&self, name: &str) -> Option<&TableDef> {
        self.by_name.get(name)
    }

    pub fn table_for_root_page(&self, page: PageNum) -> Option<&str> {
        self.by_root_page.get(&page).map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &TableDef> {
        self.by_name.values()
    }

    pub fn is_root_page(&self, page: PageNum) -> bool {
        self.by_root_page.contains_key(&page)
    }
}

/// Leaf page number → owning table name, built by traversing every table's B-tree
/// (spec.md's `PageToTable`).
#[derive(Debug, Clone, Default)]
pub struct PageToTable {
    map: HashMap<PageNum, String>,
}

impl PageToTable {
    pub fn insert(&mut self, page: PageNum, table: String) {
        self.map.insert(page, table);
    }

    pub fn get(&self, page: PageNum) -> Option<&str> {
        self.map.get(&page).map(|s| s.as_str())
    }

    pub fn contains(&self, page: PageNum) -> bool {
        self.map.contains_key(&page)
    }

    pub fn pages(&self) -> impl Iterator<Item = PageNum> + '_ {
        self.map.keys().copied()
    }
}

/// Union of all trunk and freelist-leaf page numbers (spec.md's `FreelistSet`).
#[derive(Debug, Clone, Default)]
pub struct FreelistSet {
    trunks: HashSet<PageNum>,
    leaves: HashSet<PageNum>,
}

impl FreelistSet {
    pub fn add_trunk(&mut self, page: PageNum) {
        self.trunks.insert(page);
    }

    pub fn add_leaf(&mut self, page: PageNum) {
        self.leaves.insert(page);
    }

    pub fn is_trunk(&self, page: PageNum) -> bool {
        self.trunks.contains(&page)
    }

    pub fn is_leaf(&self, page: PageNum) -> bool {
        self.leaves.contains(&page)
    }

    pub fn contains(&self, page: PageNum) -> bool {
        self.is_trunk(page) || self.is_leaf(page)
    }

    pub fn all_pages(&self) -> impl Iterator<Item = PageNum> + '_ {
        self.trunks.iter().chain(self.leaves.iter()).copied()
    }
}

/// Predicted pointer-map page numbers (spec.md's `PointerMapSet`).
#[derive(Debug, Clone, Default)]
pub struct PointerMapSet {
    pages: HashSet<PageNum>,
}

impl PointerMapSet {
    pub fn new(pages: HashSet<PageNum>) -> Self {
        PointerMapSet { pages }
    }

    pub fn contains(&self, page: PageNum) -> bool {
        self.pages.contains(&page)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Active,
    Duplicate,
    ModifiedReusedId,
    Deleted,
    /// Rows decoded from a freelist-leaf page that still happens to look like a
    /// table-leaf layout (spec.md §4.10c); these are never classified further.
    Freelist,
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecordStatus::Active => "Active",
            RecordStatus::Duplicate => "Duplicate (Active)",
            RecordStatus::ModifiedReusedId => "Modified/Reused ID",
            RecordStatus::Deleted => "Deleted",
            RecordStatus::Freelist => "Freelist",
        };
        write!(f, "{}", s)
    }
}

/// Either a frame number from a WAL, or "N/A" for a row that comes from the main file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FrameNumber {
    MainFile,
    Wal(u32),
}

impl FrameNumber {
    /// Main-file rows are treated as frame 0 for the max-frame comparison in
    /// spec.md §4.12.
    pub fn as_ordinal(&self) -> u32 {
        match self {
            FrameNumber::MainFile => 0,
            FrameNumber::Wal(n) => *n,
        }
    }
}

impl std::fmt::Display for FrameNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameNumber::MainFile => write!(f, "N/A"),
            FrameNumber::Wal(n) => write!(f, "{}", n),
        }
    }
}

/// One allocated row (spec.md §6 "Record tuple").
#[derive(Debug, Clone)]
pub struct RecordTuple {
    pub source_file_name: String,
    pub frame_number: FrameNumber,
    pub page_number: PageNum,
    pub record_status: RecordStatus,
    pub table_name: String,
    pub file_offset_of_cell: u64,
    pub rowid: i64,
    pub values: Vec<Value>,
    /// True when the cell decoder could not follow an overflow chain (only possible
    /// for WAL-resident rows, spec.md §4.8) and trailing columns are absent.
    pub partial: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResidueKind {
    PageUnallocatedSpace,
    Freeblock,
}

impl std::fmt::Display for ResidueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResidueKind::PageUnallocatedSpace => "Page Unallocated Space",
            ResidueKind::Freeblock => "Freeblock",
        };
        write!(f, "{}", s)
    }
}

/// One scavenged fragment of printable text (spec.md §6 "Recovered tuple").
#[derive(Debug, Clone)]
pub struct RecoveredTuple {
    pub source_file_name: String,
    pub frame_number: FrameNumber,
    pub page_number: PageNum,
    pub page_type_label: String,
    pub table_name: Option<String>,
    pub kind: ResidueKind,
    pub file_offset: u64,
    pub printable_string: String,
}

impl RecoveredTuple {
    pub fn table_name_or_not_known(&self) -> &str {
        self.table_name.as_deref().unwrap_or("Not Known")
    }
}
