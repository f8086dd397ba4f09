//! Decodes page 1 ("sqlite_master") to discover every table's root page and
//! column list (spec.md §4.6). Page 1 is always a table B-tree rooted at itself, so
//! this is the B-tree traverser and cell decoder applied to one well-known root,
//! filtered to rows where `type = "table"`.

pub mod ddl;

use crate::btree::{btree_view, header as btree_header, traverse};
use crate::cell::{self, OverflowSource};
use crate::model::{ColumnDef, TableDef, TableMap};
use crate::value::Value;

const SCHEMA_TYPE_COLIDX: usize = 0;
const SCHEMA_NAME_COLIDX: usize = 1;
const SCHEMA_TBL_NAME_COLIDX: usize = 2;
const SCHEMA_ROOTPAGE_COLIDX: usize = 3;
const SCHEMA_SQL_COLIDX: usize = 4;

/// Reads every `sqlite_master` row with `type = "table"` from page 1, decoding each
/// row's SQL into an ordered column list. `read_page`/`overflow` let this run against
/// either a `source::PageSource` or synthetic in-memory fixtures. An unreadable or
/// unparseable page along the way just yields fewer tables, rather than failing the
/// whole read — the same tolerance the rest of this crate gives damaged evidence.
pub fn read_table_map(
    page_size: u64,
    max_page_number: u32,
    mut read_page: impl FnMut(crate::source::PageNum) -> Option<Vec<u8>>,
    mut overflow: impl OverflowSource,
) -> TableMap {
    let mut leaf_pages = Vec::new();
    traverse::walk_leaves(1, |pn| read_page(pn), |pn| leaf_pages.push(pn));

    let mut tables = TableMap::default();
    for leaf_page in leaf_pages {
        let Some(image) = read_page(leaf_page) else { continue };
        let (area, adjust) = btree_view(&image, leaf_page);
        let Ok(header) = btree_header::read_header(area) else { continue };
        for pointer in btree_header::cell_pointers(area, &header) {
            let cell_start = pointer as usize - adjust;
            if cell_start >= area.len() {
                continue;
            }
            let decoded = match cell::decode(
                &area[cell_start..],
                page_size,
                max_page_number,
                Some(&mut overflow),
            ) {
                Ok(d) => d,
                Err(_) => continue,
            };
            if let Some(table) = row_to_table_def(&decoded.values) {
                tables.insert(table);
            }
        }
    }
    tables
}

fn row_to_table_def(values: &[Value]) -> Option<TableDef> {
    if values.len() <= SCHEMA_SQL_COLIDX {
        return None;
    }
    if text_of(&values[SCHEMA_TYPE_COLIDX]) != "table" {
        return None;
    }
    let _name_col = &values[SCHEMA_NAME_COLIDX];
    let tbl_name = text_of(&values[SCHEMA_TBL_NAME_COLIDX]);
    let root_page = int_of(&values[SCHEMA_ROOTPAGE_COLIDX])? as crate::source::PageNum;
    let sql = text_of(&values[SCHEMA_SQL_COLIDX]);
    let columns: Vec<ColumnDef> = ddl::extract_columns(&sql);

    Some(TableDef {
        name: tbl_name,
        root_page,
        sql,
        columns,
    })
}

fn text_of(v: &Value) -> String {
    match v {
        Value::Text(s) => s.clone(),
        Value::Null => String::new(),
        other => format!("{}", other),
    }
}

fn int_of(v: &Value) -> Option<i64> {
    match v {
        Value::Int(i) => Some(*i),
        Value::Zero => Some(0),
        Value::One => Some(1),
        _ => None,
    }
}
