//! Walks the freelist trunk chain rooted at the main header's first-trunk pointer
//! (spec.md §4.4).

use byteorder::{BigEndian, ReadBytesExt};
use std::collections::HashSet;
use std::io::Cursor;

use crate::model::FreelistSet;
use crate::source::PageNum;

#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error("Freelist trunk page {0} was visited twice; the chain is cyclic.")]
    FreelistCycle(PageNum),
}

/// One warning emitted for an out-of-range leaf entry; the walk continues regardless.
#[derive(Debug, Clone)]
pub struct OutOfRangeLeaf {
    pub trunk_page: PageNum,
    pub leaf_page_value: u32,
}

pub struct WalkResult {
    pub set: FreelistSet,
    pub skipped: Vec<OutOfRangeLeaf>,
}

/// Walks trunk pages starting at `first_trunk` (0 means no freelist). `read_page`
/// fetches a page image by number; `page_count` bounds valid leaf entries.
pub fn walk(
    first_trunk: PageNum,
    page_count: PageNum,
    mut read_page: impl FnMut(PageNum) -> Option<Vec<u8>>,
) -> Result<WalkResult, Error> {
    let mut set = FreelistSet::default();
    let mut skipped = Vec::new();
    let mut visited = HashSet::new();
    let mut trunk = first_trunk;

    while trunk != 0 {
        if !visited.insert(trunk) {
            return Err(Error::FreelistCycle(trunk));
        }
        set.add_trunk(trunk);
        let Some(page) = read_page(trunk) else {
            break;
        };
        let mut c = Cursor::new(&page);
        let next_trunk = c.read_u32::<BigEndian>().unwrap_or(0) as PageNum;
        let leaf_count = c.read_u32::<BigEndian>().unwrap_or(0);
        for _ in 0..leaf_count {
            let leaf = match c.read_u32::<BigEndian>() {
                Ok(v) => v,
                Err(_) => break,
            };
            if leaf == 0 || leaf as PageNum > page_count {
                skipped.push(OutOfRangeLeaf {
                    trunk_page: trunk,
                    leaf_page_value: leaf,
                });
                continue;
            }
            set.add_leaf(leaf as PageNum);
        }
        trunk = next_trunk;
    }

    Ok(WalkResult { set, skipped })
}
