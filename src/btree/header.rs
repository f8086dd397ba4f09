//! The 8-byte (leaf) or 12-byte (interior) B-tree page header that immediately
//! follows the 100-byte file header on page 1, or starts at byte 0 elsewhere
//! (spec.md §3 "B-tree header").

use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

use crate::page::PageType;

#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error("Page is too short to contain a B-tree header.")]
    Truncated,
    #[error("Page type byte {0:#x} is not a B-tree page type.")]
    NotABtreePage(u8),
}

#[derive(Debug, Clone)]
pub struct Header {
    pub page_type: PageType,
    pub first_freeblock: u16,
    pub cell_count: u16,
    /// Start of the cell-content area; 0 on disk means 65536.
    pub cell_content_start: u32,
    pub fragmented_free_bytes: u8,
    pub rightmost_pointer: Option<u32>,
}

impl Header {
    pub fn byte_len(&self) -> usize {
        if self.rightmost_pointer.is_some() {
            12
        } else {
            8
        }
    }
}

/// Reads the B-tree header from the start of `btree_area` (see `btree::btree_view`).
pub fn read_header(btree_area: &[u8]) -> Result<Header, Error> {
    if btree_area.len() < 8 {
        return Err(Error::Truncated);
    }
    let mut c = Cursor::new(btree_area);
    let type_byte = c.read_u8().map_err(|_| Error::Truncated)?;
    let page_type = match type_byte {
        0x02 => PageType::IndexInterior,
        0x05 => PageType::TableInterior,
        0x0a => PageType::IndexLeaf,
        0x0d => PageType::TableLeaf,
        b => return Err(Error::NotABtreePage(b)),
    };
    let first_freeblock = c.read_u16::<BigEndian>().map_err(|_| Error::Truncated)?;
    let cell_count = c.read_u16::<BigEndian>().map_err(|_| Error::Truncated)?;
    let cell_content_start = match c.read_u16::<BigEndian>().map_err(|_| Error::Truncated)? {
        0 => 65536,
        x => x as u32,
    };
    let fragmented_free_bytes = c.read_u8().map_err(|_| Error::Truncated)?;
    let rightmost_pointer = match page_type {
        PageType::TableInterior | PageType::IndexInterior => {
            if btree_area.len() < 12 {
                return Err(Error::Truncated);
            }
            Some(c.read_u32::<BigEndian>().map_err(|_| Error::Truncated)?)
        }
        _ => None,
    };

    Ok(Header {
        page_type,
        first_freeblock,
        cell_count,
        cell_content_start,
        fragmented_free_bytes,
        rightmost_pointer,
    })
}

/// Reads the `cell_count` big-endian u16 cell pointers immediately following the
/// B-tree header. Pointer values are page-relative as stored on disk; the caller
/// subtracts the adjustment from `btree::btree_view` before indexing `btree_area`.
pub fn cell_pointers(btree_area: &[u8], header: &Header) -> Vec<u16> {
    let start = header.byte_len();
    let mut out = Vec::with_capacity(header.cell_count as usize);
    let mut c = Cursor::new(btree_area);
    c.set_position(start as u64);
    for _ in 0..header.cell_count {
        match c.read_u16::<BigEndian>() {
            Ok(off) => out.push(off),
            Err(_) => break,
        }
    }
    out
}
