//! Decodes one table B-tree leaf cell: payload length, rowid, record header, and
//! column values, following the overflow chain when the payload spills past the
//! in-cell threshold (spec.md §4.8).

use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

use crate::value::Value;
use crate::varint;

#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error("Cell at offset {0} is truncated before its declared payload length.")]
    TruncatedCell(usize),
    #[error("Overflow chain starting at page {0} could not be followed: {1}")]
    OverflowChainInvalid(u32, String),
    #[error("Serial type {0} is not a valid column encoding.")]
    UnsupportedSerialType(i64),
}

/// Overflow-threshold constants for one page size (spec.md §3).
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub u: u64,
    pub x: u64,
    pub m: u64,
}

impl Thresholds {
    pub fn for_page_size(page_size: u64) -> Thresholds {
        let u = page_size;
        let x = u - 35;
        let m = (u - 12) * 32 / 255 - 23;
        Thresholds { u, x, m }
    }

    /// Initial in-cell payload length for a cell whose total payload is `p` bytes.
    pub fn initial_len(&self, p: u64) -> u64 {
        if p <= self.x {
            return p;
        }
        let k = self.m + (p - self.m) % (self.u - 4);
        if k <= self.x {
            k
        } else {
            self.m
        }
    }
}

/// A decoded leaf cell, plus bookkeeping the pipeline needs to attach source
/// metadata (page number, table, frame) that the decoder itself is not told.
#[derive(Debug, Clone)]
pub struct DecodedCell {
    pub rowid: i64,
    pub values: Vec<Value>,
    /// True when the decoder could not retrieve the full payload (WAL variant only,
    /// spec.md §4.8): trailing columns past the initial in-cell bytes are absent.
    pub partial: bool,
}

/// Fetches one overflow page's `(next_page, body)`. `body` has had the trailing
/// padding beyond `page_size` trimmed by the caller already.
pub trait OverflowSource {
    fn read_page(&mut self, page_number: u32) -> Option<Vec<u8>>;
}

/// Decodes the cell at `cell_bytes[0..]` (the page slice starting at a cell pointer).
/// `page_size` drives the overflow threshold formulas. `overflow` supplies pages for
/// the overflow chain; pass `None` to get the WAL variant, which never follows
/// overflow pointers and instead returns a partial row (spec.md §4.8 final paragraph).
pub fn decode(
    cell_bytes: &[u8],
    page_size: u64,
    max_page_number: u32,
    overflow: Option<&mut dyn OverflowSource>,
) -> Result<DecodedCell, Error> {
    let mut pos = 0usize;
    let (payload_len, len1) = varint::decode(cell_bytes, pos).map_err(|_| Error::TruncatedCell(pos))?;
    pos += len1;
    let (rowid, len2) = varint::decode(cell_bytes, pos).map_err(|_| Error::TruncatedCell(pos))?;
    pos += len2;
    let cell_body_start = pos;

    let payload_len = payload_len as u64;
    let thresholds = Thresholds::for_page_size(page_size);
    let initial_len = thresholds.initial_len(payload_len).min(payload_len);
    let has_overflow = initial_len < payload_len;

    let initial_bytes_available = cell_bytes.len().saturating_sub(cell_body_start);
    let want_initial = initial_len as usize;
    if !has_overflow && initial_bytes_available < want_initial {
        return Err(Error::TruncatedCell(cell_body_start));
    }
    let available_initial = want_initial.min(initial_bytes_available);
    let initial_payload = &cell_bytes[cell_body_start..cell_body_start + available_initial];

    let (full_payload, partial) = if !has_overflow {
        (initial_payload.to_vec(), available_initial < want_initial)
    } else {
        match overflow {
            None => {
                // WAL variant: never follow the chain. Truncated payload is reported partial.
                (initial_payload.to_vec(), true)
            }
            Some(src) => {
                let overflow_ptr_start = cell_body_start + available_initial;
                let pointer = read_overflow_pointer(cell_bytes, overflow_ptr_start, max_page_number)?;
                let mut buf = initial_payload.to_vec();
                let remaining = payload_len.saturating_sub(available_initial as u64);
                follow_overflow_chain(src, pointer, remaining, page_size, &mut buf)?;
                (buf, false)
            }
        }
    };

    decode_record(&full_payload, rowid, partial)
}

/// The on-disk overflow pointer sits right after the initial payload bytes. Per
/// spec.md §4.8 step 4, upstream sizing has historically been off by a few bytes;
/// if the naive 4-byte window is not a page number in range, walk it backwards a
/// handful of bytes (bounded by the payload already consumed) looking for one that is,
/// keeping skipped bytes as payload rather than discarding them.
fn read_overflow_pointer(cell_bytes: &[u8], naive_offset: usize, max_page_number: u32) -> Result<u32, Error> {
    if let Some(ptr) = try_read_u32(cell_bytes, naive_offset) {
        if ptr != 0 && ptr <= max_page_number {
            return Ok(ptr);
        }
    }
    const MAX_WALKBACK: usize = 4;
    for back in 1..=MAX_WALKBACK.min(naive_offset) {
        let candidate_offset = naive_offset - back;
        if let Some(ptr) = try_read_u32(cell_bytes, candidate_offset) {
            if ptr != 0 && ptr <= max_page_number {
                log::warn!(
                    "overflow pointer at offset {} did not decode to a valid page; \
                     found one {} bytes earlier instead",
                    naive_offset,
                    back
                );
                return Ok(ptr);
            }
        }
    }
    Err(Error::OverflowChainInvalid(
        0,
        format!("no valid overflow page number near offset {}", naive_offset),
    ))
}

fn try_read_u32(buf: &[u8], offset: usize) -> Option<u32> {
    buf.get(offset..offset + 4).map(|b| {
        let mut c = Cursor::new(b);
        c.read_u32::<BigEndian>().expect("4 bytes always decode")
    })
}

fn follow_overflow_chain(
    src: &mut dyn OverflowSource,
    mut next_page: u32,
    mut remaining: u64,
    page_size: u64,
    buf: &mut Vec<u8>,
) -> Result<(), Error> {
    let per_page = page_size.saturating_sub(4);
    let mut visited = std::collections::HashSet::new();
    while next_page != 0 && remaining > 0 {
        if !visited.insert(next_page) {
            return Err(Error::OverflowChainInvalid(
                next_page,
                "overflow chain revisits a page".to_string(),
            ));
        }
        let page = src
            .read_page(next_page)
            .ok_or_else(|| Error::OverflowChainInvalid(next_page, "page unavailable".to_string()))?;
        if page.len() < 4 {
            return Err(Error::OverflowChainInvalid(next_page, "page too short".to_string()));
        }
        let following = u32::from_be_bytes([page[0], page[1], page[2], page[3]]);
        let take = (per_page.min(remaining)) as usize;
        let body_len = page.len().saturating_sub(4).min(take);
        buf.extend_from_slice(&page[4..4 + body_len]);
        remaining = remaining.saturating_sub(body_len as u64);
        next_page = following;
    }
    Ok(())
}

fn decode_record(payload: &[u8], rowid: i64, mut partial: bool) -> Result<DecodedCell, Error> {
    if payload.is_empty() {
        return Ok(DecodedCell { rowid, values: Vec::new(), partial: true });
    }
    let (header_len, hlen_varint_len) =
        varint::decode(payload, 0).map_err(|_| Error::TruncatedCell(0))?;
    let header_len = header_len as usize;
    let header_bytes = &payload[hlen_varint_len.min(payload.len())..header_len.min(payload.len())];
    let serial_types = varint::decode_many(header_bytes);

    let mut values = Vec::with_capacity(serial_types.len());
    let mut pos = header_len;
    for st in serial_types {
        let size = match crate::serial_type::content_size(st) {
            Ok(s) => s,
            Err(_) => {
                return Err(Error::UnsupportedSerialType(st));
            }
        };
        if pos + size > payload.len() {
            partial = true;
            break;
        }
        let value = crate::serial_type::to_value(st, &payload[pos..pos + size])
            .map_err(|_| Error::UnsupportedSerialType(st))?;
        values.push(value);
        pos += size;
    }

    Ok(DecodedCell { rowid, values, partial })
}
