//! Reads the 100-byte main database header and the 32-byte WAL header.
//!
//! Unlike a storage engine opening a file it trusts, a forensic reader treats most
//! header fields as informational rather than as preconditions to enforce: evidence
//! is allowed to disagree with itself. Only the handful of fields downstream
//! decoding cannot proceed without (magic, page size) are treated as fatal.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read, Seek, SeekFrom};

#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error("The first 16 bytes are not the SQLite format 3 magic string.")]
    NotSQLite,
    #[error("The WAL magic number {0:#x} is neither big- nor little-endian checksum variant.")]
    NotWAL(u32),
    #[error("Declared page size {0} is not a power of two in 512..=65536.")]
    BadPageSize(u32),
    #[error("The header region is truncated.")]
    TruncatedHeader,
}

const MAIN_HEADER_BYTES: usize = 100;
const WAL_HEADER_BYTES: usize = 32;
const MAGIC: &[u8] = b"SQLite format 3\0";
const WAL_MAGIC_BE: u32 = 0x377f_0682;
const WAL_MAGIC_LE: u32 = 0x377f_0683;

fn validate_pagesize(raw: u16) -> Result<u32, Error> {
    let pagesize: u32 = if raw == 1 { 65536 } else { raw as u32 };
    if pagesize.is_power_of_two() && (512..=65536).contains(&pagesize) {
        Ok(pagesize)
    } else {
        Err(Error::BadPageSize(pagesize))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Utf16Le,
    Utf16Be,
}

/// The main database file header (spec.md §4.2).
#[derive(Debug, Clone)]
pub struct DbHeader {
    pub page_size: u32,
    pub file_change_counter: u32,
    pub page_count: u32,
    pub first_freelist_trunk: u32,
    pub freelist_page_count: u32,
    pub auto_vacuum: u32,
    pub text_encoding: TextEncoding,
}

impl DbHeader {
    pub fn auto_vacuum_enabled(&self) -> bool {
        self.auto_vacuum != 0
    }
}

pub fn read_db_header<R: Read + Seek>(r: &mut R) -> Result<DbHeader, Error> {
    let mut buf = [0_u8; MAIN_HEADER_BYTES];
    r.seek(SeekFrom::Start(0)).map_err(|_| Error::TruncatedHeader)?;
    r.read_exact(&mut buf).map_err(|_| Error::TruncatedHeader)?;
    parse_db_header(&buf)
}

pub fn parse_db_header(buf: &[u8]) -> Result<DbHeader, Error> {
    if buf.len() < MAIN_HEADER_BYTES {
        return Err(Error::TruncatedHeader);
    }
    if &buf[0..16] != MAGIC {
        return Err(Error::NotSQLite);
    }
    let mut c = Cursor::new(buf);
    c.set_position(16);
    let page_size = validate_pagesize(c.read_u16::<BigEndian>().map_err(|_| Error::TruncatedHeader)?)?;

    c.set_position(24);
    let file_change_counter = c.read_u32::<BigEndian>().map_err(|_| Error::TruncatedHeader)?;
    let page_count = c.read_u32::<BigEndian>().map_err(|_| Error::TruncatedHeader)?;
    let first_freelist_trunk = c.read_u32::<BigEndian>().map_err(|_| Error::TruncatedHeader)?;
    let freelist_page_count = c.read_u32::<BigEndian>().map_err(|_| Error::TruncatedHeader)?;

    c.set_position(52);
    let auto_vacuum = c.read_u32::<BigEndian>().map_err(|_| Error::TruncatedHeader)?;

    c.set_position(56);
    let text_encoding = match c.read_u32::<BigEndian>().map_err(|_| Error::TruncatedHeader)? {
        2 => TextEncoding::Utf16Le,
        3 => TextEncoding::Utf16Be,
        _ => TextEncoding::Utf8,
    };

    Ok(DbHeader {
        page_size,
        file_change_counter,
        page_count,
        first_freelist_trunk,
        freelist_page_count,
        auto_vacuum,
        text_encoding,
    })
}

/// The 32-byte WAL file header (spec.md §4.2).
#[derive(Debug, Clone)]
pub struct WalHeader {
    pub page_size: u32,
    pub checkpoint_sequence: u32,
    pub salt1: u32,
    pub salt2: u32,
}

pub fn read_wal_header<R: Read + Seek>(r: &mut R) -> Result<WalHeader, Error> {
    let mut buf = [0_u8; WAL_HEADER_BYTES];
    r.seek(SeekFrom::Start(0)).map_err(|_| Error::TruncatedHeader)?;
    r.read_exact(&mut buf).map_err(|_| Error::TruncatedHeader)?;
    parse_wal_header(&buf)
}

pub fn parse_wal_header(buf: &[u8]) -> Result<WalHeader, Error> {
    if buf.len() < WAL_HEADER_BYTES {
        return Err(Error::TruncatedHeader);
    }
    let mut c = Cursor::new(buf);
    let magic = c.read_u32::<BigEndian>().map_err(|_| Error::TruncatedHeader)?;
    if magic != WAL_MAGIC_BE && magic != WAL_MAGIC_LE {
        return Err(Error::NotWAL(magic));
    }
    let _file_format_version = c.read_u32::<BigEndian>().map_err(|_| Error::TruncatedHeader)?;
    let page_size_raw = c.read_u32::<BigEndian>().map_err(|_| Error::TruncatedHeader)?;
    let page_size = validate_pagesize(page_size_raw as u16).unwrap_or_else(|_| {
        // Some WAL producers encode page size as a full u32 rather than the main
        // header's u16-with-65536-sentinel convention; fall back to the raw value.
        page_size_raw
    });
    let checkpoint_sequence = c.read_u32::<BigEndian>().map_err(|_| Error::TruncatedHeader)?;
    let salt1 = c.read_u32::<BigEndian>().map_err(|_| Error::TruncatedHeader)?;
    let salt2 = c.read_u32::<BigEndian>().map_err(|_| Error::TruncatedHeader)?;

    Ok(WalHeader {
        page_size,
        checkpoint_sequence,
        salt1,
        salt2,
    })
}

pub const MAIN_HEADER_LEN: usize = MAIN_HEADER_BYTES;
pub const WAL_HEADER_LEN: usize = WAL_HEADER_BYTES;
pub const WAL_FRAME_HEADER_LEN: usize = 24;

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_db_header(page_size_field: u16, auto_vacuum: u32) -> Vec<u8> {
        let mut buf = vec![0_u8; MAIN_HEADER_BYTES];
        buf[0..16].copy_from_slice(MAGIC);
        buf[16..18].copy_from_slice(&page_size_field.to_be_bytes());
        buf[24..28].copy_from_slice(&1u32.to_be_bytes()); // change counter
        buf[28..32].copy_from_slice(&2u32.to_be_bytes()); // page count
        buf[52..56].copy_from_slice(&auto_vacuum.to_be_bytes());
        buf[56..60].copy_from_slice(&1u32.to_be_bytes()); // utf8
        buf
    }

    #[test]
    fn test_parse_db_header_happy_path() {
        let buf = sample_db_header(4096, 0);
        let h = parse_db_header(&buf).unwrap();
        assert_eq!(h.page_size, 4096);
        assert_eq!(h.page_count, 2);
        assert!(!h.auto_vacuum_enabled());
        assert_eq!(h.text_encoding, TextEncoding::Utf8);
    }

    #[test]
    fn test_parse_db_header_pagesize_one_means_65536() {
        let buf = sample_db_header(1, 0);
        assert_eq!(parse_db_header(&buf).unwrap().page_size, 65536);
    }

    #[test]
    fn test_parse_db_header_bad_magic() {
        let mut buf = sample_db_header(4096, 0);
        buf[0] = b'X';
        assert!(matches!(parse_db_header(&buf), Err(Error::NotSQLite)));
    }

    #[test]
    fn test_parse_db_header_bad_pagesize() {
        let buf = sample_db_header(4097, 0);
        assert!(matches!(parse_db_header(&buf), Err(Error::BadPageSize(4097))));
    }

    #[test]
    fn test_parse_db_header_auto_vacuum() {
        let buf = sample_db_header(4096, 1);
        assert!(parse_db_header(&buf).unwrap().auto_vacuum_enabled());
    }

    #[test]
    fn test_parse_wal_header_happy_path() {
        let mut buf = vec![0_u8; WAL_HEADER_BYTES];
        buf[0..4].copy_from_slice(&WAL_MAGIC_BE.to_be_bytes());
        buf[8..12].copy_from_slice(&4096u32.to_be_bytes());
        let h = parse_wal_header(&buf).unwrap();
        assert_eq!(h.page_size, 4096);
    }

    #[test]
    fn test_parse_wal_header_bad_magic() {
        let buf = vec![0_u8; WAL_HEADER_BYTES];
        assert!(matches!(parse_wal_header(&buf), Err(Error::NotWAL(0))));
    }

    #[test]
    fn test_parse_db_header_truncated() {
        let buf = vec![0_u8; 10];
        assert!(matches!(parse_db_header(&buf), Err(Error::TruncatedHeader)));
    }
}
