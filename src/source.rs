//! A page-addressable view over one evidence file (a main database file or a WAL
//! sidecar), with whatever page size the evidence's own header declares rather than
//! a fixed constant.
//!
//! Pages are loaded on demand and cached for the lifetime of the source. A page
//! number past the end of the file is a recoverable condition rather than a panic,
//! since evidence files are frequently truncated.

use std::io::{Read, Seek, SeekFrom};

pub type PageNum = usize;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Page {0} is beyond the end of the file.")]
    PageOutOfRange(PageNum),
    #[error("Failed reading from evidence file: {0}")]
    Io(#[from] std::io::Error),
}

/// A read-only, page-addressable view of one evidence file.
pub struct PageSource {
    file: std::fs::File,
    page_size: usize,
    file_len: u64,
    cache: Vec<Option<Vec<u8>>>,
}

impl PageSource {
    pub fn open(path: &std::path::Path, page_size: usize) -> Result<Self, Error> {
        let file = std::fs::OpenOptions::new().read(true).open(path)?;
        let file_len = file.metadata()?.len();
        Ok(PageSource {
            file,
            page_size,
            file_len,
            cache: Vec::new(),
        })
    }

    /// Wraps an in-memory buffer as a page source, for synthetic-fixture tests.
    pub fn from_bytes(bytes: Vec<u8>, page_size: usize) -> Result<Self, Error> {
        let tmp = tempfile_from_bytes(&bytes)?;
        let file_len = bytes.len() as u64;
        Ok(PageSource {
            file: tmp,
            page_size,
            file_len,
            cache: Vec::new(),
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    /// Number of whole pages implied by file length, including a possible short
    /// trailing page which evidence may contain after truncation.
    pub fn page_count(&self) -> usize {
        ((self.file_len + self.page_size as u64 - 1) / self.page_size as u64) as usize
    }

    fn load(&mut self, pn: PageNum) -> Result<(), Error> {
        if pn == 0 {
            return Err(Error::PageOutOfRange(pn));
        }
        if pn > self.cache.len() {
            self.cache.resize(pn, None);
        }
        if self.cache[pn - 1].is_some() {
            return Ok(());
        }
        let offset = (pn - 1) as u64 * self.page_size as u64;
        if offset >= self.file_len {
            return Err(Error::PageOutOfRange(pn));
        }
        let want = self.page_size.min((self.file_len - offset) as usize);
        let mut buf = vec![0_u8; self.page_size];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf[..want])?;
        self.cache[pn - 1] = Some(buf);
        Ok(())
    }

    /// Returns the page image for `pn`, zero-padded if the evidence file ends mid-page.
    pub fn read_page(&mut self, pn: PageNum) -> Result<&[u8], Error> {
        self.load(pn)?;
        Ok(self.cache[pn - 1].as_deref().unwrap())
    }

    /// Reads `len` bytes at an arbitrary absolute byte offset, used for WAL frame headers
    /// and page images, which are not page-size-aligned to the main file's page grid.
    pub fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>, Error> {
        let mut buf = vec![0_u8; len];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// In tests we want `PageSource` to be backed by plain bytes without touching disk.
/// The simplest portable way to give it a `Read + Seek` file handle is a short-lived
/// anonymous temp file; tests are the only caller.
fn tempfile_from_bytes(bytes: &[u8]) -> Result<std::fs::File, Error> {
    use std::io::Write;
    let mut f = tempfile_handle()?;
    f.write_all(bytes)?;
    f.seek(SeekFrom::Start(0))?;
    Ok(f)
}

#[cfg(unix)]
fn tempfile_handle() -> Result<std::fs::File, Error> {
    let path = std::env::temp_dir().join(format!(
        "sqlite-forensics-test-{}-{}",
        std::process::id(),
        unique_suffix()
    ));
    let f = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)?;
    let _ = std::fs::remove_file(&path);
    Ok(f)
}

#[cfg(not(unix))]
fn tempfile_handle() -> Result<std::fs::File, Error> {
    let path = std::env::temp_dir().join(format!(
        "sqlite-forensics-test-{}-{}",
        std::process::id(),
        unique_suffix()
    ));
    std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)
        .map_err(Error::Io)
}

fn unique_suffix() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_count_rounds_up() {
        let bytes = vec![0_u8; 100];
        let src = PageSource::from_bytes(bytes, 64).unwrap();
        assert_eq!(src.page_count(), 2);
    }

    #[test]
    fn test_read_page_returns_correct_slice() {
        let mut bytes = vec![0_u8; 8];
        bytes[0..4].copy_from_slice(&[1, 2, 3, 4]);
        bytes[4..8].copy_from_slice(&[5, 6, 7, 8]);
        let mut src = PageSource::from_bytes(bytes, 4).unwrap();
        assert_eq!(src.read_page(1).unwrap(), &[1, 2, 3, 4]);
        assert_eq!(src.read_page(2).unwrap(), &[5, 6, 7, 8]);
    }

    #[test]
    fn test_read_page_out_of_range() {
        let mut src = PageSource::from_bytes(vec![0_u8; 4], 4).unwrap();
        assert!(matches!(src.read_page(2), Err(Error::PageOutOfRange(2))));
    }

    #[test]
    fn test_short_trailing_page_is_zero_padded() {
        let mut src = PageSource::from_bytes(vec![9_u8; 3], 8).unwrap();
        let page = src.read_page(1).unwrap();
        assert_eq!(page.len(), 8);
        assert_eq!(&page[0..3], &[9, 9, 9]);
        assert_eq!(&page[3..8], &[0, 0, 0, 0, 0]);
    }
}
