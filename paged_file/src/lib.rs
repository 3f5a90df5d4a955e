//! Fixed-size paged file storage.
//!
//! A [`PagedFile`] stores `PAGE_SIZE`-byte pages addressed by an opaque
//! [`PageId`], backed by positioned I/O (`read_at`/`write_at`) so reads and
//! writes don't need to share a cursor. Page id `0` is reserved to mean
//! "no page" — allocation always hands out ids starting at `1`.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::trace;

/// A unique identifier for a page within a [`PagedFile`].
pub type PageId = u32;

/// Reserved value meaning "no page".
pub const INVALID_PAGE_ID: PageId = 0;

/// The size of a single page in bytes.
pub const PAGE_SIZE: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum PagedFileError {
    #[error("paged file not found: {0}")]
    FileNotFound(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Manages reading and writing fixed-size pages to a single file on disk.
pub struct PagedFile {
    path: PathBuf,
    file: File,
    next_page_id: Mutex<PageId>,
}

impl PagedFile {
    /// Opens `path` if it exists, creating it otherwise.
    pub fn open_or_create(path: impl AsRef<Path>) -> Result<Self, PagedFileError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        let len = file.metadata()?.len();
        let existing_pages = (len / PAGE_SIZE as u64) as PageId;
        // Page ids start at 1; an empty file has allocated zero pages so far.
        let next_page_id = existing_pages.max(1);
        Ok(Self {
            path,
            file,
            next_page_id: Mutex::new(next_page_id),
        })
    }

    /// True if a page with the given id has been allocated (persisted or not).
    pub fn file_exists(path: impl AsRef<Path>) -> bool {
        path.as_ref().exists()
    }

    /// Deletes the backing file. The `PagedFile` must be dropped first.
    pub fn delete_file(path: impl AsRef<Path>) -> Result<(), PagedFileError> {
        let path = path.as_ref();
        fs::remove_file(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                PagedFileError::FileNotFound(path.to_path_buf())
            } else {
                PagedFileError::Io(e)
            }
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the page `page_id` into `data`, which must be exactly `PAGE_SIZE` bytes.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<(), PagedFileError> {
        assert_eq!(data.len(), PAGE_SIZE, "read buffer must be one page wide");
        let offset = (page_id as u64) * PAGE_SIZE as u64;
        trace!(page_id, "read_page");
        self.file.read_exact_at(data, offset)?;
        Ok(())
    }

    /// Writes `data` (exactly `PAGE_SIZE` bytes) to page `page_id`.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<(), PagedFileError> {
        assert_eq!(data.len(), PAGE_SIZE, "write buffer must be one page wide");
        let offset = (page_id as u64) * PAGE_SIZE as u64;
        trace!(page_id, "write_page");
        self.file.write_all_at(data, offset)?;
        Ok(())
    }

    /// Allocates and zero-fills a fresh page, returning its id.
    pub fn allocate_page(&self) -> Result<PageId, PagedFileError> {
        let mut next_page_id = self.next_page_id.lock().unwrap();
        let page_id = *next_page_id;
        *next_page_id += 1;
        self.write_page(page_id, &[0u8; PAGE_SIZE])?;
        trace!(page_id, "allocate_page");
        Ok(page_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_and_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let pf = PagedFile::open_or_create(&path).unwrap();

        let p1 = pf.allocate_page().unwrap();
        let p2 = pf.allocate_page().unwrap();
        assert_ne!(p1, p2);
        assert_ne!(p1, INVALID_PAGE_ID);

        let mut buf = [7u8; PAGE_SIZE];
        pf.write_page(p1, &buf).unwrap();
        let mut read_buf = [0u8; PAGE_SIZE];
        pf.read_page(p1, &mut read_buf).unwrap();
        assert_eq!(&read_buf[..], &buf[..]);

        buf.fill(0);
        pf.read_page(p2, &mut read_buf).unwrap();
        assert_eq!(&read_buf[..], &buf[..]);
    }

    #[test]
    fn reopen_continues_allocation_past_existing_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        {
            let pf = PagedFile::open_or_create(&path).unwrap();
            pf.allocate_page().unwrap();
            pf.allocate_page().unwrap();
        }
        let pf = PagedFile::open_or_create(&path).unwrap();
        let next = pf.allocate_page().unwrap();
        assert_eq!(next, 3);
    }

    #[test]
    fn delete_file_removes_backing_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        {
            let pf = PagedFile::open_or_create(&path).unwrap();
            pf.allocate_page().unwrap();
        }
        assert!(PagedFile::file_exists(&path));
        PagedFile::delete_file(&path).unwrap();
        assert!(!PagedFile::file_exists(&path));
    }
}
