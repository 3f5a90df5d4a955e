//! The relation scanner: an external collaborator specified only by the
//! interface the index consumes. It yields `(RowId, record_bytes)` tuples
//! in file order until exhaustion.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use paged_file::PageId;

use crate::error::IndexError;

/// A record identifier: the page and slot a tuple lives at in the indexed
/// relation. Opaque to the index beyond ordering by page then slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowId {
    pub page_id: PageId,
    pub slot_index: u16,
}

/// Yields `(RowId, record_bytes)` tuples in file order.
pub trait RelationScanner {
    /// Returns the next record, or `Err(IndexError::EndOfFile)` once exhausted.
    fn scan_next(&mut self) -> Result<(RowId, Vec<u8>), IndexError>;
}

/// A relation stored as a flat file of fixed-width records, one record id
/// of `(page_id, slot_index)` assigned per `records_per_page` records. This
/// is the simplest relation shape that exercises the index end to end; a
/// real system would plug in whatever heap/slotted-page reader it has.
pub struct FixedWidthRelation {
    file: File,
    record_size: usize,
    records_per_page: u16,
    next_record_index: u64,
}

impl FixedWidthRelation {
    pub fn open(
        path: impl AsRef<Path>,
        record_size: usize,
        records_per_page: u16,
    ) -> Result<Self, IndexError> {
        let file = File::open(path).map_err(|_| IndexError::FileNotFound)?;
        Ok(Self {
            file,
            record_size,
            records_per_page,
            next_record_index: 0,
        })
    }
}

impl RelationScanner for FixedWidthRelation {
    fn scan_next(&mut self) -> Result<(RowId, Vec<u8>), IndexError> {
        let offset = self.next_record_index * self.record_size as u64;
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|_| IndexError::EndOfFile)?;

        let mut buf = vec![0u8; self.record_size];
        self.file
            .read_exact(&mut buf)
            .map_err(|_| IndexError::EndOfFile)?;

        let page_id = (self.next_record_index / self.records_per_page as u64) as PageId;
        let slot_index = (self.next_record_index % self.records_per_page as u64) as u16;
        self.next_record_index += 1;

        Ok((RowId { page_id, slot_index }, buf))
    }
}
