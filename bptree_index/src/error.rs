//! Error kinds surfaced by the B+-tree index.
//!
//! Each variant is a distinct signal per the index's contract; callers are
//! expected to match on kind rather than string content.
//! [`IndexError::IndexScanCompleted`] is not a bug — it's the normal
//! terminator for a range scan.

use buffer_pool::BpmError;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// A comparison operator outside the permitted set was passed to `start_scan`.
    #[error("bad opcodes: low_op/high_op not in the permitted comparator sets")]
    BadOpcodes,

    /// `low > high` was passed to `start_scan`.
    #[error("bad scan range: low bound exceeds high bound")]
    BadScanRange,

    /// `scan_next`/`end_scan` called while the cursor is not `Active`.
    #[error("scan not initialized: call start_scan first")]
    ScanNotInitialized,

    /// The scan is exhausted; not an error condition, just the terminator.
    #[error("index scan completed")]
    IndexScanCompleted,

    /// Reserved for a future point-lookup operation.
    #[error("no such key found")]
    NoSuchKeyFound,

    /// The meta page on disk doesn't match the constructor's
    /// `attr_byte_offset`/`attr_type` arguments.
    #[error("index metadata on disk is incompatible with the requested attribute")]
    BadIndexInfo,

    /// Propagated from the relation scanner when its source file is missing.
    #[error("relation file not found")]
    FileNotFound,

    /// Propagated from the relation scanner at end of input.
    #[error("end of file")]
    EndOfFile,

    #[error(transparent)]
    Buffer(#[from] BpmError),
}
