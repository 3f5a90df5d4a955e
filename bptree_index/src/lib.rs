//! A disk-resident B+-tree index over an external paged-file and
//! buffer-pool subsystem: page layout, recursive insert with cascading
//! splits, and a two-phase range scan over the leaf sibling chain.

pub mod bptree;
pub mod error;
pub mod key;
pub mod meta;
pub mod node;
pub mod relation;
pub mod scan;

pub use bptree::BPlusTree;
pub use error::IndexError;
pub use key::{IndexKey, KeyType};
pub use relation::{FixedWidthRelation, RelationScanner, RowId};
pub use scan::CompareOp;

pub use buffer_pool::{BpmError, BufferPool, BufferPoolManager, PageGuard};
pub use paged_file::{PageId, PagedFile, PagedFileError, INVALID_PAGE_ID, PAGE_SIZE};
