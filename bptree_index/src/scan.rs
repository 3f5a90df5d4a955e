//! Range-scan cursor types.
//!
//! The cursor itself is state carried inside [`crate::bptree::BPlusTree`]
//! (it needs the buffer pool to hold a pinned leaf frame between calls);
//! this module holds the operator vocabulary and the pure bound checks so
//! that logic isn't tangled up with pinning.

use std::cmp::Ordering;

use buffer_pool::PageGuard;

use crate::key::IndexKey;

/// The full comparator vocabulary callers may pass to `start_scan`. Only a
/// subset is valid in each position — see [`LowOp`]/[`HighOp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LowOp {
    Gt,
    Gte,
}

impl TryFrom<CompareOp> for LowOp {
    type Error = ();
    fn try_from(op: CompareOp) -> Result<Self, ()> {
        match op {
            CompareOp::Gt => Ok(LowOp::Gt),
            CompareOp::Gte => Ok(LowOp::Gte),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HighOp {
    Lt,
    Lte,
}

impl TryFrom<CompareOp> for HighOp {
    type Error = ();
    fn try_from(op: CompareOp) -> Result<Self, ()> {
        match op {
            CompareOp::Lt => Ok(HighOp::Lt),
            CompareOp::Lte => Ok(HighOp::Lte),
            _ => Err(()),
        }
    }
}

/// True if `k` satisfies the lower bound `low_op low`.
pub fn satisfies_low(k: IndexKey, low: IndexKey, low_op: LowOp) -> bool {
    match k.compare(&low) {
        Ordering::Greater => true,
        Ordering::Equal => low_op == LowOp::Gte,
        Ordering::Less => false,
    }
}

/// True if `k` satisfies the upper bound `high_op high`.
pub fn satisfies_high(k: IndexKey, high: IndexKey, high_op: HighOp) -> bool {
    match k.compare(&high) {
        Ordering::Less => true,
        Ordering::Equal => high_op == HighOp::Lte,
        Ordering::Greater => false,
    }
}

/// Cursor state while `Active`. `Idle` is represented by its absence from
/// `BPlusTree::scan`. `guard` is `None` only for an empty index (no leaf
/// page exists yet) — in that case the first `scan_next` reports
/// `IndexScanCompleted` without needing anything pinned.
pub(crate) struct ScanState {
    pub(crate) guard: Option<Box<dyn PageGuard + 'static>>,
    pub(crate) next_entry: usize,
    pub(crate) low: IndexKey,
    pub(crate) low_op: LowOp,
    pub(crate) high: IndexKey,
    pub(crate) high_op: HighOp,
}
