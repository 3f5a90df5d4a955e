//! The B+-tree itself: lifecycle, insertion with cascading splits, and the
//! range-scan cursor.
//!
//! The root page id is never cached on this struct — every public
//! operation rereads it from the meta page before touching anything else,
//! so a crash or an externally-driven reopen can never leave an operation
//! working from a stale root.

use std::cmp::Ordering;
use std::mem;

use buffer_pool::{BufferPoolManager, PageGuard};
use paged_file::{PageId, INVALID_PAGE_ID};
use tracing::{debug, trace};

use crate::error::IndexError;
use crate::key::{IndexKey, KeyType};
use crate::meta::{MetaPage, MetaPageView};
use crate::node::{
    is_leaf_page, leaf_capacity, nonleaf_capacity, LeafNode, LeafNodeRef, NonLeafNode, NonLeafNodeRef,
};
use crate::relation::{RelationScanner, RowId};
use crate::scan::{satisfies_high, satisfies_low, CompareOp, HighOp, LowOp, ScanState};

/// Safety: `bpm` is heap-allocated (`Box<BP>`); its storage does not move
/// when a `BPlusTree` is moved, only the pointer does. Every guard stored
/// in `scan` is dropped — via `end_scan`, the next `start_scan`, or
/// `BPlusTree`'s own drop order (`scan` is declared before `bpm`) — before
/// `bpm` can be freed.
unsafe fn erase_guard_lifetime<'a>(guard: Box<dyn PageGuard + 'a>) -> Box<dyn PageGuard + 'static> {
    mem::transmute(guard)
}

pub struct BPlusTree<BP: BufferPoolManager + 'static> {
    scan: Option<ScanState>,
    bpm: Box<BP>,
    meta_page_id: PageId,
    key_type: KeyType,
    attr_byte_offset: i32,
}

impl<BP: BufferPoolManager + 'static> BPlusTree<BP> {
    /// Opens an existing index file's tree, validating that the stored
    /// meta page agrees with the caller's attribute arguments.
    pub fn open(bpm: BP, attr_byte_offset: i32, key_type: KeyType, relation_name: &str) -> Result<Self, IndexError> {
        let meta_page_id: PageId = 1;
        let tree = Self {
            scan: None,
            bpm: Box::new(bpm),
            meta_page_id,
            key_type,
            attr_byte_offset,
        };
        {
            let guard = tree.bpm.fetch_page(meta_page_id)?;
            let view = MetaPageView::new(&guard);
            if view.relation_name() != relation_name
                || view.attr_byte_offset() != attr_byte_offset
                || view.attr_type_discriminant() != key_type.discriminant()
            {
                return Err(IndexError::BadIndexInfo);
            }
        }
        Ok(tree)
    }

    /// Creates a fresh index file's tree and bulk-loads it from `scanner`.
    pub fn create(
        bpm: BP,
        attr_byte_offset: i32,
        key_type: KeyType,
        relation_name: &str,
        scanner: &mut dyn RelationScanner,
    ) -> Result<Self, IndexError> {
        let mut tree = Self {
            scan: None,
            bpm: Box::new(bpm),
            meta_page_id: INVALID_PAGE_ID,
            key_type,
            attr_byte_offset,
        };
        let meta_page_id = {
            let mut guard = tree.bpm.new_page()?;
            let page_id = guard.page_id();
            MetaPage::new(&mut guard).initialize(relation_name, attr_byte_offset, key_type);
            page_id
        };
        tree.meta_page_id = meta_page_id;
        tree.build_from_scanner(scanner)?;
        tree.bpm.flush_all_pages()?;
        Ok(tree)
    }

    /// Derives the on-disk index file name from the relation it indexes and
    /// the byte offset of the indexed attribute, per the index's naming
    /// contract (`<relation>.<offset>`). The caller joins this onto
    /// whatever directory the relation itself lives in.
    pub fn index_file_name(relation_name: &str, attr_byte_offset: i32) -> String {
        format!("{relation_name}.{attr_byte_offset}")
    }

    /// Opens the index if `index_existed`, else creates it and bulk-inserts
    /// every tuple `scanner` yields. The combined lifecycle entry point:
    /// callers that don't need to choose between `open`/`create` themselves
    /// (e.g. because they already know whether the index file is present)
    /// should use this instead.
    pub fn create_or_open(
        bpm: BP,
        attr_byte_offset: i32,
        key_type: KeyType,
        relation_name: &str,
        index_existed: bool,
        scanner: &mut dyn RelationScanner,
    ) -> Result<Self, IndexError> {
        if index_existed {
            Self::open(bpm, attr_byte_offset, key_type, relation_name)
        } else {
            Self::create(bpm, attr_byte_offset, key_type, relation_name, scanner)
        }
    }

    fn build_from_scanner(&mut self, scanner: &mut dyn RelationScanner) -> Result<(), IndexError> {
        loop {
            match scanner.scan_next() {
                Ok((rid, record)) => {
                    let key = self.decode_key(&record);
                    self.insert_entry(key, rid)?;
                }
                Err(IndexError::EndOfFile) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    fn decode_key(&self, record: &[u8]) -> IndexKey {
        let offset = self.attr_byte_offset as usize;
        let size = self.key_type.size();
        IndexKey::deserialize(&record[offset..offset + size], self.key_type)
    }

    fn root_page_no(&self) -> Result<PageId, IndexError> {
        let guard = self.bpm.fetch_page(self.meta_page_id)?;
        Ok(MetaPageView::new(&guard).root_page_no())
    }

    fn set_root_page_no(&self, page_id: PageId) -> Result<(), IndexError> {
        let mut guard = self.bpm.fetch_page(self.meta_page_id)?;
        MetaPage::new(&mut guard).set_root_page_no(page_id);
        Ok(())
    }

    fn level_of(&self, page_id: PageId) -> Result<u16, IndexError> {
        let guard = self.bpm.fetch_page(page_id)?;
        if is_leaf_page(&guard) {
            Ok(0)
        } else {
            Ok(NonLeafNodeRef::new(&guard, self.key_type).level())
        }
    }

    /// The current root's level (`0` for a leaf root), or `None` for an
    /// empty tree. Exposed for invariant checks: see spec scenario 3
    /// ("cascading splits").
    pub fn root_level(&self) -> Result<Option<u16>, IndexError> {
        let root = self.root_page_no()?;
        if root == INVALID_PAGE_ID {
            return Ok(None);
        }
        Ok(Some(self.level_of(root)?))
    }

    /// Inserts `(key, rid)`. `key` must not be the layout's sentinel value
    /// — a programming defect, not a runtime error, so this only asserts
    /// in debug builds.
    pub fn insert_entry(&mut self, key: IndexKey, rid: RowId) -> Result<(), IndexError> {
        debug_assert!(!key.is_sentinel(), "cannot index the sentinel value");

        let root = self.root_page_no()?;
        if root == INVALID_PAGE_ID {
            let mut guard = self.bpm.new_page()?;
            let leaf_page_id = guard.page_id();
            let mut leaf = LeafNode::new(&mut guard, self.key_type);
            leaf.initialize(INVALID_PAGE_ID);
            leaf.insert_sorted(key, rid);
            drop(guard);
            self.set_root_page_no(leaf_page_id)?;
            debug!(page_id = leaf_page_id, "installed first leaf as root");
            return Ok(());
        }

        if let Some((separator, new_right)) = self.insert_recursive(root, key, rid)? {
            let old_root_level = self.level_of(root)?;
            let mut guard = self.bpm.new_page()?;
            let new_root_id = guard.page_id();
            let mut node = NonLeafNode::new(&mut guard, self.key_type);
            node.initialize(old_root_level + 1);
            node.set_child_at(0, root);
            node.insert_separator(0, separator, new_right);
            drop(guard);
            self.set_root_page_no(new_root_id)?;
            debug!(page_id = new_root_id, level = old_root_level + 1, "grew root");
        }
        Ok(())
    }

    fn insert_recursive(
        &mut self,
        page_id: PageId,
        key: IndexKey,
        rid: RowId,
    ) -> Result<Option<(IndexKey, PageId)>, IndexError> {
        let leaf = {
            let guard = self.bpm.fetch_page(page_id)?;
            is_leaf_page(&guard)
        };

        if leaf {
            return self.insert_into_leaf(page_id, key, rid);
        }

        let child_id = {
            let guard = self.bpm.fetch_page(page_id)?;
            let view = NonLeafNodeRef::new(&guard, self.key_type);
            view.child_at(view.find_child_index(key))
        };

        match self.insert_recursive(child_id, key, rid)? {
            None => Ok(None),
            Some((separator, new_right)) => self.insert_into_nonleaf(page_id, separator, new_right),
        }
    }

    fn insert_into_leaf(
        &mut self,
        page_id: PageId,
        key: IndexKey,
        rid: RowId,
    ) -> Result<Option<(IndexKey, PageId)>, IndexError> {
        let mut guard = self.bpm.fetch_page(page_id)?;
        let full = LeafNodeRef::new(&guard, self.key_type).occupancy() >= leaf_capacity(self.key_type);

        if !full {
            LeafNode::new(&mut guard, self.key_type).insert_sorted(key, rid);
            return Ok(None);
        }

        let old_right_sibling = LeafNodeRef::new(&guard, self.key_type).right_sibling();
        let mut entries = LeafNode::new(&mut guard, self.key_type).read_all();
        let pos = entries.partition_point(|(k, _)| k.compare(&key) != Ordering::Greater);
        entries.insert(pos, (key, rid));

        let mid = leaf_capacity(self.key_type) / 2;
        let (left_entries, right_entries) = entries.split_at(mid);
        let separator = right_entries[0].0;

        let mut new_guard = self.bpm.new_page()?;
        let new_page_id = new_guard.page_id();
        let mut right = LeafNode::new(&mut new_guard, self.key_type);
        right.initialize(old_right_sibling);
        right.write_all(right_entries);
        drop(right);
        drop(new_guard);

        let mut left = LeafNode::new(&mut guard, self.key_type);
        left.write_all(left_entries);
        left.set_right_sibling(new_page_id);

        trace!(page_id, new_page_id, "leaf split");
        Ok(Some((separator, new_page_id)))
    }

    fn insert_into_nonleaf(
        &mut self,
        page_id: PageId,
        separator: IndexKey,
        new_right: PageId,
    ) -> Result<Option<(IndexKey, PageId)>, IndexError> {
        let mut guard = self.bpm.fetch_page(page_id)?;
        let (idx, full) = {
            let view = NonLeafNodeRef::new(&guard, self.key_type);
            (
                view.find_child_index(separator),
                view.occupancy() >= nonleaf_capacity(self.key_type),
            )
        };

        if !full {
            NonLeafNode::new(&mut guard, self.key_type).insert_separator(idx, separator, new_right);
            return Ok(None);
        }

        let level = NonLeafNodeRef::new(&guard, self.key_type).level();
        let (mut keys, mut children) = NonLeafNode::new(&mut guard, self.key_type).read_all();
        keys.insert(idx, separator);
        children.insert(idx + 1, new_right);

        let mid = nonleaf_capacity(self.key_type) / 2;
        let lifted = keys[mid];

        let mut new_guard = self.bpm.new_page()?;
        let new_page_id = new_guard.page_id();
        let mut right = NonLeafNode::new(&mut new_guard, self.key_type);
        right.initialize(level);
        right.write_all(&keys[mid + 1..], &children[mid + 1..]);
        drop(right);
        drop(new_guard);

        let mut left = NonLeafNode::new(&mut guard, self.key_type);
        left.write_all(&keys[..mid], &children[..=mid]);

        trace!(page_id, new_page_id, "non-leaf split");
        Ok(Some((lifted, new_page_id)))
    }

    /// Begins a range scan. Releases any page pinned by a prior active
    /// scan before locating the first qualifying leaf entry.
    pub fn start_scan(
        &mut self,
        low: IndexKey,
        low_op: CompareOp,
        high: IndexKey,
        high_op: CompareOp,
    ) -> Result<(), IndexError> {
        let low_op = LowOp::try_from(low_op).map_err(|_| IndexError::BadOpcodes)?;
        let high_op = HighOp::try_from(high_op).map_err(|_| IndexError::BadOpcodes)?;
        if low.compare(&high) == Ordering::Greater {
            return Err(IndexError::BadScanRange);
        }

        // Drop any page pinned by a prior scan before starting the new one.
        self.scan = None;

        let root = self.root_page_no()?;
        if root == INVALID_PAGE_ID {
            // Empty tree: no leaf to pin. The cursor is still Active; the
            // first scan_next reports completion without anything pinned.
            self.scan = Some(ScanState {
                guard: None,
                next_entry: 0,
                low,
                low_op,
                high,
                high_op,
            });
            return Ok(());
        }

        let (leaf_page_id, next_entry) = self.descend_to_scan_start(root, low)?;
        let guard = self.bpm.fetch_page(leaf_page_id)?;
        self.scan = Some(ScanState {
            guard: Some(unsafe { erase_guard_lifetime(guard) }),
            next_entry,
            low,
            low_op,
            high,
            high_op,
        });
        Ok(())
    }

    /// Descends from `page_id` to the leaf where a scan for `low` should
    /// begin, choosing at each non-leaf the smallest index `i` with
    /// `low <= key_array[i]`, or the last occupied child if none qualify.
    fn descend_to_scan_start(&self, page_id: PageId, low: IndexKey) -> Result<(PageId, usize), IndexError> {
        let mut current = page_id;
        loop {
            let guard = self.bpm.fetch_page(current)?;
            if is_leaf_page(&guard) {
                return Ok((current, 0));
            }
            let view = NonLeafNodeRef::new(&guard, self.key_type);
            let idx = view.find_child_index_for_scan(low);
            current = view.child_at(idx);
        }
    }

    /// Returns the next record id in range, or signals
    /// [`IndexError::IndexScanCompleted`] once the scan is exhausted. Per
    /// the scan contract, completion does not return the cursor to
    /// `Idle` — the caller must still call `end_scan` to release it.
    pub fn scan_next(&mut self) -> Result<RowId, IndexError> {
        loop {
            let state = self.scan.as_mut().ok_or(IndexError::ScanNotInitialized)?;

            let guard = match state.guard.as_ref() {
                Some(guard) => guard,
                None => return Err(IndexError::IndexScanCompleted),
            };
            let occupancy = LeafNodeRef::new(guard, self.key_type).occupancy();

            if state.next_entry >= occupancy {
                let right_sibling = LeafNodeRef::new(state.guard.as_ref().unwrap(), self.key_type).right_sibling();
                if right_sibling == INVALID_PAGE_ID {
                    state.guard = None;
                    return Err(IndexError::IndexScanCompleted);
                }
                let new_guard = self.bpm.fetch_page(right_sibling)?;
                let state = self.scan.as_mut().expect("scan state still present");
                state.guard = Some(unsafe { erase_guard_lifetime(new_guard) });
                state.next_entry = 0;
                continue;
            }

            let key = LeafNodeRef::new(state.guard.as_ref().unwrap(), self.key_type).key_at(state.next_entry);

            if !satisfies_high(key, state.high, state.high_op) {
                state.guard = None;
                return Err(IndexError::IndexScanCompleted);
            }
            if !satisfies_low(key, state.low, state.low_op) {
                state.next_entry += 1;
                continue;
            }

            let rid = LeafNodeRef::new(state.guard.as_ref().unwrap(), self.key_type).rid_at(state.next_entry);
            state.next_entry += 1;
            return Ok(rid);
        }
    }

    /// Releases the page (if any) pinned by the current scan and returns
    /// to `Idle`.
    pub fn end_scan(&mut self) -> Result<(), IndexError> {
        if self.scan.take().is_none() {
            return Err(IndexError::ScanNotInitialized);
        }
        Ok(())
    }

    /// Flushes every dirty page to the backing file.
    pub fn flush(&self) -> Result<(), IndexError> {
        self.bpm.flush_all_pages().map_err(IndexError::from)
    }
}

impl<BP: BufferPoolManager + 'static> Drop for BPlusTree<BP> {
    fn drop(&mut self) {
        self.scan = None;
        if let Err(err) = self.bpm.flush_all_pages() {
            tracing::warn!(%err, "failed to flush index on drop");
        }
    }
}
