//! B+-tree node layout and accessors: zero-copy views over a page frame.
//!
//! Both leaf and non-leaf nodes share a one-byte `is_leaf` discriminant at
//! offset 0 so a page can be classified before its body is interpreted —
//! this is what lets descent read a child page without first knowing
//! whether it's a leaf.
//!
//! Leaf layout (8-byte header):
//! `is_leaf(1) | pad(1) | occupancy: u16 | right_sibling: PageId(u32)`
//! followed by `occupancy` `(key, rid)` entries in ascending key order and
//! sentinel-filled slots beyond that, up to [`leaf_capacity`].
//!
//! Non-leaf layout (8-byte header):
//! `is_leaf(1) | pad(1) | level: u16 | occupancy: u16 | pad(2)`
//! followed by a `key_array` of `nonleaf_capacity` keys, then a
//! `page_no_array` of `nonleaf_capacity + 1` page ids (the classic "n keys,
//! n+1 children" layout).

use paged_file::{PageId, INVALID_PAGE_ID, PAGE_SIZE};

use crate::key::{IndexKey, KeyType};
use crate::relation::RowId;

const IS_LEAF_OFFSET: usize = 0;

const LEAF_OCCUPANCY_OFFSET: usize = 2;
const LEAF_RIGHT_SIBLING_OFFSET: usize = 4;
pub const LEAF_HEADER_SIZE: usize = 8;
const RID_SIZE: usize = 8; // page_id (4) + slot_index (2) + padding (2)

const NONLEAF_LEVEL_OFFSET: usize = 2;
const NONLEAF_OCCUPANCY_OFFSET: usize = 4;
pub const NONLEAF_HEADER_SIZE: usize = 8;
const CHILD_SIZE: usize = 4;

/// Maximum occupied key slots in a leaf of this key type.
pub fn leaf_capacity(key_type: KeyType) -> usize {
    (PAGE_SIZE - LEAF_HEADER_SIZE) / (key_type.size() + RID_SIZE)
}

/// Maximum occupied key slots in a non-leaf of this key type (it holds one
/// more child pointer than keys).
pub fn nonleaf_capacity(key_type: KeyType) -> usize {
    (PAGE_SIZE - NONLEAF_HEADER_SIZE - CHILD_SIZE) / (key_type.size() + CHILD_SIZE)
}

/// Reads the shared discriminant without committing to a node kind.
pub fn is_leaf_page(data: &[u8]) -> bool {
    data[IS_LEAF_OFFSET] != 0
}

pub struct LeafNode<'a> {
    data: &'a mut [u8],
    key_type: KeyType,
}

impl<'a> LeafNode<'a> {
    pub fn new(data: &'a mut [u8], key_type: KeyType) -> Self {
        Self { data, key_type }
    }

    pub fn initialize(&mut self, right_sibling: PageId) {
        self.data[IS_LEAF_OFFSET] = 1;
        self.set_occupancy(0);
        self.set_right_sibling(right_sibling);
        let cap = leaf_capacity(self.key_type);
        for i in 0..cap {
            self.set_key_at(i, IndexKey::sentinel(self.key_type));
        }
    }

    pub fn occupancy(&self) -> usize {
        u16::from_le_bytes(self.data[LEAF_OCCUPANCY_OFFSET..LEAF_OCCUPANCY_OFFSET + 2].try_into().unwrap())
            as usize
    }

    fn set_occupancy(&mut self, count: usize) {
        self.data[LEAF_OCCUPANCY_OFFSET..LEAF_OCCUPANCY_OFFSET + 2]
            .copy_from_slice(&(count as u16).to_le_bytes());
    }

    pub fn right_sibling(&self) -> PageId {
        PageId::from_le_bytes(
            self.data[LEAF_RIGHT_SIBLING_OFFSET..LEAF_RIGHT_SIBLING_OFFSET + 4]
                .try_into()
                .unwrap(),
        )
    }

    pub fn set_right_sibling(&mut self, page_id: PageId) {
        self.data[LEAF_RIGHT_SIBLING_OFFSET..LEAF_RIGHT_SIBLING_OFFSET + 4]
            .copy_from_slice(&page_id.to_le_bytes());
    }

    fn entry_size(&self) -> usize {
        self.key_type.size() + RID_SIZE
    }

    fn key_offset(&self, index: usize) -> usize {
        LEAF_HEADER_SIZE + index * self.entry_size()
    }

    pub fn key_at(&self, index: usize) -> IndexKey {
        let offset = self.key_offset(index);
        IndexKey::deserialize(&self.data[offset..offset + self.key_type.size()], self.key_type)
    }

    fn set_key_at(&mut self, index: usize, key: IndexKey) {
        let offset = self.key_offset(index);
        let size = self.key_type.size();
        key.serialize(&mut self.data[offset..offset + size]);
    }

    pub fn rid_at(&self, index: usize) -> RowId {
        let offset = self.key_offset(index) + self.key_type.size();
        let page_id = PageId::from_le_bytes(self.data[offset..offset + 4].try_into().unwrap());
        let slot_index = u16::from_le_bytes(self.data[offset + 4..offset + 6].try_into().unwrap());
        RowId { page_id, slot_index }
    }

    fn set_rid_at(&mut self, index: usize, rid: RowId) {
        let offset = self.key_offset(index) + self.key_type.size();
        self.data[offset..offset + 4].copy_from_slice(&rid.page_id.to_le_bytes());
        self.data[offset + 4..offset + 6].copy_from_slice(&rid.slot_index.to_le_bytes());
    }

    pub fn is_full(&self) -> bool {
        self.occupancy() >= leaf_capacity(self.key_type)
    }

    /// Inserts `(key, rid)` in sorted position. Duplicate keys are placed
    /// after any existing equal keys (scan from the high end, shift right
    /// while the slot holds a greater key).
    pub fn insert_sorted(&mut self, key: IndexKey, rid: RowId) {
        let occ = self.occupancy();
        debug_assert!(occ < leaf_capacity(self.key_type), "insert into a full leaf");

        let mut pos = occ;
        while pos > 0 && self.key_at(pos - 1).compare(&key) == std::cmp::Ordering::Greater {
            pos -= 1;
        }
        for i in (pos..occ).rev() {
            let k = self.key_at(i);
            let r = self.rid_at(i);
            self.set_key_at(i + 1, k);
            self.set_rid_at(i + 1, r);
        }
        self.set_key_at(pos, key);
        self.set_rid_at(pos, rid);
        self.set_occupancy(occ + 1);
    }

    /// All occupied `(key, rid)` pairs in ascending order.
    pub fn read_all(&self) -> Vec<(IndexKey, RowId)> {
        (0..self.occupancy()).map(|i| (self.key_at(i), self.rid_at(i))).collect()
    }

    /// Replaces the occupied entries wholesale and sentinel-fills the rest.
    /// Used by the splitter, which works from a scratch buffer sized one
    /// past capacity rather than shifting bytes in place.
    pub fn write_all(&mut self, entries: &[(IndexKey, RowId)]) {
        debug_assert!(entries.len() <= leaf_capacity(self.key_type));
        for (i, (k, r)) in entries.iter().enumerate() {
            self.set_key_at(i, *k);
            self.set_rid_at(i, *r);
        }
        for i in entries.len()..leaf_capacity(self.key_type) {
            self.set_key_at(i, IndexKey::sentinel(self.key_type));
        }
        self.set_occupancy(entries.len());
    }
}

pub struct NonLeafNode<'a> {
    data: &'a mut [u8],
    key_type: KeyType,
}

impl<'a> NonLeafNode<'a> {
    pub fn new(data: &'a mut [u8], key_type: KeyType) -> Self {
        Self { data, key_type }
    }

    pub fn initialize(&mut self, level: u16) {
        self.data[IS_LEAF_OFFSET] = 0;
        self.set_level(level);
        self.set_occupancy(0);
        let cap = nonleaf_capacity(self.key_type);
        for i in 0..cap {
            self.set_key_at(i, IndexKey::sentinel(self.key_type));
        }
        for i in 0..=cap {
            self.set_child_at(i, INVALID_PAGE_ID);
        }
    }

    pub fn level(&self) -> u16 {
        u16::from_le_bytes(self.data[NONLEAF_LEVEL_OFFSET..NONLEAF_LEVEL_OFFSET + 2].try_into().unwrap())
    }

    pub fn set_level(&mut self, level: u16) {
        self.data[NONLEAF_LEVEL_OFFSET..NONLEAF_LEVEL_OFFSET + 2].copy_from_slice(&level.to_le_bytes());
    }

    pub fn occupancy(&self) -> usize {
        u16::from_le_bytes(
            self.data[NONLEAF_OCCUPANCY_OFFSET..NONLEAF_OCCUPANCY_OFFSET + 2]
                .try_into()
                .unwrap(),
        ) as usize
    }

    fn set_occupancy(&mut self, count: usize) {
        self.data[NONLEAF_OCCUPANCY_OFFSET..NONLEAF_OCCUPANCY_OFFSET + 2]
            .copy_from_slice(&(count as u16).to_le_bytes());
    }

    fn key_offset(&self, index: usize) -> usize {
        NONLEAF_HEADER_SIZE + index * self.key_type.size()
    }

    fn children_base(&self) -> usize {
        NONLEAF_HEADER_SIZE + nonleaf_capacity(self.key_type) * self.key_type.size()
    }

    fn child_offset(&self, index: usize) -> usize {
        self.children_base() + index * CHILD_SIZE
    }

    pub fn key_at(&self, index: usize) -> IndexKey {
        let offset = self.key_offset(index);
        IndexKey::deserialize(&self.data[offset..offset + self.key_type.size()], self.key_type)
    }

    fn set_key_at(&mut self, index: usize, key: IndexKey) {
        let offset = self.key_offset(index);
        let size = self.key_type.size();
        key.serialize(&mut self.data[offset..offset + size]);
    }

    pub fn child_at(&self, index: usize) -> PageId {
        let offset = self.child_offset(index);
        PageId::from_le_bytes(self.data[offset..offset + 4].try_into().unwrap())
    }

    pub fn set_child_at(&mut self, index: usize, page_id: PageId) {
        let offset = self.child_offset(index);
        self.data[offset..offset + 4].copy_from_slice(&page_id.to_le_bytes());
    }

    pub fn is_full(&self) -> bool {
        self.occupancy() >= nonleaf_capacity(self.key_type)
    }

    /// Finds the child to descend into for `key` during insertion: the
    /// smallest index `i` with `key < key_array[i]` or an unset right
    /// sibling child, per the insert-descent rule. Duplicates fall to the
    /// right subtree.
    pub fn find_child_index(&self, key: IndexKey) -> usize {
        let occ = self.occupancy();
        for i in 0..occ {
            if key.compare(&self.key_at(i)) == std::cmp::Ordering::Less {
                return i;
            }
        }
        occ
    }

    /// Finds the child to descend into for a scan's lower bound: the
    /// smallest index `i` with `low <= key_array[i]`, ignoring sentinels,
    /// or the last occupied child if no such key exists.
    pub fn find_child_index_for_scan(&self, low: IndexKey) -> usize {
        let occ = self.occupancy();
        for i in 0..occ {
            if low.compare(&self.key_at(i)) != std::cmp::Ordering::Greater {
                return i;
            }
        }
        occ
    }

    /// Inserts `key` at `index`, with `right_child` becoming child
    /// `index + 1`. Shifts keys `[index..occupancy)` and children
    /// `[index+1..occupancy+1)` right by one slot first.
    pub fn insert_separator(&mut self, index: usize, key: IndexKey, right_child: PageId) {
        let occ = self.occupancy();
        debug_assert!(occ < nonleaf_capacity(self.key_type), "insert into a full non-leaf");

        for i in (index..occ).rev() {
            let k = self.key_at(i);
            self.set_key_at(i + 1, k);
        }
        for i in (index + 1..=occ).rev() {
            let c = self.child_at(i);
            self.set_child_at(i + 1, c);
        }
        self.set_key_at(index, key);
        self.set_child_at(index + 1, right_child);
        self.set_occupancy(occ + 1);
    }

    /// All occupied keys and the `occupancy + 1` children around them.
    pub fn read_all(&self) -> (Vec<IndexKey>, Vec<PageId>) {
        let occ = self.occupancy();
        let keys = (0..occ).map(|i| self.key_at(i)).collect();
        let children = (0..=occ).map(|i| self.child_at(i)).collect();
        (keys, children)
    }

    /// Replaces keys and children wholesale (`children.len() == keys.len() + 1`)
    /// and sentinel/invalid-fills the rest. See [`LeafNode::write_all`].
    pub fn write_all(&mut self, keys: &[IndexKey], children: &[PageId]) {
        debug_assert_eq!(children.len(), keys.len() + 1);
        debug_assert!(keys.len() <= nonleaf_capacity(self.key_type));
        let cap = nonleaf_capacity(self.key_type);
        for (i, k) in keys.iter().enumerate() {
            self.set_key_at(i, *k);
        }
        for i in keys.len()..cap {
            self.set_key_at(i, IndexKey::sentinel(self.key_type));
        }
        for (i, c) in children.iter().enumerate() {
            self.set_child_at(i, *c);
        }
        for i in children.len()..=cap {
            self.set_child_at(i, INVALID_PAGE_ID);
        }
        self.set_occupancy(keys.len());
    }
}

/// Read-only leaf view for descent steps that must not mark a clean frame
/// dirty (e.g. scanning for the child to recurse into).
pub struct LeafNodeRef<'a> {
    data: &'a [u8],
    key_type: KeyType,
}

impl<'a> LeafNodeRef<'a> {
    pub fn new(data: &'a [u8], key_type: KeyType) -> Self {
        Self { data, key_type }
    }

    pub fn occupancy(&self) -> usize {
        u16::from_le_bytes(self.data[LEAF_OCCUPANCY_OFFSET..LEAF_OCCUPANCY_OFFSET + 2].try_into().unwrap())
            as usize
    }

    pub fn right_sibling(&self) -> PageId {
        PageId::from_le_bytes(
            self.data[LEAF_RIGHT_SIBLING_OFFSET..LEAF_RIGHT_SIBLING_OFFSET + 4]
                .try_into()
                .unwrap(),
        )
    }

    pub fn key_at(&self, index: usize) -> IndexKey {
        let offset = LEAF_HEADER_SIZE + index * (self.key_type.size() + RID_SIZE);
        IndexKey::deserialize(&self.data[offset..offset + self.key_type.size()], self.key_type)
    }

    pub fn rid_at(&self, index: usize) -> RowId {
        let offset = LEAF_HEADER_SIZE + index * (self.key_type.size() + RID_SIZE) + self.key_type.size();
        let page_id = PageId::from_le_bytes(self.data[offset..offset + 4].try_into().unwrap());
        let slot_index = u16::from_le_bytes(self.data[offset + 4..offset + 6].try_into().unwrap());
        RowId { page_id, slot_index }
    }
}

/// Read-only non-leaf view, for the same reason as [`LeafNodeRef`].
pub struct NonLeafNodeRef<'a> {
    data: &'a [u8],
    key_type: KeyType,
}

impl<'a> NonLeafNodeRef<'a> {
    pub fn new(data: &'a [u8], key_type: KeyType) -> Self {
        Self { data, key_type }
    }

    pub fn level(&self) -> u16 {
        u16::from_le_bytes(self.data[NONLEAF_LEVEL_OFFSET..NONLEAF_LEVEL_OFFSET + 2].try_into().unwrap())
    }

    pub fn occupancy(&self) -> usize {
        u16::from_le_bytes(
            self.data[NONLEAF_OCCUPANCY_OFFSET..NONLEAF_OCCUPANCY_OFFSET + 2]
                .try_into()
                .unwrap(),
        ) as usize
    }

    fn children_base(&self) -> usize {
        NONLEAF_HEADER_SIZE + nonleaf_capacity(self.key_type) * self.key_type.size()
    }

    pub fn key_at(&self, index: usize) -> IndexKey {
        let offset = NONLEAF_HEADER_SIZE + index * self.key_type.size();
        IndexKey::deserialize(&self.data[offset..offset + self.key_type.size()], self.key_type)
    }

    pub fn child_at(&self, index: usize) -> PageId {
        let offset = self.children_base() + index * CHILD_SIZE;
        PageId::from_le_bytes(self.data[offset..offset + 4].try_into().unwrap())
    }

    /// Smallest index `i` with `key < key_array[i]`, or `occupancy` if none
    /// (duplicates descend right).
    pub fn find_child_index(&self, key: IndexKey) -> usize {
        let occ = self.occupancy();
        for i in 0..occ {
            if key.compare(&self.key_at(i)) == std::cmp::Ordering::Less {
                return i;
            }
        }
        occ
    }

    /// Smallest index `i` with `low <= key_array[i]`, or the last occupied
    /// child if no such key exists. Used to descend to a scan's start leaf.
    pub fn find_child_index_for_scan(&self, low: IndexKey) -> usize {
        let occ = self.occupancy();
        for i in 0..occ {
            if low.compare(&self.key_at(i)) != std::cmp::Ordering::Greater {
                return i;
            }
        }
        occ
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Vec<u8> {
        vec![0u8; PAGE_SIZE]
    }

    #[test]
    fn leaf_insert_keeps_ascending_order_with_duplicates() {
        let mut buf = page();
        let mut leaf = LeafNode::new(&mut buf, KeyType::Integer);
        leaf.initialize(INVALID_PAGE_ID);

        leaf.insert_sorted(IndexKey::Integer(10), RowId { page_id: 1, slot_index: 0 });
        leaf.insert_sorted(IndexKey::Integer(5), RowId { page_id: 1, slot_index: 1 });
        leaf.insert_sorted(IndexKey::Integer(10), RowId { page_id: 1, slot_index: 2 });

        assert_eq!(leaf.occupancy(), 3);
        assert_eq!(leaf.key_at(0), IndexKey::Integer(5));
        assert_eq!(leaf.key_at(1), IndexKey::Integer(10));
        assert_eq!(leaf.key_at(2), IndexKey::Integer(10));
        // duplicate-of-10 inserted later lands after the first 10
        assert_eq!(leaf.rid_at(1).slot_index, 0);
        assert_eq!(leaf.rid_at(2).slot_index, 2);
    }

    #[test]
    fn leaf_full_detection() {
        let mut buf = page();
        let mut leaf = LeafNode::new(&mut buf, KeyType::Integer);
        leaf.initialize(INVALID_PAGE_ID);
        let cap = leaf_capacity(KeyType::Integer);
        for i in 0..cap {
            leaf.insert_sorted(IndexKey::Integer(i as i32), RowId { page_id: 1, slot_index: i as u16 });
        }
        assert!(leaf.is_full());
    }

    #[test]
    fn leaf_read_all_then_write_all_splits_and_sentinels_vacated_slots() {
        let mut left_buf = page();
        let mut right_buf = page();
        let mut left = LeafNode::new(&mut left_buf, KeyType::Integer);
        left.initialize(INVALID_PAGE_ID);
        for i in 0..10 {
            left.insert_sorted(IndexKey::Integer(i), RowId { page_id: 1, slot_index: i as u16 });
        }
        let mut right = LeafNode::new(&mut right_buf, KeyType::Integer);
        right.initialize(INVALID_PAGE_ID);

        let all = left.read_all();
        left.write_all(&all[..5]);
        right.write_all(&all[5..]);

        assert_eq!(left.occupancy(), 5);
        assert_eq!(right.occupancy(), 5);
        assert_eq!(right.key_at(0), IndexKey::Integer(5));
        assert!(left.key_at(5).is_sentinel());
    }

    #[test]
    fn nonleaf_insert_separator_shifts_keys_and_children() {
        let mut buf = page();
        let mut node = NonLeafNode::new(&mut buf, KeyType::Integer);
        node.initialize(1);
        node.set_child_at(0, 100);
        node.insert_separator(0, IndexKey::Integer(50), 200);
        node.insert_separator(1, IndexKey::Integer(80), 300);

        assert_eq!(node.occupancy(), 2);
        assert_eq!(node.key_at(0), IndexKey::Integer(50));
        assert_eq!(node.key_at(1), IndexKey::Integer(80));
        assert_eq!(node.child_at(0), 100);
        assert_eq!(node.child_at(1), 200);
        assert_eq!(node.child_at(2), 300);
    }

    #[test]
    fn nonleaf_read_all_then_write_all_lifts_middle_key_from_both_halves() {
        let mut left_buf = page();
        let mut right_buf = page();
        let mut left = NonLeafNode::new(&mut left_buf, KeyType::Integer);
        left.initialize(1);
        left.set_child_at(0, 0);
        for i in 0..6 {
            left.insert_separator(i, IndexKey::Integer(i as i32 * 10), (i as u32 + 1) * 10);
        }
        let mut right = NonLeafNode::new(&mut right_buf, KeyType::Integer);
        right.initialize(1);

        let (keys, children) = left.read_all();
        let mid = 3;
        let separator = keys[mid];
        left.write_all(&keys[..mid], &children[..=mid]);
        right.write_all(&keys[mid + 1..], &children[mid + 1..]);

        assert_eq!(separator, IndexKey::Integer(30));
        assert_eq!(left.occupancy(), 3);
        assert_eq!(right.occupancy(), 2);
        // neither half still carries the lifted key
        for i in 0..left.occupancy() {
            assert_ne!(left.key_at(i), separator);
        }
        for i in 0..right.occupancy() {
            assert_ne!(right.key_at(i), separator);
        }
    }

    #[test]
    fn find_child_index_sends_duplicates_right() {
        let mut buf = page();
        let mut node = NonLeafNode::new(&mut buf, KeyType::Integer);
        node.initialize(1);
        node.set_child_at(0, 1);
        node.insert_separator(0, IndexKey::Integer(42), 2);

        // key strictly less than separator goes left
        assert_eq!(node.find_child_index(IndexKey::Integer(10)), 0);
        // key equal to separator goes right (duplicates right)
        assert_eq!(node.find_child_index(IndexKey::Integer(42)), 1);
        assert_eq!(node.find_child_index(IndexKey::Integer(100)), 1);
    }
}
