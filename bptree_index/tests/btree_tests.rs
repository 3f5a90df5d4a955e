//! End-to-end coverage over a real paged file and buffer pool: build,
//! range scan, cascading splits, duplicates, reopen round-trip, and the
//! documented error shapes.

use std::collections::HashSet;
use std::rc::Rc;

use bptree_index::{
    BPlusTree, BufferPool, CompareOp, IndexError, IndexKey, KeyType, PagedFile, RelationScanner, RowId,
};

struct NoRecords;

impl RelationScanner for NoRecords {
    fn scan_next(&mut self) -> Result<(RowId, Vec<u8>), IndexError> {
        Err(IndexError::EndOfFile)
    }
}

fn new_tree(dir: &tempfile::TempDir, name: &str) -> BPlusTree<BufferPool> {
    let path = dir.path().join(name);
    let pf = Rc::new(PagedFile::open_or_create(&path).unwrap());
    let bpm = BufferPool::new(32, pf);
    BPlusTree::create(bpm, 0, KeyType::Integer, "orders", &mut NoRecords).unwrap()
}

fn rid(k: i32) -> RowId {
    RowId {
        page_id: (k / 100) as u32,
        slot_index: (k % 100) as u16,
    }
}

fn drain_scan(tree: &mut BPlusTree<BufferPool>) -> Vec<RowId> {
    let mut out = Vec::new();
    loop {
        match tree.scan_next() {
            Ok(r) => out.push(r),
            Err(IndexError::IndexScanCompleted) => break,
            Err(e) => panic!("unexpected scan error: {e}"),
        }
    }
    tree.end_scan().unwrap();
    out
}

#[test]
fn integer_build_and_inclusive_range_scan() {
    let dir = tempfile::tempdir().unwrap();
    let mut tree = new_tree(&dir, "a.db");

    for k in 1..=5000 {
        tree.insert_entry(IndexKey::Integer(k), rid(k)).unwrap();
    }

    tree.start_scan(IndexKey::Integer(100), CompareOp::Gte, IndexKey::Integer(200), CompareOp::Lte)
        .unwrap();
    let results = drain_scan(&mut tree);

    assert_eq!(results.len(), 101);
    assert_eq!(results[0], rid(100));
    assert_eq!(results[results.len() - 1], rid(200));
}

#[test]
fn operator_corners_exclude_both_ends() {
    let dir = tempfile::tempdir().unwrap();
    let mut tree = new_tree(&dir, "a.db");
    for k in 1..=5000 {
        tree.insert_entry(IndexKey::Integer(k), rid(k)).unwrap();
    }

    tree.start_scan(IndexKey::Integer(100), CompareOp::Gt, IndexKey::Integer(200), CompareOp::Lt)
        .unwrap();
    let results = drain_scan(&mut tree);

    assert_eq!(results.len(), 99);
    assert_eq!(results[0], rid(101));
    assert_eq!(results[results.len() - 1], rid(199));
}

#[test]
fn cascading_splits_grow_tree_past_height_two() {
    let dir = tempfile::tempdir().unwrap();
    let mut tree = new_tree(&dir, "a.db");

    // Ascending inserts split every leaf 50/50, so a leaf split happens
    // roughly every `leaf_cap / 2` inserts past the first full leaf. The
    // root (a non-leaf) only overflows into a second non-leaf level once
    // it has accumulated more than `nonleaf_cap` separators, i.e. more
    // than `nonleaf_cap` leaf splits — pad with a healthy margin of extra
    // splits so the count isn't balanced on a knife edge.
    let leaf_cap = bptree_index::node::leaf_capacity(KeyType::Integer) as i32;
    let nonleaf_cap = bptree_index::node::nonleaf_capacity(KeyType::Integer) as i32;
    let n = leaf_cap + (nonleaf_cap + 10) * (leaf_cap / 2);

    for k in 0..n {
        tree.insert_entry(IndexKey::Integer(k), rid(k)).unwrap();
    }

    let level = tree.root_level().unwrap().expect("tree is not empty");
    assert!(level >= 2, "expected root level >= 2, got {level}");

    tree.start_scan(
        IndexKey::Integer(i32::MIN),
        CompareOp::Gte,
        IndexKey::Integer(i32::MAX),
        CompareOp::Lte,
    )
    .unwrap();
    let results = drain_scan(&mut tree);
    assert_eq!(results.len(), n as usize);
    let mut prev = None;
    for r in &results {
        let page_slot = (r.page_id, r.slot_index);
        if let Some(p) = prev {
            assert!(p <= page_slot);
        }
        prev = Some(page_slot);
    }
}

#[test]
fn descending_insert_still_scans_ascending() {
    let dir = tempfile::tempdir().unwrap();
    let mut tree = new_tree(&dir, "a.db");
    let n = 2000;
    for k in (0..n).rev() {
        tree.insert_entry(IndexKey::Integer(k), rid(k)).unwrap();
    }

    tree.start_scan(IndexKey::Integer(0), CompareOp::Gte, IndexKey::Integer(n - 1), CompareOp::Lte)
        .unwrap();
    let results = drain_scan(&mut tree);

    let expected: Vec<RowId> = (0..n).map(rid).collect();
    assert_eq!(results, expected);
}

#[test]
fn duplicate_keys_all_reachable_by_scan() {
    let dir = tempfile::tempdir().unwrap();
    let mut tree = new_tree(&dir, "a.db");

    let a = RowId { page_id: 1, slot_index: 0 };
    let b = RowId { page_id: 1, slot_index: 1 };
    let c = RowId { page_id: 1, slot_index: 2 };
    tree.insert_entry(IndexKey::Integer(42), a).unwrap();
    tree.insert_entry(IndexKey::Integer(42), b).unwrap();
    tree.insert_entry(IndexKey::Integer(42), c).unwrap();

    tree.start_scan(IndexKey::Integer(42), CompareOp::Gte, IndexKey::Integer(42), CompareOp::Lte)
        .unwrap();
    let results: HashSet<RowId> = drain_scan(&mut tree).into_iter().collect();

    assert_eq!(results, HashSet::from([a, b, c]));
}

#[test]
fn error_shapes_match_contract() {
    let dir = tempfile::tempdir().unwrap();
    let mut tree = new_tree(&dir, "a.db");

    let err = tree
        .start_scan(IndexKey::Integer(10), CompareOp::Gte, IndexKey::Integer(5), CompareOp::Lte)
        .unwrap_err();
    assert!(matches!(err, IndexError::BadScanRange));

    let err = tree
        .start_scan(IndexKey::Integer(10), CompareOp::Lt, IndexKey::Integer(20), CompareOp::Lte)
        .unwrap_err();
    assert!(matches!(err, IndexError::BadOpcodes));

    let err = tree.scan_next().unwrap_err();
    assert!(matches!(err, IndexError::ScanNotInitialized));

    let err = tree.end_scan().unwrap_err();
    assert!(matches!(err, IndexError::ScanNotInitialized));
}

#[test]
fn empty_index_completes_scan_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let mut tree = new_tree(&dir, "a.db");

    tree.start_scan(IndexKey::Integer(0), CompareOp::Gte, IndexKey::Integer(100), CompareOp::Lte)
        .unwrap();
    let err = tree.scan_next().unwrap_err();
    assert!(matches!(err, IndexError::IndexScanCompleted));
    // still Active per the scan contract: end_scan must succeed, not ScanNotInitialized
    tree.end_scan().unwrap();
}

#[test]
fn inserts_filling_a_leaf_exactly_do_not_split() {
    let dir = tempfile::tempdir().unwrap();
    let mut tree = new_tree(&dir, "a.db");

    let cap = bptree_index::node::leaf_capacity(KeyType::Integer);
    for k in 0..cap as i32 {
        tree.insert_entry(IndexKey::Integer(k), rid(k)).unwrap();
    }

    assert_eq!(tree.root_level().unwrap(), Some(0), "leaf root should not have split yet");
}

#[test]
fn reopen_after_close_preserves_all_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reopen.db");

    {
        let pf = Rc::new(PagedFile::open_or_create(&path).unwrap());
        let bpm = BufferPool::new(16, pf);
        let mut tree = BPlusTree::create(bpm, 4, KeyType::Double, "accounts", &mut NoRecords).unwrap();
        for k in 0..1500 {
            tree.insert_entry(IndexKey::Double(k as f64), rid(k)).unwrap();
        }
    } // tree dropped: flushes

    let pf = Rc::new(PagedFile::open_or_create(&path).unwrap());
    let bpm = BufferPool::new(16, pf);
    let mut tree = BPlusTree::open(bpm, 4, KeyType::Double, "accounts").unwrap();

    tree.start_scan(
        IndexKey::Double(f64::MIN),
        CompareOp::Gte,
        IndexKey::Double(f64::MAX),
        CompareOp::Lte,
    )
    .unwrap();
    let results: HashSet<RowId> = drain_scan(&mut tree).into_iter().collect();
    let expected: HashSet<RowId> = (0..1500).map(rid).collect();
    assert_eq!(results, expected);
}

#[test]
fn reopen_with_mismatched_attribute_signals_bad_index_info() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mismatch.db");
    {
        let pf = Rc::new(PagedFile::open_or_create(&path).unwrap());
        let bpm = BufferPool::new(8, pf);
        let _tree = BPlusTree::create(bpm, 4, KeyType::Integer, "orders", &mut NoRecords).unwrap();
    }

    let pf = Rc::new(PagedFile::open_or_create(&path).unwrap());
    let bpm = BufferPool::new(8, pf);
    let err = BPlusTree::open(bpm, 8, KeyType::Integer, "orders").unwrap_err();
    assert!(matches!(err, IndexError::BadIndexInfo));
}
