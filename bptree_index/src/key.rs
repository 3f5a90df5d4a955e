//! Key abstraction for the B+-tree: comparison, serialization and the
//! capability set (compare / sentinel / capacity) the node layer needs to
//! stay generic over key type without template-style genericity.

use std::cmp::Ordering;

/// The wire discriminant stored in the meta page's `attr_type` field.
/// `String` is reserved but has no implemented code path (see spec's
/// design notes) — constructing an index with it is a programming error,
/// not a runtime one, and panics rather than returning `IndexError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Integer,
    Double,
}

impl KeyType {
    pub fn discriminant(self) -> i32 {
        match self {
            KeyType::Integer => 0,
            KeyType::Double => 1,
        }
    }

    pub fn from_discriminant(d: i32) -> Option<Self> {
        match d {
            0 => Some(KeyType::Integer),
            1 => Some(KeyType::Double),
            _ => None,
        }
    }

    /// Fixed on-disk size of a serialized key of this type.
    pub fn size(self) -> usize {
        match self {
            KeyType::Integer => 4,
            KeyType::Double => 8,
        }
    }
}

/// A key value stored in the index. Duplicates are permitted; sentinel
/// values (`-1` / `-1.0`) may not be indexed — they mark unused slots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndexKey {
    Integer(i32),
    Double(f64),
}

impl IndexKey {
    pub fn key_type(self) -> KeyType {
        match self {
            IndexKey::Integer(_) => KeyType::Integer,
            IndexKey::Double(_) => KeyType::Double,
        }
    }

    /// True if this value is the layout's sentinel ("empty slot") value.
    pub fn is_sentinel(self) -> bool {
        match self {
            IndexKey::Integer(v) => v == -1,
            IndexKey::Double(v) => v == -1.0,
        }
    }

    pub fn sentinel(key_type: KeyType) -> Self {
        match key_type {
            KeyType::Integer => IndexKey::Integer(-1),
            KeyType::Double => IndexKey::Double(-1.0),
        }
    }

    /// # Panics
    /// Panics if comparing keys of different types — a programming defect,
    /// never a valid runtime state within one index.
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (IndexKey::Integer(a), IndexKey::Integer(b)) => a.cmp(b),
            (IndexKey::Double(a), IndexKey::Double(b)) => {
                a.partial_cmp(b).expect("NaN is not a valid index key")
            }
            _ => panic!("cannot compare keys of different types"),
        }
    }

    pub fn serialize(self, out: &mut [u8]) {
        match self {
            IndexKey::Integer(v) => out[0..4].copy_from_slice(&v.to_le_bytes()),
            IndexKey::Double(v) => out[0..8].copy_from_slice(&v.to_le_bytes()),
        }
    }

    pub fn deserialize(bytes: &[u8], key_type: KeyType) -> Self {
        match key_type {
            KeyType::Integer => IndexKey::Integer(i32::from_le_bytes(bytes[0..4].try_into().unwrap())),
            KeyType::Double => IndexKey::Double(f64::from_le_bytes(bytes[0..8].try_into().unwrap())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(IndexKey::Integer(1), IndexKey::Integer(2), Ordering::Less)]
    #[test_case(IndexKey::Integer(2), IndexKey::Integer(1), Ordering::Greater)]
    #[test_case(IndexKey::Integer(5), IndexKey::Integer(5), Ordering::Equal)]
    #[test_case(IndexKey::Double(1.5), IndexKey::Double(2.5), Ordering::Less)]
    fn compares_same_type_keys(a: IndexKey, b: IndexKey, expected: Ordering) {
        assert_eq!(a.compare(&b), expected);
    }

    #[test]
    #[should_panic(expected = "different types")]
    fn compare_panics_on_mixed_types() {
        IndexKey::Integer(1).compare(&IndexKey::Double(1.0));
    }

    #[test]
    fn sentinel_roundtrips_for_both_types() {
        assert!(IndexKey::sentinel(KeyType::Integer).is_sentinel());
        assert!(IndexKey::sentinel(KeyType::Double).is_sentinel());
        assert!(!IndexKey::Integer(0).is_sentinel());
    }

    #[test]
    fn integer_serialize_deserialize_roundtrip() {
        let key = IndexKey::Integer(-42);
        let mut buf = [0u8; 4];
        key.serialize(&mut buf);
        assert_eq!(IndexKey::deserialize(&buf, KeyType::Integer), key);
    }

    #[test]
    fn double_serialize_deserialize_roundtrip() {
        let key = IndexKey::Double(3.25);
        let mut buf = [0u8; 8];
        key.serialize(&mut buf);
        assert_eq!(IndexKey::deserialize(&buf, KeyType::Double), key);
    }
}
