//! Zero-copy view over the index's meta page.
//!
//! Layout (32 bytes, little-endian), fixed per the index's on-disk contract
//! so a reopen can validate compatibility before trusting anything else on
//! the page:
//!
//! | offset | field              | size |
//! |--------|--------------------|------|
//! | 0      | relation_name      | 20   |
//! | 20     | attr_byte_offset   | 4    |
//! | 24     | attr_type          | 4    |
//! | 28     | root_page_no       | 4    |

use paged_file::{PageId, INVALID_PAGE_ID};

use crate::key::KeyType;

const RELATION_NAME_LEN: usize = 20;
const RELATION_NAME_OFFSET: usize = 0;
const ATTR_BYTE_OFFSET_OFFSET: usize = RELATION_NAME_OFFSET + RELATION_NAME_LEN;
const ATTR_TYPE_OFFSET: usize = ATTR_BYTE_OFFSET_OFFSET + 4;
const ROOT_PAGE_NO_OFFSET: usize = ATTR_TYPE_OFFSET + 4;
pub const META_HEADER_SIZE: usize = ROOT_PAGE_NO_OFFSET + 4;

fn read_relation_name(data: &[u8]) -> String {
    let raw = &data[RELATION_NAME_OFFSET..RELATION_NAME_OFFSET + RELATION_NAME_LEN];
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

fn read_attr_byte_offset(data: &[u8]) -> i32 {
    i32::from_le_bytes(data[ATTR_BYTE_OFFSET_OFFSET..ATTR_BYTE_OFFSET_OFFSET + 4].try_into().unwrap())
}

fn read_attr_type_discriminant(data: &[u8]) -> i32 {
    i32::from_le_bytes(data[ATTR_TYPE_OFFSET..ATTR_TYPE_OFFSET + 4].try_into().unwrap())
}

fn read_root_page_no(data: &[u8]) -> PageId {
    PageId::from_le_bytes(data[ROOT_PAGE_NO_OFFSET..ROOT_PAGE_NO_OFFSET + 4].try_into().unwrap())
}

/// Read-only view, for validating an existing meta page without marking its
/// frame dirty.
pub struct MetaPageView<'a> {
    data: &'a [u8],
}

impl<'a> MetaPageView<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn relation_name(&self) -> String {
        read_relation_name(self.data)
    }

    pub fn attr_byte_offset(&self) -> i32 {
        read_attr_byte_offset(self.data)
    }

    pub fn attr_type_discriminant(&self) -> i32 {
        read_attr_type_discriminant(self.data)
    }

    pub fn root_page_no(&self) -> PageId {
        read_root_page_no(self.data)
    }
}

pub struct MetaPage<'a> {
    data: &'a mut [u8],
}

impl<'a> MetaPage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self { data }
    }

    pub fn initialize(&mut self, relation_name: &str, attr_byte_offset: i32, key_type: KeyType) {
        self.set_relation_name(relation_name);
        self.set_attr_byte_offset(attr_byte_offset);
        self.set_attr_type_discriminant(key_type.discriminant());
        self.set_root_page_no(INVALID_PAGE_ID);
    }

    pub fn relation_name(&self) -> String {
        read_relation_name(self.data)
    }

    pub fn set_relation_name(&mut self, name: &str) {
        let bytes = name.as_bytes();
        assert!(bytes.len() <= RELATION_NAME_LEN, "relation name too long");
        let field = &mut self.data[RELATION_NAME_OFFSET..RELATION_NAME_OFFSET + RELATION_NAME_LEN];
        field.fill(0);
        field[..bytes.len()].copy_from_slice(bytes);
    }

    pub fn attr_byte_offset(&self) -> i32 {
        read_attr_byte_offset(self.data)
    }

    pub fn set_attr_byte_offset(&mut self, offset: i32) {
        self.data[ATTR_BYTE_OFFSET_OFFSET..ATTR_BYTE_OFFSET_OFFSET + 4]
            .copy_from_slice(&offset.to_le_bytes());
    }

    pub fn attr_type_discriminant(&self) -> i32 {
        read_attr_type_discriminant(self.data)
    }

    pub fn set_attr_type_discriminant(&mut self, discriminant: i32) {
        self.data[ATTR_TYPE_OFFSET..ATTR_TYPE_OFFSET + 4].copy_from_slice(&discriminant.to_le_bytes());
    }

    pub fn root_page_no(&self) -> PageId {
        read_root_page_no(self.data)
    }

    pub fn set_root_page_no(&mut self, page_id: PageId) {
        self.data[ROOT_PAGE_NO_OFFSET..ROOT_PAGE_NO_OFFSET + 4].copy_from_slice(&page_id.to_le_bytes());
    }
}
