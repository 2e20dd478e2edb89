//! Hash bucket layout
//!
//! ```text
//! ┌────────────────┬───────────┬─────────────────────────────────────┐
//! │ Local Depth (1)│ Count (2) │ (Id (4) │ Position (8)) × capacity  │
//! └────────────────┴───────────┴─────────────────────────────────────┘
//! ```
//!
//! Entries are kept sorted by id; slots past `count` are zero padding.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Result, StoreError};
use crate::index::Entry;

const ENTRY_SIZE: usize = 4 + 8;

#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub local_depth: u8,
    pub entries: Vec<Entry>,
}

impl Bucket {
    pub fn new(local_depth: u8) -> Self {
        Self {
            local_depth,
            entries: Vec::new(),
        }
    }

    pub fn disk_size(capacity: usize) -> usize {
        1 + 2 + capacity * ENTRY_SIZE
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Position of `id` among the sorted entries
    pub fn find(&self, id: i32) -> std::result::Result<usize, usize> {
        self.entries.binary_search_by_key(&id, |e| e.id)
    }

    /// Insert keeping entries sorted; the caller has ruled out duplicates
    pub fn insert(&mut self, entry: Entry) {
        let idx = self.find(entry.id).unwrap_or_else(|idx| idx);
        self.entries.insert(idx, entry);
    }

    pub fn to_bytes(&self, capacity: usize) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(Self::disk_size(capacity));
        buf.put_u8(self.local_depth);
        buf.put_i16(self.entries.len() as i16);
        for entry in &self.entries {
            buf.put_i32(entry.id);
            buf.put_i64(entry.position);
        }
        buf.put_bytes(0, (capacity - self.entries.len()) * ENTRY_SIZE);
        buf.to_vec()
    }

    pub fn from_bytes(offset: u64, bytes: &[u8], capacity: usize) -> Result<Self> {
        if bytes.len() < Self::disk_size(capacity) {
            return Err(StoreError::Corrupted(format!(
                "bucket at {} is {} bytes, expected {}",
                offset,
                bytes.len(),
                Self::disk_size(capacity)
            )));
        }

        let mut buf = bytes;
        let local_depth = buf.get_u8();
        let count = buf.get_i16();
        if count < 0 || count as usize > capacity {
            return Err(StoreError::Corrupted(format!(
                "bucket at {} has count {} (capacity {})",
                offset, count, capacity
            )));
        }

        let entries = (0..count)
            .map(|_| Entry {
                id: buf.get_i32(),
                position: buf.get_i64(),
            })
            .collect();

        Ok(Self {
            local_depth,
            entries,
        })
    }
}
