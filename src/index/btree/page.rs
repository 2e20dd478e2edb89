//! B-tree page layout
//!
//! ```text
//! ┌───────────┬──────────────────────────────────────────┬──────────────────┐
//! │ Count (4) │ (Child (8) │ Id (4) │ Position (8)) × 2m  │ Last Child (8)   │
//! └───────────┴──────────────────────────────────────────┴──────────────────┘
//! ```
//!
//! Slots beyond `count` are padded with null children and zeroed entries so
//! every page of a tree has the same size.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Result, StoreError};
use crate::index::{Entry, NULL_OFFSET};

/// Size of one `(child, id, position)` slot
const SLOT_SIZE: usize = 8 + 4 + 8;

/// In-memory copy of one page
///
/// `children` always holds `entries.len() + 1` pointers. A leaf has only
/// null children.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// File offset, or `None` until the page is first written
    pub offset: Option<u64>,
    pub entries: Vec<Entry>,
    pub children: Vec<i64>,
}

impl Page {
    /// Empty leaf with no offset yet
    pub fn new() -> Self {
        Self {
            offset: None,
            entries: Vec::new(),
            children: vec![NULL_OFFSET],
        }
    }

    /// On-disk size of a page holding up to `2m` entries
    pub fn disk_size(half_order: usize) -> usize {
        4 + 2 * half_order * SLOT_SIZE + 8
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_leaf(&self) -> bool {
        self.children[0] == NULL_OFFSET
    }

    /// Index of the first entry with `entry.id >= id` (linear scan)
    pub fn find(&self, id: i32) -> usize {
        self.entries
            .iter()
            .position(|e| e.id >= id)
            .unwrap_or(self.entries.len())
    }

    /// Serialize, padding to the full `2m` slots
    pub fn to_bytes(&self, half_order: usize) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(Self::disk_size(half_order));
        buf.put_i32(self.entries.len() as i32);
        for slot in 0..2 * half_order {
            match self.entries.get(slot) {
                Some(entry) => {
                    buf.put_i64(self.children[slot]);
                    buf.put_i32(entry.id);
                    buf.put_i64(entry.position);
                }
                None => {
                    buf.put_i64(NULL_OFFSET);
                    buf.put_i32(0);
                    buf.put_i64(NULL_OFFSET);
                }
            }
        }
        buf.put_i64(self.children[self.entries.len()]);
        buf.to_vec()
    }

    /// Parse a page read from `offset`
    pub fn from_bytes(offset: u64, bytes: &[u8], half_order: usize) -> Result<Self> {
        if bytes.len() < Self::disk_size(half_order) {
            return Err(StoreError::Corrupted(format!(
                "B-tree page at {} is {} bytes, expected {}",
                offset,
                bytes.len(),
                Self::disk_size(half_order)
            )));
        }

        let mut buf = bytes;
        let count = buf.get_i32();
        if count < 0 || count as usize > 2 * half_order {
            return Err(StoreError::Corrupted(format!(
                "B-tree page at {} has entry count {} (max {})",
                offset,
                count,
                2 * half_order
            )));
        }
        let count = count as usize;

        let mut entries = Vec::with_capacity(count);
        let mut children = Vec::with_capacity(count + 1);
        for _ in 0..count {
            children.push(buf.get_i64());
            let id = buf.get_i32();
            let position = buf.get_i64();
            entries.push(Entry { id, position });
        }

        // Skip the unused slots; the last child follows the full slot array
        buf.advance((2 * half_order - count) * SLOT_SIZE);
        children.push(buf.get_i64());

        Ok(Self {
            offset: Some(offset),
            entries,
            children,
        })
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}
