//! Hash directory
//!
//! `2^global_depth` bucket addresses, memory-resident for the session and
//! written back wholesale whenever it changes.
//!
//! ```text
//! ┌──────────────────┬──────────────────────────────────────┐
//! │ Global Depth (1) │ Bucket Address (8) × 2^global_depth  │
//! └──────────────────┴──────────────────────────────────────┘
//! ```

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Result, StoreError};

/// Deepest directory allowed (2^24 slots, a 128 MiB directory file)
pub const MAX_GLOBAL_DEPTH: u8 = 24;

#[derive(Debug, Clone, PartialEq)]
pub struct Directory {
    global_depth: u8,
    addresses: Vec<u64>,
}

impl Directory {
    /// Depth-0 directory whose only slot points at `first_bucket`
    pub fn new(first_bucket: u64) -> Self {
        Self {
            global_depth: 0,
            addresses: vec![first_bucket],
        }
    }

    pub fn global_depth(&self) -> u8 {
        self.global_depth
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn addresses(&self) -> &[u64] {
        &self.addresses
    }

    /// Slot of `id` at the current global depth
    pub fn slot(&self, id: i32) -> usize {
        hash(id, self.global_depth)
    }

    pub fn address(&self, slot: usize) -> u64 {
        self.addresses[slot]
    }

    pub fn set(&mut self, slot: usize, address: u64) {
        self.addresses[slot] = address;
    }

    /// Duplicate every slot into a new upper half and add one hash bit
    pub fn double(&mut self) -> Result<()> {
        if self.global_depth >= MAX_GLOBAL_DEPTH {
            return Err(StoreError::InvalidConfiguration(format!(
                "hash directory cannot grow past depth {}",
                MAX_GLOBAL_DEPTH
            )));
        }
        self.addresses.extend_from_within(..);
        self.global_depth += 1;
        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(1 + 8 * self.addresses.len());
        buf.put_u8(self.global_depth);
        for &address in &self.addresses {
            buf.put_i64(address as i64);
        }
        buf.to_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut buf = bytes;
        if buf.remaining() < 1 {
            return Err(StoreError::Corrupted("empty hash directory".to_string()));
        }
        let global_depth = buf.get_u8();
        if global_depth > MAX_GLOBAL_DEPTH {
            return Err(StoreError::Corrupted(format!(
                "hash directory depth {} exceeds {}",
                global_depth, MAX_GLOBAL_DEPTH
            )));
        }

        let slots = 1usize << global_depth;
        if buf.remaining() < slots * 8 {
            return Err(StoreError::Corrupted(format!(
                "hash directory of depth {} needs {} addresses, file holds {}",
                global_depth,
                slots,
                buf.remaining() / 8
            )));
        }

        let mut addresses = Vec::with_capacity(slots);
        for _ in 0..slots {
            let raw = buf.get_i64();
            let address = u64::try_from(raw).map_err(|_| {
                StoreError::Corrupted(format!("negative bucket address {}", raw))
            })?;
            addresses.push(address);
        }

        Ok(Self {
            global_depth,
            addresses,
        })
    }
}

/// `|id| mod 2^depth`
pub fn hash(id: i32, depth: u8) -> usize {
    let value = id.unsigned_abs() as u64;
    let mask = if depth >= 64 { u64::MAX } else { (1u64 << depth) - 1 };
    (value & mask) as usize
}
