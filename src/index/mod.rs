//! Index Module
//!
//! Secondary indexes mapping a record id to the byte offset of its record in
//! the data file.
//!
//! ## Implementations
//! - [`BTreeIndex`]: disk-paged B-tree with split/borrow/merge rebalancing
//! - [`HashIndex`]: extendible hash table with directory doubling
//!
//! Neither index is synchronised with the record store automatically: the
//! caller that writes a record also keeps its index entry current.

pub mod btree;
pub mod hash;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Result, StoreError};

pub use btree::{BTreeIndex, TreeStats};
pub use hash::{DirectoryStats, HashIndex};

/// Null file pointer shared by both on-disk index layouts
pub(crate) const NULL_OFFSET: i64 = -1;

/// One index key: a record id and its record-file offset
///
/// Stored as `[id: i32][position: i64]`, big-endian, in both layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub id: i32,
    pub position: i64,
}

/// Operations every secondary index exposes
pub trait Index {
    /// Offset stored for `id`, or `NotFound`
    fn search(&mut self, id: i32) -> Result<u64>;

    /// Add `id -> position`, or `Conflict` if `id` is already present
    fn insert(&mut self, id: i32, position: u64) -> Result<()>;

    /// Remove `id`, or `NotFound`
    fn delete(&mut self, id: i32) -> Result<()>;

    /// Delete every backing file. Irreversible; the index must not be used
    /// afterwards. Calling it again once the files are gone is a no-op.
    fn destruct(&mut self) -> Result<()>;

    /// Paths of every backing file
    fn files(&self) -> Vec<PathBuf>;

    /// Which structure this is
    fn kind(&self) -> IndexKind;
}

/// The two available index structures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    BTree,
    Hash,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKind::BTree => write!(f, "btree"),
            IndexKind::Hash => write!(f, "hash"),
        }
    }
}

impl FromStr for IndexKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "btree" | "b-tree" => Ok(IndexKind::BTree),
            "hash" => Ok(IndexKind::Hash),
            other => Err(StoreError::InvalidConfiguration(format!(
                "unknown index kind: {}",
                other
            ))),
        }
    }
}

/// Index chosen for a dataset at creation time
pub enum TrackIndex {
    BTree(BTreeIndex),
    Hash(HashIndex),
}

impl Index for TrackIndex {
    fn search(&mut self, id: i32) -> Result<u64> {
        match self {
            TrackIndex::BTree(index) => index.search(id),
            TrackIndex::Hash(index) => index.search(id),
        }
    }

    fn insert(&mut self, id: i32, position: u64) -> Result<()> {
        match self {
            TrackIndex::BTree(index) => index.insert(id, position),
            TrackIndex::Hash(index) => index.insert(id, position),
        }
    }

    fn delete(&mut self, id: i32) -> Result<()> {
        match self {
            TrackIndex::BTree(index) => index.delete(id),
            TrackIndex::Hash(index) => index.delete(id),
        }
    }

    fn destruct(&mut self) -> Result<()> {
        match self {
            TrackIndex::BTree(index) => index.destruct(),
            TrackIndex::Hash(index) => index.destruct(),
        }
    }

    fn files(&self) -> Vec<PathBuf> {
        match self {
            TrackIndex::BTree(index) => index.files(),
            TrackIndex::Hash(index) => index.files(),
        }
    }

    fn kind(&self) -> IndexKind {
        match self {
            TrackIndex::BTree(_) => IndexKind::BTree,
            TrackIndex::Hash(_) => IndexKind::Hash,
        }
    }
}

/// Convert an i64 on-disk pointer to an offset, rejecting negatives
pub(crate) fn to_offset(raw: i64, what: &str) -> Result<u64> {
    u64::try_from(raw)
        .map_err(|_| StoreError::Corrupted(format!("negative {} offset {}", what, raw)))
}
