//! Storage Module
//!
//! The single data file holding every serialized track.
//!
//! ## Responsibilities
//! - Assign monotonically increasing ids (never reused, even after delete)
//! - Append, overwrite in place, or tombstone serialized records
//! - Sequential scans for lookups and iteration
//!
//! ## File Format
//! ```text
//! ┌────────────────────────────────────────┐
//! │ Header                                 │
//! │ ┌────────────────────────────────────┐ │
//! │ │ Last Assigned Id (4, big-endian)   │ │
//! │ └────────────────────────────────────┘ │
//! ├────────────────────────────────────────┤
//! │ Records                                │
//! │ ┌──────────┬──────────┬──────────────┐ │
//! │ │Valid (1) │ Len (4)  │   Payload    │ │
//! │ └──────────┴──────────┴──────────────┘ │
//! │ ... (repeated, in append order)        │
//! └────────────────────────────────────────┘
//! ```
//!
//! `Valid = 0` marks a tombstone. Its payload bytes stay on disk so the
//! offsets of later records never move, and `Len` always covers them so a
//! scan can skip a tombstone without parsing it.

mod iterator;
mod store;

pub use iterator::RecordIter;
pub use store::RecordStore;

pub(crate) use store::remove_if_exists;

use crate::record::Track;

/// A live record together with its physical location
#[derive(Debug, Clone)]
pub struct StoredRecord {
    /// Offset of the record header in the data file
    pub offset: u64,
    /// Stored payload length (may exceed the encoded track after an in-place update)
    pub len: u32,
    pub track: Track,
}

// =============================================================================
// Shared Constants (used by store and iterator)
// =============================================================================

/// Header size: last assigned id (4 bytes)
pub const HEADER_SIZE: u64 = 4;

/// Record header size: validity (1) + payload length (4)
pub const RECORD_HEADER_SIZE: u64 = 5;

/// Validity byte of a live record
pub(crate) const VALID: u8 = 1;

/// Validity byte of a tombstone
pub(crate) const TOMBSTONE: u8 = 0;
