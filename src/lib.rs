//! # TrackStore
//!
//! An embedded, single-file record store for track metadata with:
//! - Variable-length records with tombstone deletion
//! - Append-or-overwrite updates and never-reused ids
//! - A disk-paged B-tree index with split/borrow/merge rebalancing
//! - An extendible hash index with directory doubling
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Caller (CLI, bulk loader)                  │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                         Dataset                             │
//! │          (keeps record file and index in step)              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌───────────────────┐
//!   │ RecordStore │          │   Index (trait)   │
//!   │ (tracks.db) │          │  B-tree │  Hash   │
//!   └──────┬──────┘          └───────────────────┘
//!          │
//!          ▼
//!   ┌─────────────┐
//!   │ Track codec │
//!   └─────────────┘
//! ```
//!
//! Everything is single-threaded and blocking; callers serialize access.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod record;
pub mod storage;
pub mod index;
pub mod dataset;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, StoreError};
pub use config::Config;
pub use dataset::Dataset;
pub use index::{BTreeIndex, HashIndex, Index, IndexKind, TrackIndex};
pub use record::Track;
pub use storage::RecordStore;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of TrackStore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
