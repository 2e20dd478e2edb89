//! Configuration for TrackStore
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{Result, StoreError};
use crate::index::IndexKind;

/// Smallest accepted B-tree half-order
pub const MIN_HALF_ORDER: usize = 2;

/// Largest accepted B-tree half-order (keeps a page well under 1 MB)
pub const MAX_HALF_ORDER: usize = 16 * 1024;

/// Largest accepted bucket capacity (bucket count is a 2-byte short)
pub const MAX_BUCKET_CAPACITY: usize = i16::MAX as usize;

/// Main configuration for a dataset
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all dataset files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── tracks.db            (record file)
    ///     ├── tracks.btree         (B-tree index, if selected)
    ///     └── tracks.hash.*        (hash index meta/dir/buckets, if selected)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // Index Configuration
    // -------------------------------------------------------------------------
    /// Which secondary index backs the dataset
    pub index_kind: IndexKind,

    /// B-tree half-order `m`: pages hold between m and 2m entries
    pub btree_half_order: usize,

    /// Entries per hash bucket
    pub bucket_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./trackstore_data"),
            index_kind: IndexKind::BTree,
            btree_half_order: 8,
            bucket_capacity: 32,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject orders and capacities the on-disk layouts cannot hold
    pub fn validate(&self) -> Result<()> {
        validate_half_order(self.btree_half_order)?;
        validate_bucket_capacity(self.bucket_capacity)
    }
}

pub(crate) fn validate_half_order(m: usize) -> Result<()> {
    if !(MIN_HALF_ORDER..=MAX_HALF_ORDER).contains(&m) {
        return Err(StoreError::InvalidConfiguration(format!(
            "B-tree half-order must be within {}..={}, got {}",
            MIN_HALF_ORDER, MAX_HALF_ORDER, m
        )));
    }
    Ok(())
}

pub(crate) fn validate_bucket_capacity(capacity: usize) -> Result<()> {
    if capacity == 0 || capacity > MAX_BUCKET_CAPACITY {
        return Err(StoreError::InvalidConfiguration(format!(
            "bucket capacity must be within 1..={}, got {}",
            MAX_BUCKET_CAPACITY, capacity
        )));
    }
    Ok(())
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all dataset files)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Select the index structure
    pub fn index_kind(mut self, kind: IndexKind) -> Self {
        self.config.index_kind = kind;
        self
    }

    /// Set the B-tree half-order
    pub fn btree_half_order(mut self, m: usize) -> Self {
        self.config.btree_half_order = m;
        self
    }

    /// Set the hash bucket capacity
    pub fn bucket_capacity(mut self, capacity: usize) -> Self {
        self.config.bucket_capacity = capacity;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
