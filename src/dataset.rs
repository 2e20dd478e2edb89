//! Dataset Module
//!
//! Ties a record store to the secondary index chosen for it.
//!
//! ## Responsibilities
//! - Open/create the record file and index files together
//! - Keep `id -> offset` index entries current on every logical CRUD call
//! - Serve reads through the index, scans and text search through the store
//! - Destroy every backing file together

use std::fs;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::index::{BTreeIndex, HashIndex, Index, IndexKind, TrackIndex};
use crate::record::Track;
use crate::storage::RecordStore;

/// A record store plus its index
///
/// ## Consistency
/// Every mutation writes the record first and the index second. There is no
/// transaction spanning both: an I/O failure between the two writes leaves
/// them out of step until `reindex` rebuilds the index from the store.
pub struct Dataset {
    /// Dataset configuration
    config: Config,

    /// Record file
    store: RecordStore,

    /// Index selected at creation time
    index: TrackIndex,
}

impl Dataset {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const RECORD_FILENAME: &'static str = "tracks.db";
    const BTREE_FILENAME: &'static str = "tracks.btree";
    const HASH_BASENAME: &'static str = "tracks";

    /// Open or create a dataset with the given config
    ///
    /// On startup:
    /// 1. Validate config and create the data directory
    /// 2. Open/create the record file
    /// 3. Open/create the selected index, rebuilding it from the record
    ///    file if it had to be created next to existing records
    pub fn open(mut config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let store = RecordStore::open(&config.data_dir.join(Self::RECORD_FILENAME))?;
        let index_existed = Self::index_files(&config).iter().all(|path| path.exists());
        let index = Self::open_index(&config)?;

        // Parameters recorded in existing index files override the config
        match &index {
            TrackIndex::BTree(tree) => config.btree_half_order = tree.half_order(),
            TrackIndex::Hash(table) => config.bucket_capacity = table.bucket_capacity(),
        }

        info!(
            data_dir = %config.data_dir.display(),
            index = %config.index_kind,
            last_id = store.last_id(),
            "dataset opened"
        );

        let mut dataset = Self {
            config,
            store,
            index,
        };

        // A freshly created index over an existing record file starts empty
        if !index_existed && dataset.store.last_id() > 0 {
            dataset.reindex()?;
        }
        Ok(dataset)
    }

    fn index_files(config: &Config) -> Vec<PathBuf> {
        match config.index_kind {
            IndexKind::BTree => vec![config.data_dir.join(Self::BTREE_FILENAME)],
            IndexKind::Hash => HashIndex::paths(&config.data_dir.join(Self::HASH_BASENAME)).to_vec(),
        }
    }

    fn open_index(config: &Config) -> Result<TrackIndex> {
        Ok(match config.index_kind {
            IndexKind::BTree => TrackIndex::BTree(BTreeIndex::open_or_create(
                &config.data_dir.join(Self::BTREE_FILENAME),
                config.btree_half_order,
            )?),
            IndexKind::Hash => TrackIndex::Hash(HashIndex::open_or_create(
                &config.data_dir.join(Self::HASH_BASENAME),
                config.bucket_capacity,
            )?),
        })
    }

    fn create_index(config: &Config) -> Result<TrackIndex> {
        Ok(match config.index_kind {
            IndexKind::BTree => TrackIndex::BTree(BTreeIndex::create(
                &config.data_dir.join(Self::BTREE_FILENAME),
                config.btree_half_order,
            )?),
            IndexKind::Hash => TrackIndex::Hash(HashIndex::create(
                &config.data_dir.join(Self::HASH_BASENAME),
                config.bucket_capacity,
            )?),
        })
    }

    // =========================================================================
    // CRUD
    // =========================================================================

    /// Store a new track and index it; returns the assigned id
    pub fn create(&mut self, track: &Track) -> Result<i32> {
        let (id, offset) = self.store.append(track)?;
        self.index.insert(id, offset)?;
        Ok(id)
    }

    /// Read a track through the index
    pub fn read(&mut self, id: i32) -> Result<Track> {
        let offset = self.index.search(id)?;
        let track = self.store.read_at(offset)?;
        if track.id != id {
            warn!(id, offset, found = track.id, "index entry points at another record");
            return Err(StoreError::Corrupted(format!(
                "index maps {} to offset {} holding record {}",
                id, offset, track.id
            )));
        }
        Ok(track)
    }

    /// Replace a track, re-pointing the index if the record moved
    pub fn update(&mut self, id: i32, track: &Track) -> Result<()> {
        let old_offset = self.index.search(id)?;
        let new_offset = self.store.update(id, track)?;
        if new_offset != old_offset {
            self.index.delete(id)?;
            self.index.insert(id, new_offset)?;
        }
        Ok(())
    }

    /// Tombstone a track and drop its index entry
    pub fn delete(&mut self, id: i32) -> Result<()> {
        self.index.search(id)?;
        self.store.delete(id)?;
        self.index.delete(id)
    }

    /// Live tracks in physical order
    pub fn iter(&mut self) -> Result<impl Iterator<Item = Result<Track>> + '_> {
        self.store.iterate()
    }

    /// Tracks whose name, album, artists or genres contain `needle`
    /// (case-insensitive). Scans the store, never the index.
    pub fn search_text(&mut self, needle: &str) -> Result<Vec<Track>> {
        let mut matches = Vec::new();
        for track in self.store.iterate()? {
            let track = track?;
            if track.matches_text(needle) {
                matches.push(track);
            }
        }
        Ok(matches)
    }

    /// Rebuild the index from a full scan of the store
    ///
    /// Returns the number of records indexed.
    pub fn reindex(&mut self) -> Result<usize> {
        self.index.destruct()?;
        self.index = Self::create_index(&self.config)?;

        let mut located = Vec::new();
        for stored in self.store.scan()? {
            let stored = stored?;
            located.push((stored.track.id, stored.offset));
        }
        for (id, offset) in &located {
            self.index.insert(*id, *offset)?;
        }

        info!(records = located.len(), index = %self.index.kind(), "dataset reindexed");
        Ok(located.len())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Flush every file and close the dataset
    pub fn close(mut self) -> Result<()> {
        match &mut self.index {
            TrackIndex::BTree(index) => index.sync()?,
            TrackIndex::Hash(index) => index.sync()?,
        }
        self.store.close()
    }

    /// Delete every backing file. Irreversible.
    pub fn destruct(self) -> Result<()> {
        let Dataset {
            config,
            store,
            mut index,
        } = self;
        index.destruct()?;
        store.destruct()?;
        info!(data_dir = %config.data_dir.display(), "dataset destroyed");
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Paths of the record file and every index file
    pub fn files(&self) -> Vec<PathBuf> {
        let mut files = vec![self.store.path().to_path_buf()];
        files.extend(self.index.files());
        files
    }

    /// Last id assigned by the store
    pub fn last_id(&self) -> i32 {
        self.store.last_id()
    }

    pub fn index_kind(&self) -> IndexKind {
        self.index.kind()
    }

    /// Direct access to the index (for inspection)
    pub fn index_mut(&mut self) -> &mut TrackIndex {
        &mut self.index
    }

    /// Direct access to the record store (for inspection)
    pub fn store_mut(&mut self) -> &mut RecordStore {
        &mut self.store
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}
