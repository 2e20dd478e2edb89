//! Extendible Hash Index
//!
//! Directory of `2^global_depth` bucket addresses over a file of fixed-size
//! buckets. A full bucket splits in two (doubling the directory first when
//! its local depth has caught up with the global depth).
//!
//! ## Files
//! ```text
//! {base}.hash.meta     Bucket Capacity: i32 (4)
//! {base}.hash.dir      Global Depth (1) | Address: i64 (8) × 2^depth
//! {base}.hash.buckets  Bucket × n (fixed size, see `bucket`)
//! ```
//!
//! Deletes never merge buckets or shrink the directory: buckets may stay
//! sparsely populated after many deletes.

mod bucket;
mod directory;

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::config::validate_bucket_capacity;
use crate::error::{Result, StoreError};
use crate::index::{to_offset, Entry, Index, IndexKind};
use crate::storage::remove_if_exists;

pub use directory::{hash, MAX_GLOBAL_DEPTH};

use bucket::Bucket;
use directory::Directory;

/// Shape of a hash index as reported by [`HashIndex::verify`]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirectoryStats {
    pub global_depth: u8,
    /// Distinct buckets referenced by the directory
    pub buckets: usize,
    pub entries: usize,
    /// Local depth of every bucket, keyed by bucket address
    pub local_depths: HashMap<u64, u8>,
}

/// Extendible hash table mapping record ids to record offsets
pub struct HashIndex {
    meta_path: PathBuf,
    directory_path: PathBuf,
    buckets_path: PathBuf,
    /// Directory file handle, rewritten wholesale on change
    directory_file: File,
    /// Bucket file handle
    buckets: File,
    directory: Directory,
    capacity: usize,
    bucket_size: usize,
}

impl HashIndex {
    /// Create an empty index next to `base`, replacing any existing files
    pub fn create(base: &Path, capacity: usize) -> Result<Self> {
        validate_bucket_capacity(capacity)?;
        let [meta_path, directory_path, buckets_path] = Self::paths(base);

        fs::write(&meta_path, (capacity as i32).to_be_bytes())?;

        let mut buckets = open_truncated(&buckets_path)?;
        buckets.write_all(&Bucket::new(0).to_bytes(capacity))?;

        let mut index = Self {
            meta_path,
            directory_path: directory_path.clone(),
            buckets_path,
            directory_file: open_truncated(&directory_path)?,
            buckets,
            directory: Directory::new(0),
            capacity,
            bucket_size: Bucket::disk_size(capacity),
        };
        index.persist_directory()?;

        debug!(base = %base.display(), capacity, "hash index created");
        Ok(index)
    }

    /// Open an existing index; its stored bucket capacity is used
    pub fn open(base: &Path) -> Result<Self> {
        let [meta_path, directory_path, buckets_path] = Self::paths(base);

        let meta = fs::read(&meta_path)?;
        let raw: [u8; 4] = meta.get(..4).and_then(|b| b.try_into().ok()).ok_or_else(|| {
            StoreError::Corrupted(format!("hash metadata {} truncated", meta_path.display()))
        })?;
        let capacity = i32::from_be_bytes(raw);
        let capacity = usize::try_from(capacity).map_err(|_| {
            StoreError::Corrupted(format!("negative bucket capacity {}", capacity))
        })?;
        validate_bucket_capacity(capacity)?;

        let mut directory_file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&directory_path)?;
        let mut bytes = Vec::new();
        directory_file.read_to_end(&mut bytes)?;
        let directory = Directory::from_bytes(&bytes)?;

        let buckets = OpenOptions::new().read(true).write(true).open(&buckets_path)?;

        debug!(
            base = %base.display(),
            capacity,
            global_depth = directory.global_depth(),
            "hash index opened"
        );

        Ok(Self {
            meta_path,
            directory_path,
            buckets_path,
            directory_file,
            buckets,
            directory,
            capacity,
            bucket_size: Bucket::disk_size(capacity),
        })
    }

    /// Open the index next to `base`, creating it with `capacity` if absent
    pub fn open_or_create(base: &Path, capacity: usize) -> Result<Self> {
        let [meta_path, ..] = Self::paths(base);
        if meta_path.exists() {
            Self::open(base)
        } else {
            Self::create(base, capacity)
        }
    }

    /// `{base}.hash.meta`, `{base}.hash.dir`, `{base}.hash.buckets`
    pub fn paths(base: &Path) -> [PathBuf; 3] {
        let with_suffix = |suffix: &str| {
            let mut name = OsString::from(base.as_os_str());
            name.push(suffix);
            PathBuf::from(name)
        };
        [
            with_suffix(".hash.meta"),
            with_suffix(".hash.dir"),
            with_suffix(".hash.buckets"),
        ]
    }

    pub fn global_depth(&self) -> u8 {
        self.directory.global_depth()
    }

    pub fn bucket_capacity(&self) -> usize {
        self.capacity
    }

    /// Local depth of the bucket `id` hashes to
    pub fn local_depth_of(&mut self, id: i32) -> Result<u8> {
        let address = self.directory.address(self.directory.slot(id));
        Ok(self.read_bucket(address)?.local_depth)
    }

    /// Flush every index file to disk
    pub fn sync(&mut self) -> Result<()> {
        self.directory_file.sync_all()?;
        self.buckets.sync_all()?;
        Ok(())
    }

    /// Check that every bucket is referenced by exactly
    /// `2^(global_depth - local_depth)` slots sharing its low hash bits, and
    /// that its entries are sorted, within capacity and hash to it
    pub fn verify(&mut self) -> Result<DirectoryStats> {
        let global_depth = self.directory.global_depth();
        let mut slots_by_bucket: HashMap<u64, Vec<usize>> = HashMap::new();
        for (slot, &address) in self.directory.addresses().iter().enumerate() {
            slots_by_bucket.entry(address).or_default().push(slot);
        }

        let mut stats = DirectoryStats {
            global_depth,
            buckets: slots_by_bucket.len(),
            ..DirectoryStats::default()
        };

        for (address, slots) in &slots_by_bucket {
            let bucket = self.read_bucket(*address)?;
            let local = bucket.local_depth;
            let corrupt = |what: String| {
                StoreError::Corrupted(format!("bucket at {}: {}", address, what))
            };

            if local > global_depth {
                return Err(corrupt(format!(
                    "local depth {} exceeds global depth {}",
                    local, global_depth
                )));
            }
            let expected = 1usize << (global_depth - local);
            if slots.len() != expected {
                return Err(corrupt(format!(
                    "referenced by {} slots, expected {}",
                    slots.len(),
                    expected
                )));
            }

            let low_bits = slots[0] & ((1usize << local) - 1);
            if slots.iter().any(|&s| s & ((1usize << local) - 1) != low_bits) {
                return Err(corrupt("slots disagree on the low hash bits".to_string()));
            }
            if bucket.len() > self.capacity {
                return Err(corrupt(format!("holds {} entries", bucket.len())));
            }
            if bucket.entries.windows(2).any(|pair| pair[0].id >= pair[1].id) {
                return Err(corrupt("entries out of order".to_string()));
            }
            if let Some(stray) = bucket.entries.iter().find(|e| hash(e.id, local) != low_bits) {
                return Err(corrupt(format!("id {} hashes elsewhere", stray.id)));
            }

            stats.entries += bucket.len();
            stats.local_depths.insert(*address, local);
        }

        Ok(stats)
    }

    // =========================================================================
    // Insertion
    // =========================================================================

    fn insert_entry(&mut self, entry: Entry) -> Result<()> {
        let address = self.directory.address(self.directory.slot(entry.id));
        let mut bucket = self.read_bucket(address)?;

        if bucket.find(entry.id).is_ok() {
            return Err(StoreError::Conflict { id: entry.id });
        }

        if bucket.len() < self.capacity {
            bucket.insert(entry);
            return self.write_bucket(address, &bucket);
        }

        // No split can separate ids that agree on every usable hash bit
        let target = hash(entry.id, MAX_GLOBAL_DEPTH);
        if bucket.entries.iter().all(|e| hash(e.id, MAX_GLOBAL_DEPTH) == target) {
            return Err(StoreError::InvalidConfiguration(format!(
                "bucket capacity {} cannot hold id {} and the {} ids colliding with it",
                self.capacity,
                entry.id,
                bucket.len()
            )));
        }

        self.split(address, bucket, entry.id)?;
        self.insert_entry(entry)
    }

    /// Replace the full bucket at `address` with two buckets one bit deeper
    ///
    /// The old address is reused for the bucket taking the slots whose new
    /// hash bit is 0; the other bucket is appended. Entries of the old bucket
    /// are then re-inserted through the normal insert path.
    fn split(&mut self, address: u64, bucket: Bucket, id: i32) -> Result<()> {
        let local = bucket.local_depth;

        if local == self.directory.global_depth() {
            self.directory.double()?;
            debug!(
                global_depth = self.directory.global_depth(),
                slots = self.directory.len(),
                "hash directory doubled"
            );
        }

        let depth = local + 1;
        let low = address;
        self.write_bucket(low, &Bucket::new(depth))?;
        let high = self.append_bucket(&Bucket::new(depth))?;

        // Slots that pointed at the old bucket are `start + k * 2^local`;
        // bit `local` of the slot alternates with k
        let step = 1usize << local;
        let start = hash(id, local);
        let mut to_high = false;
        for slot in (start..self.directory.len()).step_by(step) {
            self.directory.set(slot, if to_high { high } else { low });
            to_high = !to_high;
        }
        self.persist_directory()?;

        debug!(low, high, local_depth = depth, "hash bucket split");

        for entry in bucket.entries {
            self.insert_entry(entry)?;
        }
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn read_bucket(&mut self, address: u64) -> Result<Bucket> {
        let mut bytes = vec![0u8; self.bucket_size];
        self.buckets.seek(SeekFrom::Start(address))?;
        self.buckets.read_exact(&mut bytes)?;
        Bucket::from_bytes(address, &bytes, self.capacity)
    }

    fn write_bucket(&mut self, address: u64, bucket: &Bucket) -> Result<()> {
        self.buckets.seek(SeekFrom::Start(address))?;
        self.buckets.write_all(&bucket.to_bytes(self.capacity))?;
        Ok(())
    }

    fn append_bucket(&mut self, bucket: &Bucket) -> Result<u64> {
        let address = self.buckets.seek(SeekFrom::End(0))?;
        self.buckets.write_all(&bucket.to_bytes(self.capacity))?;
        Ok(address)
    }

    fn persist_directory(&mut self) -> Result<()> {
        let bytes = self.directory.to_bytes();
        self.directory_file.set_len(0)?;
        self.directory_file.seek(SeekFrom::Start(0))?;
        self.directory_file.write_all(&bytes)?;
        Ok(())
    }
}

impl Index for HashIndex {
    fn search(&mut self, id: i32) -> Result<u64> {
        let slot = self.directory.slot(id);
        let address = self.directory.address(slot);
        trace!(id, slot, address, "hash search");
        let bucket = self.read_bucket(address)?;
        match bucket.find(id) {
            Ok(idx) => to_offset(bucket.entries[idx].position, "record"),
            Err(_) => Err(StoreError::NotFound { id }),
        }
    }

    fn insert(&mut self, id: i32, position: u64) -> Result<()> {
        let position = i64::try_from(position).map_err(|_| {
            StoreError::Encoding(format!("position {} does not fit an i64", position))
        })?;
        self.insert_entry(Entry { id, position })
    }

    fn delete(&mut self, id: i32) -> Result<()> {
        let address = self.directory.address(self.directory.slot(id));
        let mut bucket = self.read_bucket(address)?;
        let idx = bucket.find(id).map_err(|_| StoreError::NotFound { id })?;
        bucket.entries.remove(idx);
        self.write_bucket(address, &bucket)
    }

    fn destruct(&mut self) -> Result<()> {
        for path in self.files() {
            remove_if_exists(&path)?;
        }
        self.directory = Directory::new(0);
        debug!(path = %self.meta_path.display(), "hash index removed");
        Ok(())
    }

    fn files(&self) -> Vec<PathBuf> {
        vec![
            self.meta_path.clone(),
            self.directory_path.clone(),
            self.buckets_path.clone(),
        ]
    }

    fn kind(&self) -> IndexKind {
        IndexKind::Hash
    }
}

fn open_truncated(path: &Path) -> Result<File> {
    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?)
}
