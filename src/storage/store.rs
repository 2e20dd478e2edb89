//! Record Store
//!
//! Owns the data file and performs physical create/read/update/delete/iterate
//! over serialized tracks.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::error::{Result, StoreError};
use crate::record::{self, Track};

use super::{RecordIter, StoredRecord, HEADER_SIZE, RECORD_HEADER_SIZE, TOMBSTONE, VALID};

/// Single-file record store
///
/// ## Lookup cost
/// `read`, `update` and `delete` scan from the first record: O(n) in the
/// number of records. Index-assisted access goes through `read_at` with an
/// offset obtained from a secondary index kept current by the caller.
///
/// ## Concurrency
/// None. Every method takes `&mut self`; callers serialize access.
pub struct RecordStore {
    /// Path of the data file
    path: PathBuf,
    /// Read/write handle, exclusively owned
    file: File,
    /// Last assigned id (mirrors the file header)
    last_id: i32,
}

impl RecordStore {
    /// Open or create a record store at `path`
    ///
    /// A missing or empty file gets a fresh header with last id 0.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let len = file.metadata()?.len();
        let last_id = if len == 0 {
            file.write_all(&0i32.to_be_bytes())?;
            0
        } else if len < HEADER_SIZE {
            return Err(StoreError::Corrupted(format!(
                "record file {} is {} bytes, shorter than its header",
                path.display(),
                len
            )));
        } else {
            let mut header = [0u8; HEADER_SIZE as usize];
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut header)?;
            i32::from_be_bytes(header)
        };

        debug!(path = %path.display(), last_id, "record store opened");

        Ok(Self {
            path: path.to_path_buf(),
            file,
            last_id,
        })
    }

    // =========================================================================
    // CRUD
    // =========================================================================

    /// Store a new track and return its freshly assigned id
    pub fn create(&mut self, track: &Track) -> Result<i32> {
        self.append(track).map(|(id, _)| id)
    }

    /// Store a new track, returning `(id, offset)` of the appended record
    ///
    /// The id in `track` is ignored. The header is rewritten after the
    /// record lands, so ids stay unique even after deletes.
    pub fn append(&mut self, track: &Track) -> Result<(i32, u64)> {
        let id = self.last_id.checked_add(1).ok_or_else(|| {
            StoreError::InvalidConfiguration("record id space exhausted".to_string())
        })?;

        let mut stored = track.clone();
        stored.id = id;
        let payload = record::encode(&stored)?;

        let offset = self.write_record(&payload)?;

        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&id.to_be_bytes())?;
        self.last_id = id;

        debug!(id, offset, len = payload.len(), "record appended");
        Ok((id, offset))
    }

    /// Read a track by id (sequential scan)
    pub fn read(&mut self, id: i32) -> Result<Track> {
        trace!(id, "scanning for record");
        self.locate(id)?
            .map(|found| found.track)
            .ok_or(StoreError::NotFound { id })
    }

    /// Read the live record starting at `offset`
    ///
    /// Reports `NotFound` if the record there is a tombstone.
    pub fn read_at(&mut self, offset: u64) -> Result<Track> {
        let (valid, len) = self.read_record_header(offset)?;
        let mut payload = vec![0u8; len as usize];
        self.file.read_exact(&mut payload)?;

        match valid {
            VALID => record::decode(&payload),
            TOMBSTONE => Err(StoreError::NotFound {
                id: record::peek_id(&payload)?,
            }),
            other => Err(StoreError::Corrupted(format!(
                "invalid validity byte 0x{:02x} at offset {}",
                other, offset
            ))),
        }
    }

    /// Replace the track stored under `id`, returning the record's offset
    ///
    /// A payload that fits the old footprint is written in place and keeps
    /// the old length field (the slack is not reclaimed). A larger one
    /// tombstones the old record and is appended under the same id, so the
    /// returned offset differs from the old one.
    pub fn update(&mut self, id: i32, track: &Track) -> Result<u64> {
        let found = self.locate(id)?.ok_or(StoreError::NotFound { id })?;

        let mut stored = track.clone();
        stored.id = id;
        let payload = record::encode(&stored)?;

        if payload.len() as u64 <= found.len as u64 {
            self.file
                .seek(SeekFrom::Start(found.offset + RECORD_HEADER_SIZE))?;
            self.file.write_all(&payload)?;
            debug!(id, offset = found.offset, "record overwritten in place");
            return Ok(found.offset);
        }

        self.write_validity(found.offset, TOMBSTONE)?;
        let offset = self.write_record(&payload)?;
        debug!(
            id,
            old_offset = found.offset,
            new_offset = offset,
            "record relocated"
        );
        Ok(offset)
    }

    /// Tombstone the record stored under `id`
    pub fn delete(&mut self, id: i32) -> Result<()> {
        let found = self.locate(id)?.ok_or(StoreError::NotFound { id })?;
        self.write_validity(found.offset, TOMBSTONE)?;
        debug!(id, offset = found.offset, "record tombstoned");
        Ok(())
    }

    /// Live records in physical order, with their offsets
    ///
    /// Each call reseeks to the first record.
    pub fn scan(&mut self) -> Result<RecordIter<'_>> {
        RecordIter::new(&mut self.file)
    }

    /// Live tracks in physical order
    ///
    /// Each call reseeks to the first record.
    pub fn iterate(&mut self) -> Result<impl Iterator<Item = Result<Track>> + '_> {
        Ok(self.scan()?.map(|item| item.map(|stored| stored.track)))
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Flush and close the data file
    pub fn close(self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Close and delete the data file. Deleting an absent file is not an error.
    pub fn destruct(self) -> Result<()> {
        let RecordStore { path, file, .. } = self;
        drop(file);
        remove_if_exists(&path)?;
        debug!(path = %path.display(), "record file removed");
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Path of the data file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last id assigned by `create`
    pub fn last_id(&self) -> i32 {
        self.last_id
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// First live record whose decoded id matches
    fn locate(&mut self, id: i32) -> Result<Option<StoredRecord>> {
        for item in self.scan()? {
            let stored = item?;
            if stored.track.id == id {
                return Ok(Some(stored));
            }
        }
        Ok(None)
    }

    /// Append `[valid][len][payload]` at end of file and return its offset
    fn write_record(&mut self, payload: &[u8]) -> Result<u64> {
        let len = u32::try_from(payload.len()).map_err(|_| {
            StoreError::Encoding(format!("payload of {} bytes is too large", payload.len()))
        })?;

        let mut bytes = Vec::with_capacity(RECORD_HEADER_SIZE as usize + payload.len());
        bytes.push(VALID);
        bytes.extend_from_slice(&len.to_be_bytes());
        bytes.extend_from_slice(payload);

        let offset = self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(&bytes)?;
        Ok(offset)
    }

    fn write_validity(&mut self, offset: u64, valid: u8) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&[valid])?;
        Ok(())
    }

    /// Read `[valid][len]` at `offset`, leaving the cursor on the payload
    ///
    /// A length running past the end of the file is `Corrupted`.
    fn read_record_header(&mut self, offset: u64) -> Result<(u8, u32)> {
        let end = self.file.metadata()?.len();
        if offset < HEADER_SIZE || offset + RECORD_HEADER_SIZE > end {
            return Err(StoreError::Corrupted(format!(
                "record offset {} outside data file of {} bytes",
                offset, end
            )));
        }

        let mut header = [0u8; RECORD_HEADER_SIZE as usize];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut header)?;
        let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
        if offset + RECORD_HEADER_SIZE + len as u64 > end {
            return Err(StoreError::Corrupted(format!(
                "record at offset {} claims {} payload bytes past end of file",
                offset, len
            )));
        }
        Ok((header[0], len))
    }
}

/// Remove a file, treating an already-missing file as success
pub(crate) fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
