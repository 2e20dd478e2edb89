//! B-tree pager
//!
//! Owns the index file and a per-operation page cache keyed by file offset.
//! Pages are copied out of the cache, edited, and written back with `save`;
//! `release` forgets everything once an operation completes, so the file is
//! always the canonical state.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut, BytesMut};
use tracing::trace;

use crate::config::validate_half_order;
use crate::error::{Result, StoreError};
use crate::index::NULL_OFFSET;

use super::page::Page;

/// Header size: root offset (8) + half-order (4)
pub(super) const HEADER_SIZE: u64 = 12;

pub(super) struct Pager {
    path: PathBuf,
    file: File,
    half_order: usize,
    page_size: usize,
    /// Offset of the root page, `None` for an empty tree
    root: Option<u64>,
    /// Pages touched by the current operation
    cache: HashMap<u64, Page>,
}

impl Pager {
    /// Create a fresh index file holding an empty tree
    pub fn create(path: &Path, half_order: usize) -> Result<Self> {
        validate_half_order(half_order)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let mut pager = Self {
            path: path.to_path_buf(),
            file,
            half_order,
            page_size: Page::disk_size(half_order),
            root: None,
            cache: HashMap::new(),
        };
        pager.write_header()?;
        Ok(pager)
    }

    /// Open an existing index file; the stored half-order is authoritative
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header).map_err(|e| {
            StoreError::Corrupted(format!(
                "B-tree header of {} unreadable: {}",
                path.display(),
                e
            ))
        })?;

        let mut buf = &header[..];
        let root = buf.get_i64();
        let half_order = buf.get_i32();
        if half_order < 0 {
            return Err(StoreError::Corrupted(format!(
                "B-tree half-order {} in {}",
                half_order,
                path.display()
            )));
        }
        let half_order = half_order as usize;
        validate_half_order(half_order)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            half_order,
            page_size: Page::disk_size(half_order),
            root: child_ptr(root),
            cache: HashMap::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn half_order(&self) -> usize {
        self.half_order
    }

    pub fn root(&self) -> Option<u64> {
        self.root
    }

    /// Point the header at a new root (or at nothing)
    pub fn set_root(&mut self, root: Option<u64>) -> Result<()> {
        self.root = root;
        self.write_header()
    }

    /// Copy of the page at `offset`, read from disk on first access
    pub fn load(&mut self, offset: u64) -> Result<Page> {
        if let Some(page) = self.cache.get(&offset) {
            return Ok(page.clone());
        }

        trace!(offset, "loading B-tree page");
        let mut bytes = vec![0u8; self.page_size];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut bytes)?;
        let page = Page::from_bytes(offset, &bytes, self.half_order)?;

        self.cache.insert(offset, page.clone());
        Ok(page)
    }

    /// Write a page, assigning it the end-of-file offset on its first save
    pub fn save(&mut self, page: &mut Page) -> Result<u64> {
        let offset = match page.offset {
            Some(offset) => offset,
            None => {
                let end = self.file.seek(SeekFrom::End(0))?;
                page.offset = Some(end);
                end
            }
        };

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&page.to_bytes(self.half_order))?;
        self.cache.insert(offset, page.clone());
        Ok(offset)
    }

    /// Forget every cached page
    pub fn release(&mut self) {
        self.cache.clear();
    }

    /// Drop all in-memory state after the backing file is removed
    pub fn reset(&mut self) {
        self.cache.clear();
        self.root = None;
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn write_header(&mut self) -> Result<()> {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE as usize);
        buf.put_i64(raw_ptr(self.root));
        buf.put_i32(self.half_order as i32);

        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&buf)?;
        Ok(())
    }
}

/// Decode an on-disk child pointer
pub(super) fn child_ptr(raw: i64) -> Option<u64> {
    if raw < 0 {
        None
    } else {
        Some(raw as u64)
    }
}

/// Encode a child pointer for the on-disk layout
pub(super) fn raw_ptr(offset: Option<u64>) -> i64 {
    offset.map(|o| o as i64).unwrap_or(NULL_OFFSET)
}
