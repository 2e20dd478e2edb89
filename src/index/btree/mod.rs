//! Paged B-tree Index
//!
//! Disk-resident B-tree of half-order `m`: every page holds between `m` and
//! `2m` entries (the root may hold fewer) and `count + 1` child pointers.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Header (12 bytes)                       │
//! │   Root Offset: i64 (8) | Half-Order (4) │
//! ├─────────────────────────────────────────┤
//! │ Pages (fixed size, see `page`)          │
//! │   ... at the offsets children point to  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Pages emptied by a merge are left in place; the file never shrinks.

mod page;
mod pager;

use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::error::{Result, StoreError};
use crate::index::{to_offset, Entry, Index, IndexKind};
use crate::storage::remove_if_exists;

use page::Page;
use pager::{child_ptr, raw_ptr, Pager};

/// Outcome of inserting into a subtree
enum Insertion {
    /// The subtree absorbed the entry without changing height
    Absorbed,
    /// The subtree split: `separator` moves up, `right` is the new page
    Grew { separator: Entry, right: i64 },
}

/// Outcome of deleting from a subtree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Removal {
    Balanced,
    /// The subtree root dropped below `m` entries
    Underflow,
}

/// Shape of a tree as reported by [`BTreeIndex::verify`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TreeStats {
    /// Levels from root to leaves (0 for an empty tree)
    pub height: usize,
    pub pages: usize,
    pub entries: usize,
}

/// Disk-paged B-tree mapping record ids to record offsets
pub struct BTreeIndex {
    pager: Pager,
}

impl BTreeIndex {
    /// Create an empty tree at `path`, replacing any existing file
    pub fn create(path: &Path, half_order: usize) -> Result<Self> {
        let pager = Pager::create(path, half_order)?;
        debug!(path = %path.display(), half_order, "B-tree index created");
        Ok(Self { pager })
    }

    /// Open an existing tree; its stored half-order is used
    pub fn open(path: &Path) -> Result<Self> {
        let pager = Pager::open(path)?;
        debug!(
            path = %path.display(),
            half_order = pager.half_order(),
            "B-tree index opened"
        );
        Ok(Self { pager })
    }

    /// Open the tree at `path`, creating it with `half_order` if absent
    pub fn open_or_create(path: &Path, half_order: usize) -> Result<Self> {
        if path.exists() {
            Self::open(path)
        } else {
            Self::create(path, half_order)
        }
    }

    pub fn half_order(&self) -> usize {
        self.pager.half_order()
    }

    pub fn path(&self) -> &Path {
        self.pager.path()
    }

    pub fn is_empty(&self) -> bool {
        self.pager.root().is_none()
    }

    /// Flush the index file to disk
    pub fn sync(&mut self) -> Result<()> {
        self.pager.sync()
    }

    /// Number of levels (0 for an empty tree)
    pub fn height(&mut self) -> Result<usize> {
        let result = self.measure_height();
        self.pager.release();
        result
    }

    /// Every `(id, position)` pair in ascending id order
    pub fn entries(&mut self) -> Result<Vec<(i32, u64)>> {
        let mut out = Vec::new();
        let result = match self.pager.root() {
            Some(root) => self.collect(root, &mut out),
            None => Ok(()),
        };
        self.pager.release();
        result.map(|()| out)
    }

    /// Walk every page, checking ordering, bracketing, fill and depth
    ///
    /// Returns `Corrupted` describing the first violation found.
    pub fn verify(&mut self) -> Result<TreeStats> {
        let mut stats = TreeStats::default();
        let result = match self.pager.root() {
            Some(root) => {
                let mut leaf_depth = None;
                self.verify_page(root, None, None, 1, &mut leaf_depth, &mut stats)
                    .map(|()| stats.height = leaf_depth.unwrap_or(0))
            }
            None => Ok(()),
        };
        self.pager.release();
        result.map(|()| stats)
    }

    // =========================================================================
    // Search
    // =========================================================================

    fn find(&mut self, id: i32) -> Result<u64> {
        let mut current = self.pager.root();
        while let Some(offset) = current {
            let page = self.pager.load(offset)?;
            let idx = page.find(id);
            if idx < page.len() && page.entries[idx].id == id {
                return to_offset(page.entries[idx].position, "record");
            }
            current = child_ptr(page.children[idx]);
        }
        Err(StoreError::NotFound { id })
    }

    // =========================================================================
    // Insertion
    // =========================================================================

    fn insert_root(&mut self, entry: Entry) -> Result<()> {
        let root = self.pager.root();
        match self.insert_into(root, entry)? {
            Insertion::Absorbed => Ok(()),
            Insertion::Grew { separator, right } => {
                let mut page = Page::new();
                page.entries.push(separator);
                page.children = vec![raw_ptr(root), right];
                let offset = self.pager.save(&mut page)?;
                self.pager.set_root(Some(offset))?;
                debug!(root = offset, separator = separator.id, "B-tree root replaced");
                Ok(())
            }
        }
    }

    /// Insert below `node`, reporting growth to the caller
    ///
    /// Reaching a null child means the entry belongs in the page above, so
    /// it is handed back as a growth with no right subtree.
    fn insert_into(&mut self, node: Option<u64>, entry: Entry) -> Result<Insertion> {
        let offset = match node {
            Some(offset) => offset,
            None => {
                return Ok(Insertion::Grew {
                    separator: entry,
                    right: raw_ptr(None),
                })
            }
        };

        let mut page = self.pager.load(offset)?;
        let idx = page.find(entry.id);
        if idx < page.len() && page.entries[idx].id == entry.id {
            return Err(StoreError::Conflict { id: entry.id });
        }

        let (separator, right) = match self.insert_into(child_ptr(page.children[idx]), entry)? {
            Insertion::Absorbed => return Ok(Insertion::Absorbed),
            Insertion::Grew { separator, right } => (separator, right),
        };

        page.entries.insert(idx, separator);
        page.children.insert(idx + 1, right);

        let m = self.pager.half_order();
        if page.len() <= 2 * m {
            self.pager.save(&mut page)?;
            return Ok(Insertion::Absorbed);
        }

        // 2m + 1 entries: keep m, push the median up, move m to a new page
        let mut sibling = Page::new();
        sibling.entries = page.entries.split_off(m + 1);
        sibling.children = page.children.split_off(m + 1);
        let median = page.entries.remove(m);

        self.pager.save(&mut page)?;
        let right = self.pager.save(&mut sibling)?;
        debug!(page = offset, sibling = right, median = median.id, "B-tree page split");

        Ok(Insertion::Grew {
            separator: median,
            right: right as i64,
        })
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    fn delete_root(&mut self, id: i32) -> Result<()> {
        let root = self.pager.root().ok_or(StoreError::NotFound { id })?;
        self.delete_from(root, id)?;

        // A merge that drained the root leaves its only child in charge
        let page = self.pager.load(root)?;
        if page.is_empty() {
            let new_root = child_ptr(page.children[0]);
            self.pager.set_root(new_root)?;
            debug!(old_root = root, new_root = ?new_root, "B-tree root collapsed");
        }
        Ok(())
    }

    fn delete_from(&mut self, offset: u64, id: i32) -> Result<Removal> {
        let mut page = self.pager.load(offset)?;
        let idx = page.find(id);

        if idx < page.len() && page.entries[idx].id == id {
            if page.is_leaf() {
                page.entries.remove(idx);
                page.children.remove(idx);
                self.pager.save(&mut page)?;
                return Ok(self.status(&page));
            }

            // Internal hit: swap in the in-order predecessor
            let left = child_at(&page, idx)?;
            let (predecessor, removal) = self.remove_max(left)?;
            page.entries[idx] = predecessor;
            return self.settle(&mut page, idx, removal, true);
        }

        let child = child_ptr(page.children[idx]).ok_or(StoreError::NotFound { id })?;
        let removal = self.delete_from(child, id)?;
        self.settle(&mut page, idx, removal, false)
    }

    /// Remove and return the largest entry of the subtree at `offset`
    fn remove_max(&mut self, offset: u64) -> Result<(Entry, Removal)> {
        let mut page = self.pager.load(offset)?;

        if page.is_leaf() {
            let entry = page.entries.pop().ok_or_else(|| {
                StoreError::Corrupted(format!("empty non-root B-tree page at {}", offset))
            })?;
            page.children.pop();
            self.pager.save(&mut page)?;
            return Ok((entry, self.status(&page)));
        }

        let last = page.len();
        let child = child_at(&page, last)?;
        let (entry, removal) = self.remove_max(child)?;
        let removal = self.settle(&mut page, last, removal, false)?;
        Ok((entry, removal))
    }

    /// Rebalance child `idx` if it underflowed, persist `page` if it changed,
    /// and report whether `page` itself is now short
    fn settle(
        &mut self,
        page: &mut Page,
        idx: usize,
        removal: Removal,
        dirty: bool,
    ) -> Result<Removal> {
        let dirty = match removal {
            Removal::Underflow => {
                self.rebalance(page, idx)?;
                true
            }
            Removal::Balanced => dirty,
        };
        if dirty {
            self.pager.save(page)?;
        }
        Ok(self.status(page))
    }

    /// Fix the underflowing child `idx` of `parent` by borrowing from a
    /// sibling with slack, or merging with it otherwise
    ///
    /// The right sibling is preferred. `parent` is edited in memory only.
    fn rebalance(&mut self, parent: &mut Page, idx: usize) -> Result<()> {
        let m = self.pager.half_order();
        let mut child = self.pager.load(child_at(parent, idx)?)?;

        if idx < parent.len() {
            let right_offset = child_at(parent, idx + 1)?;
            let mut sibling = self.pager.load(right_offset)?;

            if sibling.len() > m {
                child.entries.push(parent.entries[idx]);
                child.children.push(sibling.children.remove(0));
                parent.entries[idx] = sibling.entries.remove(0);
                self.pager.save(&mut child)?;
                self.pager.save(&mut sibling)?;
                trace!(separator = parent.entries[idx].id, "borrowed from right sibling");
            } else {
                child.entries.push(parent.entries.remove(idx));
                child.entries.append(&mut sibling.entries);
                child.children.append(&mut sibling.children);
                parent.children.remove(idx + 1);
                self.pager.save(&mut child)?;
                debug!(page = ?child.offset, released = ?sibling.offset, "merged with right sibling");
            }
            return Ok(());
        }

        if idx == 0 {
            return Err(StoreError::Corrupted(format!(
                "B-tree page {:?} has a lone child and no entries",
                parent.offset
            )));
        }

        let left_offset = child_at(parent, idx - 1)?;
        let mut sibling = self.pager.load(left_offset)?;
        if sibling.len() > m {
            let borrowed_child = sibling.children.pop();
            let borrowed_entry = sibling.entries.pop();
            let (borrowed_child, borrowed_entry) = match (borrowed_child, borrowed_entry) {
                (Some(c), Some(e)) => (c, e),
                _ => {
                    return Err(StoreError::Corrupted(format!(
                        "B-tree page {:?} lost its entries",
                        sibling.offset
                    )))
                }
            };
            child.entries.insert(0, parent.entries[idx - 1]);
            child.children.insert(0, borrowed_child);
            parent.entries[idx - 1] = borrowed_entry;
            self.pager.save(&mut child)?;
            self.pager.save(&mut sibling)?;
            trace!(separator = borrowed_entry.id, "borrowed from left sibling");
        } else {
            sibling.entries.push(parent.entries.remove(idx - 1));
            sibling.entries.append(&mut child.entries);
            sibling.children.append(&mut child.children);
            parent.children.remove(idx);
            self.pager.save(&mut sibling)?;
            debug!(page = ?sibling.offset, released = ?child.offset, "merged into left sibling");
        }
        Ok(())
    }

    fn status(&self, page: &Page) -> Removal {
        if page.len() < self.pager.half_order() {
            Removal::Underflow
        } else {
            Removal::Balanced
        }
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    fn measure_height(&mut self) -> Result<usize> {
        let mut height = 0;
        let mut current = self.pager.root();
        while let Some(offset) = current {
            height += 1;
            current = child_ptr(self.pager.load(offset)?.children[0]);
        }
        Ok(height)
    }

    fn collect(&mut self, offset: u64, out: &mut Vec<(i32, u64)>) -> Result<()> {
        let page = self.pager.load(offset)?;
        for (idx, entry) in page.entries.iter().enumerate() {
            if let Some(child) = child_ptr(page.children[idx]) {
                self.collect(child, out)?;
            }
            out.push((entry.id, to_offset(entry.position, "record")?));
        }
        if let Some(last) = child_ptr(page.children[page.len()]) {
            self.collect(last, out)?;
        }
        Ok(())
    }

    fn verify_page(
        &mut self,
        offset: u64,
        lower: Option<i32>,
        upper: Option<i32>,
        depth: usize,
        leaf_depth: &mut Option<usize>,
        stats: &mut TreeStats,
    ) -> Result<()> {
        let m = self.pager.half_order();
        let page = self.pager.load(offset)?;
        let corrupt = |what: String| StoreError::Corrupted(format!("page {}: {}", offset, what));

        stats.pages += 1;
        stats.entries += page.len();

        let is_root = depth == 1;
        if page.len() > 2 * m || (!is_root && page.len() < m) || page.is_empty() {
            return Err(corrupt(format!("holds {} entries (m = {})", page.len(), m)));
        }

        for pair in page.entries.windows(2) {
            if pair[0].id >= pair[1].id {
                return Err(corrupt(format!("ids {} and {} out of order", pair[0].id, pair[1].id)));
            }
        }
        let first = page.entries[0].id;
        let last = page.entries[page.len() - 1].id;
        if lower.map_or(false, |lo| first <= lo) || upper.map_or(false, |hi| last >= hi) {
            return Err(corrupt(format!(
                "ids {}..={} escape bracket {:?}..{:?}",
                first, last, lower, upper
            )));
        }

        if page.is_leaf() {
            if page.children.iter().any(|&c| child_ptr(c).is_some()) {
                return Err(corrupt("leaf with a non-null child".to_string()));
            }
            match *leaf_depth {
                None => *leaf_depth = Some(depth),
                Some(d) if d != depth => {
                    return Err(corrupt(format!("leaf at depth {}, expected {}", depth, d)));
                }
                Some(_) => {}
            }
            return Ok(());
        }

        for idx in 0..=page.len() {
            let child = child_ptr(page.children[idx])
                .ok_or_else(|| corrupt(format!("internal page missing child {}", idx)))?;
            let lo = if idx == 0 { lower } else { Some(page.entries[idx - 1].id) };
            let hi = if idx == page.len() { upper } else { Some(page.entries[idx].id) };
            self.verify_page(child, lo, hi, depth + 1, leaf_depth, stats)?;
        }
        Ok(())
    }
}

fn child_at(page: &Page, idx: usize) -> Result<u64> {
    page.children
        .get(idx)
        .copied()
        .and_then(child_ptr)
        .ok_or_else(|| {
            StoreError::Corrupted(format!(
                "B-tree page {:?} has no child at slot {}",
                page.offset, idx
            ))
        })
}

impl Index for BTreeIndex {
    fn search(&mut self, id: i32) -> Result<u64> {
        trace!(id, "B-tree search");
        let result = self.find(id);
        self.pager.release();
        result
    }

    fn insert(&mut self, id: i32, position: u64) -> Result<()> {
        let position = i64::try_from(position).map_err(|_| {
            StoreError::Encoding(format!("position {} does not fit an i64", position))
        })?;
        let result = self.insert_root(Entry { id, position });
        self.pager.release();
        result
    }

    fn delete(&mut self, id: i32) -> Result<()> {
        let result = self.delete_root(id);
        self.pager.release();
        result
    }

    fn destruct(&mut self) -> Result<()> {
        self.pager.reset();
        remove_if_exists(self.pager.path())?;
        debug!(path = %self.pager.path().display(), "B-tree index removed");
        Ok(())
    }

    fn files(&self) -> Vec<PathBuf> {
        vec![self.pager.path().to_path_buf()]
    }

    fn kind(&self) -> IndexKind {
        IndexKind::BTree
    }
}
