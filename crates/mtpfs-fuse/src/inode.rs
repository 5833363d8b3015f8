//! Inode management for the FUSE filesystem.
//!
//! The core library is path-oriented; the kernel speaks inodes. This table
//! assigns a stable inode number to every mount path the kernel has seen and
//! tracks the kernel's lookup count so entries can be dropped on `forget`.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// The root inode number (FUSE convention).
pub const ROOT_INODE: u64 = 1;

/// An entry in the inode table.
#[derive(Debug)]
pub struct InodeEntry {
    /// Mount path, absolute and normalized.
    pub path: String,
    /// Lookup count for proper `forget()` handling.
    nlookup: AtomicU64,
}

impl InodeEntry {
    fn new(path: String, nlookup: u64) -> Self {
        Self {
            path,
            nlookup: AtomicU64::new(nlookup),
        }
    }

    /// Increments the lookup count and returns the new value.
    pub fn inc_nlookup(&self) -> u64 {
        self.nlookup.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Decrements the lookup count by `count` and returns the new value.
    /// Returns `None` if the count would go negative.
    pub fn dec_nlookup(&self, count: u64) -> Option<u64> {
        let old = self.nlookup.fetch_sub(count, Ordering::AcqRel);
        if old < count {
            self.nlookup.fetch_add(count, Ordering::Relaxed);
            None
        } else {
            Some(old - count)
        }
    }

    pub fn nlookup(&self) -> u64 {
        self.nlookup.load(Ordering::Relaxed)
    }
}

/// Thread-safe bidirectional map between inodes and mount paths.
pub struct InodeTable {
    path_to_inode: DashMap<String, u64>,
    entries: DashMap<u64, InodeEntry>,
    next_inode: AtomicU64,
}

impl InodeTable {
    /// Creates a table with the root directory pre-allocated.
    pub fn new() -> Self {
        let table = Self {
            path_to_inode: DashMap::new(),
            entries: DashMap::new(),
            next_inode: AtomicU64::new(ROOT_INODE + 1),
        };
        table.path_to_inode.insert("/".to_string(), ROOT_INODE);
        table.entries.insert(ROOT_INODE, InodeEntry::new("/".to_string(), 1));
        table
    }

    /// Returns the inode for `path`, allocating one if needed, and counts a
    /// kernel lookup against it.
    pub fn get_or_insert(&self, path: &str) -> u64 {
        let inode = self.get_or_insert_no_lookup_inc(path);
        if let Some(entry) = self.entries.get(&inode) {
            entry.inc_nlookup();
        }
        inode
    }

    /// Returns the inode for `path` without touching its lookup count.
    ///
    /// Entries returned from `readdir()` must not count as lookups.
    pub fn get_or_insert_no_lookup_inc(&self, path: &str) -> u64 {
        if let Some(inode) = self.path_to_inode.get(path) {
            return *inode;
        }
        // Entry API avoids allocating two inodes for one path under a race.
        *self
            .path_to_inode
            .entry(path.to_string())
            .or_insert_with(|| {
                let inode = self.next_inode.fetch_add(1, Ordering::Relaxed);
                self.entries.insert(inode, InodeEntry::new(path.to_string(), 0));
                inode
            })
    }

    /// Path of an inode.
    pub fn path(&self, inode: u64) -> Option<String> {
        self.entries.get(&inode).map(|e| e.path.clone())
    }

    /// Inode of a path, if one was allocated.
    pub fn get_inode(&self, path: &str) -> Option<u64> {
        self.path_to_inode.get(path).map(|r| *r)
    }

    pub fn nlookup(&self, inode: u64) -> Option<u64> {
        self.entries.get(&inode).map(|e| e.nlookup())
    }

    /// Decrements the lookup count for an inode and evicts it at zero.
    /// Returns `true` if the inode was evicted.
    pub fn forget(&self, inode: u64, nlookup: u64) -> bool {
        if inode == ROOT_INODE {
            return false;
        }
        if let Some(entry) = self.entries.get(&inode)
            && let Some(remaining) = entry.dec_nlookup(nlookup)
            && remaining == 0
        {
            drop(entry);
            return self.evict(inode);
        }
        false
    }

    fn evict(&self, inode: u64) -> bool {
        let Some((_, entry)) = self.entries.remove(&inode) else {
            return false;
        };
        // The path may already point at a newer inode after an invalidation.
        self.path_to_inode
            .remove_if(&entry.path, |_, mapped| *mapped == inode);
        true
    }

    /// Detaches `path` from its inode after a delete or rename.
    ///
    /// The inode entry itself stays until the kernel forgets it, since the
    /// kernel may still pass the number in later requests. A later lookup of
    /// the same path gets a fresh inode.
    pub fn invalidate_path(&self, path: &str) {
        self.path_to_inode.remove(path);
    }

    /// Number of inodes, root included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if only the root inode is present.
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}
