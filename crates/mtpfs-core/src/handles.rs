//! Scratch buffers and the open handle table.
//!
//! Every open file is served from a local scratch buffer (an anonymous
//! temporary file). Handles live in a [`HandleTable`] outside the session
//! lock, and each buffer sits behind its own mutex, so reads and writes on an
//! open handle never wait for device traffic.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicU64, Ordering};

/// Local backing store for file contents.
#[derive(Debug)]
pub struct ScratchBuffer {
    file: File,
}

impl ScratchBuffer {
    /// Creates an empty buffer backed by an unlinked temporary file.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            file: tempfile::tempfile()?,
        })
    }

    /// Reads up to `size` bytes starting at `offset`.
    ///
    /// Returns fewer bytes at end of file and none past it.
    pub fn read_at(&mut self, offset: u64, size: usize) -> io::Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut out = Vec::with_capacity(size.min(1 << 20));
        (&mut self.file).take(size as u64).read_to_end(&mut out)?;
        Ok(out)
    }

    /// Writes all of `data` at `offset`, extending the buffer as needed.
    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<usize> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        Ok(data.len())
    }

    pub fn set_len(&mut self, size: u64) -> io::Result<()> {
        self.file.set_len(size)
    }

    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Whole contents of the buffer.
    pub fn contents(&mut self) -> io::Result<Vec<u8>> {
        self.file.rewind()?;
        let mut out = Vec::new();
        self.file.read_to_end(&mut out)?;
        Ok(out)
    }

    /// Rewinds and returns a reader over the whole buffer.
    pub fn reader(&mut self) -> io::Result<&mut File> {
        self.file.rewind()?;
        Ok(&mut self.file)
    }

    /// Rewinds and returns a writer that replaces the buffer's contents.
    pub fn writer(&mut self) -> io::Result<&mut File> {
        self.file.set_len(0)?;
        self.file.rewind()?;
        Ok(&mut self.file)
    }
}

/// Concurrent map from handle ids to open handle state.
///
/// Ids start at 1; 0 is never issued.
#[derive(Debug)]
pub struct HandleTable<V> {
    handles: DashMap<u64, V>,
    next_id: AtomicU64,
}

impl<V> Default for HandleTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> HandleTable<V> {
    pub fn new() -> Self {
        Self {
            handles: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Inserts a value under a fresh id and returns the id.
    pub fn insert(&self, value: V) -> u64 {
        let mut value = Some(value);
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id == 0 {
                continue;
            }
            if let Entry::Vacant(entry) = self.handles.entry(id) {
                if let Some(value) = value.take() {
                    entry.insert(value);
                }
                return id;
            }
        }
    }

    pub fn remove(&self, id: u64) -> Option<V> {
        self.handles.remove(&id).map(|(_, v)| v)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.handles.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl<V: Clone> HandleTable<V> {
    /// Clones the value out so no map shard stays locked during I/O.
    pub fn get_cloned(&self, id: u64) -> Option<V> {
        self.handles.get(&id).map(|v| v.value().clone())
    }
}
