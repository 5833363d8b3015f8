//! Staged-write table.
//!
//! A staged path exists only locally: it was created through the filesystem
//! but its contents have not been transferred to the device yet. Staged paths
//! shadow any device object at the same path until they are committed or
//! removed. Paths are matched like device names: the storage segment exactly,
//! everything below it ignoring ASCII case.

use crate::error::{MtpError, MtpResult};
use crate::handles::ScratchBuffer;
use crate::path::{case_key, split_parent};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StagedState {
    /// Created, no writer attached.
    Pending,
    /// A writer holds the scratch buffer.
    Open,
}

#[derive(Debug)]
struct StagedEntry {
    /// The path as spelled when it was created.
    path: String,
    state: StagedState,
}

/// Paths created locally and not yet committed to the device.
#[derive(Debug, Default)]
pub struct StagedWriteTable {
    entries: BTreeMap<String, StagedEntry>,
}

impl StagedWriteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new staged path.
    ///
    /// Callers must first check that the path does not resolve to a device
    /// object; this only rejects paths that are already staged under any
    /// spelling.
    pub fn stage(&mut self, path: &str) -> MtpResult<()> {
        let key = case_key(path);
        if self.entries.contains_key(&key) {
            return Err(MtpError::AlreadyExists(path.to_string()));
        }
        self.entries.insert(
            key,
            StagedEntry {
                path: path.to_string(),
                state: StagedState::Pending,
            },
        );
        debug!(path, "Staged new file");
        Ok(())
    }

    pub fn is_staged(&self, path: &str) -> bool {
        self.entries.contains_key(&case_key(path))
    }

    pub fn is_open(&self, path: &str) -> bool {
        self.get(path).is_some_and(|e| e.state == StagedState::Open)
    }

    /// The spelling `path` was staged under.
    pub fn staged_path(&self, path: &str) -> Option<&str> {
        self.get(path).map(|e| e.path.as_str())
    }

    /// Attaches a fresh scratch buffer to a staged path.
    ///
    /// Only one writer may hold a staged path at a time.
    pub fn open_for_write(&mut self, path: &str) -> MtpResult<ScratchBuffer> {
        let entry = self
            .entries
            .get_mut(&case_key(path))
            .ok_or_else(|| MtpError::NotFound(path.to_string()))?;
        if entry.state == StagedState::Open {
            return Err(MtpError::Busy(path.to_string()));
        }
        let buffer = ScratchBuffer::new()?;
        entry.state = StagedState::Open;
        Ok(buffer)
    }

    /// Detaches the writer without committing.
    pub fn close(&mut self, path: &str) {
        if let Some(entry) = self.entries.get_mut(&case_key(path)) {
            entry.state = StagedState::Pending;
        }
    }

    /// Forgets a staged path. Returns whether it was staged.
    pub fn remove(&mut self, path: &str) -> bool {
        self.entries.remove(&case_key(path)).is_some()
    }

    /// Names of staged paths directly inside `dir`, as spelled when staged.
    pub fn children_of(&self, dir: &str) -> impl Iterator<Item = &str> + '_ {
        let dir = case_key(dir);
        self.entries.iter().filter_map(move |(key, entry)| {
            let (parent, _) = split_parent(key);
            (parent == dir).then(|| split_parent(&entry.path).1)
        })
    }

    /// Whether any staged path lies directly inside `dir`.
    pub fn has_children(&self, dir: &str) -> bool {
        self.children_of(dir).next().is_some()
    }

    /// Parent directories of every staged path, as spelled when staged.
    pub fn parents(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|e| split_parent(&e.path).0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get(&self, path: &str) -> Option<&StagedEntry> {
        self.entries.get(&case_key(path))
    }
}
