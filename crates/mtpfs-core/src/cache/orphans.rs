//! Orphan index backing the `lost+found` directory.

use super::files::FileListCache;
use crate::device::{ObjectId, ParentRef};
use crate::path::eq_ignore_case;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Files whose parent folder is missing from every cached folder tree.
///
/// Rebuilding is a full scan and only happens on request; the index is
/// marked stale whenever a folder tree or the file list is refreshed.
#[derive(Debug)]
pub struct OrphanIndex {
    entries: Vec<(String, ObjectId)>,
    stale: bool,
}

impl Default for OrphanIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl OrphanIndex {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            stale: true,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    /// Recomputes the index in one pass over `files`.
    ///
    /// `known_folders` holds every folder id of every storage area. Files at a
    /// storage root always have a parent.
    pub fn rebuild(&mut self, known_folders: &HashSet<ObjectId>, files: &FileListCache) {
        self.entries.clear();
        for file in files.iter() {
            let ParentRef::Folder(parent) = file.parent else {
                continue;
            };
            if known_folders.contains(&parent) {
                continue;
            }
            match &file.filename {
                Some(name) => self.entries.push((name.clone(), file.id)),
                None => warn!(id = %file.id, "Orphaned file has no filename, skipping"),
            }
        }
        self.stale = false;
        debug!(orphans = self.entries.len(), "Rebuilt orphan index");
    }

    /// First orphan with the given name, ignoring case.
    pub fn lookup(&self, name: &str) -> Option<ObjectId> {
        self.entries
            .iter()
            .find(|(n, _)| eq_ignore_case(n, name))
            .map(|(_, id)| *id)
    }

    /// Orphans in scan order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, ObjectId)> {
        self.entries.iter().map(|(n, id)| (n.as_str(), *id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
