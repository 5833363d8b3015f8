//! Device-wide flat file list cache.

use crate::device::{Device, FileRecord, ObjectId, ParentRef, StorageId};
use crate::path::eq_ignore_case;
use tracing::{debug, warn};

/// Lazily refreshed mirror of every file object on the device.
///
/// Records carry their parent and storage area; callers filter. Because every
/// storage area's root is the same [`ParentRef::StorageRoot`], root-level
/// queries must also match the storage id.
#[derive(Debug)]
pub struct FileListCache {
    files: Vec<FileRecord>,
    dirty: bool,
}

impl Default for FileListCache {
    fn default() -> Self {
        Self::new()
    }
}

impl FileListCache {
    /// Creates an empty cache that will fetch on first use.
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            dirty: true,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Refetches the file list if it is known to be stale.
    ///
    /// Returns `true` when a fetch happened. A failed fetch leaves an empty
    /// list behind and still clears the dirty flag.
    pub fn ensure_fresh<D: Device + ?Sized>(&mut self, device: &mut D) -> bool {
        if !self.dirty {
            return false;
        }
        self.files = match device.fetch_all_files() {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "File list refresh failed, treating as empty");
                Vec::new()
            }
        };
        self.dirty = false;
        debug!(count = self.files.len(), "Refreshed file list");
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileRecord> {
        self.files.iter()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, id: ObjectId) -> Option<&FileRecord> {
        self.files.iter().find(|f| f.id == id)
    }

    /// Records directly inside `parent`, including unnamed ones.
    pub fn children(&self, parent: ParentRef, storage: StorageId) -> impl Iterator<Item = &FileRecord> {
        self.files
            .iter()
            .filter(move |f| is_child(f, parent, storage))
    }

    pub fn has_children(&self, parent: ParentRef, storage: StorageId) -> bool {
        self.children(parent, storage).next().is_some()
    }

    /// Finds the first file inside `parent` whose name matches, ignoring case.
    pub fn find_child(&self, parent: ParentRef, storage: StorageId, name: &str) -> Option<&FileRecord> {
        self.children(parent, storage)
            .find(|f| f.filename.as_deref().is_some_and(|n| eq_ignore_case(n, name)))
    }
}

fn is_child(file: &FileRecord, parent: ParentRef, storage: StorageId) -> bool {
    match parent {
        ParentRef::StorageRoot => file.parent == ParentRef::StorageRoot && file.storage == storage,
        ParentRef::Folder(_) => file.parent == parent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{FailPoint, MemoryDevice};

    #[test]
    fn test_root_children_are_scoped_by_storage() {
        let mut dev = MemoryDevice::new();
        let internal = dev.add_storage("Internal", 0);
        let card = dev.add_storage("Card", 0);
        let a = dev.add_file(internal, ParentRef::StorageRoot, "song.mp3", b"");
        let b = dev.add_file(card, ParentRef::StorageRoot, "song.mp3", b"");

        let mut cache = FileListCache::new();
        cache.ensure_fresh(&mut dev);

        assert_eq!(cache.find_child(ParentRef::StorageRoot, internal, "song.mp3").unwrap().id, a);
        assert_eq!(cache.find_child(ParentRef::StorageRoot, card, "SONG.MP3").unwrap().id, b);
        assert_eq!(cache.children(ParentRef::StorageRoot, card).count(), 1);
    }

    #[test]
    fn test_find_child_skips_unnamed_records() {
        let mut dev = MemoryDevice::new();
        let s = dev.add_storage("Internal", 0);
        let dir = dev.add_folder(s, ParentRef::StorageRoot, "Music");
        dev.add_unnamed_file(s, ParentRef::Folder(dir), b"x");
        let named = dev.add_file(s, ParentRef::Folder(dir), "Song.mp3", b"x");

        let mut cache = FileListCache::new();
        cache.ensure_fresh(&mut dev);
        assert_eq!(cache.find_child(ParentRef::Folder(dir), s, "song.mp3").unwrap().id, named);
        assert_eq!(cache.children(ParentRef::Folder(dir), s).count(), 2);
        assert!(cache.has_children(ParentRef::Folder(dir), s));
    }

    #[test]
    fn test_ensure_fresh_is_idempotent() {
        let mut dev = MemoryDevice::new();
        dev.add_storage("Internal", 0);
        let mut cache = FileListCache::new();
        assert!(cache.ensure_fresh(&mut dev));
        assert!(!cache.ensure_fresh(&mut dev));
        assert_eq!(dev.counters().file_lists, 1);
    }

    #[test]
    fn test_failed_refresh_clears_flag() {
        let mut dev = MemoryDevice::new();
        let s = dev.add_storage("Internal", 0);
        dev.add_file(s, ParentRef::StorageRoot, "a", b"");
        dev.fail_next(FailPoint::FileList);

        let mut cache = FileListCache::new();
        assert!(cache.ensure_fresh(&mut dev));
        assert!(cache.is_empty());
        assert!(!cache.is_dirty());
    }
}
