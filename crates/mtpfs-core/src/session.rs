//! Session state guarded by the access lock.
//!
//! A [`Session`] owns the device and every cache. [`crate::MtpFs`] keeps it
//! behind a single mutex, so a session method always runs with exclusive
//! access to both the caches and the device.

use crate::cache::{FileListCache, OrphanIndex, PlaylistCache, StorageRegistry};
use crate::device::{Device, DeviceError, ObjectId, ParentRef};
use crate::path::case_key;
use crate::resolver::{self, Catalog, Resolved};
use crate::staged::StagedWriteTable;
use std::collections::HashSet;
use tracing::debug;

/// The device together with its cached mirror and the staged-write table.
#[derive(Debug)]
pub struct Session<D> {
    device: D,
    registry: StorageRegistry,
    files: FileListCache,
    orphans: OrphanIndex,
    playlists: PlaylistCache,
    staged: StagedWriteTable,
    /// Device files currently open for in-place replacement.
    replacing: HashSet<ObjectId>,
}

impl<D: Device> Session<D> {
    /// Enumerates the device's storage areas. All caches start dirty.
    pub fn new(mut device: D) -> Result<Self, DeviceError> {
        let registry = StorageRegistry::load(&mut device)?;
        Ok(Self {
            device,
            registry,
            files: FileListCache::new(),
            orphans: OrphanIndex::new(),
            playlists: PlaylistCache::new(),
            staged: StagedWriteTable::new(),
            replacing: HashSet::new(),
        })
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn registry(&self) -> &StorageRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut StorageRegistry {
        &mut self.registry
    }

    pub fn files(&self) -> &FileListCache {
        &self.files
    }

    pub fn orphans(&self) -> &OrphanIndex {
        &self.orphans
    }

    pub fn playlists(&self) -> &PlaylistCache {
        &self.playlists
    }

    pub fn staged(&self) -> &StagedWriteTable {
        &self.staged
    }

    pub fn staged_mut(&mut self) -> &mut StagedWriteTable {
        &mut self.staged
    }

    pub(crate) fn replacing_mut(&mut self) -> &mut HashSet<ObjectId> {
        &mut self.replacing
    }

    pub fn resolve(&mut self, path: &str) -> Resolved {
        resolver::resolve(self, path)
    }

    /// Refreshes one area's folder tree if it is dirty.
    pub fn refresh_folders(&mut self, area: usize) {
        if let Some(storage) = self.registry.get_mut(area)
            && storage.folders.ensure_fresh(&mut self.device)
        {
            self.orphans.mark_stale();
        }
    }

    /// Refreshes the file list if it is dirty.
    pub fn refresh_files(&mut self) {
        if self.files.ensure_fresh(&mut self.device) {
            self.orphans.mark_stale();
        }
    }

    pub fn refresh_playlists(&mut self) {
        self.playlists.ensure_fresh(&mut self.device);
    }

    pub fn mark_folders_dirty(&mut self, area: usize) {
        if let Some(storage) = self.registry.get_mut(area) {
            storage.folders.mark_dirty();
        }
    }

    pub fn mark_files_dirty(&mut self) {
        self.files.mark_dirty();
    }

    pub fn mark_playlists_dirty(&mut self) {
        self.playlists.mark_dirty();
    }

    pub fn folders_dirty(&self, area: usize) -> bool {
        self.registry.get(area).is_some_and(|a| a.folders.is_dirty())
    }

    pub fn files_dirty(&self) -> bool {
        self.files.is_dirty()
    }

    /// Brings every cache up to date and rebuilds the orphan index if any
    /// refresh happened since the last rebuild.
    pub fn ensure_orphans(&mut self) {
        for area in 0..self.registry.len() {
            self.refresh_folders(area);
        }
        self.refresh_files();
        if self.orphans.is_stale() {
            self.rebuild_orphans_now();
        }
    }

    /// Rebuilds the orphan index unconditionally.
    pub fn rebuild_orphans(&mut self) {
        for area in 0..self.registry.len() {
            self.refresh_folders(area);
        }
        self.refresh_files();
        self.rebuild_orphans_now();
    }

    fn rebuild_orphans_now(&mut self) {
        let known: HashSet<ObjectId> = self
            .registry
            .iter()
            .flat_map(|area| area.folders.ids())
            .collect();
        self.orphans.rebuild(&known, &self.files);
    }

    /// Whether a folder has subfolders, files or staged entries.
    ///
    /// Staged entries count when their parent directory resolves to this
    /// folder, whatever spelling they were created under.
    pub fn folder_has_contents(&mut self, area: usize, id: ObjectId) -> bool {
        self.refresh_folders(area);
        self.refresh_files();
        let parent = ParentRef::Folder(id);
        let Some(storage) = self.registry.get(area) else {
            return false;
        };
        if !storage.folders.children_of(parent).is_empty() || self.files.has_children(parent, storage.id()) {
            return true;
        }
        let staged_parents: HashSet<String> = self.staged.parents().map(case_key).collect();
        staged_parents
            .iter()
            .any(|dir| self.resolve(dir) == Resolved::Folder { area, id })
    }

    /// Absolute mount path of a file object, built from the cached trees.
    ///
    /// Returns `None` for orphans and unknown ids.
    pub fn path_of_file(&mut self, id: ObjectId) -> Option<String> {
        self.refresh_files();
        let record = self.files.get(id)?.clone();
        let name = record.filename?;
        let area = self.registry.index_of(record.storage)?;
        self.refresh_folders(area);
        let storage = self.registry.get(area)?;

        let mut names = vec![name];
        let mut parent = record.parent;
        while let ParentRef::Folder(folder_id) = parent {
            let node = storage.folders.find_by_id(folder_id)?;
            names.push(node.name.clone());
            parent = node.parent;
        }
        names.push(storage.description().to_string());
        names.reverse();
        let path = format!("/{}", names.join("/"));
        debug!(%id, path, "Built path for file");
        Some(path)
    }
}

impl<D: Device> Catalog for Session<D> {
    fn is_staged(&self, path: &str) -> bool {
        self.staged.is_staged(path)
    }

    fn storage_area_named(&self, name: &str) -> Option<usize> {
        self.registry.by_description(name)
    }

    fn folder_lookup(&mut self, area: usize, segments: &[&str]) -> Option<ParentRef> {
        self.refresh_folders(area);
        self.registry
            .get(area)?
            .folders
            .lookup(segments.iter().copied())
    }

    fn file_lookup(&mut self, area: usize, parent: ParentRef, name: &str) -> Option<ObjectId> {
        self.refresh_files();
        let storage = self.registry.get(area)?.id();
        self.files.find_child(parent, storage, name).map(|f| f.id)
    }

    fn orphan_lookup(&mut self, name: &str) -> Option<ObjectId> {
        self.ensure_orphans();
        self.orphans.lookup(name)
    }

    fn playlist_lookup(&mut self, filename: &str) -> Option<ObjectId> {
        self.refresh_playlists();
        self.playlists.find_by_filename(filename).map(|p| p.id)
    }
}
