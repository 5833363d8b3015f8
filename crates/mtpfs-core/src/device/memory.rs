//! In-memory device emulation.
//!
//! [`MemoryDevice`] keeps storage areas, folders, files and playlists in plain
//! maps and implements [`Device`] over them. It backs the test suite and the
//! binary's emulated mode, so it also records how often each enumeration was
//! requested and can be told to fail the next call of a given kind.

use super::{
    Device, DeviceError, FileRecord, FolderNode, NewObject, ObjectId, ParentRef, Playlist,
    StorageId, StorageInfo,
};
use std::collections::{BTreeMap, HashSet};
use std::io::{Read, Write};
use std::time::SystemTime;
use tracing::trace;

/// Object count reported as the free-object ceiling of every storage area.
const OBJECT_CAPACITY: u64 = 65_535;

/// Kinds of device call that can be made to fail once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    StorageList,
    FolderTree,
    FileList,
    PlaylistList,
    CreateObject,
    FetchObject,
    DeleteObject,
    CreateFolder,
    CreatePlaylist,
    UpdatePlaylist,
}

/// Number of calls the device has served, by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchCounters {
    pub storage_lists: u32,
    pub folder_trees: u32,
    pub file_lists: u32,
    pub playlist_lists: u32,
    /// Successful create/delete/update calls of any kind.
    pub mutations: u32,
}

#[derive(Debug, Clone)]
struct StoredFolder {
    name: String,
    parent: ParentRef,
    storage: StorageId,
}

#[derive(Debug, Clone)]
struct StoredFile {
    record: FileRecord,
    data: Vec<u8>,
}

/// A complete in-memory [`Device`].
///
/// Object ids are assigned from one counter shared by files, folders and
/// playlists and are never reused, even after deletion.
#[derive(Debug, Default)]
pub struct MemoryDevice {
    storages: Vec<StorageInfo>,
    folders: BTreeMap<ObjectId, StoredFolder>,
    files: BTreeMap<ObjectId, StoredFile>,
    playlists: BTreeMap<ObjectId, Playlist>,
    next_id: u32,
    failures: HashSet<FailPoint>,
    counters: FetchCounters,
}

impl MemoryDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a storage area and returns its id.
    pub fn add_storage(&mut self, description: impl Into<String>, capacity_bytes: u64) -> StorageId {
        let index = u32::try_from(self.storages.len()).unwrap_or(u32::MAX - 1);
        let id = StorageId::new(((index + 1) << 16) | 1);
        self.storages.push(StorageInfo {
            id,
            description: description.into(),
            capacity_bytes,
            free_bytes: capacity_bytes,
            free_objects: OBJECT_CAPACITY,
        });
        id
    }

    /// Adds a folder. The parent is not validated, so dangling parents can be
    /// modelled.
    pub fn add_folder(&mut self, storage: StorageId, parent: ParentRef, name: impl Into<String>) -> ObjectId {
        let id = self.allocate_id();
        self.folders.insert(
            id,
            StoredFolder {
                name: name.into(),
                parent,
                storage,
            },
        );
        id
    }

    /// Adds a file with the given contents. The parent is not validated, so
    /// orphans can be modelled by pointing at a folder id that does not exist.
    pub fn add_file(
        &mut self,
        storage: StorageId,
        parent: ParentRef,
        name: impl Into<String>,
        data: &[u8],
    ) -> ObjectId {
        self.insert_file(storage, parent, Some(name.into()), data.to_vec())
    }

    /// Adds a file object that reports no filename.
    pub fn add_unnamed_file(&mut self, storage: StorageId, parent: ParentRef, data: &[u8]) -> ObjectId {
        self.insert_file(storage, parent, None, data.to_vec())
    }

    /// Adds a playlist.
    pub fn add_playlist(&mut self, name: impl Into<String>, tracks: &[ObjectId]) -> ObjectId {
        let id = self.allocate_id();
        self.playlists.insert(
            id,
            Playlist {
                id,
                name: name.into(),
                tracks: tracks.to_vec(),
            },
        );
        id
    }

    /// Makes the next call of the given kind fail with [`DeviceError::Rejected`].
    pub fn fail_next(&mut self, point: FailPoint) {
        self.failures.insert(point);
    }

    pub fn counters(&self) -> FetchCounters {
        self.counters
    }

    /// Contents of a file object, if it exists.
    pub fn file_data(&self, id: ObjectId) -> Option<&[u8]> {
        self.files.get(&id).map(|f| f.data.as_slice())
    }

    /// Metadata of a file object, if it exists.
    pub fn file(&self, id: ObjectId) -> Option<&FileRecord> {
        self.files.get(&id).map(|f| &f.record)
    }

    /// Whether a folder object exists.
    pub fn has_folder(&self, id: ObjectId) -> bool {
        self.folders.contains_key(&id)
    }

    /// Finds a folder by exact name, anywhere on the device.
    pub fn folder_named(&self, name: &str) -> Option<ObjectId> {
        self.folders
            .iter()
            .find(|(_, f)| f.name == name)
            .map(|(id, _)| *id)
    }

    pub fn playlist(&self, id: ObjectId) -> Option<&Playlist> {
        self.playlists.get(&id)
    }

    pub fn playlist_named(&self, name: &str) -> Option<&Playlist> {
        self.playlists.values().find(|p| p.name == name)
    }

    /// Number of file objects on the device.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    fn allocate_id(&mut self) -> ObjectId {
        self.next_id += 1;
        ObjectId::new(self.next_id)
    }

    fn insert_file(
        &mut self,
        storage: StorageId,
        parent: ParentRef,
        filename: Option<String>,
        data: Vec<u8>,
    ) -> ObjectId {
        let id = self.allocate_id();
        let record = FileRecord {
            id,
            filename,
            parent,
            storage,
            size: data.len() as u64,
            modified: SystemTime::now(),
        };
        self.files.insert(id, StoredFile { record, data });
        id
    }

    fn check(&mut self, point: FailPoint, operation: &'static str) -> Result<(), DeviceError> {
        if self.failures.remove(&point) {
            trace!(operation, "Injected device failure");
            return Err(DeviceError::Rejected {
                operation,
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn has_storage(&self, storage: StorageId) -> bool {
        self.storages.iter().any(|s| s.id == storage)
    }

    fn parent_exists(&self, parent: ParentRef, storage: StorageId) -> bool {
        match parent {
            ParentRef::StorageRoot => self.has_storage(storage),
            ParentRef::Folder(id) => self
                .folders
                .get(&id)
                .is_some_and(|f| f.storage == storage),
        }
    }

    fn build_subtree(&self, storage: StorageId, parent: ParentRef) -> Vec<FolderNode> {
        self.folders
            .iter()
            .filter(|(_, f)| f.storage == storage && f.parent == parent)
            .map(|(id, f)| FolderNode {
                id: *id,
                name: f.name.clone(),
                parent,
                storage,
                children: self.build_subtree(storage, ParentRef::Folder(*id)),
            })
            .collect()
    }

    fn folder_is_empty(&self, id: ObjectId) -> bool {
        let parent = ParentRef::Folder(id);
        !self.folders.values().any(|f| f.parent == parent)
            && !self.files.values().any(|f| f.record.parent == parent)
    }

    fn ensure_tracks_exist(&self, tracks: &[ObjectId]) -> Result<(), DeviceError> {
        match tracks.iter().find(|t| !self.files.contains_key(t)) {
            Some(missing) => Err(DeviceError::NoSuchObject(*missing)),
            None => Ok(()),
        }
    }
}

impl Device for MemoryDevice {
    fn list_storage_areas(&mut self) -> Result<Vec<StorageInfo>, DeviceError> {
        self.counters.storage_lists += 1;
        self.check(FailPoint::StorageList, "list storage")?;
        let mut areas = self.storages.clone();
        for area in &mut areas {
            let (used, count) = self
                .files
                .values()
                .filter(|f| f.record.storage == area.id)
                .fold((0u64, 0u64), |(bytes, n), f| (bytes + f.record.size, n + 1));
            area.free_bytes = area.capacity_bytes.saturating_sub(used);
            area.free_objects = OBJECT_CAPACITY.saturating_sub(count);
        }
        Ok(areas)
    }

    fn fetch_folder_tree(&mut self, storage: StorageId) -> Result<Vec<FolderNode>, DeviceError> {
        self.counters.folder_trees += 1;
        self.check(FailPoint::FolderTree, "fetch folder tree")?;
        Ok(self.build_subtree(storage, ParentRef::StorageRoot))
    }

    fn fetch_all_files(&mut self) -> Result<Vec<FileRecord>, DeviceError> {
        self.counters.file_lists += 1;
        self.check(FailPoint::FileList, "fetch file list")?;
        Ok(self.files.values().map(|f| f.record.clone()).collect())
    }

    fn create_object_from_buffer(
        &mut self,
        data: &mut dyn Read,
        object: &NewObject,
    ) -> Result<ObjectId, DeviceError> {
        self.check(FailPoint::CreateObject, "create object")?;
        if !self.parent_exists(object.parent, object.storage) {
            return Err(DeviceError::Rejected {
                operation: "create object",
                reason: format!("invalid parent for {}", object.filename),
            });
        }
        let mut contents = Vec::new();
        data.take(object.size).read_to_end(&mut contents)?;
        let id = self.insert_file(
            object.storage,
            object.parent,
            Some(object.filename.clone()),
            contents,
        );
        self.counters.mutations += 1;
        trace!(%id, filename = %object.filename, file_type = ?object.file_type, "Created file object");
        Ok(id)
    }

    fn fetch_object_to_buffer(&mut self, id: ObjectId, out: &mut dyn Write) -> Result<(), DeviceError> {
        self.check(FailPoint::FetchObject, "fetch object")?;
        let file = self.files.get(&id).ok_or(DeviceError::NoSuchObject(id))?;
        out.write_all(&file.data)?;
        Ok(())
    }

    fn delete_object(&mut self, id: ObjectId) -> Result<(), DeviceError> {
        self.check(FailPoint::DeleteObject, "delete object")?;
        if self.files.remove(&id).is_some() || self.playlists.remove(&id).is_some() {
            self.counters.mutations += 1;
            return Ok(());
        }
        if !self.folders.contains_key(&id) {
            return Err(DeviceError::NoSuchObject(id));
        }
        if !self.folder_is_empty(id) {
            return Err(DeviceError::Rejected {
                operation: "delete object",
                reason: format!("folder {id} is not empty"),
            });
        }
        self.folders.remove(&id);
        self.counters.mutations += 1;
        Ok(())
    }

    fn create_folder(
        &mut self,
        name: &str,
        parent: ParentRef,
        storage: StorageId,
    ) -> Result<ObjectId, DeviceError> {
        self.check(FailPoint::CreateFolder, "create folder")?;
        if !self.parent_exists(parent, storage) {
            return Err(DeviceError::Rejected {
                operation: "create folder",
                reason: format!("invalid parent for {name}"),
            });
        }
        let id = self.add_folder(storage, parent, name);
        self.counters.mutations += 1;
        Ok(id)
    }

    fn list_playlists(&mut self) -> Result<Vec<Playlist>, DeviceError> {
        self.counters.playlist_lists += 1;
        self.check(FailPoint::PlaylistList, "list playlists")?;
        Ok(self.playlists.values().cloned().collect())
    }

    fn create_playlist(&mut self, name: &str, tracks: &[ObjectId]) -> Result<ObjectId, DeviceError> {
        self.check(FailPoint::CreatePlaylist, "create playlist")?;
        self.ensure_tracks_exist(tracks)?;
        let id = self.add_playlist(name, tracks);
        self.counters.mutations += 1;
        Ok(id)
    }

    fn update_playlist(&mut self, id: ObjectId, name: &str, tracks: &[ObjectId]) -> Result<(), DeviceError> {
        self.check(FailPoint::UpdatePlaylist, "update playlist")?;
        self.ensure_tracks_exist(tracks)?;
        let playlist = self
            .playlists
            .get_mut(&id)
            .ok_or(DeviceError::NoSuchObject(id))?;
        playlist.name = name.to_string();
        playlist.tracks = tracks.to_vec();
        self.counters.mutations += 1;
        Ok(())
    }
}
