//! Path-oriented filesystem operations over a media device.
//!
//! [`MtpFs`] is what a filesystem adapter talks to. Every operation takes the
//! session lock for its whole duration, including device round-trips, so
//! operations observe a total order. I/O on an open handle's scratch buffer is
//! the exception: it only takes that handle's buffer lock.
//!
//! # Write lifecycle
//!
//! New files are staged: [`create_file`](MtpFs::create_file) registers the
//! path, [`open`](MtpFs::open) binds a scratch buffer, writes land in the
//! buffer, and [`release`](MtpFs::release) transfers the buffer to the device.
//! Release is the only point where a transfer failure becomes visible; the
//! buffered data is discarded either way.
//!
//! Existing device files opened for writing are replaced on release: the new
//! contents are uploaded as a fresh object and the old object is deleted.

use crate::cache::{playlist_filename, playlist_name};
use crate::classify::{Classifier, ExtensionClassifier};
use crate::device::{Device, NewObject, ObjectId, ParentRef, StorageId, StorageInfo};
use crate::error::{MtpError, MtpResult};
use crate::handles::{HandleTable, ScratchBuffer};
use crate::path::{
    LOST_AND_FOUND, PLAYLISTS, basename, depth, is_reserved_trash, normalize, split_parent,
};
use crate::resolver::Resolved;
use crate::session::Session;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;
use tracing::{debug, info, instrument, warn};

/// Block size reported by [`MtpFs::statfs`].
pub const BLOCK_SIZE: u64 = 1024;

/// Identifier of an open file.
pub type HandleId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl DirEntry {
    fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Directory,
        }
    }

    fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
        }
    }
}

/// Metadata of a resolved path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attributes {
    pub kind: EntryKind,
    pub size: u64,
    pub modified: SystemTime,
    /// Device object behind the path, if there is one.
    pub object_id: Option<ObjectId>,
}

/// Capacity figures in [`BLOCK_SIZE`] units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStats {
    pub block_size: u64,
    pub total_blocks: u64,
    pub free_blocks: u64,
    pub available_blocks: u64,
    pub total_files: u64,
    pub free_files: u64,
}

/// How a file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    /// Write, discarding existing contents.
    WriteTruncate,
}

impl OpenMode {
    pub fn is_write(self) -> bool {
        self != Self::Read
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandleKind {
    /// Writer of a staged path; commits on release.
    Staged,
    /// Read-only copy.
    Snapshot,
    /// Writable copy of a device file; replaces it on release if modified.
    Replace(ObjectId),
    /// Writable copy of a playlist; saved on release if modified.
    PlaylistEdit(ObjectId),
}

#[derive(Debug)]
struct OpenFile {
    path: String,
    kind: HandleKind,
    modified: AtomicBool,
    buffer: Mutex<ScratchBuffer>,
}

impl OpenFile {
    fn new(path: String, kind: HandleKind, buffer: ScratchBuffer) -> Self {
        Self {
            path,
            kind,
            modified: AtomicBool::new(false),
            buffer: Mutex::new(buffer),
        }
    }

    fn writable(&self) -> bool {
        self.kind != HandleKind::Snapshot
    }
}

/// Filesystem view of a device.
pub struct MtpFs<D> {
    session: Mutex<Session<D>>,
    handles: HandleTable<Arc<OpenFile>>,
    classifier: Box<dyn Classifier>,
    mounted_at: SystemTime,
}

impl<D: Device> MtpFs<D> {
    /// Enumerates the device's storage areas. Nothing else is fetched until
    /// first use.
    pub fn new(device: D) -> MtpResult<Self> {
        let session = Session::new(device)?;
        info!(storage_areas = session.registry().len(), "Device session opened");
        Ok(Self {
            session: Mutex::new(session),
            handles: HandleTable::new(),
            classifier: Box::new(ExtensionClassifier),
            mounted_at: SystemTime::now(),
        })
    }

    /// Replaces the filename classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: impl Classifier + 'static) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    /// Runs `f` with exclusive access to the session.
    pub fn with_session<R>(&self, f: impl FnOnce(&mut Session<D>) -> R) -> R {
        f(&mut *self.session.lock())
    }

    /// Runs `f` with exclusive access to the device.
    pub fn with_device<R>(&self, f: impl FnOnce(&mut D) -> R) -> R {
        f(self.session.lock().device_mut())
    }

    pub fn resolve(&self, path: &str) -> Resolved {
        self.session.lock().resolve(&normalize(path))
    }

    /// Storage areas with their last known usage figures.
    pub fn storage_areas(&self) -> Vec<StorageInfo> {
        self.session
            .lock()
            .registry()
            .iter()
            .map(|a| a.info.clone())
            .collect()
    }

    /// Number of open handles.
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    #[instrument(level = "debug", skip(self))]
    pub fn list_directory(&self, path: &str) -> MtpResult<Vec<DirEntry>> {
        let path = normalize(path);
        let mut session = self.session.lock();
        match session.resolve(&path) {
            Resolved::Root => {
                let mut entries: Vec<DirEntry> = session
                    .registry()
                    .iter()
                    .map(|a| DirEntry::directory(a.description()))
                    .collect();
                entries.push(DirEntry::directory(LOST_AND_FOUND));
                entries.push(DirEntry::directory(PLAYLISTS));
                Ok(entries)
            }
            Resolved::StorageRoot(area) => Ok(list_container(&mut session, area, ParentRef::StorageRoot, &path)),
            Resolved::Folder { area, id } => Ok(list_container(&mut session, area, ParentRef::Folder(id), &path)),
            Resolved::LostFound => {
                session.ensure_orphans();
                Ok(session.orphans().entries().map(|(name, _)| DirEntry::file(name)).collect())
            }
            Resolved::PlaylistDir => {
                session.refresh_playlists();
                let mut entries: Vec<DirEntry> = session
                    .playlists()
                    .iter()
                    .map(|p| DirEntry::file(playlist_filename(p)))
                    .collect();
                entries.extend(session.staged().children_of(&path).map(DirEntry::file));
                Ok(entries)
            }
            Resolved::TopLevel => Ok(Vec::new()),
            Resolved::File(_) | Resolved::Orphan(_) | Resolved::Playlist(_) | Resolved::Staged => {
                Err(MtpError::NotADirectory(path))
            }
            Resolved::NotFound => Err(MtpError::NotFound(path)),
        }
    }

    #[instrument(level = "debug", skip(self))]
    pub fn get_attributes(&self, path: &str) -> MtpResult<Attributes> {
        let path = normalize(path);
        let mut session = self.session.lock();
        let resolved = session.resolve(&path);
        match resolved {
            Resolved::Staged => Ok(Attributes {
                kind: EntryKind::File,
                size: 0,
                modified: SystemTime::now(),
                object_id: None,
            }),
            Resolved::File(id) | Resolved::Orphan(id) => {
                let record = session
                    .files()
                    .get(id)
                    .ok_or_else(|| inconsistency(&path, id))?;
                Ok(Attributes {
                    kind: EntryKind::File,
                    size: record.size,
                    modified: record.modified,
                    object_id: Some(id),
                })
            }
            Resolved::Playlist(id) => {
                let size = render_playlist(&mut session, id).len() as u64;
                Ok(Attributes {
                    kind: EntryKind::File,
                    size,
                    modified: self.mounted_at,
                    object_id: Some(id),
                })
            }
            Resolved::NotFound => Err(MtpError::NotFound(path)),
            dir => Ok(Attributes {
                kind: EntryKind::Directory,
                size: 0,
                modified: self.mounted_at,
                object_id: match dir {
                    Resolved::Folder { id, .. } => Some(id),
                    _ => None,
                },
            }),
        }
    }

    /// Stages an empty file at `path`. Nothing reaches the device until the
    /// file is opened, written and released.
    #[instrument(level = "debug", skip(self))]
    pub fn create_file(&self, path: &str) -> MtpResult<()> {
        let path = normalize(path);
        if depth(&path) < 2 || is_reserved_trash(&path) {
            return Err(MtpError::PermissionDenied(path));
        }
        let mut session = self.session.lock();
        if session.resolve(&path).is_found() {
            return Err(MtpError::AlreadyExists(path));
        }
        let (parent, name) = split_parent(&path);
        match session.resolve(parent) {
            Resolved::StorageRoot(_) | Resolved::Folder { .. } => {}
            Resolved::PlaylistDir if playlist_name(name).is_some() => {}
            Resolved::PlaylistDir | Resolved::LostFound | Resolved::Root => {
                return Err(MtpError::PermissionDenied(path));
            }
            Resolved::File(_) | Resolved::Orphan(_) | Resolved::Playlist(_) | Resolved::Staged => {
                return Err(MtpError::NotADirectory(parent.to_string()));
            }
            Resolved::TopLevel | Resolved::NotFound => {
                return Err(MtpError::NotFound(parent.to_string()));
            }
        }
        session.staged_mut().stage(&path)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn open(&self, path: &str, mode: OpenMode) -> MtpResult<HandleId> {
        let mut path = normalize(path);
        let mut session = self.session.lock();
        let (kind, buffer) = match session.resolve(&path) {
            Resolved::Staged => {
                let buffer = session.staged_mut().open_for_write(&path)?;
                if let Some(staged) = session.staged().staged_path(&path) {
                    path = staged.to_string();
                }
                (HandleKind::Staged, buffer)
            }
            Resolved::File(id) => {
                let kind = if mode.is_write() {
                    if !session.replacing_mut().insert(id) {
                        return Err(MtpError::Busy(path));
                    }
                    HandleKind::Replace(id)
                } else {
                    HandleKind::Snapshot
                };
                match fetch_to_scratch(&mut session, id, mode) {
                    Ok(buffer) => (kind, buffer),
                    Err(e) => {
                        session.replacing_mut().remove(&id);
                        return Err(e);
                    }
                }
            }
            Resolved::Orphan(id) => {
                if mode.is_write() {
                    return Err(MtpError::PermissionDenied(path));
                }
                (HandleKind::Snapshot, fetch_to_scratch(&mut session, id, mode)?)
            }
            Resolved::Playlist(id) => {
                let mut buffer = ScratchBuffer::new()?;
                if mode != OpenMode::WriteTruncate {
                    let rendered = render_playlist(&mut session, id);
                    buffer.writer()?.write_all(rendered.as_bytes())?;
                }
                let kind = if mode.is_write() {
                    HandleKind::PlaylistEdit(id)
                } else {
                    HandleKind::Snapshot
                };
                (kind, buffer)
            }
            Resolved::NotFound => return Err(MtpError::NotFound(path)),
            _ => return Err(MtpError::IsDirectory(path)),
        };
        drop(session);

        // Truncating opens start from an empty buffer.
        let truncated = mode == OpenMode::WriteTruncate && kind != HandleKind::Snapshot;
        let file = OpenFile::new(path, kind, buffer);
        file.modified.store(truncated, Ordering::Relaxed);
        let handle = self.handles.insert(Arc::new(file));
        debug!(handle, ?kind, "Opened handle");
        Ok(handle)
    }

    pub fn read(&self, handle: HandleId, offset: u64, size: usize) -> MtpResult<Vec<u8>> {
        let file = self.handle(handle)?;
        let data = file.buffer.lock().read_at(offset, size)?;
        Ok(data)
    }

    pub fn write(&self, handle: HandleId, offset: u64, data: &[u8]) -> MtpResult<usize> {
        let file = self.writable_handle(handle)?;
        let written = file.buffer.lock().write_at(offset, data)?;
        file.modified.store(true, Ordering::Relaxed);
        Ok(written)
    }

    pub fn truncate(&self, handle: HandleId, size: u64) -> MtpResult<()> {
        let file = self.writable_handle(handle)?;
        file.buffer.lock().set_len(size)?;
        file.modified.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Current size of an open handle's buffer.
    pub fn handle_size(&self, handle: HandleId) -> MtpResult<u64> {
        let file = self.handle(handle)?;
        let len = file.buffer.lock().len()?;
        Ok(len)
    }

    /// Checks that a handle is open. Data is only transferred on release.
    pub fn flush(&self, handle: HandleId) -> MtpResult<()> {
        self.handle(handle).map(|_| ())
    }

    /// Closes a handle, transferring buffered contents to the device where
    /// the handle's kind calls for it.
    #[instrument(level = "debug", skip(self))]
    pub fn release(&self, handle: HandleId) -> MtpResult<()> {
        let file = self.handles.remove(handle).ok_or(MtpError::InvalidHandle(handle))?;
        let mut buffer = file.buffer.lock();
        let modified = file.modified.load(Ordering::Relaxed);
        let mut session = self.session.lock();
        match file.kind {
            HandleKind::Snapshot => Ok(()),
            HandleKind::Staged => {
                session.staged_mut().remove(&file.path);
                self.commit(&mut session, &file.path, &mut buffer)
            }
            HandleKind::Replace(id) => {
                session.replacing_mut().remove(&id);
                if !modified {
                    return Ok(());
                }
                self.replace(&mut session, id, &file.path, &mut buffer)
            }
            HandleKind::PlaylistEdit(id) => {
                if !modified {
                    return Ok(());
                }
                let name = playlist_name(basename(&file.path))
                    .ok_or_else(|| MtpError::NotFound(file.path.clone()))?
                    .to_string();
                save_playlist(&mut session, Some(id), &name, &mut buffer)
            }
        }
    }

    #[instrument(level = "debug", skip(self))]
    pub fn unlink(&self, path: &str) -> MtpResult<()> {
        let path = normalize(path);
        let mut session = self.session.lock();
        match session.resolve(&path) {
            Resolved::Staged => {
                if session.staged().is_open(&path) {
                    return Err(MtpError::Busy(path));
                }
                session.staged_mut().remove(&path);
                Ok(())
            }
            Resolved::File(id) | Resolved::Orphan(id) => {
                session.device_mut().delete_object(id)?;
                session.mark_files_dirty();
                info!(path, %id, "Deleted file");
                Ok(())
            }
            Resolved::Playlist(id) => {
                session.device_mut().delete_object(id)?;
                session.mark_playlists_dirty();
                info!(path, %id, "Deleted playlist");
                Ok(())
            }
            Resolved::NotFound => Err(MtpError::NotFound(path)),
            _ => Err(MtpError::IsDirectory(path)),
        }
    }

    #[instrument(level = "debug", skip(self))]
    pub fn mkdir(&self, path: &str) -> MtpResult<()> {
        let path = normalize(path);
        if depth(&path) < 2 || is_reserved_trash(&path) {
            return Err(MtpError::PermissionDenied(path));
        }
        let mut session = self.session.lock();
        if session.resolve(&path).is_found() {
            return Err(MtpError::AlreadyExists(path));
        }
        let (parent, name) = split_parent(&path);
        let (area, parent_ref) = container(&mut session, parent)?;
        let storage = storage_id(&session, area, &path)?;
        let id = session.device_mut().create_folder(name, parent_ref, storage)?;
        session.mark_folders_dirty(area);
        info!(path, %id, "Created folder");
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    pub fn rmdir(&self, path: &str) -> MtpResult<()> {
        let path = normalize(path);
        let mut session = self.session.lock();
        match session.resolve(&path) {
            Resolved::Folder { area, id } => {
                if session.folder_has_contents(area, id) {
                    return Err(MtpError::NotEmpty(path));
                }
                session.device_mut().delete_object(id)?;
                session.mark_folders_dirty(area);
                info!(path, %id, "Removed folder");
                Ok(())
            }
            Resolved::File(_) | Resolved::Orphan(_) | Resolved::Playlist(_) | Resolved::Staged => {
                Err(MtpError::NotADirectory(path))
            }
            Resolved::NotFound => Err(MtpError::NotFound(path)),
            _ => Err(MtpError::PermissionDenied(path)),
        }
    }

    /// Renames an empty folder by creating the new folder and deleting the
    /// old one.
    ///
    /// The two steps are not atomic. If the delete fails, both folders stay
    /// visible and the error is returned.
    #[instrument(level = "debug", skip(self))]
    pub fn rename(&self, from: &str, to: &str) -> MtpResult<()> {
        let from = normalize(from);
        let to = normalize(to);
        let mut session = self.session.lock();
        let (area, id) = match session.resolve(&from) {
            Resolved::Folder { area, id } => (area, id),
            Resolved::File(_) | Resolved::Orphan(_) | Resolved::Playlist(_) | Resolved::Staged => {
                return Err(MtpError::NotSupported(format!("rename of file {from}")));
            }
            Resolved::NotFound => return Err(MtpError::NotFound(from)),
            _ => return Err(MtpError::PermissionDenied(from)),
        };
        if session.folder_has_contents(area, id) {
            return Err(MtpError::NotEmpty(from));
        }
        if depth(&to) < 2 || is_reserved_trash(&to) {
            return Err(MtpError::PermissionDenied(to));
        }
        if session.resolve(&to).is_found() {
            return Err(MtpError::AlreadyExists(to));
        }
        let (parent, name) = split_parent(&to);
        let (new_area, parent_ref) = container(&mut session, parent)?;
        let storage = storage_id(&session, new_area, &to)?;

        let new_id = session.device_mut().create_folder(name, parent_ref, storage)?;
        session.mark_folders_dirty(new_area);
        if let Err(e) = session.device_mut().delete_object(id) {
            warn!(from, to, error = %e, "Created new folder but failed to delete the old one");
            session.mark_folders_dirty(area);
            return Err(e.into());
        }
        session.mark_folders_dirty(area);
        info!(from, to, %new_id, "Renamed folder");
        Ok(())
    }

    /// Capacity of the storage area holding `path`, or of all areas together
    /// for paths outside any area.
    #[instrument(level = "debug", skip(self))]
    pub fn statfs(&self, path: &str) -> MtpResult<FsStats> {
        let path = normalize(path);
        let mut session = self.session.lock();
        match session.device_mut().list_storage_areas() {
            Ok(fresh) => session.registry_mut().update_usage(&fresh),
            Err(e) => warn!(error = %e, "Storage usage refresh failed, reporting cached figures"),
        }
        let registry = session.registry();
        let scope: Vec<&StorageInfo> = match registry.storage_area_for(&path) {
            Some(area) => registry.get(area).map(|a| &a.info).into_iter().collect(),
            None => registry.iter().map(|a| &a.info).collect(),
        };
        let capacity: u64 = scope.iter().map(|i| i.capacity_bytes).sum();
        let free: u64 = scope.iter().map(|i| i.free_bytes).sum();
        let free_files: u64 = scope.iter().map(|i| i.free_objects).sum();
        Ok(FsStats {
            block_size: BLOCK_SIZE,
            total_blocks: capacity / BLOCK_SIZE,
            free_blocks: free / BLOCK_SIZE,
            available_blocks: free / BLOCK_SIZE,
            total_files: free_files,
            free_files,
        })
    }

    /// Rebuilds the `lost+found` index from fresh caches.
    pub fn rebuild_lost_found(&self) -> usize {
        let mut session = self.session.lock();
        session.rebuild_orphans();
        session.orphans().len()
    }

    fn handle(&self, handle: HandleId) -> MtpResult<Arc<OpenFile>> {
        self.handles
            .get_cloned(handle)
            .ok_or(MtpError::InvalidHandle(handle))
    }

    fn writable_handle(&self, handle: HandleId) -> MtpResult<Arc<OpenFile>> {
        let file = self.handle(handle)?;
        if !file.writable() {
            return Err(MtpError::PermissionDenied(file.path.clone()));
        }
        Ok(file)
    }

    /// Transfers a staged file's buffer to the device.
    fn commit(&self, session: &mut Session<D>, path: &str, buffer: &mut ScratchBuffer) -> MtpResult<()> {
        let (parent, name) = split_parent(path);
        if session.resolve(parent) == Resolved::PlaylistDir {
            let name = playlist_name(name).ok_or_else(|| MtpError::NotFound(path.to_string()))?;
            return save_playlist(session, None, name, buffer);
        }
        let (area, parent_ref) = container(session, parent)?;
        let storage = storage_id(session, area, path)?;
        self.upload(session, name, parent_ref, storage, buffer)
            .map(|id| info!(path, %id, "Committed staged file"))
            .inspect_err(|e| warn!(path, error = %e, "Commit failed, staged data discarded"))
    }

    /// Uploads new contents for a device file, then deletes the old object.
    fn replace(
        &self,
        session: &mut Session<D>,
        old: ObjectId,
        path: &str,
        buffer: &mut ScratchBuffer,
    ) -> MtpResult<()> {
        session.refresh_files();
        let record = session
            .files()
            .get(old)
            .cloned()
            .ok_or_else(|| MtpError::NotFound(path.to_string()))?;
        let name = record
            .filename
            .clone()
            .ok_or_else(|| inconsistency(path, old))?;
        let new = self.upload(session, &name, record.parent, record.storage, buffer)?;
        session.device_mut().delete_object(old).inspect_err(|e| {
            warn!(path, %old, %new, error = %e, "Uploaded replacement but failed to delete the original");
        })?;
        session.mark_files_dirty();
        info!(path, %old, %new, "Replaced file");
        Ok(())
    }

    fn upload(
        &self,
        session: &mut Session<D>,
        name: &str,
        parent: ParentRef,
        storage: StorageId,
        buffer: &mut ScratchBuffer,
    ) -> MtpResult<ObjectId> {
        let object = NewObject {
            filename: name.to_string(),
            size: buffer.len()?,
            file_type: self.classifier.classify(name),
            parent,
            storage,
        };
        let reader = buffer.reader()?;
        let id = session.device_mut().create_object_from_buffer(reader, &object)?;
        session.mark_files_dirty();
        Ok(id)
    }
}

fn list_container<D: Device>(session: &mut Session<D>, area: usize, parent: ParentRef, path: &str) -> Vec<DirEntry> {
    session.refresh_folders(area);
    session.refresh_files();
    let Some(storage) = session.registry().get(area) else {
        return Vec::new();
    };
    let mut entries: Vec<DirEntry> = storage
        .folders
        .children_of(parent)
        .iter()
        .map(|f| DirEntry::directory(f.name.clone()))
        .collect();
    for record in session.files().children(parent, storage.id()) {
        match &record.filename {
            Some(name) => entries.push(DirEntry::file(name.clone())),
            None => warn!(id = %record.id, path, "Skipping file without a name"),
        }
    }
    entries.extend(session.staged().children_of(path).map(DirEntry::file));
    entries
}

/// Resolves a directory that can hold new files and folders.
fn container<D: Device>(session: &mut Session<D>, dir: &str) -> MtpResult<(usize, ParentRef)> {
    let resolved = session.resolve(dir);
    if let Some(found) = resolved.as_container() {
        return Ok(found);
    }
    Err(match resolved {
        Resolved::Root | Resolved::LostFound | Resolved::PlaylistDir => MtpError::PermissionDenied(dir.to_string()),
        Resolved::File(_) | Resolved::Orphan(_) | Resolved::Playlist(_) | Resolved::Staged => {
            MtpError::NotADirectory(dir.to_string())
        }
        _ => MtpError::NotFound(dir.to_string()),
    })
}

fn storage_id<D: Device>(session: &Session<D>, area: usize, path: &str) -> MtpResult<StorageId> {
    session
        .registry()
        .get(area)
        .map(|a| a.id())
        .ok_or_else(|| MtpError::Inconsistency(format!("no storage area {area} for {path}")))
}

fn inconsistency(path: &str, id: ObjectId) -> MtpError {
    warn!(path, %id, "Resolved object missing from cache");
    MtpError::Inconsistency(format!("object {id} for {path} missing from cache"))
}

fn fetch_to_scratch<D: Device>(session: &mut Session<D>, id: ObjectId, mode: OpenMode) -> MtpResult<ScratchBuffer> {
    let mut buffer = ScratchBuffer::new()?;
    if mode == OpenMode::WriteTruncate {
        return Ok(buffer);
    }
    session
        .device_mut()
        .fetch_object_to_buffer(id, buffer.writer()?)?;
    Ok(buffer)
}

/// One absolute mount path per track, newline terminated. Tracks whose path
/// cannot be built are left out.
fn render_playlist<D: Device>(session: &mut Session<D>, id: ObjectId) -> String {
    session.refresh_playlists();
    let tracks = session
        .playlists()
        .get(id)
        .map(|p| p.tracks.clone())
        .unwrap_or_default();
    let mut out = String::new();
    for track in tracks {
        match session.path_of_file(track) {
            Some(path) => {
                out.push_str(&path);
                out.push('\n');
            }
            None => debug!(%id, %track, "Playlist track has no path, skipping"),
        }
    }
    out
}

/// Parses m3u contents and stores them as the playlist `name`.
///
/// Lines that are blank, comments, or do not resolve to a device file are
/// skipped. Without an explicit id, an existing playlist of the same name is
/// updated; otherwise a new one is created.
fn save_playlist<D: Device>(
    session: &mut Session<D>,
    id: Option<ObjectId>,
    name: &str,
    buffer: &mut ScratchBuffer,
) -> MtpResult<()> {
    let contents = buffer.contents()?;
    let text = String::from_utf8_lossy(&contents);
    let mut tracks = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match session.resolve(&normalize(line)) {
            Resolved::File(track) => tracks.push(track),
            other => debug!(line, ?other, "Playlist entry is not a device file, skipping"),
        }
    }

    session.refresh_playlists();
    let existing = id.or_else(|| session.playlists().find_by_name(name).map(|p| p.id));
    let result = match existing {
        Some(existing) => session.device_mut().update_playlist(existing, name, &tracks),
        None => session.device_mut().create_playlist(name, &tracks).map(|_| ()),
    };
    session.mark_playlists_dirty();
    result?;
    info!(name, tracks = tracks.len(), "Saved playlist");
    Ok(())
}
