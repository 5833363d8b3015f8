//! Device protocol boundary.
//!
//! The [`Device`] trait is everything the engine needs from a media device
//! transport: enumeration of storage areas, folders, files and playlists, plus
//! the handful of object transfer and mutation primitives. Implementations are
//! assumed non-reentrant, which is why every method takes `&mut self`; the
//! engine only ever calls them while holding its session lock.
//!
//! Identifiers are tagged. A folder parent is always a [`ParentRef`], so the
//! "storage root" case never shares a representation with a real object id.

pub mod memory;

use crate::classify::FileType;
use std::fmt;
use std::io::{self, Read, Write};
use std::time::SystemTime;
use thiserror::Error;

pub use memory::{FailPoint, FetchCounters, MemoryDevice};

/// Device-assigned identifier of a file, folder or playlist object.
///
/// Unique across the whole device, never reused by the device for the
/// lifetime of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u32);

impl ObjectId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Device-assigned identifier of a storage area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageId(u32);

impl StorageId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StorageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Where an object lives inside its storage area.
///
/// Objects directly under a storage area's root have no parent folder. Since
/// every area shares that root, a `StorageRoot` parent is only meaningful
/// together with the object's storage id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParentRef {
    StorageRoot,
    Folder(ObjectId),
}

impl ParentRef {
    /// The parent folder id, if the parent is a real folder.
    pub fn folder(self) -> Option<ObjectId> {
        match self {
            Self::StorageRoot => None,
            Self::Folder(id) => Some(id),
        }
    }
}

/// One storage partition as reported by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageInfo {
    pub id: StorageId,
    /// Human-readable name, used verbatim as the first path segment.
    pub description: String,
    pub capacity_bytes: u64,
    pub free_bytes: u64,
    pub free_objects: u64,
}

/// A folder and its subtree, as returned by [`Device::fetch_folder_tree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderNode {
    pub id: ObjectId,
    pub name: String,
    pub parent: ParentRef,
    pub storage: StorageId,
    pub children: Vec<FolderNode>,
}

impl FolderNode {
    /// Creates a leaf folder.
    pub fn new(id: ObjectId, name: impl Into<String>, parent: ParentRef, storage: StorageId) -> Self {
        Self {
            id,
            name: name.into(),
            parent,
            storage,
            children: Vec::new(),
        }
    }
}

/// A file object as reported by the device's flat file listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: ObjectId,
    /// Devices occasionally report objects without a name.
    pub filename: Option<String>,
    pub parent: ParentRef,
    pub storage: StorageId,
    pub size: u64,
    pub modified: SystemTime,
}

/// A playlist: an ordered list of file object ids with a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playlist {
    pub id: ObjectId,
    pub name: String,
    pub tracks: Vec<ObjectId>,
}

/// Metadata sent alongside the contents of a new file object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewObject {
    pub filename: String,
    pub size: u64,
    pub file_type: FileType,
    pub parent: ParentRef,
    pub storage: StorageId,
}

/// Failures reported by a device implementation.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// The device refused the request.
    #[error("{operation} rejected by device: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },

    /// The referenced object does not exist on the device.
    #[error("No such object on device: {0}")]
    NoSuchObject(ObjectId),

    /// Moving object data to or from the device failed.
    #[error("Transfer failed: {0}")]
    Transfer(#[from] io::Error),

    /// The device is no longer reachable.
    #[error("Device disconnected")]
    Disconnected,
}

/// Operations the engine consumes from a device transport.
pub trait Device: Send {
    /// Enumerates storage areas with fresh capacity and free-space figures.
    fn list_storage_areas(&mut self) -> Result<Vec<StorageInfo>, DeviceError>;

    /// Fetches the complete folder tree of one storage area.
    ///
    /// Returns the top-level folders; each owns its subfolders.
    fn fetch_folder_tree(&mut self, storage: StorageId) -> Result<Vec<FolderNode>, DeviceError>;

    /// Fetches every file object on the device, across all storage areas.
    fn fetch_all_files(&mut self) -> Result<Vec<FileRecord>, DeviceError>;

    /// Creates a file object from `object.size` bytes of `data`.
    fn create_object_from_buffer(
        &mut self,
        data: &mut dyn Read,
        object: &NewObject,
    ) -> Result<ObjectId, DeviceError>;

    /// Streams the contents of a file object into `out`.
    fn fetch_object_to_buffer(&mut self, id: ObjectId, out: &mut dyn Write) -> Result<(), DeviceError>;

    /// Deletes a file, folder or playlist object.
    fn delete_object(&mut self, id: ObjectId) -> Result<(), DeviceError>;

    /// Creates a folder and returns its new id.
    fn create_folder(
        &mut self,
        name: &str,
        parent: ParentRef,
        storage: StorageId,
    ) -> Result<ObjectId, DeviceError>;

    /// Enumerates playlists.
    fn list_playlists(&mut self) -> Result<Vec<Playlist>, DeviceError>;

    /// Creates a playlist and returns its new id.
    fn create_playlist(&mut self, name: &str, tracks: &[ObjectId]) -> Result<ObjectId, DeviceError>;

    /// Replaces the name and tracks of an existing playlist.
    fn update_playlist(&mut self, id: ObjectId, name: &str, tracks: &[ObjectId]) -> Result<(), DeviceError>;
}

impl<D: Device + ?Sized> Device for Box<D> {
    fn list_storage_areas(&mut self) -> Result<Vec<StorageInfo>, DeviceError> {
        (**self).list_storage_areas()
    }

    fn fetch_folder_tree(&mut self, storage: StorageId) -> Result<Vec<FolderNode>, DeviceError> {
        (**self).fetch_folder_tree(storage)
    }

    fn fetch_all_files(&mut self) -> Result<Vec<FileRecord>, DeviceError> {
        (**self).fetch_all_files()
    }

    fn create_object_from_buffer(
        &mut self,
        data: &mut dyn Read,
        object: &NewObject,
    ) -> Result<ObjectId, DeviceError> {
        (**self).create_object_from_buffer(data, object)
    }

    fn fetch_object_to_buffer(&mut self, id: ObjectId, out: &mut dyn Write) -> Result<(), DeviceError> {
        (**self).fetch_object_to_buffer(id, out)
    }

    fn delete_object(&mut self, id: ObjectId) -> Result<(), DeviceError> {
        (**self).delete_object(id)
    }

    fn create_folder(
        &mut self,
        name: &str,
        parent: ParentRef,
        storage: StorageId,
    ) -> Result<ObjectId, DeviceError> {
        (**self).create_folder(name, parent, storage)
    }

    fn list_playlists(&mut self) -> Result<Vec<Playlist>, DeviceError> {
        (**self).list_playlists()
    }

    fn create_playlist(&mut self, name: &str, tracks: &[ObjectId]) -> Result<ObjectId, DeviceError> {
        (**self).create_playlist(name, tracks)
    }

    fn update_playlist(&mut self, id: ObjectId, name: &str, tracks: &[ObjectId]) -> Result<(), DeviceError> {
        (**self).update_playlist(id, name, tracks)
    }
}
