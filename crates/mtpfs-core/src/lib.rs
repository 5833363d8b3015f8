//! Path resolution and metadata caching for media device filesystems.
//!
//! Media devices speaking the media transfer protocol expose a flat object
//! store: every file and folder has a device-wide id and a parent id, and
//! there is no path lookup on the device. This crate mirrors the device's
//! folder trees and file list in memory and maps slash-delimited paths onto
//! those objects, so a filesystem adapter can offer ordinary path operations.
//!
//! # Layout
//!
//! - [`device`]: the [`Device`] trait consumed from a transport, plus the
//!   in-memory [`MemoryDevice`]
//! - [`cache`]: storage area registry, folder tree, file list, orphan and
//!   playlist caches, each refreshed lazily through a dirty flag
//! - [`staged`]: files created locally and not yet transferred
//! - [`resolver`]: the path resolution algorithm
//! - [`session`]: the state guarded by the access lock
//! - [`fs`]: [`MtpFs`], the path-oriented operation set
//!
//! # Example
//!
//! ```
//! use mtpfs_core::{MemoryDevice, MtpFs, OpenMode, ParentRef};
//!
//! let mut device = MemoryDevice::new();
//! let card = device.add_storage("Card", 1 << 30);
//! device.add_folder(card, ParentRef::StorageRoot, "DCIM");
//!
//! let fs = MtpFs::new(device)?;
//! fs.create_file("/Card/DCIM/notes.txt")?;
//! let handle = fs.open("/Card/DCIM/notes.txt", OpenMode::Write)?;
//! fs.write(handle, 0, b"hello")?;
//! fs.release(handle)?;
//!
//! assert_eq!(fs.get_attributes("/Card/DCIM/notes.txt")?.size, 5);
//! # Ok::<(), mtpfs_core::MtpError>(())
//! ```

pub mod cache;
pub mod classify;
pub mod device;
pub mod error;
pub mod fs;
pub mod handles;
pub mod path;
pub mod resolver;
pub mod session;
pub mod staged;

pub use classify::{Classifier, ExtensionClassifier, FileType};
pub use device::{
    Device, DeviceError, FailPoint, FileRecord, FolderNode, MemoryDevice, NewObject, ObjectId,
    ParentRef, Playlist, StorageId, StorageInfo,
};
pub use error::{ErrorCategory, MtpError, MtpResult};
pub use fs::{Attributes, BLOCK_SIZE, DirEntry, EntryKind, FsStats, HandleId, MtpFs, OpenMode};
pub use resolver::{Catalog, Resolved, resolve};
pub use session::Session;
