//! Volatile mirrors of device state.
//!
//! Each cache carries a dirty flag and an `ensure_fresh` method that refetches
//! only when the flag is set. Code that mutates the device marks the affected
//! cache dirty; nothing else ever invalidates.

pub mod files;
pub mod folders;
pub mod orphans;
pub mod playlists;
pub mod storage;

pub use files::FileListCache;
pub use folders::{FolderTreeCache, lookup_folder_id};
pub use orphans::OrphanIndex;
pub use playlists::{PlaylistCache, playlist_filename, playlist_name};
pub use storage::{MAX_STORAGE_AREAS, StorageArea, StorageRegistry};
