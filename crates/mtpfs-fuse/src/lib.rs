//! FUSE filesystem for media transfer protocol devices.
//!
//! Adapts the path-oriented operation set of `mtpfs-core` onto the kernel's
//! inode-oriented FUSE protocol.
//!
//! # Usage
//!
//! ```ignore
//! use mtpfs_core::{MemoryDevice, MtpFs};
//! use mtpfs_fuse::{MountConfig, MtpFuse, spawn_mount};
//! use std::sync::Arc;
//!
//! let fs = Arc::new(MtpFs::new(device)?);
//! let handle = spawn_mount(MtpFuse::new(fs, MountConfig::default()), mountpoint)?;
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod filesystem;
pub mod inode;

pub use backend::{FuseMountHandle, MountError, is_available, mount_options, spawn_mount};
pub use config::{MountConfig, StorageSpec};
pub use error::{FuseError, FuseResult, ToErrno};
pub use filesystem::{MtpFuse, open_mode};
pub use inode::{InodeEntry, InodeTable, ROOT_INODE};
