//! Error handling and mapping for the FUSE filesystem.
//!
//! Core errors are classified through [`ErrorCategory`] and each category maps
//! to exactly one POSIX error code, so every operation reports the same errno
//! for the same condition.

use mtpfs_core::{ErrorCategory, MtpError};
use std::io;
use thiserror::Error;

/// FUSE-specific errors that can occur during filesystem operations.
#[derive(Debug, Error)]
pub enum FuseError {
    /// Error from the path-oriented operation set.
    #[error(transparent)]
    Mtp(#[from] MtpError),

    /// Inode unknown to the inode table.
    #[error("Invalid inode: {0}")]
    InvalidInode(u64),

    /// Name that is not valid UTF-8 or contains a separator.
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// Negative offset passed by the kernel.
    #[error("Invalid offset: {0}")]
    InvalidOffset(i64),
}

impl FuseError {
    /// Converts this error to a libc error code for FUSE.
    pub fn to_errno(&self) -> i32 {
        match self {
            FuseError::Mtp(e) => e.to_errno(),
            FuseError::InvalidInode(_) => libc::ENOENT,
            FuseError::InvalidName(_) | FuseError::InvalidOffset(_) => libc::EINVAL,
        }
    }
}

/// Result type for FUSE operations.
pub type FuseResult<T> = Result<T, FuseError>;

/// Extension trait to convert errors to errno.
pub trait ToErrno {
    /// Converts this error to a libc error code.
    fn to_errno(&self) -> i32;
}

impl ToErrno for ErrorCategory {
    fn to_errno(&self) -> i32 {
        match self {
            ErrorCategory::NotFound => libc::ENOENT,
            ErrorCategory::AlreadyExists => libc::EEXIST,
            ErrorCategory::NotEmpty => libc::ENOTEMPTY,
            ErrorCategory::Busy => libc::EBUSY,
            ErrorCategory::PermissionDenied => libc::EACCES,
            ErrorCategory::NotSupported => libc::ENOTSUP,
            ErrorCategory::IsDirectory => libc::EISDIR,
            ErrorCategory::NotDirectory => libc::ENOTDIR,
            ErrorCategory::BadHandle => libc::EBADF,
            ErrorCategory::DeviceError => libc::EIO,
        }
    }
}

impl ToErrno for MtpError {
    fn to_errno(&self) -> i32 {
        // Raw OS errors from scratch-buffer I/O keep their own code.
        if let MtpError::Io(e) = self
            && let Some(code) = e.raw_os_error()
        {
            return code;
        }
        self.category().to_errno()
    }
}

impl ToErrno for FuseError {
    fn to_errno(&self) -> i32 {
        FuseError::to_errno(self)
    }
}

impl ToErrno for io::Error {
    fn to_errno(&self) -> i32 {
        self.raw_os_error().unwrap_or(libc::EIO)
    }
}
