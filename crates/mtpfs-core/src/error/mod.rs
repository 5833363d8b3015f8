//! Error types for the mtpfs core crate.
//!
//! Every filesystem-facing operation returns [`MtpError`]. Adapters should not
//! match on individual variants to pick an outward signal; they classify the
//! error with [`ErrorCategory`] and convert the category instead, so all
//! frontends report the same condition the same way.

use crate::device::DeviceError;
use std::io;
use thiserror::Error;

/// Errors produced by path resolution and the filesystem operation set.
#[derive(Error, Debug)]
pub enum MtpError {
    /// The path does not resolve to any known entity.
    #[error("No such file or directory: {0}")]
    NotFound(String),

    /// A create operation targeted an occupied path.
    #[error("Path already exists: {0}")]
    AlreadyExists(String),

    /// Directory deletion or rename blocked by its contents.
    #[error("Directory not empty: {0}")]
    NotEmpty(String),

    /// A staged path is already open by another writer.
    #[error("Path is busy: {0}")]
    Busy(String),

    /// The target is not allowed for this operation (e.g. a reserved trash path).
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The operation has no implementation for this kind of entry.
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// A file operation was attempted on a directory.
    #[error("Is a directory: {0}")]
    IsDirectory(String),

    /// A directory operation was attempted on a file.
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// The handle was never issued or has already been released.
    #[error("Invalid handle: {0}")]
    InvalidHandle(u64),

    /// The device protocol reported a failure.
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// A cache invariant did not hold (e.g. a record without a filename).
    #[error("Cache inconsistency: {0}")]
    Inconsistency(String),

    /// Scratch buffer I/O failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for mtpfs operations.
pub type MtpResult<T> = Result<T, MtpError>;

/// Semantic category of an [`MtpError`].
///
/// This is the smallest outward signal set a frontend needs. Internal
/// inconsistencies are folded into [`ErrorCategory::NotFound`] so they never
/// cross the boundary as a distinct condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    NotFound,
    AlreadyExists,
    NotEmpty,
    Busy,
    PermissionDenied,
    NotSupported,
    IsDirectory,
    NotDirectory,
    BadHandle,
    DeviceError,
}

impl ErrorCategory {
    /// Returns a human-readable name for this category.
    pub fn name(self) -> &'static str {
        match self {
            Self::NotFound => "NotFound",
            Self::AlreadyExists => "AlreadyExists",
            Self::NotEmpty => "NotEmpty",
            Self::Busy => "Busy",
            Self::PermissionDenied => "PermissionDenied",
            Self::NotSupported => "NotSupported",
            Self::IsDirectory => "IsDirectory",
            Self::NotDirectory => "NotDirectory",
            Self::BadHandle => "BadHandle",
            Self::DeviceError => "DeviceError",
        }
    }
}

impl From<&MtpError> for ErrorCategory {
    fn from(e: &MtpError) -> Self {
        match e {
            MtpError::NotFound(_) | MtpError::Inconsistency(_) => Self::NotFound,
            MtpError::AlreadyExists(_) => Self::AlreadyExists,
            MtpError::NotEmpty(_) => Self::NotEmpty,
            MtpError::Busy(_) => Self::Busy,
            MtpError::PermissionDenied(_) => Self::PermissionDenied,
            MtpError::NotSupported(_) => Self::NotSupported,
            MtpError::IsDirectory(_) => Self::IsDirectory,
            MtpError::NotADirectory(_) => Self::NotDirectory,
            MtpError::InvalidHandle(_) => Self::BadHandle,
            MtpError::Device(_) | MtpError::Io(_) => Self::DeviceError,
        }
    }
}

impl MtpError {
    /// Shorthand for `ErrorCategory::from(self)`.
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::from(self)
    }
}
