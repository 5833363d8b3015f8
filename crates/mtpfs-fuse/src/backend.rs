//! Mounting the filesystem through fuser.

use crate::{MountConfig, MtpFuse};
use fuser::{BackgroundSession, MountOption};
use mtpfs_core::Device;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;
use thiserror::Error;

/// Timeout for the mount syscall itself.
pub const MOUNT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for graceful session.join() before forcing unmount.
/// The join thread may leak on timeout.
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum MountError {
    #[error("FUSE is not available: {0}")]
    Unavailable(String),

    #[error("Mount failed: {0}")]
    Mount(#[from] io::Error),
}

/// Handle to a FUSE-mounted filesystem.
///
/// Wraps the fuser `BackgroundSession`. Dropping this handle triggers unmount.
pub struct FuseMountHandle {
    session: Option<BackgroundSession>,
    mountpoint: PathBuf,
}

impl FuseMountHandle {
    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    /// Unmounts and waits for the session to finish.
    pub fn unmount(mut self) {
        tracing::info!(mountpoint = %self.mountpoint.display(), "Unmounting FUSE filesystem");
        if let Some(session) = self.session.take() {
            session.join();
        }
        tracing::info!(mountpoint = %self.mountpoint.display(), "FUSE unmount successful");
    }

    /// Force unmount the filesystem using system tools.
    fn force_unmount_impl(&self) {
        #[cfg(target_os = "macos")]
        {
            let _ = std::process::Command::new("umount")
                .arg("-f")
                .arg(&self.mountpoint)
                .output();
        }

        #[cfg(target_os = "linux")]
        {
            let _ = std::process::Command::new("fusermount")
                .args(["-uz"])
                .arg(&self.mountpoint)
                .output();
        }
    }
}

impl Drop for FuseMountHandle {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::debug!("Unmounting FUSE filesystem at {}", self.mountpoint.display());

            let (tx, rx) = mpsc::channel();
            std::thread::spawn(move || {
                session.join();
                let _ = tx.send(());
            });

            match rx.recv_timeout(JOIN_TIMEOUT) {
                Ok(()) => {
                    tracing::debug!("Graceful unmount completed for {}", self.mountpoint.display());
                }
                Err(_) => {
                    tracing::warn!(
                        "session.join() timed out after {:?} for {}, forcing unmount",
                        JOIN_TIMEOUT,
                        self.mountpoint.display()
                    );
                    self.force_unmount_impl();
                }
            }
        }
    }
}

/// Returns true if the platform's FUSE implementation is present.
pub fn is_available() -> bool {
    #[cfg(target_os = "macos")]
    {
        Path::new("/Library/Filesystems/macfuse.fs").exists()
    }
    #[cfg(target_os = "linux")]
    {
        Path::new("/dev/fuse").exists()
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        false
    }
}

fn unavailable_reason() -> String {
    #[cfg(target_os = "macos")]
    {
        "macFUSE is not installed. Download it from https://osxfuse.github.io/".to_string()
    }
    #[cfg(target_os = "linux")]
    {
        "Ensure the fuse kernel module is loaded.".to_string()
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        "FUSE is not supported on this platform.".to_string()
    }
}

/// Translates a [`MountConfig`] into fuser mount options.
pub fn mount_options(config: &MountConfig) -> Vec<MountOption> {
    let mut options = vec![
        MountOption::FSName(config.fs_name.clone()),
        MountOption::Subtype("mtpfs".to_string()),
        MountOption::DefaultPermissions,
    ];
    if config.allow_other {
        options.push(MountOption::AllowOther);
    }
    if config.auto_unmount {
        options.push(MountOption::AutoUnmount);
    }
    #[cfg(target_os = "macos")]
    {
        options.push(MountOption::CUSTOM(format!("volname={}", config.fs_name)));
    }
    options
}

/// Mounts `fs` at `mountpoint` in a background session.
///
/// The mount runs on a separate thread with [`MOUNT_TIMEOUT`], since the
/// mount syscall can block on a stale mount at the same path.
pub fn spawn_mount<D: Device + 'static>(
    fs: MtpFuse<D>,
    mountpoint: &Path,
) -> Result<FuseMountHandle, MountError> {
    if !is_available() {
        return Err(MountError::Unavailable(unavailable_reason()));
    }
    if !mountpoint.exists() {
        std::fs::create_dir_all(mountpoint)?;
    }

    let options = mount_options(fs.config());
    tracing::info!(mountpoint = %mountpoint.display(), ?options, "Starting FUSE mount");

    let target = mountpoint.to_path_buf();
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let result = fuser::spawn_mount2(fs, &target, &options);
        let _ = tx.send(result);
    });

    let session = match rx.recv_timeout(MOUNT_TIMEOUT) {
        Ok(Ok(session)) => session,
        Ok(Err(e)) => return Err(MountError::Mount(e)),
        Err(mpsc::RecvTimeoutError::Timeout) => {
            return Err(MountError::Mount(io::Error::new(
                io::ErrorKind::TimedOut,
                "Mount operation timed out - the mountpoint may be on a stale FUSE mount",
            )));
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            return Err(MountError::Mount(io::Error::other(
                "Mount thread terminated unexpectedly",
            )));
        }
    };

    tracing::info!(mountpoint = %mountpoint.display(), "FUSE mount successful");
    Ok(FuseMountHandle {
        session: Some(session),
        mountpoint: mountpoint.to_path_buf(),
    })
}
