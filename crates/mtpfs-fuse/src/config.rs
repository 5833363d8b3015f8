//! Mount configuration for the FUSE filesystem.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default time-to-live for attributes and entries handed to the kernel.
pub const DEFAULT_ATTR_TTL: Duration = Duration::from_secs(1);

/// Default file permissions (rw-r--r--).
pub const DEFAULT_FILE_PERM: u16 = 0o644;

/// Default directory permissions (rwxr-xr-x).
pub const DEFAULT_DIR_PERM: u16 = 0o755;

/// Configuration options for the FUSE filesystem.
///
/// Device metadata is cached by the core library; the kernel-side TTL only
/// absorbs bursts of repeated `getattr` calls.
#[derive(Debug, Clone)]
pub struct MountConfig {
    /// Time-to-live for attributes and directory entries.
    pub attr_ttl: Duration,

    /// Owner reported for every entry.
    pub uid: u32,

    /// Group reported for every entry.
    pub gid: u32,

    /// Permission bits reported for files.
    pub file_perm: u16,

    /// Permission bits reported for directories.
    pub dir_perm: u16,

    /// Allow users other than the mounting user to access the mount.
    pub allow_other: bool,

    /// Unmount automatically when the process exits.
    pub auto_unmount: bool,

    /// Filesystem name shown in the mount table.
    pub fs_name: String,
}

impl Default for MountConfig {
    fn default() -> Self {
        // Get current user/group
        let uid = unsafe { libc::getuid() };
        let gid = unsafe { libc::getgid() };
        Self {
            attr_ttl: DEFAULT_ATTR_TTL,
            uid,
            gid,
            file_perm: DEFAULT_FILE_PERM,
            dir_perm: DEFAULT_DIR_PERM,
            allow_other: false,
            auto_unmount: true,
            fs_name: "mtpfs".to_string(),
        }
    }
}

impl MountConfig {
    /// Sets the cache TTL for attributes and entries.
    #[must_use]
    pub fn attr_ttl(mut self, ttl: Duration) -> Self {
        self.attr_ttl = ttl;
        self
    }

    /// Sets the reported owner.
    #[must_use]
    pub fn owner(mut self, uid: u32, gid: u32) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }

    /// Sets the reported permission bits.
    #[must_use]
    pub fn permissions(mut self, file_perm: u16, dir_perm: u16) -> Self {
        self.file_perm = file_perm;
        self.dir_perm = dir_perm;
        self
    }

    #[must_use]
    pub fn allow_other(mut self, allow: bool) -> Self {
        self.allow_other = allow;
        self
    }

    #[must_use]
    pub fn auto_unmount(mut self, enabled: bool) -> Self {
        self.auto_unmount = enabled;
        self
    }

    /// Sets the filesystem name shown in the mount table.
    #[must_use]
    pub fn fs_name(mut self, name: impl Into<String>) -> Self {
        self.fs_name = name.into();
        self
    }
}

/// Default capacity of an emulated storage area, in MiB.
pub const DEFAULT_CAPACITY_MB: u64 = 1024;

/// One storage area of the emulated device, written `NAME[:CAPACITY_MB]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSpec {
    pub name: String,
    pub capacity_bytes: u64,
}

impl FromStr for StorageSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, capacity_mb) = match s.rsplit_once(':') {
            Some((name, mb)) => {
                let mb: u64 = mb
                    .parse()
                    .map_err(|_| format!("invalid capacity '{mb}', expected MiB as an integer"))?;
                (name, mb)
            }
            None => (s, DEFAULT_CAPACITY_MB),
        };
        if name.is_empty() || name.contains('/') {
            return Err(format!("invalid storage name '{name}'"));
        }
        let capacity_bytes = capacity_mb
            .checked_mul(1 << 20)
            .ok_or_else(|| format!("capacity {capacity_mb} MiB is too large"))?;
        Ok(Self {
            name: name.to_string(),
            capacity_bytes,
        })
    }
}

impl fmt::Display for StorageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.capacity_bytes >> 20)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MountConfig::default();
        assert_eq!(config.attr_ttl, Duration::from_secs(1));
        assert_eq!(config.file_perm, 0o644);
        assert_eq!(config.dir_perm, 0o755);
        assert!(!config.allow_other);
        assert!(config.auto_unmount);
        assert_eq!(config.fs_name, "mtpfs");
    }

    #[test]
    fn test_builder_pattern() {
        let config = MountConfig::default()
            .attr_ttl(Duration::from_millis(250))
            .owner(1000, 100)
            .permissions(0o600, 0o700)
            .allow_other(true)
            .auto_unmount(false)
            .fs_name("mtpfs:phone");
        assert_eq!(config.attr_ttl, Duration::from_millis(250));
        assert_eq!((config.uid, config.gid), (1000, 100));
        assert_eq!((config.file_perm, config.dir_perm), (0o600, 0o700));
        assert!(config.allow_other);
        assert!(!config.auto_unmount);
        assert_eq!(config.fs_name, "mtpfs:phone");
    }

    #[test]
    fn test_storage_spec_parsing() {
        let spec: StorageSpec = "Card:64".parse().unwrap();
        assert_eq!(spec.name, "Card");
        assert_eq!(spec.capacity_bytes, 64 << 20);
        assert_eq!(spec.to_string(), "Card:64");

        let spec: StorageSpec = "Internal".parse().unwrap();
        assert_eq!(spec.capacity_bytes, DEFAULT_CAPACITY_MB << 20);

        let spec: StorageSpec = "SD:Card:8".parse().unwrap();
        assert_eq!(spec.name, "SD:Card");
    }

    #[test]
    fn test_storage_spec_rejects_bad_input() {
        assert!("Card:lots".parse::<StorageSpec>().is_err());
        assert!(":64".parse::<StorageSpec>().is_err());
        assert!("a/b:64".parse::<StorageSpec>().is_err());
        assert!(format!("Card:{}", u64::MAX).parse::<StorageSpec>().is_err());
    }
}
