//! FUSE filesystem implementation for media devices.
//!
//! Implements the fuser `Filesystem` trait on top of [`MtpFs`]. Every callback
//! translates its inode arguments to mount paths through the [`InodeTable`],
//! runs the matching path-oriented operation and maps failures to errno.
//!
//! | Operation | Notes |
//! |-----------|-------|
//! | lookup | Increments nlookup via `get_or_insert` |
//! | forget/batch_forget | Decrements nlookup, evicts at 0 |
//! | getattr | Reports the open buffer's size when a handle is given |
//! | setattr | Size changes only; other attributes are accepted and ignored |
//! | open/release | Release is where staged data reaches the device |
//! | readdir | Uses `get_or_insert_no_lookup_inc` |
//! | create | Stages the file and opens it for writing |
//! | rename | Empty folders only |

use crate::config::MountConfig;
use crate::error::{FuseError, FuseResult, ToErrno};
use crate::inode::{InodeTable, ROOT_INODE};
use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request,
    TimeOrNow,
};
use libc::c_int;
use mtpfs_core::path::{join, split_parent};
use mtpfs_core::{Attributes, BLOCK_SIZE, Device, EntryKind, MtpFs, OpenMode};
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, trace, warn};

/// Maximum filename length reported by `statfs`.
const MAX_NAME_LEN: u32 = 255;

/// FUSE filesystem for a media device.
pub struct MtpFuse<D> {
    fs: Arc<MtpFs<D>>,
    inodes: InodeTable,
    config: MountConfig,
}

impl<D: Device> MtpFuse<D> {
    pub fn new(fs: Arc<MtpFs<D>>, config: MountConfig) -> Self {
        Self {
            fs,
            inodes: InodeTable::new(),
            config,
        }
    }

    /// The wrapped operation set.
    pub fn fs(&self) -> &Arc<MtpFs<D>> {
        &self.fs
    }

    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    pub fn inodes(&self) -> &InodeTable {
        &self.inodes
    }

    fn path_of(&self, inode: u64) -> FuseResult<String> {
        self.inodes.path(inode).ok_or(FuseError::InvalidInode(inode))
    }

    fn child_path(&self, parent: u64, name: &OsStr) -> FuseResult<String> {
        let name = name
            .to_str()
            .ok_or_else(|| FuseError::InvalidName(name.to_string_lossy().into_owned()))?;
        if name.is_empty() || name.contains('/') {
            return Err(FuseError::InvalidName(name.to_string()));
        }
        Ok(join(&self.path_of(parent)?, name))
    }

    /// Builds the kernel attributes for a resolved path.
    pub fn make_attr(&self, inode: u64, attrs: &Attributes) -> FileAttr {
        let blksize = u32::try_from(BLOCK_SIZE).unwrap_or(u32::MAX);
        let (kind, perm, nlink, blocks) = match attrs.kind {
            EntryKind::Directory => (FileType::Directory, self.config.dir_perm, 2, 0),
            EntryKind::File => (
                FileType::RegularFile,
                self.config.file_perm,
                1,
                attrs.size.div_ceil(BLOCK_SIZE),
            ),
        };
        FileAttr {
            ino: inode,
            size: attrs.size,
            blocks,
            atime: attrs.modified,
            mtime: attrs.modified,
            ctime: attrs.modified,
            crtime: attrs.modified,
            kind,
            perm,
            nlink,
            uid: self.config.uid,
            gid: self.config.gid,
            rdev: 0,
            blksize,
            flags: 0,
        }
    }

    /// Attributes of `path`, with the size taken from `fh` when the kernel
    /// names an open handle.
    fn attr_for(&self, inode: u64, path: &str, fh: Option<u64>) -> FuseResult<FileAttr> {
        let mut attrs = self.fs.get_attributes(path)?;
        if let Some(fh) = fh
            && attrs.kind == EntryKind::File
            && let Ok(size) = self.fs.handle_size(fh)
        {
            attrs.size = size;
        }
        Ok(self.make_attr(inode, &attrs))
    }

    fn lookup_child(&self, parent: u64, name: &OsStr) -> FuseResult<FileAttr> {
        let path = self.child_path(parent, name)?;
        let attrs = self.fs.get_attributes(&path)?;
        let inode = self.inodes.get_or_insert(&path);
        Ok(self.make_attr(inode, &attrs))
    }

    fn resize(&self, path: &str, size: u64, fh: Option<u64>) -> FuseResult<()> {
        if let Some(fh) = fh {
            return Ok(self.fs.truncate(fh, size)?);
        }
        let mode = if size == 0 {
            OpenMode::WriteTruncate
        } else {
            OpenMode::Write
        };
        let handle = self.fs.open(path, mode)?;
        if size != 0
            && let Err(e) = self.fs.truncate(handle, size)
        {
            let _ = self.fs.release(handle);
            return Err(e.into());
        }
        Ok(self.fs.release(handle)?)
    }

    fn list(&self, inode: u64) -> FuseResult<Vec<(u64, FileType, String)>> {
        let path = self.path_of(inode)?;
        let entries = self.fs.list_directory(&path)?;
        let parent_inode = if inode == ROOT_INODE {
            ROOT_INODE
        } else {
            let (parent, _) = split_parent(&path);
            self.inodes.get_or_insert_no_lookup_inc(parent)
        };

        let mut listing = Vec::with_capacity(entries.len() + 2);
        listing.push((inode, FileType::Directory, ".".to_string()));
        listing.push((parent_inode, FileType::Directory, "..".to_string()));
        for entry in entries {
            let child = self.inodes.get_or_insert_no_lookup_inc(&join(&path, &entry.name));
            let kind = match entry.kind {
                EntryKind::Directory => FileType::Directory,
                EntryKind::File => FileType::RegularFile,
            };
            listing.push((child, kind, entry.name));
        }
        Ok(listing)
    }
}

/// Maps kernel open flags onto an [`OpenMode`].
pub fn open_mode(flags: i32) -> OpenMode {
    if flags & libc::O_ACCMODE == libc::O_RDONLY {
        OpenMode::Read
    } else if flags & libc::O_TRUNC != 0 {
        OpenMode::WriteTruncate
    } else {
        OpenMode::Write
    }
}

fn offset(offset: i64) -> FuseResult<u64> {
    u64::try_from(offset).map_err(|_| FuseError::InvalidOffset(offset))
}

impl<D: Device + 'static> Filesystem for MtpFuse<D> {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        info!(storage_areas = self.fs.storage_areas().len(), "FUSE filesystem initialized");
        Ok(())
    }

    fn destroy(&mut self) {
        let open = self.fs.open_handles();
        if open > 0 {
            warn!(open, "Unmounting with open handles, their data is discarded");
        }
        info!("FUSE filesystem destroyed");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        trace!(parent, ?name, "lookup");
        match self.lookup_child(parent, name) {
            Ok(attr) => reply.entry(&self.config.attr_ttl, &attr, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        trace!(inode = ino, nlookup, "forget");
        self.inodes.forget(ino, nlookup);
    }

    fn batch_forget(&mut self, _req: &Request<'_>, nodes: &[fuser::fuse_forget_one]) {
        trace!(count = nodes.len(), "batch_forget");
        for node in nodes {
            self.inodes.forget(node.nodeid, node.nlookup);
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, fh: Option<u64>, reply: ReplyAttr) {
        trace!(inode = ino, ?fh, "getattr");
        let result = self
            .path_of(ino)
            .and_then(|path| self.attr_for(ino, &path, fh));
        match result {
            Ok(attr) => reply.attr(&self.config.attr_ttl, &attr),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        trace!(inode = ino, ?size, ?fh, "setattr");
        let result = self.path_of(ino).and_then(|path| {
            if let Some(size) = size {
                self.resize(&path, size, fh)?;
            }
            self.attr_for(ino, &path, fh)
        });
        match result {
            Ok(attr) => reply.attr(&self.config.attr_ttl, &attr),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let mode = open_mode(flags);
        trace!(inode = ino, ?mode, "open");
        let result = self
            .path_of(ino)
            .and_then(|path| Ok(self.fs.open(&path, mode)?));
        match result {
            Ok(fh) => reply.opened(fh, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset_in: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        trace!(inode = ino, fh, offset = offset_in, size, "read");
        let result = offset(offset_in).and_then(|at| Ok(self.fs.read(fh, at, size as usize)?));
        match result {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset_in: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        trace!(inode = ino, fh, offset = offset_in, len = data.len(), "write");
        let result = offset(offset_in).and_then(|at| Ok(self.fs.write(fh, at, data)?));
        match result {
            Ok(written) => reply.written(u32::try_from(written).unwrap_or(u32::MAX)),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        trace!(inode = ino, fh, "flush");
        match self.fs.flush(fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        trace!(inode = ino, fh, "release");
        match self.fs.release(fh) {
            Ok(()) => reply.ok(),
            Err(e) => {
                warn!(inode = ino, fh, error = %e, "Release failed");
                reply.error(e.to_errno());
            }
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset_in: i64,
        mut reply: ReplyDirectory,
    ) {
        trace!(inode = ino, offset = offset_in, "readdir");
        let (skip, entries) = match offset(offset_in).and_then(|skip| Ok((skip, self.list(ino)?))) {
            Ok(listing) => listing,
            Err(e) => {
                reply.error(e.to_errno());
                return;
            }
        };
        let skip = usize::try_from(skip).unwrap_or(usize::MAX);
        for (index, (inode, kind, name)) in entries.into_iter().enumerate().skip(skip) {
            let next = i64::try_from(index + 1).unwrap_or(i64::MAX);
            if reply.add(inode, next, kind, &name) {
                break;
            }
        }
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyStatfs) {
        trace!(inode = ino, "statfs");
        let result = self
            .path_of(ino)
            .and_then(|path| Ok(self.fs.statfs(&path)?));
        match result {
            Ok(stats) => {
                let bsize = u32::try_from(stats.block_size).unwrap_or(u32::MAX);
                reply.statfs(
                    stats.total_blocks,
                    stats.free_blocks,
                    stats.available_blocks,
                    stats.total_files,
                    stats.free_files,
                    bsize,
                    MAX_NAME_LEN,
                    bsize,
                );
            }
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        trace!(parent, ?name, "create");
        let result = self.child_path(parent, name).and_then(|path| {
            self.fs.create_file(&path)?;
            let mode = match open_mode(flags) {
                OpenMode::Read => OpenMode::Write,
                mode => mode,
            };
            let fh = self.fs.open(&path, mode).inspect_err(|_| {
                let _ = self.fs.unlink(&path);
            })?;
            let attrs = self.fs.get_attributes(&path)?;
            let inode = self.inodes.get_or_insert(&path);
            debug!(path, inode, fh, "Created staged file");
            Ok((self.make_attr(inode, &attrs), fh))
        });
        match result {
            Ok((attr, fh)) => reply.created(&self.config.attr_ttl, &attr, 0, fh, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        trace!(parent, ?name, "mkdir");
        let result = self.child_path(parent, name).and_then(|path| {
            self.fs.mkdir(&path)?;
            let attrs = self.fs.get_attributes(&path)?;
            let inode = self.inodes.get_or_insert(&path);
            Ok(self.make_attr(inode, &attrs))
        });
        match result {
            Ok(attr) => reply.entry(&self.config.attr_ttl, &attr, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        trace!(parent, ?name, "unlink");
        let result = self.child_path(parent, name).and_then(|path| {
            self.fs.unlink(&path)?;
            self.inodes.invalidate_path(&path);
            Ok(())
        });
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        trace!(parent, ?name, "rmdir");
        let result = self.child_path(parent, name).and_then(|path| {
            self.fs.rmdir(&path)?;
            self.inodes.invalidate_path(&path);
            Ok(())
        });
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        trace!(parent, ?name, newparent, ?newname, flags, "rename");
        if flags != 0 {
            reply.error(libc::EINVAL);
            return;
        }
        let result = self.child_path(parent, name).and_then(|from| {
            let to = self.child_path(newparent, newname)?;
            self.fs.rename(&from, &to)?;
            self.inodes.invalidate_path(&from);
            Ok(())
        });
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }
}
