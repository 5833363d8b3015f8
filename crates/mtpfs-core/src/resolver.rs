//! Path resolution.
//!
//! [`resolve`] turns a mount path into the single entity it names. It is
//! written against the [`Catalog`] trait rather than a concrete session, so it
//! does not care how the caches behind it are locked.
//!
//! Resolution order, first match wins:
//!
//! 1. a staged path
//! 2. `/`
//! 3. a single segment: storage area, `lost+found`, `Playlists`, or an
//!    unverified top-level directory
//! 4. a folder below a storage area
//! 5. a file below a storage area
//! 6. an orphan in `lost+found` or a playlist in `Playlists`
//!
//! Directories are tried before files, so a folder and a file with the same
//! name resolve to the folder.

use crate::device::{ObjectId, ParentRef};
use crate::path::{LOST_AND_FOUND, PLAYLISTS, depth, first_segment, segments};
use tracing::trace;

/// What a path names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    /// The mount root.
    Root,
    /// The root of the storage area at this registry index.
    StorageRoot(usize),
    /// A first-level name that matches no storage area. Reported as a
    /// directory without checking the device.
    TopLevel,
    /// The synthetic orphan directory.
    LostFound,
    /// The synthetic playlist directory.
    PlaylistDir,
    Folder { area: usize, id: ObjectId },
    File(ObjectId),
    /// A file whose parent folder is missing, reached through `lost+found`.
    Orphan(ObjectId),
    Playlist(ObjectId),
    /// A locally created path not yet on the device.
    Staged,
    NotFound,
}

impl Resolved {
    pub fn is_found(self) -> bool {
        self != Self::NotFound
    }

    /// Whether the entity is listed as a directory.
    pub fn is_directory(self) -> bool {
        matches!(
            self,
            Self::Root
                | Self::StorageRoot(_)
                | Self::TopLevel
                | Self::LostFound
                | Self::PlaylistDir
                | Self::Folder { .. }
        )
    }

    /// Storage area index and parent reference, if files and folders can be
    /// created inside this entity.
    pub fn as_container(self) -> Option<(usize, ParentRef)> {
        match self {
            Self::StorageRoot(area) => Some((area, ParentRef::StorageRoot)),
            Self::Folder { area, id } => Some((area, ParentRef::Folder(id))),
            _ => None,
        }
    }
}

/// Cache queries the resolver needs.
///
/// Lookups take `&mut self` because implementations refresh stale caches
/// before answering.
pub trait Catalog {
    fn is_staged(&self, path: &str) -> bool;

    /// Registry index of the area whose description is `name`.
    fn storage_area_named(&self, name: &str) -> Option<usize>;

    /// Folder reached by walking `segments` below the area's root.
    fn folder_lookup(&mut self, area: usize, segments: &[&str]) -> Option<ParentRef>;

    /// File named `name` directly inside `parent` of the given area.
    fn file_lookup(&mut self, area: usize, parent: ParentRef, name: &str) -> Option<ObjectId>;

    /// Orphaned file named `name`.
    fn orphan_lookup(&mut self, name: &str) -> Option<ObjectId>;

    /// Playlist exposed as `filename`.
    fn playlist_lookup(&mut self, filename: &str) -> Option<ObjectId>;
}

/// Resolves a normalized absolute path.
pub fn resolve<C: Catalog + ?Sized>(catalog: &mut C, path: &str) -> Resolved {
    let resolved = resolve_inner(catalog, path);
    trace!(path, ?resolved, "Resolved path");
    resolved
}

fn resolve_inner<C: Catalog + ?Sized>(catalog: &mut C, path: &str) -> Resolved {
    if catalog.is_staged(path) {
        return Resolved::Staged;
    }
    let Some(first) = first_segment(path) else {
        return Resolved::NotFound;
    };
    let parts: Vec<&str> = segments(path).collect();
    match depth(path) {
        0 => return Resolved::Root,
        1 => {
            return match catalog.storage_area_named(first) {
                Some(area) => Resolved::StorageRoot(area),
                None if first == LOST_AND_FOUND => Resolved::LostFound,
                None if first == PLAYLISTS => Resolved::PlaylistDir,
                None => Resolved::TopLevel,
            };
        }
        _ => {}
    }

    let Some(area) = catalog.storage_area_named(first) else {
        return resolve_synthetic(catalog, &parts);
    };

    let below = &parts[1..];
    if let Some(ParentRef::Folder(id)) = catalog.folder_lookup(area, below) {
        return Resolved::Folder { area, id };
    }

    let Some((name, parent_segments)) = below.split_last() else {
        return Resolved::NotFound;
    };
    catalog
        .folder_lookup(area, parent_segments)
        .and_then(|parent| catalog.file_lookup(area, parent, name))
        .map_or(Resolved::NotFound, Resolved::File)
}

fn resolve_synthetic<C: Catalog + ?Sized>(catalog: &mut C, parts: &[&str]) -> Resolved {
    let [dir, name] = parts else {
        return Resolved::NotFound;
    };
    let found = match *dir {
        LOST_AND_FOUND => catalog.orphan_lookup(name).map(Resolved::Orphan),
        PLAYLISTS => catalog.playlist_lookup(name).map(Resolved::Playlist),
        _ => None,
    };
    found.unwrap_or(Resolved::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::lookup_folder_id;
    use crate::device::{FolderNode, StorageId};
    use crate::path::eq_ignore_case;
    use std::collections::HashSet;

    /// Catalog over fixed data that records which lookups ran.
    #[derive(Default)]
    struct FixedCatalog {
        staged: HashSet<String>,
        areas: Vec<(&'static str, Vec<FolderNode>)>,
        files: Vec<(usize, ParentRef, &'static str, ObjectId)>,
        orphans: Vec<(&'static str, ObjectId)>,
        playlists: Vec<(&'static str, ObjectId)>,
        calls: Vec<&'static str>,
    }

    impl Catalog for FixedCatalog {
        fn is_staged(&self, path: &str) -> bool {
            self.staged.contains(path)
        }

        fn storage_area_named(&self, name: &str) -> Option<usize> {
            self.areas.iter().position(|(n, _)| *n == name)
        }

        fn folder_lookup(&mut self, area: usize, segments: &[&str]) -> Option<ParentRef> {
            self.calls.push("folder");
            lookup_folder_id(&self.areas[area].1, segments)
        }

        fn file_lookup(&mut self, area: usize, parent: ParentRef, name: &str) -> Option<ObjectId> {
            self.calls.push("file");
            self.files
                .iter()
                .find(|(a, p, n, _)| *a == area && *p == parent && eq_ignore_case(n, name))
                .map(|f| f.3)
        }

        fn orphan_lookup(&mut self, name: &str) -> Option<ObjectId> {
            self.calls.push("orphan");
            self.orphans.iter().find(|(n, _)| *n == name).map(|o| o.1)
        }

        fn playlist_lookup(&mut self, filename: &str) -> Option<ObjectId> {
            self.calls.push("playlist");
            self.playlists.iter().find(|(n, _)| *n == filename).map(|p| p.1)
        }
    }

    fn catalog() -> FixedCatalog {
        let dcim = FolderNode::new(ObjectId::new(10), "DCIM", ParentRef::StorageRoot, StorageId::new(2));
        let clash = FolderNode::new(ObjectId::new(11), "clash", ParentRef::StorageRoot, StorageId::new(2));
        FixedCatalog {
            areas: vec![("Internal", vec![]), ("Card", vec![dcim, clash])],
            files: vec![
                (1, ParentRef::Folder(ObjectId::new(10)), "IMG_0001.JPG", ObjectId::new(100)),
                (1, ParentRef::StorageRoot, "clash", ObjectId::new(101)),
                (0, ParentRef::StorageRoot, "notes.txt", ObjectId::new(102)),
            ],
            orphans: vec![("lost.mp3", ObjectId::new(200))],
            playlists: vec![("Mix.m3u", ObjectId::new(300))],
            ..FixedCatalog::default()
        }
    }

    #[test]
    fn test_root_and_first_level() {
        let mut c = catalog();
        assert_eq!(resolve(&mut c, "/"), Resolved::Root);
        assert_eq!(resolve(&mut c, "/Internal"), Resolved::StorageRoot(0));
        assert_eq!(resolve(&mut c, "/Card"), Resolved::StorageRoot(1));
        assert_eq!(resolve(&mut c, "/lost+found"), Resolved::LostFound);
        assert_eq!(resolve(&mut c, "/Playlists"), Resolved::PlaylistDir);
        assert_eq!(resolve(&mut c, "/Whatever"), Resolved::TopLevel);
        assert!(c.calls.is_empty(), "first-level names never hit the caches");
    }

    #[test]
    fn test_relative_path_is_not_found() {
        assert_eq!(resolve(&mut catalog(), "Card/DCIM"), Resolved::NotFound);
    }

    #[test]
    fn test_folder_and_file() {
        let mut c = catalog();
        assert_eq!(
            resolve(&mut c, "/Card/DCIM"),
            Resolved::Folder { area: 1, id: ObjectId::new(10) }
        );
        assert_eq!(resolve(&mut c, "/Card/DCIM/img_0001.jpg"), Resolved::File(ObjectId::new(100)));
        assert_eq!(resolve(&mut c, "/Card/DCIM/missing.jpg"), Resolved::NotFound);
        assert_eq!(resolve(&mut c, "/Internal/notes.txt"), Resolved::File(ObjectId::new(102)));
        assert_eq!(resolve(&mut c, "/Card/notes.txt"), Resolved::NotFound);
    }

    #[test]
    fn test_folder_wins_over_same_named_file() {
        let mut c = catalog();
        assert_eq!(
            resolve(&mut c, "/Card/clash"),
            Resolved::Folder { area: 1, id: ObjectId::new(11) }
        );
        assert!(!c.calls.contains(&"file"));
    }

    #[test]
    fn test_staged_shadows_device_objects() {
        let mut c = catalog();
        c.staged.insert("/Card/DCIM/IMG_0001.JPG".to_string());
        assert_eq!(resolve(&mut c, "/Card/DCIM/IMG_0001.JPG"), Resolved::Staged);
        assert!(c.calls.is_empty());
    }

    #[test]
    fn test_synthetic_lookups_are_last_resort() {
        let mut c = catalog();
        assert_eq!(resolve(&mut c, "/lost+found/lost.mp3"), Resolved::Orphan(ObjectId::new(200)));
        assert_eq!(resolve(&mut c, "/Playlists/Mix.m3u"), Resolved::Playlist(ObjectId::new(300)));
        assert_eq!(resolve(&mut c, "/lost+found/a/b"), Resolved::NotFound);
        assert_eq!(resolve(&mut c, "/Nowhere/file"), Resolved::NotFound);

        c.calls.clear();
        resolve(&mut c, "/Card/DCIM/img_0001.jpg");
        assert!(!c.calls.contains(&"orphan"));
    }

    #[test]
    fn test_container_helpers() {
        assert_eq!(Resolved::StorageRoot(1).as_container(), Some((1, ParentRef::StorageRoot)));
        assert_eq!(Resolved::LostFound.as_container(), None);
        assert!(Resolved::TopLevel.is_directory());
        assert!(!Resolved::Staged.is_directory());
    }
}
