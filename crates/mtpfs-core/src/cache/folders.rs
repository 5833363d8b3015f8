//! Per-storage-area folder tree cache.

use crate::device::{Device, FolderNode, ObjectId, ParentRef, StorageId};
use crate::path::eq_ignore_case;
use tracing::{debug, warn};

/// Lazily refreshed mirror of one storage area's folder hierarchy.
///
/// The tree is replaced wholesale on refresh; nodes are never edited in place.
/// Every mutation of the area's folders must call [`mark_dirty`](Self::mark_dirty)
/// so the next access refetches.
#[derive(Debug)]
pub struct FolderTreeCache {
    storage: StorageId,
    roots: Vec<FolderNode>,
    dirty: bool,
}

impl FolderTreeCache {
    /// Creates an empty cache that will fetch on first use.
    pub fn new(storage: StorageId) -> Self {
        Self {
            storage,
            roots: Vec::new(),
            dirty: true,
        }
    }

    pub fn storage(&self) -> StorageId {
        self.storage
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Refetches the tree if it is known to be stale.
    ///
    /// Returns `true` when a fetch happened. A failed fetch leaves an empty
    /// tree behind and still clears the dirty flag.
    pub fn ensure_fresh<D: Device + ?Sized>(&mut self, device: &mut D) -> bool {
        if !self.dirty {
            return false;
        }
        self.roots = match device.fetch_folder_tree(self.storage) {
            Ok(roots) => roots,
            Err(e) => {
                warn!(storage = %self.storage, error = %e, "Folder tree refresh failed, treating as empty");
                Vec::new()
            }
        };
        self.dirty = false;
        debug!(storage = %self.storage, top_level = self.roots.len(), "Refreshed folder tree");
        true
    }

    /// Finds a folder anywhere in the tree.
    pub fn find_by_id(&self, id: ObjectId) -> Option<&FolderNode> {
        find_in(&self.roots, id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.find_by_id(id).is_some()
    }

    /// Resolves the segments below the storage area to a folder.
    ///
    /// See [`lookup_folder_id`].
    pub fn lookup<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Option<ParentRef> {
        let segments: Vec<&str> = segments.into_iter().collect();
        lookup_folder_id(&self.roots, &segments)
    }

    /// Direct subfolders of `parent`.
    pub fn children_of(&self, parent: ParentRef) -> &[FolderNode] {
        match parent {
            ParentRef::StorageRoot => &self.roots,
            ParentRef::Folder(id) => self
                .find_by_id(id)
                .map_or(&[][..], |node| node.children.as_slice()),
        }
    }

    /// Every folder id in the tree, depth first.
    pub fn ids(&self) -> Vec<ObjectId> {
        let mut out = Vec::new();
        collect_ids(&self.roots, &mut out);
        out
    }
}

fn find_in(nodes: &[FolderNode], id: ObjectId) -> Option<&FolderNode> {
    for node in nodes {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find_in(&node.children, id) {
            return Some(found);
        }
    }
    None
}

fn collect_ids(nodes: &[FolderNode], out: &mut Vec<ObjectId>) {
    for node in nodes {
        out.push(node.id);
        collect_ids(&node.children, out);
    }
}

/// Walks `segments` down a folder tree.
///
/// Each segment must equal (ignoring case) the name of a folder among the
/// current siblings; the walk then continues in that folder's children. When
/// several siblings match the same segment, each is tried in turn until one
/// yields a match for the rest of the path.
///
/// An empty segment list names the storage root.
pub fn lookup_folder_id(nodes: &[FolderNode], segments: &[&str]) -> Option<ParentRef> {
    let Some((first, rest)) = segments.split_first() else {
        return Some(ParentRef::StorageRoot);
    };
    nodes
        .iter()
        .filter(|node| eq_ignore_case(&node.name, first))
        .find_map(|node| {
            if rest.is_empty() {
                Some(ParentRef::Folder(node.id))
            } else if node.children.is_empty() {
                None
            } else {
                lookup_folder_id(&node.children, rest)
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{FailPoint, MemoryDevice};

    fn node(id: u32, name: &str, children: Vec<FolderNode>) -> FolderNode {
        FolderNode {
            id: ObjectId::new(id),
            name: name.to_string(),
            parent: ParentRef::StorageRoot,
            storage: StorageId::new(1),
            children,
        }
    }

    fn sample_tree() -> Vec<FolderNode> {
        vec![
            node(10, "Music", vec![node(11, "Albums", vec![node(12, "Live", vec![])])]),
            node(20, "DCIM", vec![node(21, "Camera", vec![])]),
        ]
    }

    #[test]
    fn test_empty_path_is_storage_root() {
        assert_eq!(lookup_folder_id(&sample_tree(), &[]), Some(ParentRef::StorageRoot));
    }

    #[test]
    fn test_nested_lookup() {
        let tree = sample_tree();
        assert_eq!(
            lookup_folder_id(&tree, &["Music", "Albums", "Live"]),
            Some(ParentRef::Folder(ObjectId::new(12)))
        );
        assert_eq!(
            lookup_folder_id(&tree, &["dcim", "CAMERA"]),
            Some(ParentRef::Folder(ObjectId::new(21)))
        );
    }

    #[test]
    fn test_lookup_misses() {
        let tree = sample_tree();
        assert_eq!(lookup_folder_id(&tree, &["Music", "Singles"]), None);
        assert_eq!(lookup_folder_id(&tree, &["Music", "Albums", "Live", "Deeper"]), None);
        // A segment must match the whole name, not a prefix of it.
        assert_eq!(lookup_folder_id(&tree, &["Mus"]), None);
        assert_eq!(lookup_folder_id(&tree, &["MusicX"]), None);
    }

    #[test]
    fn test_lookup_backtracks_across_same_named_siblings() {
        let tree = vec![
            node(1, "docs", vec![node(2, "a", vec![])]),
            node(3, "Docs", vec![node(4, "b", vec![])]),
        ];
        assert_eq!(
            lookup_folder_id(&tree, &["DOCS", "b"]),
            Some(ParentRef::Folder(ObjectId::new(4)))
        );
    }

    #[test]
    fn test_find_by_id_and_children() {
        let mut cache = FolderTreeCache::new(StorageId::new(1));
        cache.roots = sample_tree();
        cache.dirty = false;
        assert_eq!(cache.find_by_id(ObjectId::new(12)).unwrap().name, "Live");
        assert!(cache.find_by_id(ObjectId::new(99)).is_none());
        assert_eq!(cache.children_of(ParentRef::StorageRoot).len(), 2);
        assert_eq!(cache.children_of(ParentRef::Folder(ObjectId::new(10)))[0].name, "Albums");
        assert!(cache.children_of(ParentRef::Folder(ObjectId::new(99))).is_empty());
        assert_eq!(cache.ids().len(), 5);
    }

    #[test]
    fn test_ensure_fresh_fetches_once() {
        let mut dev = MemoryDevice::new();
        let s = dev.add_storage("Internal", 0);
        dev.add_folder(s, ParentRef::StorageRoot, "Music");
        let mut cache = FolderTreeCache::new(s);

        assert!(cache.ensure_fresh(&mut dev));
        assert!(!cache.ensure_fresh(&mut dev));
        assert_eq!(dev.counters().folder_trees, 1);

        cache.mark_dirty();
        assert!(cache.ensure_fresh(&mut dev));
        assert_eq!(dev.counters().folder_trees, 2);
    }

    #[test]
    fn test_failed_refresh_yields_empty_tree() {
        let mut dev = MemoryDevice::new();
        let s = dev.add_storage("Internal", 0);
        dev.add_folder(s, ParentRef::StorageRoot, "Music");
        let mut cache = FolderTreeCache::new(s);
        cache.ensure_fresh(&mut dev);
        assert!(cache.lookup(["Music"]).is_some());

        dev.fail_next(FailPoint::FolderTree);
        cache.mark_dirty();
        assert!(cache.ensure_fresh(&mut dev));
        assert!(!cache.is_dirty());
        assert_eq!(cache.lookup(["Music"]), None);
        assert_eq!(cache.lookup([]), Some(ParentRef::StorageRoot));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;
        use std::collections::BTreeSet;

        /// Builds a tree of unique-named siblings from a list of name sets,
        /// one set per level, chaining each level under the first name of the
        /// level above. Returns the tree and the ids assigned along the chain.
        fn build(levels: &[BTreeSet<String>], reversed: bool) -> (Vec<FolderNode>, Vec<u32>) {
            fn level(levels: &[BTreeSet<String>], depth: usize, reversed: bool, chain: &mut Vec<u32>) -> Vec<FolderNode> {
                let Some(names) = levels.get(depth) else {
                    return Vec::new();
                };
                let mut nodes: Vec<FolderNode> = names
                    .iter()
                    .enumerate()
                    .map(|(i, name)| {
                        let id = u32::try_from(depth * 100 + i + 1).unwrap();
                        let children = if i == 0 {
                            chain.push(id);
                            level(levels, depth + 1, reversed, chain)
                        } else {
                            Vec::new()
                        };
                        node(id, name, children)
                    })
                    .collect();
                if reversed {
                    nodes.reverse();
                }
                nodes
            }
            let mut chain = Vec::new();
            let tree = level(levels, 0, reversed, &mut chain);
            (tree, chain)
        }

        fn levels_strategy() -> impl Strategy<Value = Vec<BTreeSet<String>>> {
            // Lowercase-only names keep sibling names unique ignoring case.
            prop::collection::vec(prop::collection::btree_set("[a-z]{1,6}", 1..5), 1..5)
        }

        proptest! {
            #[test]
            fn lookup_ignores_sibling_order(levels in levels_strategy(), probe in prop::collection::vec("[a-z]{1,6}", 0..5)) {
                let (forward, chain) = build(&levels, false);
                let (backward, _) = build(&levels, true);

                let chain_names: Vec<&str> = levels
                    .iter()
                    .map(|names| names.iter().next().unwrap().as_str())
                    .collect();
                prop_assert_eq!(
                    lookup_folder_id(&forward, &chain_names),
                    Some(ParentRef::Folder(ObjectId::new(*chain.last().unwrap())))
                );
                prop_assert_eq!(
                    lookup_folder_id(&forward, &chain_names),
                    lookup_folder_id(&backward, &chain_names)
                );

                let probe: Vec<&str> = probe.iter().map(String::as_str).collect();
                prop_assert_eq!(
                    lookup_folder_id(&forward, &probe),
                    lookup_folder_id(&backward, &probe)
                );
            }

            #[test]
            fn lookup_ignores_case(levels in levels_strategy()) {
                let (tree, _) = build(&levels, false);
                let lower: Vec<String> = levels.iter().map(|n| n.iter().next().unwrap().clone()).collect();
                let upper: Vec<String> = lower.iter().map(|s| s.to_ascii_uppercase()).collect();
                let lower: Vec<&str> = lower.iter().map(String::as_str).collect();
                let upper: Vec<&str> = upper.iter().map(String::as_str).collect();
                prop_assert_eq!(lookup_folder_id(&tree, &lower), lookup_folder_id(&tree, &upper));
            }
        }
    }
}
