//! Storage area registry.

use super::folders::FolderTreeCache;
use crate::device::{Device, DeviceError, StorageId, StorageInfo};
use crate::path::first_segment;
use tracing::{info, warn};

/// Maximum number of storage areas exposed at the mount root.
pub const MAX_STORAGE_AREAS: usize = 4;

/// One storage partition and the cache of its folder tree.
#[derive(Debug)]
pub struct StorageArea {
    pub info: StorageInfo,
    pub folders: FolderTreeCache,
}

impl StorageArea {
    pub fn id(&self) -> StorageId {
        self.info.id
    }

    pub fn description(&self) -> &str {
        &self.info.description
    }
}

/// The fixed set of storage areas discovered at mount time.
#[derive(Debug, Default)]
pub struct StorageRegistry {
    areas: Vec<StorageArea>,
}

impl StorageRegistry {
    /// Enumerates storage areas from the device.
    ///
    /// Areas beyond [`MAX_STORAGE_AREAS`] are ignored.
    pub fn load<D: Device + ?Sized>(device: &mut D) -> Result<Self, DeviceError> {
        let mut reported = device.list_storage_areas()?;
        if reported.len() > MAX_STORAGE_AREAS {
            warn!(
                reported = reported.len(),
                max = MAX_STORAGE_AREAS,
                "Device reports more storage areas than supported, ignoring the rest"
            );
            reported.truncate(MAX_STORAGE_AREAS);
        }
        let areas = reported
            .into_iter()
            .map(|info| {
                info!(storage = %info.id, description = %info.description, "Found storage area");
                StorageArea {
                    folders: FolderTreeCache::new(info.id),
                    info,
                }
            })
            .collect();
        Ok(Self { areas })
    }

    /// Index of the area named by the path's first segment.
    ///
    /// The match is exact and case-sensitive. Relative paths match nothing.
    pub fn storage_area_for(&self, path: &str) -> Option<usize> {
        first_segment(path).and_then(|name| self.by_description(name))
    }

    /// Index of the area with exactly this description.
    pub fn by_description(&self, name: &str) -> Option<usize> {
        self.areas.iter().position(|a| a.info.description == name)
    }

    pub fn index_of(&self, id: StorageId) -> Option<usize> {
        self.areas.iter().position(|a| a.info.id == id)
    }

    pub fn get(&self, index: usize) -> Option<&StorageArea> {
        self.areas.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut StorageArea> {
        self.areas.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StorageArea> {
        self.areas.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut StorageArea> {
        self.areas.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    /// Copies capacity and free-space figures from a fresh enumeration.
    ///
    /// Areas are matched by id; unknown ids are ignored.
    pub fn update_usage(&mut self, fresh: &[StorageInfo]) {
        for info in fresh {
            if let Some(area) = self.areas.iter_mut().find(|a| a.info.id == info.id) {
                area.info.capacity_bytes = info.capacity_bytes;
                area.info.free_bytes = info.free_bytes;
                area.info.free_objects = info.free_objects;
            }
        }
    }
}
