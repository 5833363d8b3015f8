//! Playlist cache backing the `Playlists` directory.

use crate::device::{Device, ObjectId, Playlist};
use crate::path::{PLAYLIST_EXTENSION, eq_ignore_case};
use tracing::{debug, warn};

/// Lazily refreshed list of device playlists.
#[derive(Debug)]
pub struct PlaylistCache {
    playlists: Vec<Playlist>,
    dirty: bool,
}

impl Default for PlaylistCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaylistCache {
    pub fn new() -> Self {
        Self {
            playlists: Vec::new(),
            dirty: true,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Refetches playlists if known stale. Failures yield an empty list.
    pub fn ensure_fresh<D: Device + ?Sized>(&mut self, device: &mut D) -> bool {
        if !self.dirty {
            return false;
        }
        self.playlists = match device.list_playlists() {
            Ok(playlists) => playlists,
            Err(e) => {
                warn!(error = %e, "Playlist refresh failed, treating as empty");
                Vec::new()
            }
        };
        self.dirty = false;
        debug!(count = self.playlists.len(), "Refreshed playlists");
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &Playlist> {
        self.playlists.iter()
    }

    pub fn get(&self, id: ObjectId) -> Option<&Playlist> {
        self.playlists.iter().find(|p| p.id == id)
    }

    /// Finds a playlist by name, ignoring case.
    pub fn find_by_name(&self, name: &str) -> Option<&Playlist> {
        self.playlists.iter().find(|p| eq_ignore_case(&p.name, name))
    }

    /// Finds the playlist exposed as `filename` (`<name>.m3u`).
    pub fn find_by_filename(&self, filename: &str) -> Option<&Playlist> {
        playlist_name(filename).and_then(|name| self.find_by_name(name))
    }
}

/// Strips the playlist extension from `filename`, ignoring case.
pub fn playlist_name(filename: &str) -> Option<&str> {
    let split = filename.len().checked_sub(PLAYLIST_EXTENSION.len())?;
    let (name, ext) = (filename.get(..split)?, filename.get(split..)?);
    (!name.is_empty() && eq_ignore_case(ext, PLAYLIST_EXTENSION)).then_some(name)
}

/// Filename under which a playlist is exposed.
pub fn playlist_filename(playlist: &Playlist) -> String {
    format!("{}{PLAYLIST_EXTENSION}", playlist.name)
}
