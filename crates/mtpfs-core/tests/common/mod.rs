//! Shared fixtures for mtpfs-core integration tests.

#![allow(dead_code)]

use mtpfs_core::{DirEntry, MemoryDevice, MtpFs, ObjectId, ParentRef, StorageId};
use tracing_subscriber::EnvFilter;

pub const INTERNAL_CAPACITY: u64 = 8 << 20;
pub const CARD_CAPACITY: u64 = 16 << 20;

pub const SONG_DATA: &[u8] = b"ID3 song data";
pub const NOTES_DATA: &[u8] = b"remember the milk";
pub const IMG_DATA: &[u8] = b"jpeg bytes";

/// Ids of everything in [`sample_device`].
///
/// ```text
/// /Internal
///   Music/
///     Albums/            (empty)
///     Song.mp3
///   notes.txt
/// /Card
///   DCIM/
///     IMG_0001.JPG
/// orphan "stray.mp3" on Card, parent folder missing
/// playlist "Favourites" = [Song.mp3]
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub internal: StorageId,
    pub card: StorageId,
    pub music: ObjectId,
    pub albums: ObjectId,
    pub song: ObjectId,
    pub notes: ObjectId,
    pub dcim: ObjectId,
    pub img: ObjectId,
    pub orphan: ObjectId,
    pub playlist: ObjectId,
}

pub fn sample_device() -> (MemoryDevice, Sample) {
    let mut dev = MemoryDevice::new();
    let internal = dev.add_storage("Internal", INTERNAL_CAPACITY);
    let card = dev.add_storage("Card", CARD_CAPACITY);

    let music = dev.add_folder(internal, ParentRef::StorageRoot, "Music");
    let albums = dev.add_folder(internal, ParentRef::Folder(music), "Albums");
    let song = dev.add_file(internal, ParentRef::Folder(music), "Song.mp3", SONG_DATA);
    let notes = dev.add_file(internal, ParentRef::StorageRoot, "notes.txt", NOTES_DATA);

    let dcim = dev.add_folder(card, ParentRef::StorageRoot, "DCIM");
    let img = dev.add_file(card, ParentRef::Folder(dcim), "IMG_0001.JPG", IMG_DATA);
    let orphan = dev.add_file(card, ParentRef::Folder(ObjectId::new(0xdead)), "stray.mp3", b"");

    let playlist = dev.add_playlist("Favourites", &[song]);

    let sample = Sample {
        internal,
        card,
        music,
        albums,
        song,
        notes,
        dcim,
        img,
        orphan,
        playlist,
    };
    (dev, sample)
}

/// Routes `tracing` output through the test harness. Set `RUST_LOG` to see it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn sample_fs() -> (MtpFs<MemoryDevice>, Sample) {
    init_tracing();
    let (dev, sample) = sample_device();
    (MtpFs::new(dev).expect("sample device enumerates"), sample)
}

/// Sorted entry names.
pub fn names(entries: &[DirEntry]) -> Vec<String> {
    let mut names: Vec<String> = entries.iter().map(|e| e.name.clone()).collect();
    names.sort();
    names
}

/// Writes `data` to a new file at `path` through the staged-write lifecycle.
pub fn write_new_file(fs: &MtpFs<MemoryDevice>, path: &str, data: &[u8]) -> mtpfs_core::MtpResult<()> {
    fs.create_file(path)?;
    let handle = fs.open(path, mtpfs_core::OpenMode::Write)?;
    fs.write(handle, 0, data)?;
    fs.release(handle)
}
