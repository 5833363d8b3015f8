//! Staged-write lifecycle: create, open, write, release.
//!
//! ```bash
//! cargo test -p mtpfs-core --test staged_write_tests
//! ```

mod common;

use common::{names, sample_device, sample_fs, write_new_file};
use mtpfs_core::{
    EntryKind, ErrorCategory, FailPoint, FileType, MtpError, MtpFs, OpenMode, Resolved,
};
use std::sync::{Arc, Mutex};

#[test]
fn test_stage_then_resolve_is_staged() {
    let (fs, _) = sample_fs();
    fs.create_file("/Internal/new.mp3").unwrap();
    assert_eq!(fs.resolve("/Internal/new.mp3"), Resolved::Staged);
}

#[test]
fn test_stage_twice_is_already_exists() {
    let (fs, _) = sample_fs();
    fs.create_file("/Internal/new.mp3").unwrap();
    let err = fs.create_file("/Internal/new.mp3").unwrap_err();
    assert!(matches!(err, MtpError::AlreadyExists(_)));
    assert_eq!(err.category(), ErrorCategory::AlreadyExists);
}

#[test]
fn test_stage_over_device_object_is_already_exists() {
    let (fs, _) = sample_fs();
    assert!(matches!(
        fs.create_file("/Internal/Music/song.MP3"),
        Err(MtpError::AlreadyExists(_))
    ));
    assert!(matches!(fs.create_file("/Card/DCIM"), Err(MtpError::AlreadyExists(_))));
}

#[test]
fn test_staged_file_view() {
    let (fs, _) = sample_fs();
    fs.create_file("/Internal/Music/new.mp3").unwrap();

    let attrs = fs.get_attributes("/Internal/Music/new.mp3").unwrap();
    assert_eq!(attrs.kind, EntryKind::File);
    assert_eq!(attrs.size, 0);
    assert_eq!(attrs.object_id, None);

    let listing = fs.list_directory("/Internal/Music").unwrap();
    assert_eq!(names(&listing), vec!["Albums", "Song.mp3", "new.mp3"]);
}

#[test]
fn test_create_rejects_bad_parents() {
    let (fs, _) = sample_fs();
    assert!(matches!(fs.create_file("/"), Err(MtpError::PermissionDenied(_))));
    assert!(matches!(fs.create_file("/top.txt"), Err(MtpError::PermissionDenied(_))));
    assert!(matches!(
        fs.create_file("/lost+found/x.mp3"),
        Err(MtpError::PermissionDenied(_))
    ));
    assert!(matches!(
        fs.create_file("/Internal/.Trash-1000/x"),
        Err(MtpError::PermissionDenied(_))
    ));
    assert!(matches!(
        fs.create_file("/Internal/Missing/x.mp3"),
        Err(MtpError::NotFound(_))
    ));
    assert!(matches!(
        fs.create_file("/Internal/notes.txt/x"),
        Err(MtpError::NotADirectory(_))
    ));
}

#[test]
fn test_commit_creates_new_object() {
    let (fs, s) = sample_fs();
    let before: Vec<_> = [s.music, s.albums, s.song, s.notes, s.dcim, s.img, s.orphan, s.playlist].into();

    write_new_file(&fs, "/Card/DCIM/IMG_0002.JPG", b"second image").unwrap();

    let Resolved::File(id) = fs.resolve("/Card/DCIM/IMG_0002.JPG") else {
        panic!("committed file should resolve to a device file");
    };
    assert!(!before.contains(&id));
    assert!(before.iter().all(|old| *old < id));
    fs.with_device(|d| {
        assert_eq!(d.file_data(id), Some(&b"second image"[..]));
        assert_eq!(d.file(id).unwrap().filename.as_deref(), Some("IMG_0002.JPG"));
    });
    assert_eq!(fs.get_attributes("/Card/DCIM/IMG_0002.JPG").unwrap().size, 12);
    assert_eq!(fs.open_handles(), 0);
}

#[test]
fn test_commit_at_storage_root() {
    let (fs, s) = sample_fs();
    write_new_file(&fs, "/Card/readme.txt", b"hi").unwrap();
    let Resolved::File(id) = fs.resolve("/Card/readme.txt") else {
        panic!("expected file");
    };
    fs.with_device(|d| assert_eq!(d.file(id).unwrap().storage, s.card));
    assert_eq!(fs.resolve("/Internal/readme.txt"), Resolved::NotFound);
}

#[test]
fn test_commit_without_writes_creates_empty_file() {
    let (fs, _) = sample_fs();
    fs.create_file("/Internal/empty.txt").unwrap();
    let handle = fs.open("/Internal/empty.txt", OpenMode::Write).unwrap();
    fs.release(handle).unwrap();
    assert_eq!(fs.get_attributes("/Internal/empty.txt").unwrap().size, 0);
    assert!(matches!(fs.resolve("/Internal/empty.txt"), Resolved::File(_)));
}

#[test]
fn test_commit_sets_files_dirty() {
    let (fs, _) = sample_fs();
    fs.create_file("/Internal/a.txt").unwrap();
    let handle = fs.open("/Internal/a.txt", OpenMode::Write).unwrap();
    fs.write(handle, 0, b"a").unwrap();
    fs.with_session(|session| assert!(!session.files_dirty()));
    fs.release(handle).unwrap();
    fs.with_session(|session| assert!(session.files_dirty()));
}

#[test]
fn test_classifier_sees_filename() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);
    let (dev, _) = sample_device();
    let fs = MtpFs::new(dev).unwrap().with_classifier(move |name: &str| {
        recorder.lock().unwrap().push(name.to_string());
        FileType::Mp3
    });

    write_new_file(&fs, "/Internal/Music/track01.mp3", b"audio").unwrap();
    assert_eq!(*seen.lock().unwrap(), vec!["track01.mp3".to_string()]);
}

#[test]
fn test_second_open_is_busy_until_release() {
    let (fs, _) = sample_fs();
    fs.create_file("/Internal/busy.mp3").unwrap();
    let first = fs.open("/Internal/busy.mp3", OpenMode::Write).unwrap();

    let err = fs.open("/Internal/busy.mp3", OpenMode::Write).unwrap_err();
    assert!(matches!(err, MtpError::Busy(_)));
    assert_eq!(err.category(), ErrorCategory::Busy);
    assert!(matches!(
        fs.open("/Internal/busy.mp3", OpenMode::Read),
        Err(MtpError::Busy(_))
    ));

    fs.write(first, 0, b"data").unwrap();
    fs.release(first).unwrap();

    let again = fs.open("/Internal/busy.mp3", OpenMode::Write).unwrap();
    assert_eq!(fs.read(again, 0, 16).unwrap(), b"data");
    fs.release(again).unwrap();
}

#[test]
fn test_failed_commit_discards_entry() {
    let (fs, _) = sample_fs();
    let files_before = fs.with_device(|d| d.file_count());
    fs.create_file("/Internal/lost.mp3").unwrap();
    let handle = fs.open("/Internal/lost.mp3", OpenMode::Write).unwrap();
    fs.write(handle, 0, b"never arrives").unwrap();

    fs.with_device(|d| d.fail_next(FailPoint::CreateObject));
    let err = fs.release(handle).unwrap_err();
    assert!(matches!(err, MtpError::Device(_)));
    assert_eq!(err.category(), ErrorCategory::DeviceError);

    fs.with_session(|session| {
        assert!(!session.staged().is_staged("/Internal/lost.mp3"));
        assert!(!session.files_dirty());
    });
    assert_eq!(fs.resolve("/Internal/lost.mp3"), Resolved::NotFound);
    assert_eq!(fs.with_device(|d| d.file_count()), files_before);
    assert_eq!(fs.open_handles(), 0);
}

#[test]
fn test_commit_into_removed_folder_fails() {
    let (fs, s) = sample_fs();
    fs.create_file("/Internal/Music/Albums/a.mp3").unwrap();
    let handle = fs.open("/Internal/Music/Albums/a.mp3", OpenMode::Write).unwrap();

    // The folder disappears behind our back.
    fs.with_device(|d| {
        use mtpfs_core::Device;
        d.delete_object(s.albums).unwrap();
    });
    fs.with_session(|session| session.mark_folders_dirty(0));

    assert!(matches!(fs.release(handle), Err(MtpError::NotFound(_))));
    assert_eq!(fs.resolve("/Internal/Music/Albums/a.mp3"), Resolved::NotFound);
}

#[test]
fn test_unlink_staged() {
    let (fs, _) = sample_fs();
    fs.create_file("/Internal/tmp.txt").unwrap();
    let handle = fs.open("/Internal/tmp.txt", OpenMode::Write).unwrap();
    assert!(matches!(fs.unlink("/Internal/tmp.txt"), Err(MtpError::Busy(_))));

    fs.create_file("/Internal/tmp2.txt").unwrap();
    fs.unlink("/Internal/tmp2.txt").unwrap();
    assert_eq!(fs.resolve("/Internal/tmp2.txt"), Resolved::NotFound);

    fs.release(handle).unwrap();
}

#[test]
fn test_staged_entries_block_folder_removal() {
    let (fs, _) = sample_fs();
    fs.create_file("/Internal/Music/Albums/pending.mp3").unwrap();
    assert!(matches!(
        fs.rmdir("/Internal/Music/Albums"),
        Err(MtpError::NotEmpty(_))
    ));
    assert!(matches!(
        fs.mkdir("/Internal/Music/Albums/pending.mp3"),
        Err(MtpError::AlreadyExists(_))
    ));
}

#[test]
fn test_staged_child_blocks_case_variant_rmdir() {
    let (fs, s) = sample_fs();
    fs.create_file("/Card/DCIM/new.jpg").unwrap();
    let handle = fs.open("/Card/DCIM/new.jpg", OpenMode::Write).unwrap();
    fs.write(handle, 0, b"pixels").unwrap();
    fs.unlink("/Card/DCIM/IMG_0001.JPG").unwrap();

    assert!(matches!(fs.rmdir("/Card/dcim"), Err(MtpError::NotEmpty(_))));
    fs.with_device(|d| assert!(d.has_folder(s.dcim)));

    fs.release(handle).unwrap();
    assert!(matches!(fs.resolve("/Card/DCIM/new.jpg"), Resolved::File(_)));
}

#[test]
fn test_staged_child_blocks_case_variant_rename() {
    let (fs, _) = sample_fs();
    fs.create_file("/Internal/Music/Albums/pending.mp3").unwrap();
    assert!(matches!(
        fs.rename("/Internal/MUSIC/albums", "/Internal/Records"),
        Err(MtpError::NotEmpty(_))
    ));
    assert_eq!(fs.with_device(|d| d.counters().mutations), 0);
}

#[test]
fn test_case_variant_of_staged_path_is_already_exists() {
    let (fs, _) = sample_fs();
    fs.create_file("/Card/DCIM/b.txt").unwrap();
    assert!(matches!(
        fs.create_file("/Card/dcim/B.TXT"),
        Err(MtpError::AlreadyExists(_))
    ));
    assert_eq!(fs.resolve("/Card/dcim/B.TXT"), Resolved::Staged);
    assert_eq!(
        names(&fs.list_directory("/Card/dcim").unwrap()),
        vec!["IMG_0001.JPG", "b.txt"]
    );
}

#[test]
fn test_commit_keeps_created_spelling() {
    let (fs, _) = sample_fs();
    fs.create_file("/Card/DCIM/Holiday.jpg").unwrap();
    let handle = fs.open("/Card/dcim/HOLIDAY.JPG", OpenMode::Write).unwrap();
    fs.write(handle, 0, b"sun").unwrap();
    fs.release(handle).unwrap();

    let listed = names(&fs.list_directory("/Card/DCIM").unwrap());
    assert_eq!(listed, vec!["Holiday.jpg", "IMG_0001.JPG"]);
}

#[test]
fn test_release_unknown_handle() {
    let (fs, _) = sample_fs();
    assert!(matches!(fs.release(4242), Err(MtpError::InvalidHandle(4242))));
}

#[test]
fn test_truncate_and_sparse_writes() {
    let (fs, _) = sample_fs();
    fs.create_file("/Internal/sparse.bin").unwrap();
    let handle = fs.open("/Internal/sparse.bin", OpenMode::Write).unwrap();
    fs.write(handle, 4, b"tail").unwrap();
    assert_eq!(fs.handle_size(handle).unwrap(), 8);
    fs.truncate(handle, 6).unwrap();
    assert_eq!(fs.read(handle, 0, 100).unwrap(), b"\0\0\0\0ta");
    fs.release(handle).unwrap();
    assert_eq!(fs.get_attributes("/Internal/sparse.bin").unwrap().size, 6);
}
