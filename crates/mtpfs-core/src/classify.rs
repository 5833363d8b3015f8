//! Filename classification.
//!
//! Media devices want a content type alongside every new object. The engine
//! asks a [`Classifier`] for one when a staged file is committed; the default
//! [`ExtensionClassifier`] looks only at the filename extension.

use tracing::debug;

/// Content type tag attached to new device objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Wav,
    Mp3,
    Wma,
    Ogg,
    Mp4,
    Wmv,
    Avi,
    Mpeg,
    Asf,
    QuickTime,
    Jpeg,
    Jfif,
    Tiff,
    Bmp,
    Gif,
    Pict,
    Png,
    WindowsImageFormat,
    VCalendar2,
    WindowsExecutable,
    Playlist,
    Unknown,
}

/// Maps a filename to a device content type. Never fails; unrecognized names
/// classify as [`FileType::Unknown`].
pub trait Classifier: Send + Sync {
    fn classify(&self, filename: &str) -> FileType;
}

impl<F> Classifier for F
where
    F: Fn(&str) -> FileType + Send + Sync,
{
    fn classify(&self, filename: &str) -> FileType {
        self(filename)
    }
}

/// Classifies by the text after the last `.`, ignoring case.
///
/// A name without any `.` is treated as if the whole name were the extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionClassifier;

impl Classifier for ExtensionClassifier {
    fn classify(&self, filename: &str) -> FileType {
        let ext = filename.rsplit('.').next().unwrap_or(filename);
        let file_type = match ext.to_ascii_lowercase().as_str() {
            "wav" => FileType::Wav,
            "mp3" => FileType::Mp3,
            "wma" => FileType::Wma,
            "ogg" => FileType::Ogg,
            "mp4" => FileType::Mp4,
            "wmv" => FileType::Wmv,
            "avi" => FileType::Avi,
            "mpeg" | "mpg" => FileType::Mpeg,
            "asf" => FileType::Asf,
            "qt" | "mov" => FileType::QuickTime,
            "jpg" | "jpeg" => FileType::Jpeg,
            "jfif" => FileType::Jfif,
            "tif" | "tiff" => FileType::Tiff,
            "bmp" => FileType::Bmp,
            "gif" => FileType::Gif,
            "pic" | "pict" => FileType::Pict,
            "png" => FileType::Png,
            "wmf" => FileType::WindowsImageFormat,
            "ics" => FileType::VCalendar2,
            "exe" | "com" | "bat" | "dll" | "sys" => FileType::WindowsExecutable,
            _ => FileType::Unknown,
        };
        if file_type == FileType::Unknown {
            debug!(filename, ext, "Unrecognized extension, tagging as unknown");
        }
        file_type
    }
}
