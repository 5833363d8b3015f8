//! Mount path helpers.
//!
//! Mount paths are absolute, `/`-separated strings. The first segment names a
//! storage area (or one of the synthetic top-level directories); the rest
//! walks that area's folders. Name comparisons below the first segment ignore
//! ASCII case, matching how media devices treat names.

/// Name of the synthetic directory holding orphaned files.
pub const LOST_AND_FOUND: &str = "lost+found";

/// Name of the synthetic directory exposing device playlists.
pub const PLAYLISTS: &str = "Playlists";

/// Extension of playlist files under [`PLAYLISTS`].
pub const PLAYLIST_EXTENSION: &str = ".m3u";

/// Prefix of directory names desktop environments use for trash.
const TRASH_PREFIX: &str = ".Trash";

/// Non-empty segments of `path`, in order.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Number of non-empty segments.
pub fn depth(path: &str) -> usize {
    segments(path).count()
}

/// The text between the leading `/` and the next `/` (or the end).
///
/// Returns `None` for relative paths.
pub fn first_segment(path: &str) -> Option<&str> {
    let rest = path.strip_prefix('/')?;
    Some(rest.split('/').next().unwrap_or(rest))
}

/// Segments after the first one.
pub fn below_first(path: &str) -> impl Iterator<Item = &str> {
    segments(path).skip(1)
}

/// Splits a path into its parent directory and final component.
///
/// `/a/b` yields `("/a", "b")`, `/a` yields `("/", "a")`.
pub fn split_parent(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some(("", name)) => ("/", name),
        Some((parent, name)) => (parent, name),
        None => ("/", path),
    }
}

/// Final component of a path.
pub fn basename(path: &str) -> &str {
    split_parent(path).1
}

/// Appends `name` to `parent`.
pub fn join(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{parent}{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Collapses repeated separators and drops a trailing `/`.
pub fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for segment in segments(path) {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Case-insensitive name comparison.
#[inline]
pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Comparison key for a mount path: the first segment verbatim, every later
/// segment ASCII-lowercased.
///
/// Two paths with equal keys name the same location.
pub fn case_key(path: &str) -> String {
    let mut key = String::with_capacity(path.len());
    for (i, segment) in segments(path).enumerate() {
        key.push('/');
        if i == 0 {
            key.push_str(segment);
        } else {
            key.extend(segment.chars().map(|c| c.to_ascii_lowercase()));
        }
    }
    if key.is_empty() {
        key.push('/');
    }
    key
}

/// Whether any segment is a desktop trash directory name.
pub fn is_reserved_trash(path: &str) -> bool {
    segments(path).any(|s| s.starts_with(TRASH_PREFIX))
}
