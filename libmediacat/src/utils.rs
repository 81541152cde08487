//! Misc shared helpers.

use std::path::{Component, Path, PathBuf};

/// Lossy UTF-8 rendering used for every path column in the store.
pub fn to_db_path<P: AsRef<Path>>(p: P) -> String {
    p.as_ref().to_string_lossy().into_owned()
}

/// Expand `~`, make the path absolute against the current directory and
/// fold `.` / `..` lexically. The path does not have to exist; watched
/// directories may live on shares that are currently offline.
pub fn absolutize(raw: &str) -> PathBuf {
    let expanded = shellexpand::tilde(raw).into_owned();
    let p = PathBuf::from(expanded);
    let joined = if p.is_absolute() {
        p
    } else {
        std::env::current_dir().unwrap_or_default().join(p)
    };

    let mut out = PathBuf::new();
    for comp in joined.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// `true` when `inner` equals `outer` or lies somewhere below it.
///
/// Component-wise, so `/media/tv` is *not* inside `/media/t`.
pub fn is_within(inner: &Path, outer: &Path) -> bool {
    inner.starts_with(outer)
}

/// Case-insensitive suffix match of `name` against an extension allow-list
/// (entries without the leading dot).
pub fn has_extension(name: &str, extensions: &[String]) -> bool {
    let lower = name.to_lowercase();
    extensions.iter().any(|ext| {
        let ext = ext.trim_start_matches('.');
        !ext.is_empty()
            && lower.len() > ext.len()
            && lower.ends_with(&ext.to_lowercase())
            && lower.as_bytes()[lower.len() - ext.len() - 1] == b'.'
    })
}

/// Split a file found under `root` into the store's (reldir, filename)
/// pair. `reldir` is empty for files directly inside `root`.
///
/// `None` when `path` is not below `root` or its relative part is not
/// valid UTF-8; a lossy conversion would name a different file.
pub fn split_relative(root: &Path, path: &Path) -> Option<(String, String)> {
    let rel = path.strip_prefix(root).ok()?;
    let filename = rel.file_name()?.to_str()?.to_owned();
    let reldir = match rel.parent() {
        Some(p) => p.to_str()?.to_owned(),
        None => String::new(),
    };
    Some((reldir, filename))
}
