//! In-memory records mirrored from the store.

use std::path::{Path, PathBuf};

/// A watched filesystem root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopDirectory {
    /// Store-assigned id, `None` until the row exists.
    pub id: Option<i64>,
    pub path: PathBuf,
    pub comment: Option<String>,
    pub exclude: bool,
}

impl TopDirectory {
    pub fn new<P: Into<PathBuf>>(path: P, comment: Option<String>) -> Self {
        Self {
            id: None,
            path: path.into(),
            comment,
            exclude: false,
        }
    }
}

/// One sampled frame: offset into the video (seconds) and JPEG bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub id: Option<i64>,
    pub offset: u64,
    pub jpeg: Vec<u8>,
}

impl Thumbnail {
    pub fn new(offset: u64, jpeg: Vec<u8>) -> Self {
        Self {
            id: None,
            offset,
            jpeg,
        }
    }
}

/// Bookmark on one thumbnail of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Favorite {
    pub id: i64,
    pub thumb_id: i64,
    pub offset: u64,
}

/// One catalogued media file.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaFile {
    pub id: Option<i64>,
    pub topdir_id: i64,
    /// Directory part relative to the top directory; empty at the root.
    pub reldir: String,
    pub filename: String,
    /// topdir path + reldir + filename, kept in step with the topdir.
    pub abspath: PathBuf,
    pub size: Option<i64>,
    /// Filesystem modification time, unix seconds.
    pub mtime: Option<i64>,
    /// Unix seconds.
    pub last_played: Option<i64>,
    pub duration: Option<f64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub comment: Option<String>,
    pub actors: Vec<String>,
    pub tags: Vec<String>,
    pub cover: Option<Vec<u8>>,
    /// Only populated between probing and the first commit; afterwards
    /// frames are read from the store on demand.
    pub thumbnails: Option<Vec<Thumbnail>>,
    pub favorites: Vec<Favorite>,
}

impl MediaFile {
    pub fn new(topdir: &TopDirectory, reldir: String, filename: String) -> Self {
        let abspath = join_abspath(&topdir.path, &reldir, &filename);
        Self {
            id: None,
            topdir_id: topdir.id.unwrap_or(-1),
            reldir,
            filename,
            abspath,
            size: None,
            mtime: None,
            last_played: None,
            duration: None,
            width: None,
            height: None,
            comment: None,
            actors: Vec::new(),
            tags: Vec::new(),
            cover: None,
            thumbnails: None,
            favorites: Vec::new(),
        }
    }

    /// Recompute `abspath` after the owning topdir moved.
    pub fn rebase(&mut self, topdir_path: &Path) {
        self.abspath = join_abspath(topdir_path, &self.reldir, &self.filename);
    }
}

pub(crate) fn join_abspath(root: &Path, reldir: &str, filename: &str) -> PathBuf {
    if reldir.is_empty() {
        root.join(filename)
    } else {
        root.join(reldir).join(filename)
    }
}

/// Display sort orders offered by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Filename,
    Time,
    LastPlay,
    Duration,
    Path,
    Size,
    Resolution,
}
