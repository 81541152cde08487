// libmediacat/src/scan.rs

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::sync::CancelToken;
use crate::utils::has_extension;

/// Recursively list files under `root` whose name matches one of
/// `extensions` (case-insensitive).
///
/// Returns an empty list as soon as `cancel` is observed, whatever depth
/// the walk has reached. Unreadable subdirectories are logged and skipped.
pub fn list_media_files(root: &Path, extensions: &[String], cancel: &CancelToken) -> Vec<PathBuf> {
    let mut found = Vec::new();

    for entry in WalkDir::new(root).into_iter() {
        if cancel.is_cancelled() {
            debug!(root = %root.display(), "scan cancelled");
            return Vec::new();
        }

        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(root = %root.display(), "skipping unreadable entry: {e}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        if !has_extension(&name, extensions) {
            continue;
        }

        debug!(file = %entry.path().display(), "found");
        found.push(entry.into_path());
    }

    info!(root = %root.display(), found = found.len(), "scan complete");
    found
}
