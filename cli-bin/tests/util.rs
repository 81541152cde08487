//! tests/util.rs
//! Small helpers shared across integration tests.

use assert_cmd::Command;
use std::path::PathBuf;
use tempfile::TempDir;

/// Absolute path to the freshly-built `mediacat` binary.
pub fn bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_mediacat"))
}

/// Build a `Command` for `mediacat` that reads no user settings and keeps
/// its default catalog inside `tmp`.
pub fn mediacat(tmp: &TempDir) -> Command {
    let mut cmd = Command::new(bin());
    cmd.env("MEDIACAT_DB_PATH", tmp.path().join("default.db"))
        .env("MEDIACAT_SETTINGS", tmp.path().join("no-settings.json"))
        .env_remove("RUST_LOG");
    cmd
}

/// A directory holding only files the scanner ignores, so a sync never
/// needs ffprobe.
pub fn media_dir(tmp: &TempDir, name: &str) -> PathBuf {
    let dir = tmp.path().join(name);
    std::fs::create_dir_all(dir.join("sub")).unwrap();
    std::fs::write(dir.join("notes.txt"), "").unwrap();
    std::fs::write(dir.join("sub").join("cover.png"), "").unwrap();
    dir
}
