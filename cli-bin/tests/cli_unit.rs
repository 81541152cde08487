//! tests cli_unit.rs
//! End-to-end runs of the `mediacat` binary against scratch catalogs.

use predicates::prelude::*;
use predicates::str;
use tempfile::tempdir;

mod util;
use util::{media_dir, mediacat};

/* ───────────────────────── CREATE / INFO ─────────────────────── */

#[test]
fn create_lists_watched_dirs() {
    let tmp = tempdir().unwrap();
    let movies = media_dir(&tmp, "movies");
    let shows = media_dir(&tmp, "shows");
    let db = tmp.path().join("cat.db");

    mediacat(&tmp)
        .arg("create")
        .arg(&db)
        .arg("--dir")
        .arg(&movies)
        .arg("--dir")
        .arg(&shows)
        .assert()
        .success()
        .stdout(str::contains(format!("{}\t0", movies.display())))
        .stdout(str::contains(format!("{}\t0", shows.display())))
        .stdout(str::contains("total\t0"));

    assert!(db.is_file());

    mediacat(&tmp)
        .arg("info")
        .arg(&db)
        .assert()
        .success()
        .stdout(str::contains(movies.display().to_string()));
}

#[test]
fn create_replaces_existing_catalog() {
    let tmp = tempdir().unwrap();
    let first = media_dir(&tmp, "first");
    let second = media_dir(&tmp, "second");
    let db = tmp.path().join("cat.db");

    mediacat(&tmp)
        .arg("create")
        .arg(&db)
        .arg("--dir")
        .arg(&first)
        .assert()
        .success();

    mediacat(&tmp)
        .arg("create")
        .arg(&db)
        .arg("--dir")
        .arg(&second)
        .assert()
        .success();

    mediacat(&tmp)
        .arg("info")
        .arg(&db)
        .assert()
        .success()
        .stdout(str::contains(second.display().to_string()))
        .stdout(str::contains(first.display().to_string()).not());
}

#[test]
fn nested_dir_is_not_added_twice() {
    let tmp = tempdir().unwrap();
    let root = media_dir(&tmp, "root");
    let db = tmp.path().join("cat.db");

    mediacat(&tmp)
        .arg("create")
        .arg(&db)
        .arg("--dir")
        .arg(&root)
        .arg("--dir")
        .arg(root.join("sub"))
        .assert()
        .success()
        .stdout(str::contains(format!("{}\t", root.join("sub").display())).not());
}

/* ───────────────────────── SYNC ─────────────────────────────── */

#[test]
fn sync_existing_catalog() {
    let tmp = tempdir().unwrap();
    let movies = media_dir(&tmp, "movies");
    let db = tmp.path().join("cat.db");

    mediacat(&tmp)
        .arg("create")
        .arg(&db)
        .arg("--dir")
        .arg(&movies)
        .assert()
        .success();

    mediacat(&tmp)
        .arg("sync")
        .arg(&db)
        .assert()
        .success()
        .stderr(str::contains("Sync Finished"));
}

#[test]
fn quiet_sync_logs_nothing() {
    let tmp = tempdir().unwrap();
    let movies = media_dir(&tmp, "movies");
    let db = tmp.path().join("cat.db");

    mediacat(&tmp)
        .arg("create")
        .arg(&db)
        .arg("--dir")
        .arg(&movies)
        .assert()
        .success();

    mediacat(&tmp)
        .args(["--quiet", "sync"])
        .arg(&db)
        .assert()
        .success()
        .stderr(str::is_empty());
}

#[test]
fn missing_topdir_is_skipped_not_fatal() {
    let tmp = tempdir().unwrap();
    let movies = media_dir(&tmp, "movies");
    let db = tmp.path().join("cat.db");

    mediacat(&tmp)
        .arg("create")
        .arg(&db)
        .arg("--dir")
        .arg(&movies)
        .assert()
        .success();

    std::fs::remove_dir_all(&movies).unwrap();

    mediacat(&tmp)
        .arg("sync")
        .arg(&db)
        .assert()
        .success()
        .stderr(str::contains("topdir is not accessible"));
}

/* ───────────────────────── MOD ──────────────────────────────── */

#[test]
fn mod_retargets_prefix() {
    let tmp = tempdir().unwrap();
    let old_root = tmp.path().join("old");
    let movies = media_dir(&tmp, "old/movies");
    let db = tmp.path().join("cat.db");
    let new_root = tmp.path().join("new");

    mediacat(&tmp)
        .arg("create")
        .arg(&db)
        .arg("--dir")
        .arg(&movies)
        .assert()
        .success();

    mediacat(&tmp)
        .arg("mod")
        .arg(&db)
        .arg("--orig")
        .arg(&old_root)
        .arg("--new")
        .arg(&new_root)
        .assert()
        .success()
        .stdout(str::contains(format!(
            "{} -> {}",
            movies.display(),
            new_root.join("movies").display()
        )));

    mediacat(&tmp)
        .arg("info")
        .arg(&db)
        .assert()
        .success()
        .stdout(str::contains(new_root.join("movies").display().to_string()))
        .stdout(str::contains(movies.display().to_string()).not());
}

/* ───────────────────────── FAILURES ─────────────────────────── */

#[test]
fn info_on_missing_catalog_fails() {
    let tmp = tempdir().unwrap();
    mediacat(&tmp)
        .arg("info")
        .arg(tmp.path().join("nope.db"))
        .assert()
        .failure()
        .stderr(str::contains("does not exist"));
}

#[test]
fn version_mismatch_is_reported() {
    let tmp = tempdir().unwrap();
    let db = tmp.path().join("old.db");
    {
        let conn = libmediacat::db::open(&db).unwrap();
        libmediacat::db::set_schema_version(&conn, 0, 1).unwrap();
    }

    mediacat(&tmp)
        .arg("sync")
        .arg(&db)
        .assert()
        .failure()
        .stderr(str::contains("does not match expected"));
}

#[test]
fn create_requires_a_dir() {
    let tmp = tempdir().unwrap();
    mediacat(&tmp)
        .arg("create")
        .arg(tmp.path().join("cat.db"))
        .assert()
        .failure();
}

/* ───────────────────────── COMPLETIONS ──────────────────────── */

#[test]
fn completions_bash() {
    let tmp = tempdir().unwrap();
    mediacat(&tmp)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(str::contains("mediacat"));
}

#[test]
fn create_ignores_stale_wal_files() {
    let tmp = tempdir().unwrap();
    let movies = media_dir(&tmp, "movies");
    let db = tmp.path().join("cat.db");
    std::fs::write(tmp.path().join("cat.db-wal"), b"left over from a crash").unwrap();
    std::fs::write(tmp.path().join("cat.db-shm"), b"left over from a crash").unwrap();

    mediacat(&tmp)
        .arg("create")
        .arg(&db)
        .arg("--dir")
        .arg(&movies)
        .assert()
        .success()
        .stdout(str::contains("total\t0"));
}
