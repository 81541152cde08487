// libmediacat/src/sync_tests.rs

use super::config::{SyncSettings, ThumbnailPolicy};
use super::db;
use super::error::Result;
use super::model::{Thumbnail, TopDirectory};
use super::probe::{MediaInfo, MediaProber};
use super::sync::{sync_topdirs, CancelToken, SyncState};
use crate::test_utils::{open_catalog, quiet, recording, serial_settings, touch, FakeProber};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn store_count(cat: &super::Catalog, table: &str) -> i64 {
    let guard = cat.store().lock().unwrap();
    guard
        .conn()
        .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
        .unwrap()
}

#[test]
fn second_sync_is_a_no_op() {
    let tmp = tempdir().unwrap();
    let media = tmp.path().join("media");
    for n in ["a.mkv", "b.avi", "deep/er/c.MP4", "readme.txt"] {
        touch(&media, n);
    }
    let mut cat = open_catalog(
        &tmp.path().join("cat.db"),
        serial_settings(),
        Arc::new(FakeProber::new()),
    );
    cat.add_topdir(&media, None).unwrap();

    let first = cat.sync(&quiet(CancelToken::new())).unwrap();
    assert_eq!((first.added, first.removed), (3, 0));
    let second = cat.sync(&quiet(CancelToken::new())).unwrap();
    assert_eq!((second.added, second.removed), (0, 0));
    assert!(!second.cancelled);
    assert_eq!(store_count(&cat, "file"), 3);
}

#[test]
fn hundred_files_gain_three_lose_two() {
    let tmp = tempdir().unwrap();
    let one = tmp.path().join("one");
    let two = tmp.path().join("two");
    for i in 0..50 {
        touch(&one, &format!("clip{i:02}.mkv"));
        touch(&two, &format!("s{}/ep{i:02}.mp4", i % 3));
    }
    let mut cat = open_catalog(
        &tmp.path().join("cat.db"),
        SyncSettings {
            thumbnails: ThumbnailPolicy {
                min_images: 1,
                max_images: 2,
                ..ThumbnailPolicy::default()
            },
            ..SyncSettings::default()
        },
        Arc::new(FakeProber::new()),
    );
    cat.add_topdir(&one, None).unwrap();
    cat.add_topdir(&two, None).unwrap();
    assert_eq!(cat.sync(&quiet(CancelToken::new())).unwrap().added, 100);

    for n in ["new1.mkv", "new2.mkv", "extra/new3.mkv"] {
        touch(&one, n);
    }
    fs::remove_file(two.join("s0/ep00.mp4")).unwrap();
    fs::remove_file(two.join("s1/ep01.mp4")).unwrap();

    let out = cat.sync(&quiet(CancelToken::new())).unwrap();
    assert_eq!((out.added, out.removed), (3, 2));
    assert_eq!(cat.len(), 101);
    assert_eq!(store_count(&cat, "file"), 101);
    assert!(cat.files().iter().any(|f| f.reldir == "extra" && f.filename == "new3.mkv"));
}

#[test]
fn cancelled_sync_commits_whole_files_and_resumes() {
    let tmp = tempdir().unwrap();
    let media = tmp.path().join("media");
    for i in 0..6 {
        touch(&media, &format!("f{i}.mkv"));
    }
    let first_token = CancelToken::new();
    let prober = FakeProber::new().cancel_on(3, first_token.clone());
    let mut cat = open_catalog(&tmp.path().join("cat.db"), serial_settings(), Arc::new(prober));
    cat.add_topdir(&media, None).unwrap();

    let ctl = quiet(first_token);
    let out = cat.sync(&ctl).unwrap();
    assert!(out.cancelled);
    assert_eq!(out.added, 2, "one file per batch, cancelled during the third");
    assert_eq!(ctl.monitor.state(), SyncState::Cancelled);

    // every stored file is complete: 7 frames and a cover each
    assert_eq!(store_count(&cat, "file"), 2);
    assert_eq!(store_count(&cat, "thumbnail"), 2 * 7);
    assert_eq!(store_count(&cat, "cover"), 2);
    assert_eq!(cat.len(), 2);

    let out = cat.sync(&quiet(CancelToken::new())).unwrap();
    assert!(!out.cancelled);
    assert_eq!((out.added, out.removed), (4, 0));
    assert_eq!(store_count(&cat, "file"), 6);
    assert_eq!(store_count(&cat, "thumbnail"), 6 * 7);
    assert_eq!(store_count(&cat, "cover"), 6);
}

#[test]
fn pre_cancelled_sync_touches_nothing() {
    let tmp = tempdir().unwrap();
    let media = tmp.path().join("media");
    touch(&media, "a.mkv");
    let prober = Arc::new(FakeProber::new());
    let mut cat = open_catalog(&tmp.path().join("cat.db"), serial_settings(), prober.clone());
    cat.add_topdir(&media, None).unwrap();

    let token = CancelToken::new();
    token.cancel();
    let out = cat.sync(&quiet(token)).unwrap();
    assert!(out.cancelled);
    assert_eq!(out.added, 0);
    assert_eq!(prober.probes(), 0);
    assert_eq!(store_count(&cat, "file"), 0);
}

#[test]
fn unprobeable_file_is_skipped_and_retried() {
    let tmp = tempdir().unwrap();
    let media = tmp.path().join("media");
    for n in ["good.mkv", "bad.mkv", "fine.mp4"] {
        touch(&media, n);
    }
    let prober = Arc::new(FakeProber::new().failing("bad.mkv"));
    let mut cat = open_catalog(&tmp.path().join("cat.db"), serial_settings(), prober.clone());
    cat.add_topdir(&media, None).unwrap();

    let out = cat.sync(&quiet(CancelToken::new())).unwrap();
    assert_eq!((out.added, out.failed_probes), (2, 1));
    assert!(cat.files().iter().all(|f| f.filename != "bad.mkv"));

    let out = cat.sync(&quiet(CancelToken::new())).unwrap();
    assert_eq!((out.added, out.failed_probes), (0, 1));
    assert_eq!(prober.probes(), 4, "bad.mkv is probed again on every sync");
}

struct PanickingProber;

impl MediaProber for PanickingProber {
    fn probe(&self, path: &Path) -> Result<MediaInfo> {
        if path.ends_with("boom.mkv") {
            panic!("decoder blew up");
        }
        Ok(MediaInfo {
            duration: 10.0,
            width: 640,
            height: 480,
        })
    }

    fn sample_thumbnails(&self, _: &Path, offsets: &[u64], _: (u32, u32)) -> Result<Vec<Thumbnail>> {
        Ok(offsets.iter().map(|&o| Thumbnail::new(o, vec![0xff, 0xd8])).collect())
    }
}

#[test]
fn panicking_prober_does_not_stall_the_pool() {
    let tmp = tempdir().unwrap();
    let media = tmp.path().join("media");
    for n in ["boom.mkv", "ok1.mkv", "ok2.mkv"] {
        touch(&media, n);
    }
    let mut cat = open_catalog(
        &tmp.path().join("cat.db"),
        SyncSettings::default(),
        Arc::new(PanickingProber),
    );
    cat.add_topdir(&media, None).unwrap();
    let out = cat.sync(&quiet(CancelToken::new())).unwrap();
    assert_eq!((out.added, out.failed_probes), (2, 1));
}

#[test]
fn missing_topdir_is_skipped_not_fatal() {
    let tmp = tempdir().unwrap();
    let share = tmp.path().join("share");
    let local = tmp.path().join("local");
    touch(&share, "a.mkv");
    touch(&local, "b.mkv");

    let mut cat = open_catalog(
        &tmp.path().join("cat.db"),
        serial_settings(),
        Arc::new(FakeProber::new()),
    );
    cat.add_topdir(&share, None).unwrap();
    cat.add_topdir(&local, None).unwrap();
    assert_eq!(cat.sync(&quiet(CancelToken::new())).unwrap().added, 2);

    // share goes offline, local gains a file
    fs::remove_dir_all(&share).unwrap();
    touch(&local, "c.mkv");

    let (ctl, seen) = recording(CancelToken::new());
    let out = cat.sync(&ctl).unwrap();
    assert_eq!(out.skipped_dirs, 1);
    assert_eq!((out.added, out.removed), (1, 0));
    // records under the offline share are kept for when it comes back
    assert_eq!(store_count(&cat, "file"), 3);

    let seen = seen.lock().unwrap();
    let skipped = format!("topdir is not accessible: {}.. ignoring", share.display());
    assert!(seen.iter().any(|p| p.message == skipped));
}

#[test]
fn progress_reports_counts_and_finish() {
    let tmp = tempdir().unwrap();
    let media = tmp.path().join("media");
    for n in ["a.mkv", "b.mkv", "c.mkv"] {
        touch(&media, n);
    }
    let mut cat = open_catalog(
        &tmp.path().join("cat.db"),
        serial_settings(),
        Arc::new(FakeProber::new()),
    );
    cat.add_topdir(&media, None).unwrap();

    let (ctl, seen) = recording(CancelToken::new());
    cat.sync(&ctl).unwrap();
    let seen = seen.lock().unwrap();

    let counted: Vec<(usize, usize)> = seen
        .iter()
        .filter(|p| p.message.starts_with("Adding files : "))
        .filter_map(|p| p.current.zip(p.total))
        .collect();
    assert_eq!(counted, vec![(1, 3), (2, 3), (3, 3)]);
    assert_eq!(seen.last().map(|p| p.message.as_str()), Some("Sync Finished"));
}

#[test]
fn failed_commit_aborts_and_leaves_no_partial_rows() {
    let tmp = tempdir().unwrap();
    let media = tmp.path().join("media");
    touch(&media, "a.mkv");
    let mut cat = open_catalog(
        &tmp.path().join("cat.db"),
        serial_settings(),
        Arc::new(FakeProber::new()),
    );
    cat.add_topdir(&media, None).unwrap();
    {
        let guard = cat.store().lock().unwrap();
        guard.conn().execute_batch("DROP TABLE favorite; DROP TABLE thumbnail;").unwrap();
    }

    assert!(cat.sync(&quiet(CancelToken::new())).is_err());
    assert_eq!(store_count(&cat, "file"), 0);
    assert!(cat.is_empty());
}

#[test]
fn background_sync_reports_updates() {
    let tmp = tempdir().unwrap();
    let media = tmp.path().join("media");
    for n in ["a.mkv", "b.mkv", "c.mkv"] {
        touch(&media, n);
    }
    let mut cat = open_catalog(
        &tmp.path().join("cat.db"),
        serial_settings(),
        Arc::new(FakeProber::new()),
    );
    cat.add_topdir(&media, None).unwrap();

    let mut handle = cat.spawn_sync(quiet(CancelToken::new())).unwrap();
    let out = handle
        .join_timeout(Duration::from_secs(60))
        .expect("sync should finish")
        .unwrap();
    assert_eq!(out.added, 3);
    assert!(handle.is_finished());
    assert!(handle.take_updated());
    assert!(!handle.take_updated());
    assert_eq!(handle.state(), SyncState::Idle);

    // the foreground mirror only sees the rows after a reload
    assert!(cat.is_empty());
    assert_eq!(cat.reload_files().unwrap(), (3, 0));
}

#[test]
fn background_sync_stops_on_cancel() {
    let tmp = tempdir().unwrap();
    let media = tmp.path().join("media");
    for i in 0..4 {
        touch(&media, &format!("f{i}.mkv"));
    }
    let token = CancelToken::new();
    let prober = FakeProber::new().cancel_on(1, token.clone());
    let mut cat = open_catalog(&tmp.path().join("cat.db"), serial_settings(), Arc::new(prober));
    cat.add_topdir(&media, None).unwrap();

    let handle = cat.spawn_sync(quiet(token)).unwrap();
    let out = handle.join().unwrap();
    assert!(out.cancelled);
    assert_eq!(out.added, 0);
    assert_eq!(store_count(&cat, "file"), 0);
}

#[test]
fn topdir_table_follows_memory() {
    let conn = db::open(":memory:").unwrap();
    db::insert_topdir(&conn, &TopDirectory::new("/a", None)).unwrap();
    let b_id = db::insert_topdir(&conn, &TopDirectory::new("/b", None)).unwrap();

    let mut mem = vec![TopDirectory::new("/c", None), TopDirectory::new("/b", None)];
    let changes = sync_topdirs(&conn, &mut mem).unwrap();
    assert_eq!((changes.inserted, changes.deleted), (1, 1));

    // sorted by path, ids filled in
    assert_eq!(mem[0].path, PathBuf::from("/b"));
    assert_eq!(mem[0].id, Some(b_id));
    assert!(mem[1].id.is_some());

    let stored: Vec<PathBuf> = db::list_topdirs(&conn)
        .unwrap()
        .into_iter()
        .map(|t| t.path)
        .collect();
    assert_eq!(stored, vec![PathBuf::from("/b"), PathBuf::from("/c")]);
}

fn files_under(cat: &super::Catalog, topdir: &Path) -> usize {
    let id = cat.topdir_by_path(topdir).and_then(|t| t.id);
    let guard = cat.store().lock().unwrap();
    db::list_files(guard.conn(), 0)
        .unwrap()
        .iter()
        .filter(|r| Some(r.topdir_id) == id)
        .count()
}

#[test]
fn topdir_removed_during_background_sync_stays_removed() {
    // several rounds so the removal lands at different points of the run
    for _ in 0..5 {
        let tmp = tempdir().unwrap();
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        for n in ["1.mkv", "2.mkv"] {
            touch(&a, n);
            touch(&b, n);
        }
        let mut cat = open_catalog(
            &tmp.path().join("cat.db"),
            serial_settings(),
            Arc::new(FakeProber::new()),
        );
        cat.add_topdir(&a, None).unwrap();
        cat.add_topdir(&b, None).unwrap();
        cat.sync(&quiet(CancelToken::new())).unwrap();
        for n in ["3.mkv", "4.mkv"] {
            touch(&a, n);
            touch(&b, n);
        }

        let handle = cat.spawn_sync(quiet(CancelToken::new())).unwrap();
        assert!(cat.remove_topdir(&b).unwrap());
        let out = handle.join().unwrap();
        assert!(!out.cancelled);

        assert_eq!(store_count(&cat, "topdir"), 1);
        assert_eq!(files_under(&cat, &a), 4);
        assert_eq!(store_count(&cat, "file"), 4);

        cat.reload_files().unwrap();
        assert_eq!(cat.len(), 4);
        let a_id = cat.topdir_by_path(&a).and_then(|t| t.id);
        assert!(cat.files().iter().all(|f| Some(f.topdir_id) == a_id));
    }
}

#[test]
fn topdir_added_during_background_sync_is_kept() {
    let tmp = tempdir().unwrap();
    let a = tmp.path().join("a");
    let c = tmp.path().join("c");
    touch(&a, "1.mkv");
    touch(&c, "2.mkv");
    let mut cat = open_catalog(
        &tmp.path().join("cat.db"),
        serial_settings(),
        Arc::new(FakeProber::new()),
    );
    cat.add_topdir(&a, None).unwrap();

    let handle = cat.spawn_sync(quiet(CancelToken::new())).unwrap();
    assert!(cat.add_topdir(&c, None).unwrap());
    assert_eq!(handle.join().unwrap().added, 1);

    assert_eq!(store_count(&cat, "topdir"), 2);
    assert_eq!(files_under(&cat, &c), 0, "not part of the running sync");

    cat.reload_files().unwrap();
    let out = cat.sync(&quiet(CancelToken::new())).unwrap();
    assert_eq!((out.added, out.removed), (1, 0));
    assert_eq!(files_under(&cat, &c), 1);
}

#[cfg(target_os = "linux")]
#[test]
fn non_utf8_file_names_are_skipped_without_probing() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let tmp = tempdir().unwrap();
    let media = tmp.path().join("media");
    touch(&media, "ok.mkv");
    fs::write(media.join(OsStr::from_bytes(b"caf\xe9.mkv")), b"x").unwrap();

    let prober = Arc::new(FakeProber::new());
    let mut cat = open_catalog(&tmp.path().join("cat.db"), serial_settings(), prober.clone());
    cat.add_topdir(&media, None).unwrap();

    let first = cat.sync(&quiet(CancelToken::new())).unwrap();
    assert_eq!((first.added, first.failed_probes), (1, 0));
    let second = cat.sync(&quiet(CancelToken::new())).unwrap();
    assert_eq!((second.added, second.failed_probes), (0, 0));
    assert_eq!(prober.probes(), 1);
    assert_eq!(cat.files()[0].abspath, media.join("ok.mkv"));
}
