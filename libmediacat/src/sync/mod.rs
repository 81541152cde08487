//! Reconciliation of the store with the filesystem.
//!
//! Two phases: [`sync_topdirs`] brings the `topdir` table in line with
//! the in-memory list, then [`Reconciler::sync_files`] walks each watched
//! directory, diffs what it finds against the mirrored file records, drops
//! the stale ones and probes/commits the new ones in pool-sized batches.
//! A background run does phase two only; phase one belongs to whoever owns
//! the topdir list.
//!
//! Every committed unit (one removal, or one added file with its
//! thumbnails and cover) is a single transaction, so cancelling between
//! units always leaves a consistent store.

pub mod background;
pub mod control;
pub mod diff;
pub mod pool;

pub use background::SyncHandle;
pub use control::{
    CancelToken, LogProgress, Progress, ProgressSink, SyncControl, SyncMonitor, SyncOutcome,
    SyncState,
};
pub use diff::{merge_join, Diff};
pub use pool::{ProbeOutcome, ProbePool};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::config::SyncSettings;
use crate::db::{self, lock, NewFile, SharedStore};
use crate::error::{Error, Result};
use crate::mirror::Mirror;
use crate::model::{MediaFile, TopDirectory};
use crate::probe::MediaProber;
use crate::scan;
use crate::utils::split_relative;

/// Rows touched by [`sync_topdirs`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TopdirChanges {
    pub inserted: usize,
    pub deleted: usize,
}

/// Make the `topdir` table match `topdirs`.
///
/// Sorts `topdirs` by path, inserts the ones the store lacks (their ids are
/// filled in) and deletes store rows that are no longer listed; the delete
/// cascades to their files and everything hanging off them.
pub fn sync_topdirs(conn: &Connection, topdirs: &mut [TopDirectory]) -> Result<TopdirChanges> {
    topdirs.sort_by(|a, b| a.path.cmp(&b.path));

    let listed: Vec<(PathBuf, usize)> = topdirs
        .iter()
        .enumerate()
        .map(|(i, t)| (t.path.clone(), i))
        .collect();
    let stored = db::list_topdirs(conn)?;

    let diff = merge_join(
        listed,
        stored,
        |(p, _): &(PathBuf, usize)| p.as_path(),
        |t: &TopDirectory| t.path.as_path(),
    );

    let mut changes = TopdirChanges::default();
    for ((_, i), row) in diff.both {
        topdirs[i].id = row.id;
    }
    for (path, i) in diff.only_left {
        let id = db::insert_topdir(conn, &topdirs[i])?;
        topdirs[i].id = Some(id);
        changes.inserted += 1;
        debug!(topdir = %path.display(), id, "topdir stored");
    }
    for row in diff.only_right {
        db::delete_topdir(conn, &row.path)?;
        changes.deleted += 1;
        info!(topdir = %row.path.display(), "topdir dropped from store");
    }
    Ok(changes)
}

/// Everything one sync run needs.
pub struct Reconciler<'a> {
    pub store: &'a SharedStore,
    pub settings: &'a SyncSettings,
    pub prober: Arc<dyn MediaProber>,
    pub control: &'a SyncControl,
}

impl Reconciler<'_> {
    /// Both phases: topdir table, then files.
    pub fn run(&self, topdirs: &mut [TopDirectory], mirror: &mut Mirror) -> Result<SyncOutcome> {
        if let Err(e) = self.prepare(topdirs, mirror) {
            return self.finish(Err(e));
        }
        self.finish(self.sync_files(topdirs, mirror))
    }

    /// Phase one only. Must run on the thread that owns `topdirs`; a
    /// background run gets the committed list and only does phase two.
    pub fn prepare(&self, topdirs: &mut [TopDirectory], mirror: &mut Mirror) -> Result<()> {
        self.control
            .monitor
            .set_state(SyncState::ScanningDirectories);
        {
            let guard = lock(self.store)?;
            sync_topdirs(guard.conn(), topdirs)?;
        }
        let orphans = mirror.retain(|f| topdirs.iter().any(|t| t.id == Some(f.topdir_id)));
        if orphans > 0 {
            self.control.monitor.mark_updated();
        }
        Ok(())
    }

    /// Phase two with the final state bookkeeping.
    pub fn run_files(&self, topdirs: &[TopDirectory], mirror: &mut Mirror) -> Result<SyncOutcome> {
        self.control
            .monitor
            .set_state(SyncState::ScanningDirectories);
        self.finish(self.sync_files(topdirs, mirror))
    }

    fn finish(&self, result: Result<SyncOutcome>) -> Result<SyncOutcome> {
        match &result {
            Ok(o) if o.cancelled => self.control.monitor.set_state(SyncState::Cancelled),
            Ok(_) => self.control.monitor.set_state(SyncState::Idle),
            Err(e) => {
                warn!("sync aborted: {e}");
                self.control.say(format!("Sync aborted : {e}"));
                self.control.monitor.set_state(SyncState::Idle);
            }
        }
        result
    }

    /// Reconcile the files of every topdir with what is on disk.
    ///
    /// Only a store failure is returned as `Err`. Unreachable directories
    /// and unprobeable files are counted in the outcome and skipped.
    pub fn sync_files(&self, topdirs: &[TopDirectory], mirror: &mut Mirror) -> Result<SyncOutcome> {
        let ctl = self.control;
        let mut outcome = SyncOutcome::default();

        let pool = ProbePool::new(
            self.settings.pool_size(),
            self.prober.clone(),
            self.settings.thumbnails.clone(),
            ctl.cancel.clone(),
        )?;

        for topdir in topdirs {
            if ctl.is_cancelled() {
                return Ok(cancelled(outcome));
            }
            let Some(topdir_id) = topdir.id else {
                warn!(topdir = %topdir.path.display(), "topdir has no id, skipping");
                continue;
            };
            if !still_watched(self.store, topdir)? {
                info!(topdir = %topdir.path.display(), "topdir no longer watched, skipping");
                continue;
            }
            if !topdir.path.is_dir() {
                let err = Error::DirectoryInaccessible(topdir.path.clone());
                warn!("{err}");
                ctl.say(format!("{err}.. ignoring"));
                outcome.skipped_dirs += 1;
                continue;
            }

            ctl.monitor.set_state(SyncState::Enumerating);
            ctl.say(format!("processing directory : {}", topdir.path.display()));
            let found = scan::list_media_files(&topdir.path, &self.settings.extensions, &ctl.cancel);
            if ctl.is_cancelled() {
                return Ok(cancelled(outcome));
            }

            ctl.monitor.set_state(SyncState::Diffing);
            let stored: Vec<(PathBuf, i64)> = mirror
                .iter()
                .filter(|f| f.topdir_id == topdir_id)
                .filter_map(|f| f.id.map(|id| (f.abspath.clone(), id)))
                .collect();
            let diff = merge_join(
                found,
                stored,
                |p: &PathBuf| p.as_path(),
                |(p, _): &(PathBuf, i64)| p.as_path(),
            );
            debug!(
                topdir = %topdir.path.display(),
                add = diff.only_left.len(),
                remove = diff.only_right.len(),
                keep = diff.both.len(),
                "diffed"
            );

            ctl.monitor.set_state(SyncState::RemovingStale);
            for (path, id) in diff.only_right {
                if ctl.is_cancelled() {
                    return Ok(cancelled(outcome));
                }
                ctl.say(format!("Removing file : {}", path.display()));
                {
                    let guard = lock(self.store)?;
                    db::delete_file(guard.conn(), id)?;
                }
                mirror.remove(id);
                ctl.monitor.mark_updated();
                outcome.removed += 1;
            }

            ctl.monitor.set_state(SyncState::ProbingAndAdding);
            let pending: Vec<MediaFile> = diff
                .only_left
                .iter()
                .filter_map(|p| new_record(topdir, p))
                .collect();
            if !self.add_files(topdir, pending, &pool, mirror, &mut outcome)? {
                return Ok(cancelled(outcome));
            }
        }

        info!(
            added = outcome.added,
            removed = outcome.removed,
            skipped_dirs = outcome.skipped_dirs,
            failed_probes = outcome.failed_probes,
            "sync finished"
        );
        ctl.say("Sync Finished");
        Ok(outcome)
    }

    /// Probe and commit `pending` batch by batch. Returns `false` when the
    /// run was cancelled; the batch in flight at that point is discarded.
    fn add_files(
        &self,
        topdir: &TopDirectory,
        pending: Vec<MediaFile>,
        pool: &ProbePool,
        mirror: &mut Mirror,
        outcome: &mut SyncOutcome,
    ) -> Result<bool> {
        let ctl = self.control;
        let total = pending.len();
        let mut dispatched = 0;
        let mut pending = pending.into_iter();

        loop {
            if ctl.is_cancelled() {
                return Ok(false);
            }
            let batch: Vec<MediaFile> = pending.by_ref().take(pool.size()).collect();
            if batch.is_empty() {
                return Ok(true);
            }
            dispatched += batch.len();
            if let Some(last) = batch.last() {
                ctl.report(Progress::counted(
                    format!("Adding files : {}", last.filename),
                    dispatched,
                    total,
                ));
            }

            let results = pool.run_batch(batch)?;
            if ctl.is_cancelled() {
                return Ok(false);
            }

            for result in results {
                match result {
                    ProbeOutcome::Ready(file) => match commit_file(self.store, topdir, file)? {
                        Some(file) => {
                            mirror.push(file);
                            ctl.monitor.mark_updated();
                            outcome.added += 1;
                        }
                        None => {
                            info!(topdir = %topdir.path.display(), "topdir removed mid-sync, stopping");
                            return Ok(true);
                        }
                    },
                    ProbeOutcome::Failed(path, e) => {
                        debug!(file = %path.display(), "not added: {e}");
                        outcome.failed_probes += 1;
                    }
                    ProbeOutcome::Abandoned(_) => {}
                }
            }
        }
    }
}

fn cancelled(mut outcome: SyncOutcome) -> SyncOutcome {
    info!("sync cancelled");
    outcome.cancelled = true;
    outcome
}

/// Record for a scanned path. The scanned path itself is kept for
/// probing; names the store cannot hold as text are skipped.
fn new_record(topdir: &TopDirectory, path: &Path) -> Option<MediaFile> {
    let Some((reldir, filename)) = split_relative(&topdir.path, path) else {
        if path.starts_with(&topdir.path) {
            warn!(file = %path.display(), "file name is not valid UTF-8, skipped");
        } else {
            warn!(file = %path.display(), "outside its topdir, ignored");
        }
        return None;
    };
    let mut file = MediaFile::new(topdir, reldir, filename);
    file.abspath = path.to_path_buf();
    Some(file)
}

/// `true` while the store still holds `topdir` under its id and path.
fn still_watched(store: &SharedStore, topdir: &TopDirectory) -> Result<bool> {
    let guard = lock(store)?;
    Ok(topdir.id.is_some() && db::topdir_id(guard.conn(), &topdir.path)? == topdir.id)
}

/// Persist one probed file with its thumbnails and cover in a single
/// transaction. The returned record carries its id and no thumbnails.
/// `None` when `topdir` left the store since the run started.
pub(crate) fn commit_file(
    store: &SharedStore,
    topdir: &TopDirectory,
    mut file: MediaFile,
) -> Result<Option<MediaFile>> {
    let thumbs = file.thumbnails.take().unwrap_or_default();
    let id = {
        let mut guard = lock(store)?;
        guard.with_transaction(|tx| {
            if topdir.id.is_none() || db::topdir_id(tx, &topdir.path)? != topdir.id {
                return Ok(None);
            }
            db::insert_file(
                tx,
                &NewFile {
                    topdir_id: file.topdir_id,
                    reldir: &file.reldir,
                    filename: &file.filename,
                    size: file.size,
                    time: file.mtime,
                    lastplay: file.last_played,
                    duration: file.duration,
                    comment: file.comment.as_deref(),
                    width: file.width,
                    height: file.height,
                },
            )?;
            let id = db::resolve_file_id(tx, file.topdir_id, &file.reldir, &file.filename)?
                .ok_or_else(|| Error::NotFound(file.abspath.display().to_string()))?;
            db::insert_thumbnails(tx, id, &thumbs)?;
            if let Some(cover) = &file.cover {
                db::replace_cover(tx, id, cover)?;
            }
            Ok(Some(id))
        })?
    };
    let Some(id) = id else {
        return Ok(None);
    };
    debug!(file = %file.abspath.display(), id, frames = thumbs.len(), "committed");
    file.id = Some(id);
    Ok(Some(file))
}
