//! Catalog facade.
//!
//! A [`Catalog`] owns the in-memory mirror of one store: the watched
//! directories, every file record, and the actor/tag vocabularies. Every
//! mutation goes store first, mirror second, so a failed store call leaves
//! the mirror untouched. Deleting a file goes disk, then store, then mirror.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::{Config, SyncSettings};
use crate::db::{self, lock, FileRow, SharedStore, Store};
use crate::error::{Error, Result};
use crate::mirror::Mirror;
use crate::model::{Favorite, MediaFile, SortKey, Thumbnail, TopDirectory};
use crate::probe::{FfmpegProber, MediaProber};
use crate::sync::{self, Reconciler, SyncControl, SyncHandle, SyncOutcome, SyncState};
use crate::utils::{absolutize, is_within};

pub struct Catalog {
    store: SharedStore,
    settings: SyncSettings,
    prober: Arc<dyn MediaProber>,
    topdirs: Vec<TopDirectory>,
    mirror: Mirror,
    actors: BTreeSet<String>,
    tags: BTreeSet<String>,
}

impl Catalog {
    /// Open (or create) the catalog at `path` with default settings and
    /// the ffmpeg prober.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(&Config::at(path), Arc::new(FfmpegProber::default()))
    }

    pub fn open_with(config: &Config, prober: Arc<dyn MediaProber>) -> Result<Self> {
        let store = Store::open(&config.db_path)?.shared();
        Self::attach(store, config.sync.clone(), prober)
    }

    /// Build a catalog over an already open store and load everything.
    pub fn attach(
        store: SharedStore,
        settings: SyncSettings,
        prober: Arc<dyn MediaProber>,
    ) -> Result<Self> {
        let mut cat = Self {
            store,
            settings,
            prober,
            topdirs: Vec::new(),
            mirror: Mirror::new(),
            actors: BTreeSet::new(),
            tags: BTreeSet::new(),
        };
        cat.load()?;
        Ok(cat)
    }

    /// Load topdirs, files, actors, actor links, tags, covers and
    /// favorites, in that order.
    fn load(&mut self) -> Result<()> {
        let guard = lock(&self.store)?;
        let conn = guard.conn();

        let mut topdirs = db::list_topdirs(conn)?;
        topdirs.sort_by(|a, b| a.path.cmp(&b.path));

        let mut mirror = Mirror::new();
        for row in db::list_files(conn, 0)? {
            match file_from_row(&topdirs, row) {
                Some(f) => {
                    mirror.push(f);
                }
                None => warn!("file row without a known topdir skipped"),
            }
        }

        let actors: BTreeSet<String> = db::list_actors(conn)?.into_iter().collect();
        for (name, file_id) in db::list_actorfiles(conn)? {
            if let Some(f) = mirror.get_mut(file_id) {
                f.actors.push(name);
            }
        }

        let mut tags = BTreeSet::new();
        for (tag, file_id) in db::list_tags(conn)? {
            if let Some(f) = mirror.get_mut(file_id) {
                f.tags.push(tag.clone());
            }
            tags.insert(tag);
        }

        for (file_id, jpeg) in db::list_covers(conn)? {
            if let Some(f) = mirror.get_mut(file_id) {
                f.cover = Some(jpeg);
            }
        }

        for fav in db::list_favorites(conn)? {
            if let Some(f) = mirror.get_mut(fav.file_id) {
                f.favorites.push(Favorite {
                    id: fav.id,
                    thumb_id: fav.thumb_id,
                    offset: fav.offset,
                });
            }
        }
        drop(guard);

        info!(
            topdirs = topdirs.len(),
            files = mirror.len(),
            actors = actors.len(),
            tags = tags.len(),
            "catalog loaded"
        );
        self.topdirs = topdirs;
        self.mirror = mirror;
        self.actors = actors;
        self.tags = tags;
        Ok(())
    }

    /// Release the catalog. The connection is closed here unless a
    /// background sync still holds it.
    pub fn close(self) -> Result<()> {
        match Arc::try_unwrap(self.store) {
            Ok(m) => m
                .into_inner()
                .map_err(|_| Error::Database("store mutex poisoned".into()))?
                .close(),
            Err(_) => {
                debug!("store still shared, leaving it open");
                Ok(())
            }
        }
    }

    /* ─── accessors ────────────────────────────────────────────────── */

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn topdirs(&self) -> &[TopDirectory] {
        &self.topdirs
    }

    pub fn files(&self) -> &[MediaFile] {
        self.mirror.files()
    }

    pub fn len(&self) -> usize {
        self.mirror.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mirror.is_empty()
    }

    pub fn file_by_id(&self, id: i64) -> Option<&MediaFile> {
        self.mirror.get(id)
    }

    pub fn topdir_by_path<P: AsRef<Path>>(&self, path: P) -> Option<&TopDirectory> {
        self.topdirs.iter().find(|t| t.path == path.as_ref())
    }

    pub fn actors(&self) -> &BTreeSet<String> {
        &self.actors
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /* ─── watched directories ──────────────────────────────────────── */

    /// Watch `path`. Returns `false` when it is already watched or lies
    /// inside a watched directory. Watched directories inside `path` are
    /// dropped in its favour.
    pub fn add_topdir<P: AsRef<Path>>(&mut self, path: P, comment: Option<&str>) -> Result<bool> {
        let path = absolutize(&path.as_ref().to_string_lossy());
        if self.topdir_by_path(&path).is_some() {
            return Ok(false);
        }
        if let Some(parent) = self.topdirs.iter().find(|t| is_within(&path, &t.path)) {
            let reason = Error::AncestorDirectory {
                path: path.clone(),
                existing: parent.path.clone(),
            };
            info!("{reason}, not added");
            return Ok(false);
        }

        let previous = self.topdirs.clone();
        self.topdirs.retain(|t| {
            let nested = is_within(&t.path, &path);
            if nested {
                info!(
                    "removing {} because it is inside {}",
                    t.path.display(),
                    path.display()
                );
            }
            !nested
        });
        info!(topdir = %path.display(), "adding topdir");
        self.topdirs
            .push(TopDirectory::new(path, comment.map(str::to_string)));

        self.commit_topdirs(previous)?;
        Ok(true)
    }

    /// Stop watching `path`; its files leave the store by cascade.
    pub fn remove_topdir<P: AsRef<Path>>(&mut self, path: P) -> Result<bool> {
        let path = absolutize(&path.as_ref().to_string_lossy());
        let Some(pos) = self.topdirs.iter().position(|t| t.path == path) else {
            return Ok(false);
        };
        let previous = self.topdirs.clone();
        self.topdirs.remove(pos);
        info!(topdir = %path.display(), "removing topdir");
        self.commit_topdirs(previous)?;
        Ok(true)
    }

    /// Retarget a watched directory, e.g. after a drive letter or mount
    /// point change. File records keep their ids. The new path may not be
    /// inside, or contain, another watched directory.
    pub fn modify_topdir_path<P: AsRef<Path>, Q: AsRef<Path>>(&mut self, old: P, new: Q) -> Result<()> {
        let old = old.as_ref();
        let new = absolutize(&new.as_ref().to_string_lossy());
        let pos = self
            .topdirs
            .iter()
            .position(|t| t.path == old)
            .ok_or_else(|| Error::NotFound(format!("topdir {}", old.display())))?;
        if self.topdir_by_path(&new).is_some() {
            return Err(Error::DuplicateName(new.display().to_string()));
        }
        let clash = self
            .topdirs
            .iter()
            .enumerate()
            .find(|(i, t)| *i != pos && (is_within(&new, &t.path) || is_within(&t.path, &new)));
        if let Some((_, other)) = clash {
            return Err(Error::AncestorDirectory {
                path: new,
                existing: other.path.clone(),
            });
        }

        {
            let guard = lock(&self.store)?;
            db::update_topdir_path(guard.conn(), old, &new)?;
        }
        info!("modify {} -> {}", old.display(), new.display());

        let id = self.topdirs[pos].id;
        self.topdirs[pos].path = new.clone();
        for f in self.mirror.iter_mut().filter(|f| Some(f.topdir_id) == id) {
            f.rebase(&new);
        }
        self.topdirs.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(())
    }

    /// Push the topdir list to the store in one transaction; on failure
    /// put `previous` back.
    fn commit_topdirs(&mut self, previous: Vec<TopDirectory>) -> Result<()> {
        let res = {
            let topdirs = &mut self.topdirs;
            lock(&self.store)
                .and_then(|mut g| g.with_transaction(|tx| sync::sync_topdirs(tx, topdirs)))
        };
        match res {
            Ok(changes) => {
                debug!(?changes, "topdirs committed");
                let topdirs = &self.topdirs;
                self.mirror
                    .retain(|f| topdirs.iter().any(|t| t.id == Some(f.topdir_id)));
                Ok(())
            }
            Err(e) => {
                self.topdirs = previous;
                Err(e)
            }
        }
    }

    /* ─── queries ──────────────────────────────────────────────────── */

    /// Files with any of `actors` and any of `tags` whose path contains
    /// `name` (case-insensitive). An empty criterion matches everything.
    pub fn filter<S: AsRef<str>>(&self, actors: &[S], tags: &[S], name: &str) -> Vec<&MediaFile> {
        let needle = name.to_lowercase();
        self.mirror
            .iter()
            .filter(|f| {
                actors.is_empty()
                    || actors.iter().any(|a| f.actors.iter().any(|x| x == a.as_ref()))
            })
            .filter(|f| {
                tags.is_empty() || tags.iter().any(|t| f.tags.iter().any(|x| x == t.as_ref()))
            })
            .filter(|f| {
                needle.is_empty()
                    || f.abspath
                        .to_string_lossy()
                        .to_lowercase()
                        .contains(&needle)
            })
            .collect()
    }

    /// Reorder the mirror for display.
    pub fn sort_files(&mut self, key: SortKey, ascending: bool) {
        self.mirror.sort_by(|a, b| {
            let ord = compare(a, b, key).then_with(|| a.abspath.cmp(&b.abspath));
            if ascending {
                ord
            } else {
                ord.reverse()
            }
        });
    }

    /// Number of mirrored files per watched directory.
    pub fn count_by_topdir(&self) -> Vec<(PathBuf, usize)> {
        self.topdirs
            .iter()
            .map(|t| {
                let n = self
                    .mirror
                    .iter()
                    .filter(|f| Some(f.topdir_id) == t.id)
                    .count();
                (t.path.clone(), n)
            })
            .collect()
    }

    /* ─── files ────────────────────────────────────────────────────── */

    /// Delete the file from disk, then from the store, then from the
    /// mirror. A disk failure changes nothing.
    pub fn delete_file(&mut self, id: i64) -> Result<()> {
        let path = self
            .mirror
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("file {id}")))?
            .abspath
            .clone();

        fs::remove_file(&path).map_err(|source| Error::FileDelete {
            path: path.clone(),
            source,
        })?;

        let res = lock(&self.store).and_then(|g| db::delete_file(g.conn(), id));
        if let Err(e) = res {
            error!(file = %path.display(), "deleted from disk but still catalogued: {e}");
            return Err(e);
        }

        self.mirror.remove(id);
        info!(file = %path.display(), "file deleted");
        Ok(())
    }

    /// Pull rows committed by someone else (a background sync) into the
    /// mirror without touching the filesystem. Returns (added, removed).
    pub fn reload_files(&mut self) -> Result<(usize, usize)> {
        let (live, fresh) = {
            let guard = lock(&self.store)?;
            let conn = guard.conn();
            let rows = db::list_files(conn, 0)?;
            let live: HashSet<i64> = rows.iter().map(|r| r.id).collect();
            let mut fresh = Vec::new();
            for row in rows {
                if !self.mirror.contains(row.id) {
                    let cover = db::cover_for(conn, row.id)?;
                    fresh.push((row, cover));
                }
            }
            (live, fresh)
        };

        let removed = self
            .mirror
            .retain(|f| f.id.map_or(false, |id| live.contains(&id)));

        let mut added = 0;
        for (row, cover) in fresh {
            let id = row.id;
            match file_from_row(&self.topdirs, row) {
                Some(mut f) => {
                    f.cover = cover;
                    if self.mirror.push(f) {
                        added += 1;
                    }
                }
                None => debug!(id, "reloaded file has no known topdir"),
            }
        }
        if added > 0 || removed > 0 {
            debug!(added, removed, "mirror reloaded");
        }
        Ok((added, removed))
    }

    pub fn set_last_played(&mut self, id: i64, when: i64) -> Result<()> {
        self.require(id)?;
        {
            let guard = lock(&self.store)?;
            db::set_file_lastplay(guard.conn(), id, Some(when))?;
        }
        if let Some(f) = self.mirror.get_mut(id) {
            f.last_played = Some(when);
        }
        Ok(())
    }

    /// Stamp the file as played right now.
    pub fn mark_played(&mut self, id: i64) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();
        self.set_last_played(id, now)?;
        Ok(now)
    }

    pub fn set_comment(&mut self, id: i64, comment: Option<&str>) -> Result<()> {
        self.require(id)?;
        {
            let guard = lock(&self.store)?;
            db::set_file_comment(guard.conn(), id, comment)?;
        }
        if let Some(f) = self.mirror.get_mut(id) {
            f.comment = comment.map(str::to_string);
        }
        Ok(())
    }

    fn require(&self, id: i64) -> Result<&MediaFile> {
        self.mirror
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("file {id}")))
    }

    /* ─── actors ───────────────────────────────────────────────────── */

    /// Add `name` to the actor vocabulary.
    pub fn add_actor(&mut self, name: &str) -> Result<bool> {
        if self.actors.contains(name) {
            return Ok(false);
        }
        {
            let guard = lock(&self.store)?;
            db::insert_actor(guard.conn(), name)?;
        }
        self.actors.insert(name.to_string());
        Ok(true)
    }

    /// Drop an actor from the vocabulary and from every file.
    pub fn remove_actor(&mut self, name: &str) -> Result<bool> {
        if !self.actors.contains(name) {
            return Ok(false);
        }
        {
            let guard = lock(&self.store)?;
            db::delete_actor(guard.conn(), name)?;
        }
        self.actors.remove(name);
        for f in self.mirror.iter_mut() {
            f.actors.retain(|a| a != name);
        }
        Ok(true)
    }

    pub fn add_actor_to_file(&mut self, id: i64, name: &str) -> Result<bool> {
        if self.require(id)?.actors.iter().any(|a| a == name) {
            return Ok(false);
        }
        {
            let guard = lock(&self.store)?;
            let actor_id = db::insert_actor(guard.conn(), name)?;
            db::link_actor(guard.conn(), actor_id, id)?;
        }
        self.actors.insert(name.to_string());
        if let Some(f) = self.mirror.get_mut(id) {
            f.actors.push(name.to_string());
        }
        Ok(true)
    }

    pub fn remove_actor_from_file(&mut self, id: i64, name: &str) -> Result<bool> {
        if !self.require(id)?.actors.iter().any(|a| a == name) {
            return Ok(false);
        }
        {
            let guard = lock(&self.store)?;
            if let Some(actor_id) = db::actor_id(guard.conn(), name)? {
                db::unlink_actor(guard.conn(), actor_id, id)?;
            }
        }
        if let Some(f) = self.mirror.get_mut(id) {
            f.actors.retain(|a| a != name);
        }
        Ok(true)
    }

    /// Rename an actor everywhere. Fails with [`Error::DuplicateName`]
    /// when `new` is already in the vocabulary; nothing changes then.
    pub fn rename_actor(&mut self, old: &str, new: &str) -> Result<()> {
        if !self.actors.contains(old) {
            return Err(Error::NotFound(format!("actor {old}")));
        }
        if self.actors.contains(new) {
            return Err(Error::DuplicateName(new.to_string()));
        }
        {
            let guard = lock(&self.store)?;
            db::rename_actor(guard.conn(), old, new)?;
        }
        self.actors.remove(old);
        self.actors.insert(new.to_string());
        for f in self.mirror.iter_mut() {
            rename_in(&mut f.actors, old, new);
        }
        Ok(())
    }

    /* ─── tags ─────────────────────────────────────────────────────── */

    pub fn add_tag_to_file(&mut self, id: i64, tag: &str) -> Result<bool> {
        if self.require(id)?.tags.iter().any(|t| t == tag) {
            return Ok(false);
        }
        {
            let guard = lock(&self.store)?;
            db::add_tag(guard.conn(), tag, id)?;
        }
        self.tags.insert(tag.to_string());
        if let Some(f) = self.mirror.get_mut(id) {
            f.tags.push(tag.to_string());
        }
        Ok(true)
    }

    pub fn remove_tag_from_file(&mut self, id: i64, tag: &str) -> Result<bool> {
        if !self.require(id)?.tags.iter().any(|t| t == tag) {
            return Ok(false);
        }
        {
            let guard = lock(&self.store)?;
            db::remove_tag(guard.conn(), tag, id)?;
        }
        if let Some(f) = self.mirror.get_mut(id) {
            f.tags.retain(|t| t != tag);
        }
        Ok(true)
    }

    /// Rename a tag on every file. Same failure rules as
    /// [`rename_actor`](Self::rename_actor).
    pub fn rename_tag(&mut self, old: &str, new: &str) -> Result<()> {
        if !self.tags.contains(old) {
            return Err(Error::NotFound(format!("tag {old}")));
        }
        if self.tags.contains(new) {
            return Err(Error::DuplicateName(new.to_string()));
        }
        {
            let guard = lock(&self.store)?;
            db::rename_tag(guard.conn(), old, new)?;
        }
        self.tags.remove(old);
        self.tags.insert(new.to_string());
        for f in self.mirror.iter_mut() {
            rename_in(&mut f.tags, old, new);
        }
        Ok(())
    }

    /* ─── thumbnails, cover, favorites ─────────────────────────────── */

    /// Thumbnails of one file, read from the store, ordered by offset.
    pub fn thumbnails(&self, id: i64) -> Result<Vec<Thumbnail>> {
        self.require(id)?;
        let guard = lock(&self.store)?;
        db::thumbnails_for(guard.conn(), id)
    }

    pub fn cover(&self, id: i64) -> Option<&[u8]> {
        self.mirror.get(id).and_then(|f| f.cover.as_deref())
    }

    /// Use the `index`-th thumbnail as the file's cover.
    pub fn set_cover_index(&mut self, id: i64, index: usize) -> Result<()> {
        let mut thumbs = self.thumbnails(id)?;
        if index >= thumbs.len() {
            return Err(Error::NotFound(format!("thumbnail {index} of file {id}")));
        }
        let jpeg = thumbs.swap_remove(index).jpeg;
        {
            let guard = lock(&self.store)?;
            db::replace_cover(guard.conn(), id, &jpeg)?;
        }
        if let Some(f) = self.mirror.get_mut(id) {
            f.cover = Some(jpeg);
        }
        Ok(())
    }

    /// Bookmark the thumbnail at `offset`. Returns the existing favorite
    /// if there is one, `None` when the file has no thumbnail there.
    pub fn add_favorite(&mut self, id: i64, offset: u64) -> Result<Option<Favorite>> {
        if let Some(fav) = self.require(id)?.favorites.iter().find(|f| f.offset == offset) {
            return Ok(Some(fav.clone()));
        }
        let Some(thumb_id) = self
            .thumbnails(id)?
            .into_iter()
            .find(|t| t.offset == offset)
            .and_then(|t| t.id)
        else {
            return Ok(None);
        };

        let fav_id = {
            let guard = lock(&self.store)?;
            db::insert_favorite(guard.conn(), id, thumb_id)?
        };
        let fav = Favorite {
            id: fav_id,
            thumb_id,
            offset,
        };
        if let Some(f) = self.mirror.get_mut(id) {
            f.favorites.push(fav.clone());
            f.favorites.sort_by_key(|f| f.offset);
        }
        Ok(Some(fav))
    }

    pub fn remove_favorite(&mut self, id: i64, fav_id: i64) -> Result<bool> {
        if !self.require(id)?.favorites.iter().any(|f| f.id == fav_id) {
            return Ok(false);
        }
        {
            let guard = lock(&self.store)?;
            db::delete_favorite(guard.conn(), fav_id)?;
        }
        if let Some(f) = self.mirror.get_mut(id) {
            f.favorites.retain(|f| f.id != fav_id);
        }
        Ok(true)
    }

    /* ─── sync ─────────────────────────────────────────────────────── */

    /// Run both sync phases on the calling thread.
    pub fn sync(&mut self, control: &SyncControl) -> Result<SyncOutcome> {
        let reconciler = Reconciler {
            store: &self.store,
            settings: &self.settings,
            prober: self.prober.clone(),
            control,
        };
        reconciler.run(&mut self.topdirs, &mut self.mirror)
    }

    /// Run a sync on its own thread over the same store connection.
    ///
    /// The topdir table is committed here, on the caller's thread; the
    /// worker only reconciles files, so topdirs added or removed while it
    /// runs are left alone (a removed one is skipped, an added one waits
    /// for the next sync). The worker keeps a private copy of the mirror;
    /// call [`reload_files`](Self::reload_files) when the handle reports
    /// updates.
    pub fn spawn_sync(&mut self, control: SyncControl) -> Result<SyncHandle> {
        let prepared = Reconciler {
            store: &self.store,
            settings: &self.settings,
            prober: self.prober.clone(),
            control: &control,
        }
        .prepare(&mut self.topdirs, &mut self.mirror);
        if let Err(e) = prepared {
            control.monitor.set_state(SyncState::Idle);
            return Err(e);
        }

        let store = self.store.clone();
        let settings = self.settings.clone();
        let prober = self.prober.clone();
        let topdirs = self.topdirs.clone();
        let mut mirror = self.mirror.clone();

        SyncHandle::spawn(control, move |ctl| {
            let reconciler = Reconciler {
                store: &store,
                settings: &settings,
                prober,
                control: ctl,
            };
            reconciler.run_files(&topdirs, &mut mirror)
        })
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("topdirs", &self.topdirs.len())
            .field("files", &self.mirror.len())
            .finish()
    }
}

pub(crate) fn file_from_row(topdirs: &[TopDirectory], row: FileRow) -> Option<MediaFile> {
    let topdir = topdirs.iter().find(|t| t.id == Some(row.topdir_id))?;
    let mut f = MediaFile::new(topdir, row.reldir, row.filename);
    f.id = Some(row.id);
    f.size = row.size;
    f.mtime = row.time;
    f.last_played = row.lastplay;
    f.duration = row.duration;
    f.comment = row.comment;
    f.width = row.width;
    f.height = row.height;
    Some(f)
}

fn rename_in(names: &mut Vec<String>, old: &str, new: &str) {
    if let Some(n) = names.iter_mut().find(|n| n.as_str() == old) {
        *n = new.to_string();
        names.sort();
    }
}

fn compare(a: &MediaFile, b: &MediaFile, key: SortKey) -> Ordering {
    match key {
        SortKey::Filename => a.filename.to_lowercase().cmp(&b.filename.to_lowercase()),
        SortKey::Time => a.mtime.cmp(&b.mtime),
        SortKey::LastPlay => a.last_played.cmp(&b.last_played),
        SortKey::Duration => a
            .duration
            .partial_cmp(&b.duration)
            .unwrap_or(Ordering::Equal),
        SortKey::Path => a.abspath.cmp(&b.abspath),
        SortKey::Size => a.size.cmp(&b.size),
        SortKey::Resolution => pixels(a).cmp(&pixels(b)),
    }
}

fn pixels(f: &MediaFile) -> Option<i64> {
    f.width.zip(f.height).map(|(w, h)| w * h)
}
