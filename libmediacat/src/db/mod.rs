//! Central DB helper – connection bootstrap, version gate **and** the
//! per-table data-access helpers (topdirs, files, thumbnails, covers,
//! actors, tags, favorites).
//!
//! Helpers take a plain `&Connection`. Called on a `Transaction` (which
//! derefs to `Connection`) they join the caller's batch and nothing is
//! committed until the caller commits; called on the bare connection they
//! commit immediately.

mod store;
pub(crate) use store::lock;
pub use store::{SharedStore, Store};

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::result::Result as StdResult;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::{Thumbnail, TopDirectory};
use crate::utils::to_db_path;

/* ─── schema version ───────────────────────────────────────────────── */

/// (major, minor) written into a freshly created catalog.
pub const SCHEMA_VERSION: (i64, i64) = (0, 2);

const SCHEMA: &str = include_str!("schema.sql");

/// Read the (major, minor) tuple, `None` for a catalog without one.
pub fn schema_version(conn: &Connection) -> Result<Option<(i64, i64)>> {
    let has_table: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'version')",
        [],
        |r| r.get(0),
    )?;
    if !has_table {
        return Ok(None);
    }
    let v = conn
        .query_row("SELECT major, minor FROM version WHERE id = 0", [], |r| {
            Ok((r.get(0)?, r.get(1)?))
        })
        .optional()?;
    Ok(v)
}

/// Overwrite the stored version tuple.
pub fn set_schema_version(conn: &Connection, major: i64, minor: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO version (id, major, minor) VALUES (0, ?1, ?2)
         ON CONFLICT(id) DO UPDATE SET major = excluded.major, minor = excluded.minor",
        params![major, minor],
    )?;
    Ok(())
}

/* ─── connection bootstrap ────────────────────────────────────────── */

/// Open (or create) a catalog file.
///
/// Fails with [`Error::StoreOpen`] when the file cannot be opened or is not
/// a database, and with [`Error::SchemaVersionMismatch`] when it was
/// written by another schema version. There is no migration path.
pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Connection> {
    let path = db_path.as_ref();
    let store_err = |e: rusqlite::Error| Error::StoreOpen {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let mut conn = Connection::open(path).map_err(store_err)?;

    // First real read; a non-database file fails here.
    conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |r| r.get::<_, i64>(0))
        .map_err(store_err)?;

    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(store_err)?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |r| r.get::<_, String>(0))
        .map_err(store_err)?;

    // Wait up to 30 s for a competing writer before giving up
    conn.busy_timeout(std::time::Duration::from_secs(30))
        .map_err(store_err)?;

    ensure_schema(&mut conn)?;
    Ok(conn)
}

fn ensure_schema(conn: &mut Connection) -> Result<()> {
    match schema_version(conn)? {
        Some(found) if found != SCHEMA_VERSION => Err(Error::SchemaVersionMismatch {
            found,
            expected: SCHEMA_VERSION,
        }),
        Some(found) => {
            debug!("catalog version {}.{}", found.0, found.1);
            conn.execute_batch(SCHEMA)?;
            Ok(())
        }
        None => {
            info!(
                "creating catalog schema {}.{}",
                SCHEMA_VERSION.0, SCHEMA_VERSION.1
            );
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute_batch(SCHEMA)?;
            set_schema_version(&tx, SCHEMA_VERSION.0, SCHEMA_VERSION.1)?;
            tx.commit()?;
            Ok(())
        }
    }
}

/* ─── topdir ──────────────────────────────────────────────────────── */

/// All watched directories, sorted by path.
pub fn list_topdirs(conn: &Connection) -> Result<Vec<TopDirectory>> {
    let mut stmt =
        conn.prepare("SELECT id, path, exclude, comment FROM topdir ORDER BY path")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(TopDirectory {
                id: Some(r.get(0)?),
                path: PathBuf::from(r.get::<_, String>(1)?),
                exclude: r.get(2)?,
                comment: r.get(3)?,
            })
        })?
        .collect::<StdResult<Vec<_>, _>>()?;
    Ok(rows)
}

/// Insert a watched directory and return its id. Re-inserting an existing
/// path returns the existing id.
pub fn insert_topdir(conn: &Connection, topdir: &TopDirectory) -> Result<i64> {
    let path = to_db_path(&topdir.path);
    conn.execute(
        "INSERT INTO topdir (path, exclude, comment) VALUES (?1, ?2, ?3)
         ON CONFLICT(path) DO NOTHING",
        params![path, topdir.exclude, topdir.comment],
    )?;
    topdir_id(conn, &topdir.path)?
        .ok_or_else(|| Error::NotFound(format!("topdir {path}")))
}

pub fn topdir_id(conn: &Connection, path: &Path) -> Result<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT id FROM topdir WHERE path = ?1",
            [to_db_path(path)],
            |r| r.get(0),
        )
        .optional()?;
    Ok(id)
}

/// Delete a watched directory; every file row below it cascades.
pub fn delete_topdir(conn: &Connection, path: &Path) -> Result<usize> {
    let n = conn.execute("DELETE FROM topdir WHERE path = ?1", [to_db_path(path)])?;
    Ok(n)
}

pub fn update_topdir_path(conn: &Connection, old: &Path, new: &Path) -> Result<usize> {
    let n = conn.execute(
        "UPDATE topdir SET path = ?1 WHERE path = ?2",
        params![to_db_path(new), to_db_path(old)],
    )?;
    Ok(n)
}

/* ─── file ────────────────────────────────────────────────────────── */

/// Raw `file` row.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRow {
    pub id: i64,
    pub topdir_id: i64,
    pub reldir: String,
    pub filename: String,
    pub size: Option<i64>,
    pub time: Option<i64>,
    pub lastplay: Option<i64>,
    pub duration: Option<f64>,
    pub comment: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
}

/// Column values for an insert/update; `id` is assigned by the store.
#[derive(Debug, Clone, Copy)]
pub struct NewFile<'a> {
    pub topdir_id: i64,
    pub reldir: &'a str,
    pub filename: &'a str,
    pub size: Option<i64>,
    pub time: Option<i64>,
    pub lastplay: Option<i64>,
    pub duration: Option<f64>,
    pub comment: Option<&'a str>,
    pub width: Option<i64>,
    pub height: Option<i64>,
}

/// File rows with `id >= min_id`, ascending by id.
pub fn list_files(conn: &Connection, min_id: i64) -> Result<Vec<FileRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, topdir_id, reldir, filename, size, time, lastplay, duration,
                comment, width, height
           FROM file
          WHERE id >= ?1
          ORDER BY id",
    )?;
    let rows = stmt
        .query_map([min_id], |r| {
            Ok(FileRow {
                id: r.get(0)?,
                topdir_id: r.get(1)?,
                reldir: r.get(2)?,
                filename: r.get(3)?,
                size: r.get(4)?,
                time: r.get(5)?,
                lastplay: r.get(6)?,
                duration: r.get(7)?,
                comment: r.get(8)?,
                width: r.get(9)?,
                height: r.get(10)?,
            })
        })?
        .collect::<StdResult<Vec<_>, _>>()?;
    Ok(rows)
}

/// Insert one file row. A second row with the same natural key
/// (topdir, reldir, filename) violates the UNIQUE constraint and errors.
pub fn insert_file(conn: &Connection, f: &NewFile<'_>) -> Result<()> {
    conn.execute(
        "INSERT INTO file (topdir_id, reldir, filename, size, time, lastplay,
                           duration, comment, width, height)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            f.topdir_id,
            f.reldir,
            f.filename,
            f.size,
            f.time,
            f.lastplay,
            f.duration,
            f.comment,
            f.width,
            f.height
        ],
    )?;
    Ok(())
}

/// Look a file id up by its natural key.
pub fn resolve_file_id(
    conn: &Connection,
    topdir_id: i64,
    reldir: &str,
    filename: &str,
) -> Result<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT id FROM file WHERE topdir_id = ?1 AND reldir = ?2 AND filename = ?3",
            params![topdir_id, reldir, filename],
            |r| r.get(0),
        )
        .optional()?;
    Ok(id)
}

pub fn set_file_lastplay(conn: &Connection, id: i64, lastplay: Option<i64>) -> Result<()> {
    conn.execute(
        "UPDATE file SET lastplay = ?1 WHERE id = ?2",
        params![lastplay, id],
    )?;
    Ok(())
}

pub fn set_file_comment(conn: &Connection, id: i64, comment: Option<&str>) -> Result<()> {
    conn.execute(
        "UPDATE file SET comment = ?1 WHERE id = ?2",
        params![comment, id],
    )?;
    Ok(())
}

/// Delete a file row; thumbnails, cover, actor links, tags and favorites
/// cascade.
pub fn delete_file(conn: &Connection, id: i64) -> Result<usize> {
    let n = conn.execute("DELETE FROM file WHERE id = ?1", [id])?;
    Ok(n)
}

/* ─── thumbnail ───────────────────────────────────────────────────── */

pub fn insert_thumbnails(conn: &Connection, file_id: i64, thumbs: &[Thumbnail]) -> Result<()> {
    let mut stmt =
        conn.prepare("INSERT INTO thumbnail (file_id, time, jpg) VALUES (?1, ?2, ?3)")?;
    for t in thumbs {
        stmt.execute(params![file_id, t.offset as i64, t.jpeg])?;
    }
    Ok(())
}

/// Thumbnails of one file ordered by offset ascending.
pub fn thumbnails_for(conn: &Connection, file_id: i64) -> Result<Vec<Thumbnail>> {
    let mut stmt = conn
        .prepare("SELECT id, time, jpg FROM thumbnail WHERE file_id = ?1 ORDER BY time")?;
    let rows = stmt
        .query_map([file_id], |r| {
            Ok(Thumbnail {
                id: Some(r.get(0)?),
                offset: r.get::<_, i64>(1)? as u64,
                jpeg: r.get::<_, Option<Vec<u8>>>(2)?.unwrap_or_default(),
            })
        })?
        .collect::<StdResult<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn delete_thumbnails(conn: &Connection, file_id: i64) -> Result<usize> {
    let n = conn.execute("DELETE FROM thumbnail WHERE file_id = ?1", [file_id])?;
    Ok(n)
}

/* ─── cover ───────────────────────────────────────────────────────── */

/// Every (file_id, jpeg) cover pair.
pub fn list_covers(conn: &Connection) -> Result<Vec<(i64, Vec<u8>)>> {
    let mut stmt = conn.prepare("SELECT file_id, cover FROM cover WHERE cover IS NOT NULL")?;
    let rows = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
        .collect::<StdResult<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn cover_for(conn: &Connection, file_id: i64) -> Result<Option<Vec<u8>>> {
    let c = conn
        .query_row(
            "SELECT cover FROM cover WHERE file_id = ?1",
            [file_id],
            |r| r.get::<_, Option<Vec<u8>>>(0),
        )
        .optional()?;
    Ok(c.flatten())
}

/// Delete + reinsert the single cover row of a file.
pub fn replace_cover(conn: &Connection, file_id: i64, jpeg: &[u8]) -> Result<()> {
    conn.execute("DELETE FROM cover WHERE file_id = ?1", [file_id])?;
    conn.execute(
        "INSERT INTO cover (file_id, cover) VALUES (?1, ?2)",
        params![file_id, jpeg],
    )?;
    Ok(())
}

/* ─── actor ───────────────────────────────────────────────────────── */

pub fn list_actors(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM actor ORDER BY name")?;
    let rows = stmt
        .query_map([], |r| r.get(0))?
        .collect::<StdResult<Vec<_>, _>>()?;
    Ok(rows)
}

/// Insert an actor (no-op when it exists) and return its id.
pub fn insert_actor(conn: &Connection, name: &str) -> Result<i64> {
    conn.execute(
        "INSERT OR IGNORE INTO actor (name) VALUES (?1)",
        params![name],
    )?;
    actor_id(conn, name)?.ok_or_else(|| Error::NotFound(format!("actor {name}")))
}

pub fn actor_id(conn: &Connection, name: &str) -> Result<Option<i64>> {
    let id = conn
        .query_row("SELECT id FROM actor WHERE name = ?1", [name], |r| r.get(0))
        .optional()?;
    Ok(id)
}

/// Rename an actor. Errors with [`Error::DuplicateName`] when `new` exists.
pub fn rename_actor(conn: &Connection, old: &str, new: &str) -> Result<()> {
    if actor_id(conn, new)?.is_some() {
        return Err(Error::DuplicateName(new.to_string()));
    }
    let n = conn.execute("UPDATE actor SET name = ?1 WHERE name = ?2", params![new, old])?;
    if n == 0 {
        return Err(Error::NotFound(format!("actor {old}")));
    }
    Ok(())
}

pub fn delete_actor(conn: &Connection, name: &str) -> Result<usize> {
    let n = conn.execute("DELETE FROM actor WHERE name = ?1", [name])?;
    Ok(n)
}

/// (actor name, file id) for every link.
pub fn list_actorfiles(conn: &Connection) -> Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT a.name, af.file_id
           FROM actorfile af
           JOIN actor a ON a.id = af.actor_id
          ORDER BY a.name",
    )?;
    let rows = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
        .collect::<StdResult<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn link_actor(conn: &Connection, actor_id: i64, file_id: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO actorfile (actor_id, file_id) VALUES (?1, ?2)",
        params![actor_id, file_id],
    )?;
    Ok(())
}

pub fn unlink_actor(conn: &Connection, actor_id: i64, file_id: i64) -> Result<()> {
    conn.execute(
        "DELETE FROM actorfile WHERE actor_id = ?1 AND file_id = ?2",
        params![actor_id, file_id],
    )?;
    Ok(())
}

/* ─── tag ─────────────────────────────────────────────────────────── */

/// (tag, file id) for every tag row.
pub fn list_tags(conn: &Connection) -> Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare("SELECT tag, file_id FROM tag ORDER BY tag")?;
    let rows = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
        .collect::<StdResult<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn add_tag(conn: &Connection, tag: &str, file_id: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO tag (tag, file_id) VALUES (?1, ?2)",
        params![tag, file_id],
    )?;
    Ok(())
}

pub fn remove_tag(conn: &Connection, tag: &str, file_id: i64) -> Result<()> {
    conn.execute(
        "DELETE FROM tag WHERE tag = ?1 AND file_id = ?2",
        params![tag, file_id],
    )?;
    Ok(())
}

/// Rename a tag across every file. Errors with [`Error::DuplicateName`]
/// when `new` is already in use.
pub fn rename_tag(conn: &Connection, old: &str, new: &str) -> Result<usize> {
    let taken: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM tag WHERE tag = ?1)",
        [new],
        |r| r.get(0),
    )?;
    if taken {
        return Err(Error::DuplicateName(new.to_string()));
    }
    let n = conn.execute("UPDATE tag SET tag = ?1 WHERE tag = ?2", params![new, old])?;
    Ok(n)
}

/* ─── favorite ────────────────────────────────────────────────────── */

/// Raw favorite joined with its thumbnail offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FavoriteRow {
    pub id: i64,
    pub file_id: i64,
    pub thumb_id: i64,
    pub offset: u64,
}

pub fn list_favorites(conn: &Connection) -> Result<Vec<FavoriteRow>> {
    let mut stmt = conn.prepare(
        "SELECT f.id, f.file_id, f.thumb_id, t.time
           FROM favorite f
           JOIN thumbnail t ON t.id = f.thumb_id
          ORDER BY f.file_id, t.time",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(FavoriteRow {
                id: r.get(0)?,
                file_id: r.get(1)?,
                thumb_id: r.get(2)?,
                offset: r.get::<_, i64>(3)? as u64,
            })
        })?
        .collect::<StdResult<Vec<_>, _>>()?;
    Ok(rows)
}

/// Insert a favorite (idempotent) and return its id.
pub fn insert_favorite(conn: &Connection, file_id: i64, thumb_id: i64) -> Result<i64> {
    conn.execute(
        "INSERT OR IGNORE INTO favorite (file_id, thumb_id) VALUES (?1, ?2)",
        params![file_id, thumb_id],
    )?;
    let id = conn.query_row(
        "SELECT id FROM favorite WHERE file_id = ?1 AND thumb_id = ?2",
        params![file_id, thumb_id],
        |r| r.get(0),
    )?;
    Ok(id)
}

pub fn delete_favorite(conn: &Connection, fav_id: i64) -> Result<usize> {
    let n = conn.execute("DELETE FROM favorite WHERE id = ?1", [fav_id])?;
    Ok(n)
}

/* ─── tests ───────────────────────────────────────────────────────── */
