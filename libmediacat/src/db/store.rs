//! Store wrapper shared between the catalog facade and the sync engine.
//!
//! A catalog owns exactly one SQLite connection. Foreground queries and a
//! background sync both go through the same `Arc<Mutex<Store>>`, so there
//! is a single writer and no cross-connection races.

use rusqlite::{Connection, Transaction};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Error, Result};

/// Handle passed to every component that touches the store.
pub type SharedStore = Arc<Mutex<Store>>;

/// Owner of the catalog connection.
pub struct Store {
    conn: Connection,
    path: PathBuf,
}

impl Store {
    /// Open (or create) the catalog at `path`; see [`super::open`].
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = super::open(path.as_ref())?;
        Ok(Self {
            conn,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Wrap the store for sharing across threads.
    pub fn shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get a reference to the underlying connection
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Close the connection, surfacing any error SQLite reports.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| e.into())
    }

    /// Run `f` inside one transaction; commit on `Ok`, roll back on `Err`.
    pub fn with_transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let tx = self.conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

/// Lock the shared store, mapping a poisoned mutex to a store error.
pub(crate) fn lock(store: &SharedStore) -> Result<MutexGuard<'_, Store>> {
    store
        .lock()
        .map_err(|_| Error::Database("store mutex poisoned".into()))
}
