//! Error types for mediacat
//!
//! Every fallible library call returns [`Result`]. Per-item failures (one
//! file, one watched directory) are contained by the sync engine and only
//! show up in logs and progress messages; the variants below are what
//! escapes to callers.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type for mediacat - convenience wrapper around Result<T, Error>
pub type Result<T> = std::result::Result<T, Error>;

/// Custom error types for mediacat
#[derive(Debug)]
pub enum Error {
    /// The catalog file could not be opened or is not a database
    StoreOpen { path: PathBuf, reason: String },

    /// The catalog was written by an incompatible schema version
    SchemaVersionMismatch {
        found: (i64, i64),
        expected: (i64, i64),
    },

    /// The media prober could not read a file
    Probe { path: PathBuf, reason: String },

    /// A watched directory is missing or unreadable
    DirectoryInaccessible(PathBuf),

    /// Removing a catalogued file from disk failed
    FileDelete { path: PathBuf, source: io::Error },

    /// Rename target already exists in the actor/tag vocabulary
    DuplicateName(String),

    /// New watched directory is nested inside an existing one
    AncestorDirectory { path: PathBuf, existing: PathBuf },

    /// A sync was interrupted through its cancel token
    Cancelled,

    /// An IO error
    Io(io::Error),

    /// A database error
    Database(String),

    /// Invalid configuration
    Config(String),

    /// Lookup by id / path found nothing
    NotFound(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StoreOpen { path, reason } => {
                write!(f, "cannot open catalog {}: {}", path.display(), reason)
            }
            Self::SchemaVersionMismatch { found, expected } => write!(
                f,
                "catalog version {}.{} does not match expected {}.{}; create a new catalog",
                found.0, found.1, expected.0, expected.1
            ),
            Self::Probe { path, reason } => {
                write!(f, "cannot probe {}: {}", path.display(), reason)
            }
            Self::DirectoryInaccessible(path) => {
                write!(f, "topdir is not accessible: {}", path.display())
            }
            Self::FileDelete { path, source } => {
                write!(f, "failed to delete {}: {}", path.display(), source)
            }
            Self::DuplicateName(name) => write!(f, "name already exists: {}", name),
            Self::AncestorDirectory { path, existing } => write!(
                f,
                "{} is inside watched directory {}",
                path.display(),
                existing.display()
            ),
            Self::Cancelled => write!(f, "sync cancelled"),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::Database(msg) => write!(f, "Database error: {}", msg),
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
            Self::NotFound(what) => write!(f, "Not found: {}", what),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::FileDelete { source, .. } => Some(source),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}
