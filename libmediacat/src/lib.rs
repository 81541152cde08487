//! libmediacat – public API surface for the mediacat core.
//!
//! A catalog is one SQLite file listing the media files found under a set
//! of watched directories, with their duration, resolution, sampled
//! thumbnails and cover. [`Catalog`] is the entry point: open a catalog,
//! add directories, then [`Catalog::sync`] (or [`Catalog::spawn_sync`]) to
//! bring the store in line with the filesystem.
//!
//! Down-stream crates (`cli-bin`, tests) should stick to the items
//! re-exported here.

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod mirror;
pub mod model;
pub mod probe;
pub mod scan;
pub mod sync;
pub mod utils;

pub use catalog::Catalog;
pub use config::{Config, SyncSettings, ThumbnailPolicy};
pub use error::{Error, Result};
pub use model::{Favorite, MediaFile, SortKey, Thumbnail, TopDirectory};
pub use probe::{FfmpegProber, MediaInfo, MediaProber};
pub use sync::{
    CancelToken, LogProgress, Progress, ProgressSink, SyncControl, SyncHandle, SyncOutcome,
    SyncState,
};

#[cfg(test)]
mod sync_tests;
#[cfg(test)]
mod test_utils;
