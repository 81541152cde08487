use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

use crate::error::Result;

/// Thumbnail sampling policy.
///
/// The engine samples one frame every `period_secs`, stretching or
/// shrinking the period so every file ends up with between `min_images`
/// and `max_images` frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailPolicy {
    pub period_secs: u64,
    pub min_images: u64,
    pub max_images: u64,
    /// Bounding box for generated frames (pixels).
    pub width: u32,
    pub height: u32,
    /// Position of the default cover inside the sampled set (0.0 ..= 1.0).
    pub cover_ratio: f64,
}

impl Default for ThumbnailPolicy {
    fn default() -> Self {
        Self {
            period_secs: 90,
            min_images: 5,
            max_images: 40,
            width: 360,
            height: 203,
            cover_ratio: 0.7,
        }
    }
}

/// Everything the sync engine needs besides the store itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Lower-case extensions without the dot.
    pub extensions: Vec<String>,
    pub thumbnails: ThumbnailPolicy,
    /// Upper bound on concurrent probe workers.
    pub workers: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            extensions: ["mkv", "avi", "mp4", "asf", "wmv", "flv"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            thumbnails: ThumbnailPolicy::default(),
            workers: 4,
        }
    }
}

impl SyncSettings {
    /// Read settings from a JSON file.
    ///
    /// A missing file yields the defaults. A file that fails to parse is
    /// reported and ignored; a broken settings file must never keep the
    /// catalog from opening.
    pub fn from_file(path: &Path) -> Self {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => {
                debug!(path = %path.display(), "no settings file, using defaults");
                return Self::default();
            }
        };
        match serde_json::from_str::<Self>(&raw) {
            Ok(s) => s.normalized(),
            Err(e) => {
                warn!(path = %path.display(), "ignoring malformed settings: {e}");
                Self::default()
            }
        }
    }

    /// Write the settings as pretty JSON.
    pub fn store(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Effective worker count: `min(workers, available_parallelism)`, at
    /// least one.
    pub fn pool_size(&self) -> usize {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.workers.min(cpus).max(1)
    }

    fn normalized(mut self) -> Self {
        for ext in &mut self.extensions {
            *ext = ext.trim_start_matches('.').to_ascii_lowercase();
        }
        let t = &mut self.thumbnails;
        t.min_images = t.min_images.max(1);
        t.max_images = t.max_images.max(t.min_images);
        t.period_secs = t.period_secs.max(1);
        t.cover_ratio = t.cover_ratio.clamp(0.0, 1.0);
        self
    }
}

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub sync: SyncSettings,
}

impl Config {
    /// Resolve configuration from environment or per-user directories.
    ///
    /// Catalog path priority:
    /// 1. `MEDIACAT_DB_PATH` env-var (explicit override)
    /// 2. `catalog.db` under the XDG / platform data dir
    /// 3. `./catalog.db` when no such dir can be located
    ///
    /// Settings come from `MEDIACAT_SETTINGS`, else `settings.json` in the
    /// platform config dir.
    pub fn load() -> Result<Self> {
        let dirs = if std::env::var_os("HOME").is_some()
            || std::env::var_os("XDG_DATA_HOME").is_some()
        {
            ProjectDirs::from("io", "Mediacat", "mediacat")
        } else {
            None
        };

        let db_path = match std::env::var_os("MEDIACAT_DB_PATH") {
            Some(val) => {
                let p = PathBuf::from(val);
                if let Some(parent) = p.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent)?;
                }
                p
            }
            None => match &dirs {
                Some(d) => {
                    fs::create_dir_all(d.data_dir())?;
                    d.data_dir().join("catalog.db")
                }
                None => PathBuf::from("catalog.db"),
            },
        };

        let settings_path = match std::env::var_os("MEDIACAT_SETTINGS") {
            Some(val) => Some(PathBuf::from(val)),
            None => dirs.as_ref().map(|d| d.config_dir().join("settings.json")),
        };
        let sync = settings_path
            .as_deref()
            .map(SyncSettings::from_file)
            .unwrap_or_default();

        Ok(Self { db_path, sync })
    }

    /// Explicit catalog path with default settings; handy for tests.
    pub fn at<P: AsRef<Path>>(path: P) -> Self {
        Self {
            db_path: path.as_ref().to_path_buf(),
            sync: SyncSettings::default(),
        }
    }
}
