use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;

use crate::catalog::Catalog;
use crate::config::SyncSettings;
use crate::db::Store;
use crate::error::{Error, Result};
use crate::model::Thumbnail;
use crate::probe::{MediaInfo, MediaProber};
use crate::sync::{CancelToken, Progress, SyncControl};

lazy_static! {
    /// Global mutex to serialize environment-variable modifications in tests.
    pub static ref ENV_MUTEX: Mutex<()> = Mutex::new(());
}

/// Deterministic stand-in for ffmpeg.
///
/// Every file is 1280x720 with `default_duration` seconds unless told
/// otherwise; frames are tiny fake JPEGs naming the file and offset.
pub struct FakeProber {
    default_duration: f64,
    durations: HashMap<String, f64>,
    failing: HashSet<String>,
    trip: Option<(usize, CancelToken)>,
    probes: AtomicUsize,
}

impl FakeProber {
    pub fn new() -> Self {
        Self {
            default_duration: 600.0,
            durations: HashMap::new(),
            failing: HashSet::new(),
            trip: None,
            probes: AtomicUsize::new(0),
        }
    }

    pub fn duration(mut self, filename: &str, secs: f64) -> Self {
        self.durations.insert(filename.to_string(), secs);
        self
    }

    /// Probing `filename` fails.
    pub fn failing(mut self, filename: &str) -> Self {
        self.failing.insert(filename.to_string());
        self
    }

    /// Cancel `token` while handling the `n`-th probe (1-based).
    pub fn cancel_on(mut self, n: usize, token: CancelToken) -> Self {
        self.trip = Some((n, token));
        self
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

fn name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl MediaProber for FakeProber {
    fn probe(&self, path: &Path) -> Result<MediaInfo> {
        let n = self.probes.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((at, token)) = &self.trip {
            if n >= *at {
                token.cancel();
            }
        }
        let name = name_of(path);
        if self.failing.contains(&name) {
            return Err(Error::Probe {
                path: path.to_path_buf(),
                reason: "corrupt container".into(),
            });
        }
        Ok(MediaInfo {
            duration: self
                .durations
                .get(&name)
                .copied()
                .unwrap_or(self.default_duration),
            width: 1280,
            height: 720,
        })
    }

    fn sample_thumbnails(
        &self,
        path: &Path,
        offsets: &[u64],
        _size: (u32, u32),
    ) -> Result<Vec<Thumbnail>> {
        let name = name_of(path);
        Ok(offsets
            .iter()
            .map(|&o| Thumbnail::new(o, format!("jpeg:{name}:{o}").into_bytes()))
            .collect())
    }
}

/// Create an empty file (and its parents) under `root`.
pub fn touch(root: &Path, rel: &str) -> PathBuf {
    let p = root.join(rel);
    if let Some(parent) = p.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&p, b"not really a video").unwrap();
    p
}

/// Single-worker settings so batch boundaries are predictable.
pub fn serial_settings() -> SyncSettings {
    SyncSettings {
        workers: 1,
        ..SyncSettings::default()
    }
}

pub fn open_catalog(db: &Path, settings: SyncSettings, prober: Arc<dyn MediaProber>) -> Catalog {
    let store = Store::open(db).unwrap().shared();
    Catalog::attach(store, settings, prober).unwrap()
}

/// Control whose progress goes nowhere.
pub fn quiet(cancel: CancelToken) -> SyncControl {
    SyncControl::new(Arc::new(|_: &Progress| {}), cancel)
}

/// Control that records every progress message.
pub fn recording(cancel: CancelToken) -> (SyncControl, Arc<Mutex<Vec<Progress>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let ctl = SyncControl::new(
        Arc::new(move |p: &Progress| sink.lock().unwrap().push(p.clone())),
        cancel,
    );
    (ctl, seen)
}
