//! Fixed-size probe worker pool.
//!
//! N persistent workers pull files from a bounded channel, probe and
//! thumbnail them, and push the outcome back. The engine uses it
//! batch-synchronously: dispatch at most N files, wait for all N outcomes,
//! commit, repeat.

use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::UNIX_EPOCH;

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, warn};

use super::control::CancelToken;
use crate::config::ThumbnailPolicy;
use crate::error::{Error, Result};
use crate::model::MediaFile;
use crate::probe::{cover_index, fit_resolution, sample_offsets, MediaProber};

/// What a worker hands back for one file.
#[derive(Debug)]
pub enum ProbeOutcome {
    /// Fully probed; size, mtime, duration, resolution, thumbnails and the
    /// default cover are filled in.
    Ready(MediaFile),
    /// Probe failed; the file stays out of the store until the next sync.
    Failed(PathBuf, Error),
    /// Cancellation was observed before thumbnailing started.
    Abandoned(PathBuf),
}

pub struct ProbePool {
    jobs: Option<Sender<MediaFile>>,
    results: Receiver<ProbeOutcome>,
    workers: Vec<JoinHandle<()>>,
    size: usize,
}

impl ProbePool {
    pub fn new(
        size: usize,
        prober: Arc<dyn MediaProber>,
        policy: ThumbnailPolicy,
        cancel: CancelToken,
    ) -> Result<Self> {
        let size = size.max(1);
        let (job_tx, job_rx) = bounded::<MediaFile>(size);
        let (res_tx, res_rx) = bounded::<ProbeOutcome>(size);

        let mut workers = Vec::with_capacity(size);
        for i in 0..size {
            let rx = job_rx.clone();
            let tx = res_tx.clone();
            let prober = prober.clone();
            let policy = policy.clone();
            let cancel = cancel.clone();
            let handle = thread::Builder::new()
                .name(format!("probe-{i}"))
                .spawn(move || {
                    for file in rx.iter() {
                        let path = file.abspath.clone();
                        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                            probe_file(prober.as_ref(), file, &policy, &cancel)
                        }))
                        .unwrap_or_else(|_| {
                            ProbeOutcome::Failed(
                                path.clone(),
                                Error::Probe {
                                    path,
                                    reason: "prober panicked".into(),
                                },
                            )
                        });
                        if tx.send(outcome).is_err() {
                            break;
                        }
                    }
                })?;
            workers.push(handle);
        }

        Ok(Self {
            jobs: Some(job_tx),
            results: res_rx,
            workers,
            size,
        })
    }

    /// Number of files dispatched per batch.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Dispatch `batch` (at most [`size`](Self::size) files) and block until
    /// every file has an outcome. Outcomes arrive in completion order.
    pub fn run_batch(&self, batch: Vec<MediaFile>) -> Result<Vec<ProbeOutcome>> {
        let jobs = self.jobs.as_ref().ok_or_else(pool_gone)?;
        let n = batch.len();
        for file in batch {
            jobs.send(file).map_err(|_| pool_gone())?;
        }
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.results.recv().map_err(|_| pool_gone())?);
        }
        Ok(out)
    }
}

impl Drop for ProbePool {
    fn drop(&mut self) {
        // closing the job channel ends every worker loop
        self.jobs.take();
        for w in self.workers.drain(..) {
            let _ = w.join();
        }
    }
}

fn pool_gone() -> Error {
    Error::Io(io::Error::new(io::ErrorKind::BrokenPipe, "probe workers exited"))
}

/// The per-file task run on a worker thread.
pub(crate) fn probe_file(
    prober: &dyn MediaProber,
    mut file: MediaFile,
    policy: &ThumbnailPolicy,
    cancel: &CancelToken,
) -> ProbeOutcome {
    let path = file.abspath.clone();

    let meta = match fs::metadata(&path) {
        Ok(m) => m,
        Err(e) => return ProbeOutcome::Failed(path, Error::Io(e)),
    };
    file.size = Some(meta.len() as i64);
    file.mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64);

    let info = match prober.probe(&path) {
        Ok(i) => i,
        Err(e) => {
            warn!(file = %path.display(), "probe failed: {e}");
            return ProbeOutcome::Failed(path, e);
        }
    };
    file.duration = Some(info.duration);
    file.width = Some(info.width as i64);
    file.height = Some(info.height as i64);

    if cancel.is_cancelled() {
        return ProbeOutcome::Abandoned(path);
    }

    let offsets = sample_offsets(info.duration, policy);
    let size = fit_resolution((policy.width, policy.height), (info.width, info.height));
    let thumbs = match prober.sample_thumbnails(&path, &offsets, size) {
        Ok(t) => t,
        Err(e) => {
            warn!(file = %path.display(), "thumbnailing failed: {e}");
            return ProbeOutcome::Failed(path, e);
        }
    };

    file.cover = cover_index(thumbs.len(), policy.cover_ratio).map(|i| thumbs[i].jpeg.clone());
    debug!(file = %path.display(), frames = thumbs.len(), "probed");
    file.thumbnails = Some(thumbs);
    ProbeOutcome::Ready(file)
}
