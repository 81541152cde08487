//! Progress reporting and cooperative cancellation.
//!
//! The engine never reaches for global state: every sync call receives a
//! [`SyncControl`] carrying the sink it reports to and the token it polls.

use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::info;

/// Externally settable stop flag, polled (never pushed) by the engine.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One progress message, optionally with a running (current, total) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub message: String,
    pub current: Option<usize>,
    pub total: Option<usize>,
}

impl Progress {
    pub fn message<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            current: None,
            total: None,
        }
    }

    pub fn counted<S: Into<String>>(message: S, current: usize, total: usize) -> Self {
        Self {
            message: message.into(),
            current: Some(current),
            total: Some(total),
        }
    }
}

/// Receiver of progress updates. Called from the sync thread; a UI
/// consumer must marshal onto its own thread.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: &Progress);
}

impl<F> ProgressSink for F
where
    F: Fn(&Progress) + Send + Sync,
{
    fn report(&self, progress: &Progress) {
        self(progress)
    }
}

/// Forward updates into a channel that another thread polls.
impl ProgressSink for Sender<Progress> {
    fn report(&self, progress: &Progress) {
        // a dropped receiver just means nobody is watching any more
        let _ = self.send(progress.clone());
    }
}

/// Sink that writes every update to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, p: &Progress) {
        match (p.current, p.total) {
            (Some(c), Some(t)) => info!("{} ({c}/{t})", p.message),
            _ => info!("{}", p.message),
        }
    }
}

/// Shared view of a running sync: its current phase and whether it has
/// committed anything the foreground has not pulled yet.
#[derive(Debug, Default)]
pub struct SyncMonitor {
    state: Mutex<SyncState>,
    updated: AtomicBool,
}

impl SyncMonitor {
    pub fn state(&self) -> SyncState {
        self.state.lock().map(|g| *g).unwrap_or(SyncState::Idle)
    }

    pub(crate) fn set_state(&self, state: SyncState) {
        if let Ok(mut g) = self.state.lock() {
            *g = state;
        }
    }

    pub(crate) fn mark_updated(&self) {
        self.updated.store(true, Ordering::SeqCst);
    }

    /// Read and clear the "updated" flag.
    pub fn take_updated(&self) -> bool {
        self.updated.swap(false, Ordering::SeqCst)
    }
}

/// Explicit context handed to every engine entry point.
#[derive(Clone)]
pub struct SyncControl {
    pub progress: Arc<dyn ProgressSink>,
    pub cancel: CancelToken,
    pub monitor: Arc<SyncMonitor>,
}

impl SyncControl {
    pub fn new(progress: Arc<dyn ProgressSink>, cancel: CancelToken) -> Self {
        Self {
            progress,
            cancel,
            monitor: Arc::new(SyncMonitor::default()),
        }
    }

    /// Log-only progress with a fresh token.
    pub fn logging() -> Self {
        Self::new(Arc::new(LogProgress), CancelToken::new())
    }

    pub fn report(&self, progress: Progress) {
        self.progress.report(&progress);
    }

    pub fn say<S: Into<String>>(&self, message: S) {
        self.report(Progress::message(message));
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl std::fmt::Debug for SyncControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncControl")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("state", &self.monitor.state())
            .finish()
    }
}

/// Where a sync invocation currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Idle,
    ScanningDirectories,
    Enumerating,
    Diffing,
    RemovingStale,
    ProbingAndAdding,
    Cancelled,
}

/// Tally of one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub added: usize,
    pub removed: usize,
    pub skipped_dirs: usize,
    pub failed_probes: usize,
    pub cancelled: bool,
}
