//! Sync run on its own thread.
//!
//! The foreground keeps the [`SyncHandle`], polls [`SyncHandle::state`] and
//! [`SyncHandle::take_updated`] to know when to reload its mirror, and
//! stops the run by cancelling its token. Dropping the handle cancels and
//! joins.

use std::io;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::control::{SyncControl, SyncOutcome, SyncState};
use crate::error::{Error, Result};

const POLL: Duration = Duration::from_millis(20);

pub struct SyncHandle {
    control: SyncControl,
    thread: Option<JoinHandle<Result<SyncOutcome>>>,
}

impl SyncHandle {
    /// Run `job` on a thread named `catalog-sync`.
    pub(crate) fn spawn<F>(control: SyncControl, job: F) -> Result<Self>
    where
        F: FnOnce(&SyncControl) -> Result<SyncOutcome> + Send + 'static,
    {
        let ctl = control.clone();
        let thread = thread::Builder::new()
            .name("catalog-sync".into())
            .spawn(move || {
                let out = job(&ctl);
                debug!(ok = out.is_ok(), "background sync exited");
                out
            })?;
        Ok(Self {
            control,
            thread: Some(thread),
        })
    }

    pub fn state(&self) -> SyncState {
        self.control.monitor.state()
    }

    /// `true` once since the last call if the run committed something.
    pub fn take_updated(&self) -> bool {
        self.control.monitor.take_updated()
    }

    pub fn cancel(&self) {
        self.control.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Wait at most `budget` for the run to end. `None` means it is still
    /// going; the handle stays usable.
    pub fn join_timeout(&mut self, budget: Duration) -> Option<Result<SyncOutcome>> {
        let deadline = Instant::now() + budget;
        while !self.is_finished() {
            if Instant::now() >= deadline {
                return None;
            }
            thread::sleep(POLL);
        }
        self.thread.take().map(join_thread)
    }

    /// Block until the run ends.
    pub fn join(mut self) -> Result<SyncOutcome> {
        match self.thread.take() {
            Some(h) => join_thread(h),
            None => Err(Error::Io(io::Error::new(
                io::ErrorKind::Other,
                "sync already joined",
            ))),
        }
    }
}

fn join_thread(h: JoinHandle<Result<SyncOutcome>>) -> Result<SyncOutcome> {
    h.join().unwrap_or_else(|_| {
        Err(Error::Io(io::Error::new(
            io::ErrorKind::Other,
            "sync thread panicked",
        )))
    })
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        if let Some(h) = self.thread.take() {
            self.control.cancel.cancel();
            if let Err(e) = join_thread(h) {
                warn!("background sync ended with error: {e}");
            }
        }
    }
}

impl std::fmt::Debug for SyncHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncHandle")
            .field("state", &self.state())
            .field("finished", &self.is_finished())
            .finish()
    }
}
