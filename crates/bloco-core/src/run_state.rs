//! Cooperative cancellation for running scripts.
//!
//! A running program is cancelled by flipping a shared flag, never by killing
//! tasks. Every suspension point in compiled code re-checks its [`RunToken`]
//! after resuming and returns early once the token is cancelled. Starting a
//! new run invalidates the previous run's token.

use crate::lockfree::AtomicFlag;
use parking_lot::Mutex;
use std::sync::Arc;

/// Cancellation token handed to every suspending call of a running script.
///
/// Cheap to clone; all clones observe the same flag. The token is read-only
/// for compiled code: only [`RunState`] flips it.
#[derive(Clone, Debug)]
pub struct RunToken {
    flag: Arc<AtomicFlag>,
}

impl RunToken {
    /// A token that is already cancelled. Useful as an inert default.
    pub fn cancelled() -> Self {
        Self {
            flag: Arc::new(AtomicFlag::new(false)),
        }
    }

    /// True while the owning run is still live.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.flag.get()
    }

    /// True once the owning run has been stopped or superseded.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        !self.flag.get()
    }
}

/// Owner of the process-wide "is running" flag for one engine instance.
///
/// `begin_run` cancels the previous run's token and issues a fresh live one,
/// so at most one run's suspension points pass their checks at any time.
pub struct RunState {
    current: Mutex<Arc<AtomicFlag>>,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(Arc::new(AtomicFlag::new(false))),
        }
    }

    /// Start a new run: the previous token is cancelled, a live token issued.
    pub fn begin_run(&self) -> RunToken {
        let mut current = self.current.lock();
        current.set(false);
        let fresh = Arc::new(AtomicFlag::new(true));
        *current = fresh.clone();
        RunToken { flag: fresh }
    }

    /// Cancel the current run, if any.
    pub fn cancel(&self) {
        self.current.lock().set(false);
    }

    /// Token for the run in progress (cancelled if none is running).
    pub fn token(&self) -> RunToken {
        RunToken {
            flag: self.current.lock().clone(),
        }
    }

    /// True if a run is in progress.
    pub fn is_running(&self) -> bool {
        self.current.lock().get()
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}
