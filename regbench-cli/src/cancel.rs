//! Cooperative cancellation
//!
//! Nothing here interrupts a running subprocess. A [`CancellationToken`] is
//! only observed between benchmark invocations, and a [`Deadline`] only
//! between invocations and at pass boundaries.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Shared flag signalling that the current suite loop should stop
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Background timer that cancels a token once its duration has elapsed.
///
/// Dropping the timer stops it without cancelling.
pub struct CancelTimer {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CancelTimer {
    /// Cancel `token` after `duration`
    pub fn start(duration: Duration, token: CancellationToken) -> Self {
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = std::thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = stopped.recv_timeout(duration) {
                tracing::debug!("Run duration of {:?} elapsed", duration);
                token.cancel();
            }
        });
        Self {
            stop: Some(stop),
            handle: Some(handle),
        }
    }
}

impl Drop for CancelTimer {
    fn drop(&mut self) {
        // Disconnecting the channel wakes the timer thread.
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Overall wall-clock budget of an experiment
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    /// Deadline `limit` from now
    pub fn after(limit: Duration) -> Self {
        Self {
            start: Instant::now(),
            limit: Some(limit),
        }
    }

    /// A deadline that never expires
    pub fn none() -> Self {
        Self {
            start: Instant::now(),
            limit: None,
        }
    }

    /// `after(limit)` when a limit is given, otherwise `none()`
    pub fn from_limit(limit: Option<Duration>) -> Self {
        limit.map_or_else(Self::none, Self::after)
    }

    /// Whether the budget is used up
    pub fn is_expired(&self) -> bool {
        self.limit.is_some_and(|limit| self.start.elapsed() >= limit)
    }

    /// Time since the deadline was created
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Configured budget
    pub fn limit(&self) -> Option<Duration> {
        self.limit
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::none()
    }
}
