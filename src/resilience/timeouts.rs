//! Call timeout enforcement.
//!
//! # Responsibilities
//! - Arm one watchdog per executed call
//! - Race the watchdog against the operation so the call completes exactly once
//! - Cancel the loser: the watchdog on organic completion, the operation on timeout
//!
//! # Design Decisions
//! - Uses Tokio's timer facilities
//! - The race is settled by a compare-and-swap on a shared flag, not by task order
//! - Timeout errors are distinct from operation errors

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// Single-assignment completion shared by an operation task and its watchdog.
#[derive(Debug)]
pub(crate) struct CompletionSlot<R> {
    delivered: AtomicBool,
    sender: Mutex<Option<oneshot::Sender<R>>>,
    watchdog: Mutex<Option<AbortHandle>>,
}

impl<R> CompletionSlot<R> {
    pub(crate) fn new(sender: oneshot::Sender<R>) -> Self {
        Self {
            delivered: AtomicBool::new(false),
            sender: Mutex::new(Some(sender)),
            watchdog: Mutex::new(None),
        }
    }

    /// Claim the right to complete the call.
    ///
    /// Only the first caller gets the sender back; every later claim is a no-op.
    pub(crate) fn claim(&self) -> Option<oneshot::Sender<R>> {
        self.delivered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub(crate) fn is_delivered(&self) -> bool {
        self.delivered.load(Ordering::Acquire)
    }

    /// Register the watchdog so organic completion can cancel it.
    pub(crate) fn set_watchdog(&self, handle: AbortHandle) {
        let mut slot = self.watchdog.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_delivered() {
            handle.abort();
        } else {
            *slot = Some(handle);
        }
    }

    /// Cancel the pending watchdog, if it was registered yet.
    pub(crate) fn cancel_watchdog(&self) {
        let handle = self
            .watchdog
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

/// Spawn a watchdog that runs `on_timeout` once `timeout` elapses.
///
/// `on_timeout` receives the time elapsed since `started`.
pub(crate) fn spawn_watchdog<F>(
    runtime: &Handle,
    timeout: Duration,
    started: Instant,
    on_timeout: F,
) -> AbortHandle
where
    F: FnOnce(Duration) + Send + 'static,
{
    runtime
        .spawn(async move {
            tokio::time::sleep_until(started + timeout).await;
            on_timeout(started.elapsed());
        })
        .abort_handle()
}
