//! Circuit breaker state shared by a group of gated operations.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: downstream assumed down, calls fail fast
//! - Half-Open: the next call is a probe
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive_failures >= max_failures after a failure
//! Open → Half-Open: reset timer of the latest qualifying failure fires
//! Half-Open → Open: a call arrives (it is dispatched as the probe)
//! any → Closed: a call succeeds
//! ```
//!
//! # Design Decisions
//! - One breaker per group, shared through `Arc`
//! - Fail fast in Open state (no waiting for timeout)
//! - Single probe in Half-Open: the arriving call flips the state back to
//!   Open before it is dispatched, so concurrent callers fail fast
//! - Transitions only happen through `admit`, `record_success`,
//!   `record_failure` and the reset timer

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Serialize;
use tokio::time::Instant;

use crate::config::BreakerConfig;

/// Breaker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Decision taken for an arriving call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Run the call normally.
    Execute,
    /// Run the call as the single half-open probe.
    Probe,
    /// Fail fast without running the call.
    Reject,
}

/// Point-in-time view of a breaker, for logging and reporting.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub max_failures: u32,
    pub call_timeout_ms: u64,
    pub reset_timeout_ms: u64,
    pub last_call_ms_ago: u64,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    last_call: Option<Instant>,
    /// Bumped every time a reset timer is armed; only the newest timer may fire.
    open_generation: u64,
}

/// Breaker state shared by every gated operation of a group.
#[derive(Debug)]
pub struct BreakerState {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl BreakerState {
    pub fn new(config: BreakerConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_call: None,
                open_generation: 0,
            }),
        })
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Start of the most recently admitted call, or now if none was admitted yet.
    pub fn last_call_time(&self) -> Instant {
        self.lock().last_call.unwrap_or_else(Instant::now)
    }

    /// Decide whether an arriving call may run.
    ///
    /// A half-open breaker is flipped back to open before the probe is
    /// returned, so exactly one caller gets `Admission::Probe` per reset
    /// window. Admitted calls record their start as the last call time.
    pub fn admit(&self) -> Admission {
        let mut inner = self.lock();
        let admission = match inner.state {
            CircuitState::Open => return Admission::Reject,
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                Admission::Probe
            }
            CircuitState::Closed => Admission::Execute,
        };
        inner.last_call = Some(Instant::now());
        admission
    }

    /// Account for a call that completed successfully.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        let previous = inner.state;
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;

        if previous != CircuitState::Closed {
            tracing::info!(previous = ?previous, "Circuit breaker closed");
        }
    }

    /// Account for a call that failed or timed out.
    ///
    /// Returns the state after the failure. Every failure that leaves the
    /// breaker open arms a fresh reset timer.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime when the breaker opens.
    pub fn record_failure(self: &Arc<Self>) -> CircuitState {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        if inner.consecutive_failures < self.config.max_failures {
            inner.state = CircuitState::Closed;
            return CircuitState::Closed;
        }

        if inner.state != CircuitState::Open {
            tracing::warn!(
                consecutive_failures = inner.consecutive_failures,
                max_failures = self.config.max_failures,
                reset_timeout_ms = self.config.reset_timeout_ms,
                "Circuit breaker opened"
            );
        }
        inner.state = CircuitState::Open;
        inner.open_generation += 1;
        let generation = inner.open_generation;
        drop(inner);

        self.arm_reset_timer(generation);
        CircuitState::Open
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        let last_call_ms_ago = inner
            .last_call
            .map(|at| u64::try_from(at.elapsed().as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        BreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            max_failures: self.config.max_failures,
            call_timeout_ms: self.config.call_timeout_ms,
            reset_timeout_ms: self.config.reset_timeout_ms,
            last_call_ms_ago,
        }
    }

    fn arm_reset_timer(self: &Arc<Self>, generation: u64) {
        let breaker: Weak<Self> = Arc::downgrade(self);
        let delay = self.config.reset_timeout();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(breaker) = breaker.upgrade() {
                breaker.on_reset_elapsed(generation);
            }
        });
    }

    fn on_reset_elapsed(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.state == CircuitState::Open && inner.open_generation == generation {
            inner.state = CircuitState::HalfOpen;
            tracing::info!("Circuit breaker half-open, next call is a probe");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every critical section leaves Inner consistent, so a poisoned lock is still usable.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
