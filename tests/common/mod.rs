//! Shared utilities for gated-operation integration tests.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use breaker_gate::CallError;
use tokio::sync::Notify;

pub const SAMPLE_COUNT: u32 = 20;
pub const CALL_FREQUENCY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected failure")]
pub struct ExpectedFailure;

/// How the scripted backend answers the next invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)]
pub enum Behavior {
    Succeed,
    Fail,
    /// Never complete.
    Hang,
    /// Succeed once `release` is called.
    WaitForRelease,
}

/// A downstream whose answers are scripted by the test.
#[derive(Debug)]
#[allow(dead_code)]
pub struct ScriptedBackend {
    behavior: Mutex<Behavior>,
    invocations: AtomicU32,
    release: Notify,
}

#[allow(dead_code)]
impl ScriptedBackend {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(behavior),
            invocations: AtomicU32::new(0),
            release: Notify::new(),
        })
    }

    pub fn set(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn invocations(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    pub fn invoke(self: &Arc<Self>) -> impl Future<Output = Result<(), ExpectedFailure>> + Send + 'static {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let behavior = *self.behavior.lock().unwrap();
        let backend = self.clone();

        async move {
            match behavior {
                Behavior::Succeed => Ok(()),
                Behavior::Fail => Err(ExpectedFailure),
                Behavior::Hang => std::future::pending().await,
                Behavior::WaitForRelease => {
                    backend.release.notified().await;
                    Ok(())
                }
            }
        }
    }
}

/// Outcome counts observed by a caller.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)]
pub struct Tally {
    pub ok: u32,
    pub failed: u32,
    pub timed_out: u32,
    pub rejected: u32,
}

#[allow(dead_code)]
impl Tally {
    pub fn record<T, E>(&mut self, outcome: &Result<T, CallError<E>>) {
        match outcome {
            Ok(_) => self.ok += 1,
            Err(CallError::Operation(_)) => self.failed += 1,
            Err(CallError::Timeout(_)) => self.timed_out += 1,
            Err(CallError::BreakerOpen(_)) => self.rejected += 1,
            Err(CallError::Interrupted { .. }) => panic!("call interrupted"),
        }
    }

    pub fn errors(&self) -> u32 {
        self.failed + self.timed_out + self.rejected
    }
}
