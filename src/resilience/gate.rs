//! Call gate: wraps one async operation behind a shared breaker.
//!
//! # Responsibilities
//! - Consult the breaker on every invocation (fail fast or execute)
//! - Arm a watchdog for each executed call
//! - Account every completion exactly once, then forward the outcome
//!
//! # Design Decisions
//! - Dispatch is eager: the decision, the watchdog and the operation all
//!   start inside `call`, the returned future only delivers the outcome
//! - Dropping a `PendingCall` does not cancel the call; it is still accounted
//! - Fail-fast errors are delivered through the same future, never inline

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::time::Instant;
use uuid::Uuid;

use crate::resilience::circuit_breaker::{Admission, BreakerState};
use crate::resilience::error::{BreakerOpenError, CallError, TimeoutError, UsageError};
use crate::resilience::timeouts::{spawn_watchdog, CompletionSlot};

/// Type-erased async operation.
pub type OperationFn<A, T, E> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

/// A named, free-standing async operation to protect.
pub struct Operation<A, T, E> {
    pub(crate) name: String,
    pub(crate) invoke: OperationFn<A, T, E>,
}

impl<A, T, E> Operation<A, T, E>
where
    A: 'static,
    T: 'static,
    E: 'static,
{
    /// Name used when none is given.
    pub const DEFAULT_NAME: &'static str = "call";

    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            name: name.into(),
            invoke: Arc::new(move |args| f(args).boxed()),
        }
    }

    /// Wrap an operation under the default name `call`.
    pub fn unnamed<F, Fut>(f: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self::new(Self::DEFAULT_NAME, f)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<A, T, E> fmt::Debug for Operation<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation").field("name", &self.name).finish()
    }
}

/// An operation bound to its group's breaker.
///
/// Cloning is cheap; clones share the operation and the breaker.
pub struct GatedOperation<A, T, E> {
    name: Arc<str>,
    invoke: OperationFn<A, T, E>,
    breaker: Arc<BreakerState>,
}

impl<A, T, E> Clone for GatedOperation<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            invoke: self.invoke.clone(),
            breaker: self.breaker.clone(),
        }
    }
}

impl<A, T, E> fmt::Debug for GatedOperation<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatedOperation")
            .field("name", &self.name)
            .field("breaker", &self.breaker)
            .finish()
    }
}

impl<A, T, E> GatedOperation<A, T, E>
where
    A: 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    pub(crate) fn new(name: impl Into<Arc<str>>, invoke: OperationFn<A, T, E>, breaker: Arc<BreakerState>) -> Self {
        Self {
            name: name.into(),
            invoke,
            breaker,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn breaker(&self) -> &Arc<BreakerState> {
        &self.breaker
    }

    /// Invoke the operation through the breaker.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime; use [`try_call`](Self::try_call)
    /// to get a [`UsageError`] instead.
    pub fn call(&self, args: A) -> PendingCall<T, E> {
        match self.try_call(args) {
            Ok(pending) => pending,
            Err(e) => panic!("{e}"),
        }
    }

    /// Invoke the operation through the breaker.
    ///
    /// Fails synchronously, before any timer or operation is started, when no
    /// outcome could ever be delivered.
    pub fn try_call(&self, args: A) -> Result<PendingCall<T, E>, UsageError> {
        let runtime = Handle::try_current().map_err(|_| UsageError::NoRuntime {
            operation: self.name.to_string(),
        })?;
        let (tx, rx) = oneshot::channel();

        match self.breaker.admit() {
            Admission::Reject => {
                tracing::debug!(operation = %self.name, "Failing fast, circuit breaker open");
                let _ = tx.send(Err(CallError::BreakerOpen(BreakerOpenError {
                    operation: self.name.to_string(),
                })));
            }
            admission => self.dispatch(&runtime, args, tx, admission == Admission::Probe),
        }

        Ok(PendingCall {
            operation: self.name.clone(),
            rx,
        })
    }

    /// Invoke the operation and hand its outcome to `completion`.
    ///
    /// `completion` always runs on a spawned task, never inside this call.
    pub fn call_with<F>(&self, args: A, completion: F) -> Result<(), UsageError>
    where
        F: FnOnce(Result<T, CallError<E>>) + Send + 'static,
    {
        let pending = self.try_call(args)?;
        tokio::spawn(async move { completion(pending.await) });
        Ok(())
    }

    fn dispatch(
        &self,
        runtime: &Handle,
        args: A,
        tx: oneshot::Sender<Result<T, CallError<E>>>,
        probe: bool,
    ) {
        let call_id = Uuid::new_v4();
        let started = Instant::now();
        let slot = Arc::new(CompletionSlot::new(tx));
        tracing::debug!(operation = %self.name, %call_id, probe, "Dispatching gated call");

        let operation = {
            let future = (self.invoke)(args);
            let slot = slot.clone();
            let breaker = self.breaker.clone();
            let name = self.name.clone();
            runtime.spawn(async move {
                let outcome = future.await;
                let Some(tx) = slot.claim() else {
                    return;
                };
                slot.cancel_watchdog();

                let outcome = match outcome {
                    Ok(value) => {
                        breaker.record_success();
                        tracing::debug!(operation = %name, %call_id, "Gated call succeeded");
                        Ok(value)
                    }
                    Err(e) => {
                        let state = breaker.record_failure();
                        tracing::debug!(operation = %name, %call_id, state = ?state, "Gated call failed");
                        Err(CallError::Operation(e))
                    }
                };
                let _ = tx.send(outcome);
            })
        };

        let watchdog = {
            let slot = slot.clone();
            let breaker = self.breaker.clone();
            let name = self.name.clone();
            let operation = operation.abort_handle();
            spawn_watchdog(runtime, self.breaker.config().call_timeout(), started, move |elapsed| {
                let Some(tx) = slot.claim() else {
                    return;
                };
                operation.abort();

                let state = breaker.record_failure();
                let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(operation = %name, %call_id, elapsed_ms, state = ?state, "Gated call timed out");
                let _ = tx.send(Err(CallError::Timeout(TimeoutError {
                    operation: name.to_string(),
                    elapsed_ms,
                })));
            })
        };
        slot.set_watchdog(watchdog);
    }
}

/// Outcome of a gated call that has already been dispatched.
#[must_use = "the call runs regardless; await this to observe its outcome"]
#[derive(Debug)]
pub struct PendingCall<T, E> {
    operation: Arc<str>,
    rx: oneshot::Receiver<Result<T, CallError<E>>>,
}

impl<T, E> PendingCall<T, E> {
    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl<T, E> Future for PendingCall<T, E> {
    type Output = Result<T, CallError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let outcome = ready!(Pin::new(&mut self.rx).poll(cx));
        Poll::Ready(outcome.unwrap_or_else(|_| {
            Err(CallError::Interrupted {
                operation: self.operation.to_string(),
            })
        }))
    }
}
