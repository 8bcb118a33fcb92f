//! Group binder: one breaker, one gate per protected operation.
//!
//! # Responsibilities
//! - Build the shared `BreakerState` for a single operation or a group
//! - Bind every group member to that breaker, in declaration order
//! - Hand each member its group's receiver so it keeps its owner's identity
//!
//! # Design Decisions
//! - Single operation and group are distinct types; `Protect` resolves which
//!   gated shape is produced at construction
//! - Receiver data is never gated, only the registered operations are
//! - Registering a name twice replaces the earlier operation

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::config::BreakerConfig;
use crate::resilience::circuit_breaker::{BreakerSnapshot, BreakerState};
use crate::resilience::error::UsageError;
use crate::resilience::gate::{GatedOperation, Operation, OperationFn, PendingCall};

type MemberFn<S, A, T, E> = Arc<dyn Fn(Arc<S>, A) -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

/// A receiver plus the named operations that act on it.
///
/// Every member shares one argument, output and error type. Operations with
/// other signatures can still join the group's breaker by binding them to it
/// directly:
///
/// ```
/// use breaker_gate::{new_circuit_breaker, Operation, OperationGroup, Protect};
/// use std::sync::Arc;
///
/// let gated = new_circuit_breaker(
///     OperationGroup::new(()).operation("ping", |_: Arc<()>, _: ()| async { Ok::<(), String>(()) }),
///     3,
///     1_000,
///     5_000,
/// );
/// let lookup = Operation::new("lookup", |id: u64| async move { Ok::<u64, std::io::Error>(id) })
///     .bind(gated.breaker().clone());
/// assert!(Arc::ptr_eq(lookup.breaker(), gated.breaker()));
/// ```
pub struct OperationGroup<S, A, T, E> {
    receiver: Arc<S>,
    members: Vec<(String, MemberFn<S, A, T, E>)>,
}

impl<S, A, T, E> OperationGroup<S, A, T, E>
where
    S: 'static,
    A: 'static,
    T: 'static,
    E: 'static,
{
    pub fn new(receiver: S) -> Self {
        Self::from_arc(Arc::new(receiver))
    }

    pub fn from_arc(receiver: Arc<S>) -> Self {
        Self {
            receiver,
            members: Vec::new(),
        }
    }

    /// Register an operation under `name`.
    pub fn operation<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Arc<S>, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let name = name.into();
        let member: MemberFn<S, A, T, E> = Arc::new(move |receiver, args| f(receiver, args).boxed());
        match self.members.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = member,
            None => self.members.push((name, member)),
        }
        self
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl<S, A, T, E> fmt::Debug for OperationGroup<S, A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationGroup")
            .field("operations", &self.members.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .finish()
    }
}

/// A group whose operations share a single breaker.
pub struct GatedGroup<S, A, T, E> {
    receiver: Arc<S>,
    breaker: Arc<BreakerState>,
    operations: Vec<GatedOperation<A, T, E>>,
}

impl<S, A, T, E> GatedGroup<S, A, T, E>
where
    S: Send + Sync + 'static,
    A: 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    /// The group's receiver, including any plain data it carries.
    pub fn receiver(&self) -> &Arc<S> {
        &self.receiver
    }

    pub fn breaker(&self) -> &Arc<BreakerState> {
        &self.breaker
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        self.breaker.snapshot()
    }

    /// Gated operation names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.operations.iter().map(GatedOperation::name)
    }

    pub fn operations(&self) -> &[GatedOperation<A, T, E>] {
        &self.operations
    }

    pub fn get(&self, name: &str) -> Option<&GatedOperation<A, T, E>> {
        self.operations.iter().find(|op| op.name() == name)
    }

    /// Invoke the member named `name`.
    pub fn try_call(&self, name: &str, args: A) -> Result<PendingCall<T, E>, UsageError> {
        self.get(name)
            .ok_or_else(|| UsageError::UnknownOperation {
                operation: name.to_string(),
            })?
            .try_call(args)
    }

    /// Invoke the member named `name`.
    ///
    /// # Panics
    /// Panics on a [`UsageError`], see [`try_call`](Self::try_call).
    pub fn call(&self, name: &str, args: A) -> PendingCall<T, E> {
        match self.try_call(name, args) {
            Ok(pending) => pending,
            Err(e) => panic!("{e}"),
        }
    }
}

impl<S, A, T, E> fmt::Debug for GatedGroup<S, A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatedGroup")
            .field("operations", &self.operations)
            .field("breaker", &self.breaker)
            .finish()
    }
}

/// Something that can be placed behind a circuit breaker.
pub trait Protect {
    type Gated;

    /// Gate `self` behind an existing breaker, shared with whatever else it guards.
    fn bind(self, breaker: Arc<BreakerState>) -> Self::Gated;
}

impl<A, T, E> Protect for Operation<A, T, E>
where
    A: 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    type Gated = GatedOperation<A, T, E>;

    fn bind(self, breaker: Arc<BreakerState>) -> Self::Gated {
        GatedOperation::new(self.name, self.invoke, breaker)
    }
}

impl<S, A, T, E> Protect for OperationGroup<S, A, T, E>
where
    S: Send + Sync + 'static,
    A: 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    type Gated = GatedGroup<S, A, T, E>;

    fn bind(self, breaker: Arc<BreakerState>) -> Self::Gated {
        let receiver = self.receiver;
        let operations = self
            .members
            .into_iter()
            .map(|(name, member)| {
                let owner = receiver.clone();
                let invoke: OperationFn<A, T, E> = Arc::new(move |args| member(owner.clone(), args));
                GatedOperation::new(name, invoke, breaker.clone())
            })
            .collect();

        GatedGroup {
            receiver,
            breaker,
            operations,
        }
    }
}

/// Put `target` behind a new circuit breaker.
///
/// `max_failures` is the consecutive-failure threshold (0 opens on the first
/// failure), `call_timeout_ms` bounds every executed call and
/// `reset_timeout_ms` is how long the breaker stays open before admitting a
/// probe.
pub fn new_circuit_breaker<P: Protect>(
    target: P,
    max_failures: u32,
    call_timeout_ms: u64,
    reset_timeout_ms: u64,
) -> P::Gated {
    new_circuit_breaker_with(
        target,
        &BreakerConfig::new(max_failures, call_timeout_ms, reset_timeout_ms),
    )
}

/// Put `target` behind a new circuit breaker built from `config`.
pub fn new_circuit_breaker_with<P: Protect>(target: P, config: &BreakerConfig) -> P::Gated {
    tracing::debug!(
        max_failures = config.max_failures,
        call_timeout_ms = config.call_timeout_ms,
        reset_timeout_ms = config.reset_timeout_ms,
        "Creating circuit breaker"
    );
    target.bind(BreakerState::new(*config))
}
