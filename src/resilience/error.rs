//! Errors surfaced by gated operations.

use thiserror::Error;

/// A gated call exceeded its call timeout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("operation {operation} timed out after {elapsed_ms} ms")]
pub struct TimeoutError {
    pub operation: String,
    pub elapsed_ms: u64,
}

/// A gated call was rejected without running because the breaker is open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("operation {operation} failed fast: circuit breaker open")]
pub struct BreakerOpenError {
    pub operation: String,
}

/// Outcome delivered to the caller of a gated operation.
#[derive(Debug, Error)]
pub enum CallError<E> {
    /// The operation's own error, forwarded verbatim.
    #[error("{0}")]
    Operation(E),

    #[error(transparent)]
    Timeout(TimeoutError),

    #[error(transparent)]
    BreakerOpen(BreakerOpenError),

    /// The runtime dropped the call before any outcome was delivered.
    #[error("operation {operation} was interrupted before completing")]
    Interrupted { operation: String },
}

impl<E> CallError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, CallError::Timeout(_))
    }

    pub fn is_breaker_open(&self) -> bool {
        matches!(self, CallError::BreakerOpen(_))
    }

    /// The operation's own error, if that is what this is.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            CallError::Operation(e) => Some(e),
            _ => None,
        }
    }
}

/// Programming errors detected when a gated call is initiated.
///
/// These never reach the breaker's failure accounting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("operation {operation} invoked outside a Tokio runtime; no completion can be delivered")]
    NoRuntime { operation: String },

    #[error("group has no operation named {operation}")]
    UnknownOperation { operation: String },
}
