//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Caller invokes a gated operation:
//!     → gate.rs (ask circuit_breaker.rs: fail fast or execute)
//!     → timeouts.rs (arm watchdog, race it against the operation)
//!     → first completion wins: circuit_breaker.rs records success/failure
//!     → outcome delivered through PendingCall
//!
//! Construction:
//!     group.rs builds one BreakerState and one gate per operation
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every executed call has a deadline
//! - Circuit breaker prevents cascading failures
//! - One breaker is shared by every operation of a group

pub mod circuit_breaker;
pub mod error;
pub mod gate;
pub mod group;
pub mod timeouts;

pub use circuit_breaker::{Admission, BreakerSnapshot, BreakerState, CircuitState};
pub use error::{BreakerOpenError, CallError, TimeoutError, UsageError};
pub use gate::{GatedOperation, Operation, PendingCall};
pub use group::{new_circuit_breaker, new_circuit_breaker_with, GatedGroup, OperationGroup, Protect};
