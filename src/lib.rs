//! In-process circuit breaker for async operations.

pub mod config;
pub mod observability;
pub mod resilience;

pub use config::{BreakerConfig, GateConfig};
pub use resilience::{
    new_circuit_breaker, new_circuit_breaker_with, BreakerOpenError, CallError, CircuitState,
    GatedGroup, GatedOperation, Operation, OperationGroup, Protect, TimeoutError, UsageError,
};
