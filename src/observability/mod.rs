//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! resilience/ produces:
//!     → breaker transitions (warn/info events)
//!     → per-call admission and outcome (debug events, call_id field)
//!
//! Consumers:
//!     → logging.rs (fmt subscriber on stdout)
//! ```

pub mod logging;

pub use logging::init_logging;
