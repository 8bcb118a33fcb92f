//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GateConfig (validated, immutable)
//!     → BreakerConfig handed to new_circuit_breaker_with
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; a breaker never re-reads it
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::BreakerConfig;
pub use schema::GateConfig;
pub use schema::ObservabilityConfig;
pub use schema::SimulationConfig;
