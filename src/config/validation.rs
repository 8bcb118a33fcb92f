//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, probabilities within 0..=1)
//! - Reject unknown log levels and formats
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GateConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::GateConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["full", "compact", "pretty"];

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} must be within 0.0..=1.0, got {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("unknown {field} '{value}'")]
    Unknown { field: &'static str, value: String },
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.breaker.call_timeout_ms == 0 {
        errors.push(ValidationError::Zero { field: "breaker.call_timeout_ms" });
    }
    if config.breaker.reset_timeout_ms == 0 {
        errors.push(ValidationError::Zero { field: "breaker.reset_timeout_ms" });
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::Unknown {
            field: "observability.log_level",
            value: config.observability.log_level.clone(),
        });
    }
    if !LOG_FORMATS.contains(&config.observability.log_format.as_str()) {
        errors.push(ValidationError::Unknown {
            field: "observability.log_format",
            value: config.observability.log_format.clone(),
        });
    }

    let sim = &config.simulation;
    if sim.calls == 0 {
        errors.push(ValidationError::Zero { field: "simulation.calls" });
    }
    if sim.interval_ms == 0 {
        errors.push(ValidationError::Zero { field: "simulation.interval_ms" });
    }
    for (field, value) in [
        ("simulation.failure_rate", sim.failure_rate),
        ("simulation.hang_rate", sim.hang_rate),
    ] {
        if !(0.0..=1.0).contains(&value) {
            errors.push(ValidationError::OutOfRange { field, value });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
