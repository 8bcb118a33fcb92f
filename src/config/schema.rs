//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for a gated
//! operation group. All types derive Serde traits for deserialization from
//! config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GateConfig {
    /// Breaker thresholds and timeouts.
    pub breaker: BreakerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Simulated downstream driven by the demo binary.
    pub simulation: SimulationConfig,
}

/// Circuit breaker settings, immutable once a group is built.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker (0 opens on the first failure).
    pub max_failures: u32,

    /// Per-call timeout in milliseconds.
    pub call_timeout_ms: u64,

    /// Delay in milliseconds before an open breaker admits a probe.
    pub reset_timeout_ms: u64,
}

impl BreakerConfig {
    pub fn new(max_failures: u32, call_timeout_ms: u64, reset_timeout_ms: u64) -> Self {
        Self {
            max_failures,
            call_timeout_ms,
            reset_timeout_ms,
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            call_timeout_ms: 1_000,
            reset_timeout_ms: 5_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log line format (full, compact, pretty).
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "full".to_string(),
        }
    }
}

/// Simulated downstream used by the `breaker-gate` binary.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Total number of calls to issue.
    pub calls: u32,

    /// Delay between consecutive calls in milliseconds.
    pub interval_ms: u64,

    /// Probability (0.0..=1.0) that a call reports an error.
    pub failure_rate: f64,

    /// Probability (0.0..=1.0) that a call never completes.
    pub hang_rate: f64,

    /// Simulated downstream latency in milliseconds.
    pub latency_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            calls: 50,
            interval_ms: 100,
            failure_rate: 0.3,
            hang_rate: 0.05,
            latency_ms: 20,
        }
    }
}
