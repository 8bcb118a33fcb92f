//! breaker-gate demo
//!
//! Drives a simulated flaky downstream through a gated operation group and
//! reports how the breaker behaved.
//!
//! ```text
//!   calls ──▶ GatedGroup { quote, balance, history } ──▶ Downstream
//!                  │                                    (random failures,
//!                  └── one BreakerState                  hangs, latency)
//! ```

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rand::Rng;
use serde::Serialize;

use breaker_gate::config::validation::validate_config;
use breaker_gate::config::{load_config, ConfigError, GateConfig, SimulationConfig};
use breaker_gate::observability::init_logging;
use breaker_gate::resilience::{new_circuit_breaker_with, CallError, OperationGroup};

#[derive(Parser)]
#[command(name = "breaker-gate")]
#[command(about = "Drive a simulated flaky downstream through a circuit breaker", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    calls: Option<u32>,

    #[arg(long)]
    interval_ms: Option<u64>,

    #[arg(long)]
    failure_rate: Option<f64>,

    #[arg(long)]
    max_failures: Option<u32>,
}

#[derive(Debug, thiserror::Error)]
#[error("downstream endpoint {0} failed")]
struct DownstreamError(&'static str);

/// Simulated dependency shared by every operation of the group.
struct Downstream {
    sim: SimulationConfig,
    served: AtomicU64,
}

impl Downstream {
    fn serve(self: Arc<Self>, endpoint: &'static str) -> impl Future<Output = Result<u64, DownstreamError>> {
        let mut rng = rand::thread_rng();
        let hang = rng.gen_bool(self.sim.hang_rate);
        let fail = rng.gen_bool(self.sim.failure_rate);
        let latency = Duration::from_millis(self.sim.latency_ms);

        async move {
            if hang {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(latency).await;
            if fail {
                Err(DownstreamError(endpoint))
            } else {
                Ok(self.served.fetch_add(1, Ordering::Relaxed) + 1)
            }
        }
    }
}

#[derive(Debug, Default, Serialize)]
struct Tally {
    succeeded: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    rejected: AtomicU64,
    interrupted: AtomicU64,
}

impl Tally {
    fn record<T>(&self, outcome: &Result<T, CallError<DownstreamError>>) {
        let counter = match outcome {
            Ok(_) => &self.succeeded,
            Err(CallError::Operation(_)) => &self.failed,
            Err(CallError::Timeout(_)) => &self.timed_out,
            Err(CallError::BreakerOpen(_)) => &self.rejected,
            Err(CallError::Interrupted { .. }) => &self.interrupted,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

fn load(cli: &Cli) -> Result<GateConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GateConfig::default(),
    };

    if let Some(calls) = cli.calls {
        config.simulation.calls = calls;
    }
    if let Some(interval_ms) = cli.interval_ms {
        config.simulation.interval_ms = interval_ms;
    }
    if let Some(failure_rate) = cli.failure_rate {
        config.simulation.failure_rate = failure_rate;
    }
    if let Some(max_failures) = cli.max_failures {
        config.breaker.max_failures = max_failures;
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load(&cli)?;
    init_logging(&config.observability)?;

    tracing::info!(
        max_failures = config.breaker.max_failures,
        call_timeout_ms = config.breaker.call_timeout_ms,
        reset_timeout_ms = config.breaker.reset_timeout_ms,
        calls = config.simulation.calls,
        "Configuration loaded"
    );

    let downstream = Downstream {
        sim: config.simulation.clone(),
        served: AtomicU64::new(0),
    };
    let group = OperationGroup::new(downstream)
        .operation("quote", |d: Arc<Downstream>, _: ()| d.serve("quote"))
        .operation("balance", |d: Arc<Downstream>, _: ()| d.serve("balance"))
        .operation("history", |d: Arc<Downstream>, _: ()| d.serve("history"));
    let gated = new_circuit_breaker_with(group, &config.breaker);

    let operations = gated.operations();
    let tally = Arc::new(Tally::default());
    let mut ticker = tokio::time::interval(Duration::from_millis(config.simulation.interval_ms));

    for i in 0..config.simulation.calls as usize {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping early");
                break;
            }
        }

        let tally = tally.clone();
        let operation = &operations[i % operations.len()];
        let name = operation.name().to_string();
        operation.call_with((), move |outcome| {
            match &outcome {
                Ok(served) => tracing::info!(call = i, operation = %name, served, "Call succeeded"),
                Err(e) => tracing::info!(call = i, operation = %name, error = %e, "Call failed"),
            }
            tally.record(&outcome);
        })?;
    }

    // Let in-flight calls settle: the watchdog bounds every one of them.
    tokio::time::sleep(config.breaker.call_timeout() + Duration::from_millis(10)).await;

    let report = serde_json::json!({
        "breaker": gated.snapshot(),
        "outcomes": &*tally,
        "downstream_served": gated.receiver().served.load(Ordering::Relaxed),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
