//! # Telemetry Observer Seam
//!
//! The core never talks to an exporter directly. Every interesting moment (task
//! start, task drained, fault suppression, fetch failure, successful emission) is
//! reported through this trait, and the concrete sink (tracing, metrics, plain
//! logging) is injected by the binary. Counter and event names mirror the metric
//! names the original mesh exported, so dashboards carry over unchanged.

use serde_json::Value;

/// Counter: total simulations started.
pub const METRIC_SIMULATIONS_STARTED: &str = "simulation_service.simulations.started";
/// Gauge-style up/down counter: currently active simulations.
pub const METRIC_SIMULATIONS_ACTIVE: &str = "simulation_service.simulations.active";
/// Counter: total data points emitted to rooms.
pub const METRIC_DATA_EMITTED: &str = "simulation_service.data.emitted";
/// Counter: total errors, tagged with `error_type` and `operation`.
pub const METRIC_ERRORS: &str = "simulation_service.errors.count";
/// Gauge-style up/down counter: currently connected sessions.
pub const METRIC_CONNECTIONS_ACTIVE: &str = "simulation_service.connections.active";

/// # Observer
///
/// The telemetry sink the core emits through. Implementations must be cheap and
/// non-blocking; the simulation loop calls them inline on every tick.
pub trait Observer: Send + Sync {
    /// Records a discrete structured event (task started, task drained, ...).
    fn record_event(&self, name: &str, attributes: Value);

    /// Adds `delta` to a named counter. Negative deltas are valid for the
    /// gauge-style active counters.
    fn increment_counter(&self, name: &str, attributes: Value, delta: i64);
}

/// # Log Observer
///
/// Default sink: forwards everything to the `log` facade. The binary installs
/// `env_logger`, so events and counters end up on the service's stdout the same
/// way the rest of the engine logs do.
#[derive(Debug, Default)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn record_event(&self, name: &str, attributes: Value) {
        log::info!("event {} {}", name, attributes);
    }

    fn increment_counter(&self, name: &str, attributes: Value, delta: i64) {
        log::debug!("counter {} {:+} {}", name, delta, attributes);
    }
}
