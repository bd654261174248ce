//! # Runtime Configuration
//!
//! Environment-driven settings for the simulation service. Every key has a
//! default matching the compose setup of the demo mesh, so the binary runs with
//! zero configuration; malformed values fail fast at startup instead of
//! surfacing mid-simulation.

use std::env;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const ENV_SERVER_PORT: &str = "SERVER_PORT";
const ENV_PLANT_SERVICE_URL: &str = "PLANT_SERVICE_URL";
const ENV_TICK_SECONDS: &str = "SIMULATION_TICK_SECONDS";

#[derive(Debug, Error)]
pub enum RuntimeConfigError {
    #[error("environment variable {var} has invalid value '{value}': {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Settings the simulation service boots with.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    /// Port the HTTP/WebSocket server binds to.
    pub server_port: u16,
    /// Base URL of the plant service queried every tick.
    pub plant_service_url: String,
    /// Seconds between ticks of each per-user simulation loop.
    pub tick_seconds: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            server_port: 5003,
            plant_service_url: "http://plant_service:5002".to_string(),
            tick_seconds: 2,
        }
    }
}

impl fmt::Display for SimulationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SimulationConfig {{ port: {}, plant_service: {}, tick: {}s }}",
            self.server_port, self.plant_service_url, self.tick_seconds
        )
    }
}

impl SimulationConfig {
    /// Loads the configuration from the process environment, falling back to
    /// the defaults above for unset keys.
    pub fn from_env() -> Result<Self, RuntimeConfigError> {
        let defaults = Self::default();

        let server_port = match env::var(ENV_SERVER_PORT) {
            Ok(raw) => raw.parse::<u16>().map_err(|e| RuntimeConfigError::InvalidValue {
                var: ENV_SERVER_PORT,
                value: raw,
                reason: e.to_string(),
            })?,
            Err(_) => defaults.server_port,
        };

        let plant_service_url =
            env::var(ENV_PLANT_SERVICE_URL).unwrap_or(defaults.plant_service_url);

        let tick_seconds = match env::var(ENV_TICK_SECONDS) {
            Ok(raw) => {
                let parsed = raw.parse::<u64>().map_err(|e| RuntimeConfigError::InvalidValue {
                    var: ENV_TICK_SECONDS,
                    value: raw.clone(),
                    reason: e.to_string(),
                })?;
                if parsed == 0 {
                    return Err(RuntimeConfigError::InvalidValue {
                        var: ENV_TICK_SECONDS,
                        value: raw,
                        reason: "tick period must be at least 1 second".to_string(),
                    });
                }
                parsed
            }
            Err(_) => defaults.tick_seconds,
        };

        Ok(Self {
            server_port,
            plant_service_url,
            tick_seconds,
        })
    }

    /// The tick period as a `Duration`, ready for the scheduler context.
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs(self.tick_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_demo_mesh() {
        let cfg = SimulationConfig::default();
        assert_eq!(cfg.server_port, 5003);
        assert_eq!(cfg.plant_service_url, "http://plant_service:5002");
        assert_eq!(cfg.tick_period(), Duration::from_secs(2));
    }
}
