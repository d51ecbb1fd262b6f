// ── Runtime fleet configuration ──
//
// These types describe how a fleet run behaves. They never touch disk:
// the CLI builds a `FleetConfig` (usually via simfleet-config) and hands it in.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use simfleet_api::BackoffPolicy;
use strum::{Display, EnumString};

use crate::model::{DeviceId, TypeTag};

/// Where device state lives during a run. Chosen once per run.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum StateMode {
    /// Authoritative in memory; flushed to the directory at shutdown.
    #[default]
    Memory,
    /// Every write goes straight to the directory; every read re-fetches.
    Directory,
}

/// MQTT broker address and session tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
    pub keep_alive: Duration,
}

impl Default for BrokerEndpoint {
    fn default() -> Self {
        Self {
            host: "demo.thingsboard.io".into(),
            port: 1883,
            keep_alive: Duration::from_secs(60),
        }
    }
}

/// Which directory records a run simulates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DeviceSelector {
    #[default]
    All,
    Ids(Vec<DeviceId>),
    Group(String),
    Type(TypeTag),
}

/// Configuration for one fleet run.
#[derive(Debug, Clone)]
pub struct FleetConfig {
    pub broker: BrokerEndpoint,
    /// Randomize periodic telemetry instead of republishing stored state.
    pub randomize: bool,
    /// Write metric records for telemetry and RPC mutations.
    pub metrics: bool,
    pub state_mode: StateMode,
    /// Telemetry period per device.
    pub heartbeat: Duration,
    /// How often to re-list the directory for new devices.
    pub discovery_interval: Duration,
    /// Deadline for a single connect attempt.
    pub connect_timeout: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            broker: BrokerEndpoint::default(),
            randomize: false,
            metrics: false,
            state_mode: StateMode::Memory,
            heartbeat: Duration::from_secs(5),
            discovery_interval: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            backoff: BackoffPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_mode_parses_case_insensitively() {
        assert_eq!("Directory".parse::<StateMode>().ok(), Some(StateMode::Directory));
        assert_eq!("memory".parse::<StateMode>().ok(), Some(StateMode::Memory));
        assert!("disk".parse::<StateMode>().is_err());
        assert_eq!(StateMode::Directory.to_string(), "directory");
    }

    #[test]
    fn defaults_match_simulator_cadence() {
        let config = FleetConfig::default();
        assert_eq!(config.heartbeat, Duration::from_secs(5));
        assert_eq!(config.discovery_interval, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.broker.port, 1883);
    }
}
