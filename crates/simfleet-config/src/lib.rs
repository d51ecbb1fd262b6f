//! Shared configuration for the simfleet binary.
//!
//! TOML file + `SIMFLEET_` environment overrides (via figment), secret
//! resolution (env var, system keyring, plaintext), and translation into
//! `simfleet_core::FleetConfig`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use simfleet_api::BackoffPolicy;
use simfleet_core::{BrokerEndpoint, FleetConfig, StateMode};

/// Keyring service name for stored tokens.
pub const KEYRING_SERVICE: &str = "simfleet";

const ENV_PREFIX: &str = "SIMFLEET_";
const REDACTED: &str = "********";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no {what} configured")]
    Missing { what: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerSection,

    #[serde(default)]
    pub directory: DirectorySection,

    #[serde(default)]
    pub metrics: MetricsSection,

    #[serde(default)]
    pub simulator: SimulatorSection,

    #[serde(default)]
    pub backoff: BackoffSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BrokerSection {
    #[serde(default = "default_broker_host")]
    pub host: String,

    #[serde(default = "default_broker_port")]
    pub port: u16,

    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            host: default_broker_host(),
            port: default_broker_port(),
            keepalive_secs: default_keepalive(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_broker_host() -> String {
    "demo.thingsboard.io".into()
}
fn default_broker_port() -> u16 {
    1883
}
fn default_keepalive() -> u64 {
    60
}
fn default_connect_timeout() -> u64 {
    10
}

/// Which directory backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryKind {
    /// The directory REST service.
    #[default]
    Http,
    /// A local JSON document.
    File,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DirectorySection {
    #[serde(default)]
    pub kind: DirectoryKind,

    /// Base URL of the REST service (kind = "http").
    #[serde(default = "default_directory_url")]
    pub url: String,

    /// API token (plaintext; prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable holding the API token.
    pub token_env: Option<String>,

    /// Path of the JSON document (kind = "file").
    pub path: Option<PathBuf>,

    /// Accept self-signed certificates.
    #[serde(default)]
    pub insecure: bool,

    /// Custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for DirectorySection {
    fn default() -> Self {
        Self {
            kind: DirectoryKind::Http,
            url: default_directory_url(),
            token: None,
            token_env: None,
            path: None,
            insecure: false,
            ca_cert: None,
            timeout_secs: default_http_timeout(),
        }
    }
}

fn default_directory_url() -> String {
    "http://localhost:8000".into()
}
fn default_http_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MetricsSection {
    /// InfluxDB base URL.
    #[serde(default = "default_metrics_url")]
    pub url: String,

    #[serde(default)]
    pub org: String,

    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Write token (plaintext; prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable holding the write token.
    pub token_env: Option<String>,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            url: default_metrics_url(),
            org: String::new(),
            bucket: default_bucket(),
            token: None,
            token_env: None,
        }
    }
}

fn default_metrics_url() -> String {
    "http://localhost:8086".into()
}
fn default_bucket() -> String {
    "iot_data".into()
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SimulatorSection {
    #[serde(default = "default_heartbeat")]
    pub heartbeat_secs: u64,

    #[serde(default = "default_discovery")]
    pub discovery_secs: u64,

    #[serde(default)]
    pub randomize: bool,

    #[serde(default)]
    pub use_metrics: bool,

    #[serde(default)]
    pub state_backend: StateMode,
}

impl Default for SimulatorSection {
    fn default() -> Self {
        Self {
            heartbeat_secs: default_heartbeat(),
            discovery_secs: default_discovery(),
            randomize: false,
            use_metrics: false,
            state_backend: StateMode::Memory,
        }
    }
}

fn default_heartbeat() -> u64 {
    5
}
fn default_discovery() -> u64 {
    5
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BackoffSection {
    #[serde(default = "default_backoff_initial")]
    pub initial_ms: u64,

    #[serde(default = "default_backoff_max")]
    pub max_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub multiplier: f64,
}

impl Default for BackoffSection {
    fn default() -> Self {
        Self {
            initial_ms: default_backoff_initial(),
            max_ms: default_backoff_max(),
            multiplier: default_backoff_multiplier(),
        }
    }
}

fn default_backoff_initial() -> u64 {
    1_000
}
fn default_backoff_max() -> u64 {
    30_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Config {
    /// Copy with every plaintext secret masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.directory.token.is_some() {
            copy.directory.token = Some(REDACTED.into());
        }
        if copy.metrics.token.is_some() {
            copy.metrics.token = Some(REDACTED.into());
        }
        copy
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "simfleet", "simfleet").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("simfleet");
    p
}

// ── Config loading ──────────────────────────────────────────────────

fn figment_for(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load config from `path` + environment. A missing file yields defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = figment_for(path).extract()?;
    Ok(config)
}

/// Load config from the canonical path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

/// Serialize config to TOML and write it to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

// ── Secret resolution ───────────────────────────────────────────────

/// Resolve a secret: env var named by `env_name`, then the system keyring
/// entry `KEYRING_SERVICE/keyring_user`, then the plaintext value.
pub fn resolve_secret(
    env_name: Option<&str>,
    keyring_user: &str,
    plaintext: Option<&str>,
) -> Option<SecretString> {
    // 1. Env var
    if let Some(name) = env_name {
        if let Ok(val) = std::env::var(name) {
            return Some(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, keyring_user) {
        if let Ok(secret) = entry.get_password() {
            return Some(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    plaintext.map(|s| SecretString::from(s.to_owned()))
}

/// Directory API token, if any is configured.
pub fn directory_token(cfg: &Config) -> Option<SecretString> {
    resolve_secret(
        cfg.directory.token_env.as_deref(),
        "directory-token",
        cfg.directory.token.as_deref(),
    )
}

/// Metrics write token, if any is configured.
pub fn metrics_token(cfg: &Config) -> Option<SecretString> {
    resolve_secret(
        cfg.metrics.token_env.as_deref(),
        "metrics-token",
        cfg.metrics.token.as_deref(),
    )
}

// ── Validation & translation ────────────────────────────────────────

fn parse_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    raw.parse().map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL '{raw}': {e}"),
    })
}

/// Directory base URL.
pub fn directory_url(cfg: &Config) -> Result<Url, ConfigError> {
    parse_url("directory.url", &cfg.directory.url)
}

/// Directory document path (kind = "file").
pub fn directory_path(cfg: &Config) -> Result<&Path, ConfigError> {
    cfg.directory
        .path
        .as_deref()
        .ok_or_else(|| ConfigError::Missing {
            what: "directory.path for kind = \"file\"".into(),
        })
}

/// Metrics base URL.
pub fn metrics_url(cfg: &Config) -> Result<Url, ConfigError> {
    parse_url("metrics.url", &cfg.metrics.url)
}

fn positive_secs(field: &str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::Validation {
            field: field.into(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(Duration::from_secs(secs))
}

/// Build the runtime `FleetConfig` from file settings.
pub fn to_fleet_config(cfg: &Config) -> Result<FleetConfig, ConfigError> {
    if cfg.broker.host.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "broker.host".into(),
            reason: "must not be empty".into(),
        });
    }
    if !cfg.backoff.multiplier.is_finite() || cfg.backoff.multiplier < 1.0 {
        return Err(ConfigError::Validation {
            field: "backoff.multiplier".into(),
            reason: format!("must be >= 1.0, got {}", cfg.backoff.multiplier),
        });
    }
    if cfg.backoff.initial_ms == 0 || cfg.backoff.max_ms < cfg.backoff.initial_ms {
        return Err(ConfigError::Validation {
            field: "backoff".into(),
            reason: "need 0 < initial_ms <= max_ms".into(),
        });
    }

    Ok(FleetConfig {
        broker: BrokerEndpoint {
            host: cfg.broker.host.clone(),
            port: cfg.broker.port,
            keep_alive: positive_secs("broker.keepalive_secs", cfg.broker.keepalive_secs)?,
        },
        randomize: cfg.simulator.randomize,
        metrics: cfg.simulator.use_metrics,
        state_mode: cfg.simulator.state_backend,
        heartbeat: positive_secs("simulator.heartbeat_secs", cfg.simulator.heartbeat_secs)?,
        discovery_interval: positive_secs("simulator.discovery_secs", cfg.simulator.discovery_secs)?,
        connect_timeout: positive_secs(
            "broker.connect_timeout_secs",
            cfg.broker.connect_timeout_secs,
        )?,
        backoff: BackoffPolicy {
            initial: Duration::from_millis(cfg.backoff.initial_ms),
            multiplier: cfg.backoff.multiplier,
            max: Duration::from_millis(cfg.backoff.max_ms),
        },
    })
}
