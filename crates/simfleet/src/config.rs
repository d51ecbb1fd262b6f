//! CLI configuration: the shared config crate plus flag overrides.
//!
//! Everything the commands need from the config file is resolved here:
//! the directory backend, the metrics sink, and the final `FleetConfig`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use simfleet_api::{DirectoryClient, InfluxSink, MetricsSink, TlsMode, TransportConfig};
use simfleet_core::{
    DeviceId, DeviceSelector, Directory, FleetConfig, HttpDirectory, LocalDirectory, StateMode,
    TypeTag,
};

use crate::cli::{GlobalOpts, RunArgs, SelectArgs, StateBackend};
use crate::error::CliError;

pub use simfleet_config::{Config, DirectoryKind};

/// Config file in effect: `--config` / `SIMFLEET_CONFIG`, else the platform path.
pub fn config_path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(simfleet_config::config_path)
}

/// Load the config file merged with `SIMFLEET_*` overrides.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(simfleet_config::load_config_from(&config_path(global))?)
}

fn transport(cfg: &Config) -> TransportConfig {
    let tls = if cfg.directory.insecure {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca) = cfg.directory.ca_cert {
        TlsMode::CustomCa(ca.clone())
    } else {
        TlsMode::System
    };
    TransportConfig {
        tls,
        timeout: Duration::from_secs(cfg.directory.timeout_secs),
    }
}

/// Build the directory backend named by `[directory] kind`.
pub async fn directory(cfg: &Config) -> Result<Arc<dyn Directory>, CliError> {
    match cfg.directory.kind {
        DirectoryKind::Http => {
            let url = simfleet_config::directory_url(cfg)?;
            let token = simfleet_config::directory_token(cfg);
            let client = DirectoryClient::new(url, token.as_ref(), &transport(cfg))?;
            Ok(Arc::new(HttpDirectory::new(client)))
        }
        DirectoryKind::File => {
            let path = simfleet_config::directory_path(cfg)?;
            Ok(Arc::new(LocalDirectory::open(path).await?))
        }
    }
}

/// Build the InfluxDB sink from `[metrics]`.
pub fn metrics_sink(cfg: &Config) -> Result<InfluxSink, CliError> {
    let url = simfleet_config::metrics_url(cfg)?;
    let token = simfleet_config::metrics_token(cfg);
    Ok(InfluxSink::new(
        &url,
        &cfg.metrics.org,
        &cfg.metrics.bucket,
        token.as_ref(),
        &transport(cfg),
    )?)
}

/// Translate the selection flags into a `DeviceSelector`.
pub fn selector(args: &SelectArgs) -> DeviceSelector {
    if !args.device_ids.is_empty() {
        DeviceSelector::Ids(args.device_ids.iter().copied().map(DeviceId).collect())
    } else if let Some(ref group) = args.group {
        DeviceSelector::Group(group.clone())
    } else if let Some(ref device_type) = args.device_type {
        DeviceSelector::Type(TypeTag::new(device_type))
    } else {
        DeviceSelector::All
    }
}

/// File settings with `run` flags layered on top.
pub fn fleet_config(cfg: &Config, args: &RunArgs) -> Result<FleetConfig, CliError> {
    let mut fleet = simfleet_config::to_fleet_config(cfg)?;

    if args.randomize {
        fleet.randomize = true;
    }
    if args.use_metrics {
        fleet.metrics = true;
    }
    if let Some(backend) = args.state_backend {
        fleet.state_mode = match backend {
            StateBackend::Memory => StateMode::Memory,
            StateBackend::Directory => StateMode::Directory,
        };
    }
    if let Some(secs) = args.heartbeat {
        if secs == 0 {
            return Err(CliError::Validation {
                field: "heartbeat".into(),
                reason: "must be greater than zero".into(),
            });
        }
        fleet.heartbeat = Duration::from_secs(secs);
    }

    Ok(fleet)
}

/// Build the metrics sink only when the run records metrics.
pub fn optional_sink(
    cfg: &Config,
    fleet: &FleetConfig,
) -> Result<Option<Arc<dyn MetricsSink>>, CliError> {
    if !fleet.metrics {
        return Ok(None);
    }
    let sink: Arc<dyn MetricsSink> = Arc::new(metrics_sink(cfg)?);
    Ok(Some(sink))
}
