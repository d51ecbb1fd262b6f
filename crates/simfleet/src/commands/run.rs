//! `run`: simulate the selected devices until Ctrl-C.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use simfleet_api::MqttBroker;
use simfleet_core::Fleet;

use crate::cli::{GlobalOpts, RunArgs};
use crate::commands::devices;
use crate::config;
use crate::error::CliError;
use crate::output;

pub async fn handle(args: RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load(global)?;
    let fleet_config = config::fleet_config(&cfg, &args)?;
    let sink = config::optional_sink(&cfg, &fleet_config)?;
    let directory = config::directory(&cfg).await?;

    let mut fleet = Fleet::new(fleet_config, Arc::new(MqttBroker::new()), directory);
    if let Some(sink) = sink {
        fleet = fleet.with_metrics(sink);
    }

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, shutting down");
                stop.cancel();
            }
            Err(e) => warn!(error = %e, "cannot listen for Ctrl-C"),
        }
    });

    let report = fleet.run(config::selector(&args.select), cancel).await?;
    if report.is_empty() {
        if !global.quiet {
            eprintln!("No devices registered.");
        }
        return Ok(());
    }

    let out = devices::render(&report.devices, global)?;
    output::print_output(&out, global.quiet);
    if !global.quiet {
        eprintln!(
            "Simulated {} device(s); {} state record(s) written back.",
            report.len(),
            report.flushed
        );
    }
    Ok(())
}
