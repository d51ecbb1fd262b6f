//! Command dispatch: bridges CLI args to the fleet engine and output formatting.

pub mod config_cmd;
pub mod devices;
pub mod run;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a command that talks to the directory, broker, or metrics sink.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Run(args) => run::handle(args, global).await,
        Command::Devices(args) => devices::handle(args, global).await,
        Command::MetricsTest(args) => metrics_test::handle(args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}
