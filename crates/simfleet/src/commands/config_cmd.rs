//! Config subcommand handlers.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        // ── Init: starter file ──────────────────────────────────────
        ConfigCommand::Init { force } => {
            let path = config::config_path(global);
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }

            simfleet_config::save_config_to(&Config::default(), &path)?;

            if !global.quiet {
                eprintln!("✓ Configuration written to {}", path.display());
                eprintln!("  Point [directory] at your device registry, then: simfleet devices list");
            }
            Ok(())
        }

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let cfg = config::load(global)?.redacted();
            let out = output::render_single(
                &global.output,
                &cfg,
                |c| {
                    toml::to_string_pretty(c).map_err(|e| CliError::Serialization {
                        message: e.to_string(),
                    })
                },
                |_| config::config_path(global).display().to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Path ────────────────────────────────────────────────────
        ConfigCommand::Path => {
            output::print_output(&config::config_path(global).display().to_string(), false);
            Ok(())
        }
    }
}
