//! Clap derive structures for the `simfleet` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// simfleet -- simulate a fleet of IoT devices against an MQTT broker
#[derive(Debug, Parser)]
#[command(
    name = "simfleet",
    version,
    about = "Simulate IoT device fleets over MQTT",
    long_about = "Runs one simulated device per directory record: each device keeps an\n\
        MQTT session with the broker, publishes periodic telemetry, and answers\n\
        RPC commands that change its state.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config dir)
    #[arg(long, env = "SIMFLEET_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "SIMFLEET_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log line format
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StateBackend {
    /// Keep state in memory, write it back on shutdown
    Memory,
    /// Read and write every change through the directory
    Directory,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start simulating devices until interrupted
    Run(RunArgs),

    /// Inspect the device directory
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Write one test point to the metrics sink
    MetricsTest(MetricsTestArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Device selection ─────────────────────────────────────────────────

/// Which directory records a command applies to. At most one filter.
#[derive(Debug, Args)]
pub struct SelectArgs {
    /// Only these directory ids (repeatable)
    #[arg(long = "device-id", value_name = "ID", conflicts_with_all = ["group", "device_type"])]
    pub device_ids: Vec<u64>,

    /// Only devices in this group
    #[arg(long, conflicts_with = "device_type")]
    pub group: Option<String>,

    /// Only devices of this type (case-insensitive)
    #[arg(long = "type", value_name = "TYPE")]
    pub device_type: Option<String>,
}

// ── Run ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub select: SelectArgs,

    /// Publish randomized readings instead of the stored state
    #[arg(long)]
    pub randomize: bool,

    /// Record telemetry and RPC changes to the metrics sink
    #[arg(long)]
    pub use_metrics: bool,

    /// Where device state lives during the run
    #[arg(long, value_name = "BACKEND")]
    pub state_backend: Option<StateBackend>,

    /// Telemetry period in seconds
    #[arg(long, value_name = "SECS")]
    pub heartbeat: Option<u64>,
}

// ── Devices ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    pub command: DevicesCommand,
}

#[derive(Debug, Subcommand)]
pub enum DevicesCommand {
    /// List directory records
    #[command(alias = "ls")]
    List(SelectArgs),
}

// ── Metrics test ─────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct MetricsTestArgs {
    /// Device name to tag the point with
    #[arg(long)]
    pub device_id: String,

    /// Numeric value to write
    #[arg(long, default_value = "1.0", allow_negative_numbers = true)]
    pub value: f64,

    /// Measurement name
    #[arg(long, default_value = "device_data")]
    pub measurement: String,

    /// Field key name
    #[arg(long, default_value = "test_value")]
    pub field: String,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Write a starter config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective config (secrets redacted)
    Show,

    /// Print the config file path
    Path,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: clap_complete::Shell,
}
