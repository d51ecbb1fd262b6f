//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use simfleet_config::ConfigError;
use simfleet_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach {target}: {reason}")]
    #[diagnostic(
        code(simfleet::connection_failed),
        help(
            "Check that the service is running and accessible.\n\
             Inspect the effective settings with: simfleet config show"
        )
    )]
    ConnectionFailed { target: String, reason: String },

    #[error("Timed out after {seconds}s")]
    #[diagnostic(
        code(simfleet::timeout),
        help("Raise broker.connect_timeout_secs or directory.timeout_secs in the config.")
    )]
    Timeout { seconds: u64 },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(simfleet::auth_failed),
        help(
            "Verify the directory token.\n\
             Set it with SIMFLEET_DIRECTORY__TOKEN, directory.token_env, or the\n\
             system keyring (service \"simfleet\", user \"directory-token\")."
        )
    )]
    AuthFailed { message: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(simfleet::not_found),
        help("Run: simfleet devices list to see registered devices")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
    },

    // ── Remote services ──────────────────────────────────────────────
    #[error("Directory error: {message}")]
    #[diagnostic(code(simfleet::directory))]
    Directory { message: String },

    #[error("Metrics write failed: {message}")]
    #[diagnostic(
        code(simfleet::metrics),
        help("Check metrics.url, metrics.org, metrics.bucket and the write token.")
    )]
    Metrics { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(simfleet::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration file already exists at {path}")]
    #[diagnostic(
        code(simfleet::config_exists),
        help("Pass --force to overwrite it.")
    )]
    ConfigExists { path: String },

    #[error(transparent)]
    #[diagnostic(
        code(simfleet::config),
        help("Create a starter file with: simfleet config init")
    )]
    Config(Box<ConfigError>),

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("Interrupted")]
    #[diagnostic(code(simfleet::cancelled))]
    Cancelled,

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Serialization failed: {message}")]
    #[diagnostic(code(simfleet::serialization))]
    Serialization { message: String },
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(Box::new(other)),
        }
    }
}

impl From<simfleet_api::Error> for CliError {
    fn from(err: simfleet_api::Error) -> Self {
        CoreError::from(err).into()
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::ConfigExists { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { reason } | CoreError::Broker { message: reason } => {
                CliError::ConnectionFailed {
                    target: "broker".into(),
                    reason,
                }
            }

            CoreError::NotConnected => CliError::ConnectionFailed {
                target: "broker".into(),
                reason: "session is not connected".into(),
            },

            CoreError::NotAuthorized { reason: message }
            | CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },

            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },

            CoreError::DeviceNotFound { id } => CliError::NotFound {
                resource_type: "device".into(),
                identifier: id.to_string(),
            },

            CoreError::Directory {
                message,
                status: None,
            } => CliError::ConnectionFailed {
                target: "directory".into(),
                reason: message,
            },

            CoreError::Directory { message, .. } => CliError::Directory { message },

            CoreError::Io { path, source } => CliError::Io(std::io::Error::new(
                source.kind(),
                format!("{}: {source}", path.display()),
            )),

            CoreError::Serialization { message } => CliError::Serialization { message },

            CoreError::Metrics { message } => CliError::Metrics { message },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::Cancelled => CliError::Cancelled,
        }
    }
}
