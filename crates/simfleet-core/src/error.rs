// ── Core error types ──
//
// Domain errors from simfleet-core. Wire-level failures from simfleet-api
// are translated through `From<simfleet_api::Error>` so workers and the
// scheduler reason about what happened, not which transport said so.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::DeviceId;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to broker: {reason}")]
    ConnectionFailed { reason: String },

    /// The broker refused the device credential.
    #[error("Broker rejected credentials: {reason}")]
    NotAuthorized { reason: String },

    #[error("Broker connect timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Not connected to broker")]
    NotConnected,

    #[error("Broker operation failed: {message}")]
    Broker { message: String },

    // ── Directory errors ─────────────────────────────────────────────
    #[error("Device not found: {id}")]
    DeviceNotFound { id: DeviceId },

    #[error("Directory authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Directory error: {message}")]
    Directory {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Local storage errors ─────────────────────────────────────────
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    // ── Metrics errors ───────────────────────────────────────────────
    #[error("Metrics write failed: {message}")]
    Metrics { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Lifecycle ────────────────────────────────────────────────────
    /// The operation was interrupted by cancellation.
    #[error("Cancelled")]
    Cancelled,
}

impl CoreError {
    /// Returns `true` if a fresh credential might resolve this error.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::NotAuthorized { .. })
    }

    /// Returns `true` for failures a retry with backoff may clear.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionFailed { .. }
            | Self::Timeout { .. }
            | Self::NotConnected
            | Self::Broker { .. } => true,
            Self::Directory { status, .. } => status.is_none_or(|s| s >= 500),
            _ => false,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<simfleet_api::Error> for CoreError {
    fn from(err: simfleet_api::Error) -> Self {
        use simfleet_api::Error as Api;

        match err {
            Api::BrokerConnect(reason) => CoreError::ConnectionFailed { reason },
            Api::NotAuthorized { reason } => CoreError::NotAuthorized { reason },
            Api::ConnectTimeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            Api::NotConnected => CoreError::NotConnected,
            e @ (Api::Publish { .. } | Api::Subscribe { .. }) => CoreError::Broker {
                message: e.to_string(),
            },
            Api::Transport(ref e) => CoreError::Directory {
                message: e.to_string(),
                status: e.status().map(|s| s.as_u16()),
            },
            Api::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            Api::Tls(msg) => CoreError::Config {
                message: format!("TLS error: {msg}"),
            },
            Api::Authentication { message } => CoreError::AuthenticationFailed { message },
            Api::NotFound { resource } => CoreError::Directory {
                message: format!("not found: {resource}"),
                status: Some(404),
            },
            Api::Directory { status, message } => CoreError::Directory {
                message,
                status: Some(status),
            },
            Api::Metrics { status, message } => CoreError::Metrics {
                message: format!("HTTP {status}: {message}"),
            },
            Api::Deserialization { message, .. } => CoreError::Serialization { message },
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization {
            message: err.to_string(),
        }
    }
}
