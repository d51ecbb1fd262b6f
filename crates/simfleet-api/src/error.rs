use thiserror::Error;

/// Top-level error type for the `simfleet-api` crate.
///
/// Covers every failure mode across the wire surfaces: MQTT broker sessions,
/// the device directory REST API, and the metrics sink. `simfleet-core`
/// maps these into domain errors and decides what is retryable.
#[derive(Debug, Error)]
pub enum Error {
    // ── Broker ──────────────────────────────────────────────────────
    /// TCP or MQTT handshake failure (broker down, DNS failure, reset).
    #[error("Broker connection failed: {0}")]
    BrokerConnect(String),

    /// The broker answered CONNACK with "not authorized" or
    /// "bad username or password".
    #[error("Broker rejected device credentials: {reason}")]
    NotAuthorized { reason: String },

    /// A single connect attempt exceeded its deadline.
    #[error("Broker connect timed out after {timeout_secs}s")]
    ConnectTimeout { timeout_secs: u64 },

    /// Publish or subscribe issued on a session whose event loop has stopped.
    #[error("Not connected to broker")]
    NotConnected,

    #[error("Publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("Subscribe to {filter} failed: {reason}")]
    Subscribe { filter: String, reason: String },

    // ── HTTP transport ──────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS or HTTP client construction error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Directory ───────────────────────────────────────────────────
    /// The directory rejected our API token.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Any other non-success answer from the directory.
    #[error("Directory API error (HTTP {status}): {message}")]
    Directory { status: u16, message: String },

    // ── Metrics ─────────────────────────────────────────────────────
    /// The metrics sink refused a write.
    #[error("Metrics write rejected (HTTP {status}): {message}")]
    Metrics { status: u16, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if re-provisioning credentials might resolve this error.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::NotAuthorized { .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::BrokerConnect(_)
            | Self::ConnectTimeout { .. }
            | Self::NotConnected
            | Self::Publish { .. }
            | Self::Subscribe { .. } => true,
            Self::Directory { status, .. } | Self::Metrics { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            _ => false,
        }
    }
}
