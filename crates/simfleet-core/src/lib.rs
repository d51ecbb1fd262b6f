//! Device simulation engine between `simfleet-api` and the `simfleet` CLI.
//!
//! - **[`Fleet`]**: enumerates the directory, runs one [`DeviceWorker`] per
//!   device, discovers new devices periodically, and flushes state on stop.
//! - **[`ConnectionSupervisor`]**: keeps one broker session per device alive
//!   with backoff, reconciles rejected credentials against the directory,
//!   and owns the device's single inbound drain task.
//! - **[`policy`]**: telemetry generation per device family.
//! - **[`rpc`]**: method registry and pure request dispatch.
//! - **[`StateStore`]**: per-device state, in memory or written through to
//!   the [`Directory`].

pub mod config;
pub mod directory;
pub mod error;
pub mod fleet;
pub mod metrics;
pub mod model;
pub mod policy;
pub mod rpc;
pub mod state;
pub mod supervisor;
pub mod worker;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{BrokerEndpoint, DeviceSelector, FleetConfig, StateMode};
pub use directory::{Directory, HttpDirectory, LocalDirectory};
pub use error::CoreError;
pub use fleet::{Fleet, FleetReport};
pub use metrics::MetricsRecorder;
pub use model::{DeviceEntry, DeviceId, DeviceIdentity, DeviceState, RpcRequest, TypeTag};
pub use policy::{Family, PolicyMode};
pub use rpc::RpcRegistry;
pub use state::StateStore;
pub use supervisor::{ConnectionState, ConnectionSupervisor, Inbound};
pub use worker::{DeviceWorker, WorkerContext};
