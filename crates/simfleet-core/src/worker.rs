// ── Device worker ──
//
// One task per simulated device. The worker owns the device's state and its
// connection supervisor, and serializes everything that touches either:
// periodic telemetry, RPC application, and reconnects all happen on this task.

use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::Value;
use simfleet_api::Broker;
use simfleet_api::broker::topics;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::FleetConfig;
use crate::directory::Directory;
use crate::metrics::{MetricsRecorder, Stamp};
use crate::model::{DeviceEntry, DeviceId, RpcRequest};
use crate::policy::{self, Family, PolicyMode};
use crate::rpc::{DeviceHandlers, RpcRegistry};
use crate::state::StateStore;
use crate::supervisor::{ConnectionState, ConnectionSupervisor, Inbound, SupervisorConfig};

/// Everything a worker shares with the rest of the fleet.
#[derive(Clone)]
pub struct WorkerContext {
    pub broker: Arc<dyn Broker>,
    pub directory: Arc<dyn Directory>,
    pub metrics: Option<Arc<MetricsRecorder>>,
    pub registry: Arc<RpcRegistry>,
    pub config: FleetConfig,
}

impl std::fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerContext")
            .field("metrics", &self.metrics.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WorkerContext {
    pub fn new(broker: Arc<dyn Broker>, directory: Arc<dyn Directory>, config: FleetConfig) -> Self {
        Self {
            broker,
            directory,
            metrics: None,
            registry: Arc::new(RpcRegistry::default()),
            config,
        }
    }
}

pub struct DeviceWorker {
    supervisor: ConnectionSupervisor,
    inbound: mpsc::Receiver<Inbound>,
    store: StateStore,
    handlers: DeviceHandlers,
    metrics: Option<Arc<MetricsRecorder>>,
    heartbeat: Duration,
    telemetry_mode: PolicyMode,
    rng: StdRng,
    cancel: CancellationToken,
}

impl std::fmt::Debug for DeviceWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceWorker")
            .field("supervisor", &self.supervisor)
            .field("telemetry_mode", &self.telemetry_mode)
            .finish_non_exhaustive()
    }
}

impl DeviceWorker {
    pub fn new(entry: DeviceEntry, ctx: &WorkerContext, cancel: CancellationToken) -> Self {
        let DeviceEntry { identity, state } = entry;
        let family = Family::from_tag(&identity.type_tag);
        if family.is_none() {
            info!(device_id = %identity.id, type_tag = %identity.type_tag, "unrecognized device type, telemetry will echo state");
        }

        let store = StateStore::new(
            identity.id,
            state,
            ctx.config.state_mode,
            Arc::clone(&ctx.directory),
        );
        let (supervisor, inbound) = ConnectionSupervisor::new(
            identity,
            Arc::clone(&ctx.broker),
            Arc::clone(&ctx.directory),
            SupervisorConfig::from(&ctx.config),
            cancel.clone(),
        );
        let telemetry_mode = if ctx.config.randomize {
            PolicyMode::Randomize
        } else {
            PolicyMode::Steady
        };

        Self {
            supervisor,
            inbound,
            store,
            handlers: ctx.registry.resolve(family),
            metrics: if ctx.config.metrics { ctx.metrics.clone() } else { None },
            heartbeat: ctx.config.heartbeat,
            telemetry_mode,
            rng: StdRng::from_entropy(),
            cancel,
        }
    }

    /// Replace the random source (seeded runs).
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn id(&self) -> DeviceId {
        self.supervisor.identity().id
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.supervisor.connection_state()
    }

    /// Run until cancelled. Returns the device's final identity and state.
    pub async fn run(mut self) -> DeviceEntry {
        let initial = self.store.get().await;
        if self.supervisor.connect(&initial).await.is_err() {
            return self.finish();
        }

        let mut ticker = tokio::time::interval(self.heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                inbound = self.inbound.recv() => match inbound {
                    Some(Inbound::Request(request)) => self.apply_rpc(request).await,
                    Some(Inbound::Disconnected) => {
                        let state = self.store.snapshot().clone();
                        if self.supervisor.handle_disconnect(&state).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => self.send_telemetry().await,
            }
        }

        self.finish()
    }

    fn finish(self) -> DeviceEntry {
        let Self {
            mut supervisor,
            store,
            ..
        } = self;
        supervisor.shutdown();
        debug!(device_id = %supervisor.identity().id, "worker stopped");
        DeviceEntry {
            identity: supervisor.identity().clone(),
            state: store.into_state(),
        }
    }

    async fn send_telemetry(&mut self) {
        let current = self.store.get().await;
        let telemetry = policy::generate(
            self.handlers.family(),
            &current,
            self.telemetry_mode,
            &mut self.rng,
        );
        if telemetry.next_state != current {
            self.store.set(telemetry.next_state).await;
        }

        let payload = Value::Object(telemetry.payload);
        let id = self.id();
        if let Err(e) = self
            .supervisor
            .publish(topics::TELEMETRY, &payload, self.store.snapshot())
            .await
        {
            warn!(device_id = %id, error = %e, "telemetry not sent");
            return;
        }
        debug!(device_id = %id, %payload, "telemetry sent");

        if let (Some(metrics), Value::Object(fields)) = (&self.metrics, &payload) {
            metrics.record(self.supervisor.identity(), fields, Stamp::Sent);
        }
    }

    async fn apply_rpc(&mut self, request: RpcRequest) {
        let id = self.id();
        let current = self.store.get().await;

        let Some(outcome) = self.handlers.dispatch(&request, &current, &mut self.rng) else {
            warn!(
                device_id = %id,
                method = %request.method,
                type_tag = %self.supervisor.identity().type_tag,
                "unsupported device type for RPC"
            );
            return;
        };

        if let Some(mutation) = outcome.mutation {
            self.store.set(mutation.next_state).await;
            info!(device_id = %id, method = %request.method, "RPC applied");

            let telemetry = Value::Object(mutation.telemetry);
            if let Err(e) = self
                .supervisor
                .publish(topics::TELEMETRY, &telemetry, self.store.snapshot())
                .await
            {
                warn!(device_id = %id, error = %e, "post-RPC telemetry not sent");
            }

            if let (Some(metrics), Value::Object(fields)) = (&self.metrics, &telemetry) {
                metrics.record(self.supervisor.identity(), fields, Stamp::Received);
            }
        } else {
            info!(device_id = %id, method = %request.method, response = %outcome.response, "RPC rejected");
        }

        let topic = topics::rpc_response(&request.correlation_id);
        if let Err(e) = self
            .supervisor
            .publish(&topic, &outcome.response, self.store.snapshot())
            .await
        {
            warn!(device_id = %id, error = %e, "RPC response not sent");
        }
    }
}
