// ── Connection supervisor ──
//
// Keeps one broker connection alive for one device. Owned by the device
// worker; every method takes `&mut self`, so connection attempts for a
// device are never concurrent. Inbound traffic flows through a single drain
// task per device that outlives individual connections: each new connection
// hands its inbound receiver to the running drain task instead of spawning
// another one.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use simfleet_api::broker::topics;
use simfleet_api::{BackoffPolicy, Broker, BrokerSession, ConnectParams, Connection, InboundMessage};
use secrecy::ExposeSecret;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{BrokerEndpoint, FleetConfig};
use crate::directory::Directory;
use crate::error::CoreError;
use crate::model::{DeviceEntry, DeviceId, DeviceIdentity, DeviceState, RpcPayload, RpcRequest};

const INBOUND_CHANNEL_SIZE: usize = 64;
const HANDOFF_CHANNEL_SIZE: usize = 1;

// ── ConnectionState ──────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting to retry after a transport failure.
    Reconnecting { attempt: u32 },
    /// The broker refused the credential; reconciling with the directory.
    AuthRecovery { attempt: u32 },
    /// Cancelled. Terminal.
    Stopped,
}

/// What the drain task forwards to the worker.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Request(RpcRequest),
    /// The current connection's inbound stream closed.
    Disconnected,
}

/// Connection tuning, usually taken from [`FleetConfig`].
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub endpoint: BrokerEndpoint,
    pub connect_timeout: Duration,
    pub backoff: BackoffPolicy,
}

impl From<&FleetConfig> for SupervisorConfig {
    fn from(config: &FleetConfig) -> Self {
        Self {
            endpoint: config.broker.clone(),
            connect_timeout: config.connect_timeout,
            backoff: config.backoff,
        }
    }
}

// ── ConnectionSupervisor ─────────────────────────────────────────

pub struct ConnectionSupervisor {
    identity: DeviceIdentity,
    broker: Arc<dyn Broker>,
    directory: Arc<dyn Directory>,
    config: SupervisorConfig,
    session: Option<Arc<dyn BrokerSession>>,
    state: watch::Sender<ConnectionState>,
    inbound_tx: mpsc::Sender<Inbound>,
    /// Feeds fresh inbound receivers to the drain task. `None` until the
    /// drain task is spawned, and again after shutdown.
    handoff: Option<mpsc::Sender<mpsc::Receiver<InboundMessage>>>,
    drain_spawns: usize,
    connections: usize,
    /// Set when the broker refused the current credential; cleared once the
    /// directory hands out a different one.
    credential_rejected: bool,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ConnectionSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("device_id", &self.identity.id)
            .field("state", &*self.state.borrow())
            .field("connections", &self.connections)
            .finish_non_exhaustive()
    }
}

impl ConnectionSupervisor {
    /// Create a supervisor and the receiver its drain task feeds.
    pub fn new(
        identity: DeviceIdentity,
        broker: Arc<dyn Broker>,
        directory: Arc<dyn Directory>,
        config: SupervisorConfig,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<Inbound>) {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_SIZE);
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let supervisor = Self {
            identity,
            broker,
            directory,
            config,
            session: None,
            state,
            inbound_tx,
            handoff: None,
            drain_spawns: 0,
            connections: 0,
            credential_rejected: false,
            cancel,
        };
        (supervisor, inbound_rx)
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Number of drain tasks ever spawned for this device.
    pub fn drain_spawns(&self) -> usize {
        self.drain_spawns
    }

    /// Number of sessions successfully established.
    pub fn connections(&self) -> usize {
        self.connections
    }

    pub fn is_connected(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_connected())
    }

    // ── Connect loop ─────────────────────────────────────────────

    /// Connect, retrying with backoff until a session is up.
    ///
    /// Only cancellation ends the loop early. `state` is what gets saved to
    /// the directory if the credential has to be reconciled.
    pub async fn connect(&mut self, state: &DeviceState) -> Result<(), CoreError> {
        let mut attempt: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(CoreError::Cancelled);
            }

            if self.identity.has_credential() && !self.credential_rejected {
                self.set_state(ConnectionState::Connecting);
                match self.establish().await {
                    Ok(()) => {
                        self.connections += 1;
                        self.set_state(ConnectionState::Connected);
                        info!(device_id = %self.identity.id, attempt, "connected");
                        return Ok(());
                    }
                    Err(e) if e.is_auth_failure() => {
                        warn!(device_id = %self.identity.id, attempt, error = %e, "credential rejected");
                        self.credential_rejected = true;
                        self.set_state(ConnectionState::AuthRecovery { attempt });
                        self.reconcile(state).await;
                    }
                    Err(e) => {
                        warn!(device_id = %self.identity.id, attempt, error = %e, "connect failed");
                        self.set_state(ConnectionState::Reconnecting { attempt });
                    }
                }
            } else {
                info!(device_id = %self.identity.id, "waiting for a usable credential, reconciling");
                self.set_state(ConnectionState::AuthRecovery { attempt });
                self.reconcile(state).await;
            }

            self.pause(attempt).await?;
            attempt = attempt.saturating_add(1);
        }
    }

    /// Drop the current session and connect again.
    pub async fn reconnect(&mut self, state: &DeviceState) -> Result<(), CoreError> {
        if let Some(session) = self.session.take() {
            session.close();
        }
        self.set_state(ConnectionState::Reconnecting { attempt: 0 });
        self.connect(state).await
    }

    /// React to the drain task reporting a closed inbound stream.
    ///
    /// Ignored when the current session is still up (the report belongs to a
    /// connection that was already replaced).
    pub async fn handle_disconnect(&mut self, state: &DeviceState) -> Result<(), CoreError> {
        if self.is_connected() {
            debug!(device_id = %self.identity.id, "stale disconnect notice ignored");
            return Ok(());
        }
        info!(device_id = %self.identity.id, "connection lost, reconnecting");
        self.reconnect(state).await
    }

    /// Publish JSON on `topic`. On failure, reconnect once and retry once.
    pub async fn publish(
        &mut self,
        topic: &str,
        payload: &Value,
        state: &DeviceState,
    ) -> Result<(), CoreError> {
        let bytes = serde_json::to_vec(payload)?;

        match self.try_publish(topic, bytes.clone()).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(device_id = %self.identity.id, topic, error = %e, "publish failed, reconnecting");
            }
        }

        self.reconnect(state).await?;
        self.try_publish(topic, bytes).await
    }

    /// Close the session and stop the drain task.
    pub fn shutdown(&mut self) {
        if let Some(session) = self.session.take() {
            session.close();
        }
        self.handoff = None;
        self.set_state(ConnectionState::Stopped);
    }

    // ── Helpers ──────────────────────────────────────────────────

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    async fn establish(&mut self) -> Result<(), CoreError> {
        let params = ConnectParams {
            host: self.config.endpoint.host.clone(),
            port: self.config.endpoint.port,
            client_id: self.identity.credential.expose_secret().to_owned(),
            credential: self.identity.credential.clone(),
            keep_alive: self.config.endpoint.keep_alive,
        };

        let timeout = self.config.connect_timeout;
        let Connection { session, inbound } =
            match tokio::time::timeout(timeout, self.broker.connect(params)).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(CoreError::Timeout {
                        timeout_secs: timeout.as_secs(),
                    });
                }
            };

        if let Err(e) = session.subscribe(topics::RPC_REQUEST_FILTER).await {
            session.close();
            return Err(e.into());
        }

        if let Err(e) = self.hand_off(inbound).await {
            session.close();
            return Err(e);
        }
        self.session = Some(session);
        Ok(())
    }

    /// Give the drain task the new inbound stream, spawning it on first use.
    async fn hand_off(&mut self, inbound: mpsc::Receiver<InboundMessage>) -> Result<(), CoreError> {
        let handoff = match &self.handoff {
            Some(tx) => tx.clone(),
            None => {
                let (tx, rx) = mpsc::channel(HANDOFF_CHANNEL_SIZE);
                tokio::spawn(drain_task(
                    self.identity.id,
                    rx,
                    self.inbound_tx.clone(),
                    self.cancel.clone(),
                ));
                self.drain_spawns += 1;
                debug!(device_id = %self.identity.id, "drain task started");
                self.handoff = Some(tx.clone());
                tx
            }
        };

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(CoreError::Cancelled),
            sent = handoff.send(inbound) => sent.map_err(|_| CoreError::Cancelled),
        }
    }

    async fn try_publish(&self, topic: &str, bytes: Vec<u8>) -> Result<(), CoreError> {
        let session = self.session.as_ref().ok_or(CoreError::NotConnected)?;
        session.publish(topic, bytes).await?;
        Ok(())
    }

    /// Save the record (which triggers re-provisioning upstream), then re-read
    /// it. A non-empty credential replaces the cached identity; one equal to a
    /// credential the broker already refused does not.
    async fn reconcile(&mut self, state: &DeviceState) {
        let id = self.identity.id;
        let entry = DeviceEntry {
            identity: self.identity.clone(),
            state: state.clone(),
        };

        if let Err(e) = self.directory.save(&entry).await {
            warn!(device_id = %id, error = %e, "directory save during reconciliation failed");
        }

        match self.directory.get(id).await {
            Ok(fresh)
                if self.credential_rejected
                    && fresh.identity.credential.expose_secret()
                        == self.identity.credential.expose_secret() =>
            {
                info!(device_id = %id, "no new credential");
            }
            Ok(fresh) if fresh.identity.has_credential() => {
                info!(device_id = %id, "credential reconciled");
                self.identity = fresh.identity;
                self.credential_rejected = false;
            }
            Ok(_) => warn!(device_id = %id, "directory has no credential for device"),
            Err(e) => warn!(device_id = %id, error = %e, "directory read during reconciliation failed"),
        }
    }

    async fn pause(&self, attempt: u32) -> Result<(), CoreError> {
        let delay = self.config.backoff.delay(attempt);
        debug!(
            device_id = %self.identity.id,
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "backing off"
        );

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                self.set_state(ConnectionState::Stopped);
                Err(CoreError::Cancelled)
            }
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

// ── Drain task ───────────────────────────────────────────────────

/// Forward parsed RPC requests from whichever connection is current.
///
/// A closed stream is reported once as [`Inbound::Disconnected`]; a new
/// receiver arriving on `handoff` replaces the current one silently.
async fn drain_task(
    device_id: DeviceId,
    mut handoff: mpsc::Receiver<mpsc::Receiver<InboundMessage>>,
    out: mpsc::Sender<Inbound>,
    cancel: CancellationToken,
) {
    let mut current: Option<mpsc::Receiver<InboundMessage>> = None;

    loop {
        let forwarded = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = handoff.recv() => match next {
                Some(rx) => {
                    current = Some(rx);
                    continue;
                }
                None => break,
            },
            message = next_message(&mut current) => match message {
                Some(message) => match parse_request(&message) {
                    Ok(request) => Inbound::Request(request),
                    Err(e) => {
                        warn!(%device_id, topic = %message.topic, error = %e, "dropping malformed RPC");
                        continue;
                    }
                },
                None => {
                    current = None;
                    Inbound::Disconnected
                }
            },
        };

        if out.send(forwarded).await.is_err() {
            break;
        }
    }

    debug!(%device_id, "drain task stopped");
}

async fn next_message(current: &mut Option<mpsc::Receiver<InboundMessage>>) -> Option<InboundMessage> {
    match current {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Decode an RPC request from a message on `v1/devices/me/rpc/request/{id}`.
pub fn parse_request(message: &InboundMessage) -> Result<RpcRequest, CoreError> {
    let correlation_id =
        topics::correlation_id(&message.topic).ok_or_else(|| CoreError::Serialization {
            message: format!("not an RPC request topic: {}", message.topic),
        })?;
    let payload: RpcPayload = serde_json::from_slice(&message.payload)?;

    Ok(RpcRequest {
        method: payload.method,
        params: payload.params,
        correlation_id: correlation_id.to_owned(),
    })
}
