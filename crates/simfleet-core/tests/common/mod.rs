// Shared test doubles: a scripted in-process broker and a provisioning directory.
#![allow(dead_code, clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use simfleet_api::{
    Broker, BrokerSession, ConnectParams, Connection, DeviceRecord, Error, InboundMessage,
};
use simfleet_core::{
    CoreError, DeviceEntry, DeviceId, DeviceSelector, DeviceState, Directory, LocalDirectory,
};
use tokio::sync::mpsc;

// ── Scripted broker ─────────────────────────────────────────────────

#[derive(Default)]
struct Script {
    /// Transient refusals still to hand out.
    reject_remaining: usize,
    denied_tokens: HashSet<String>,
    attempts: Vec<String>,
    sessions: HashMap<String, Arc<ScriptedSession>>,
    links: HashMap<String, mpsc::Sender<InboundMessage>>,
    connects: HashMap<String, usize>,
}

/// In-process [`Broker`] whose behavior tests script up front.
#[derive(Clone, Default)]
pub struct ScriptedBroker {
    script: Arc<Mutex<Script>>,
    published: Arc<Mutex<Vec<Published>>>,
}

#[derive(Debug, Clone)]
pub struct Published {
    pub token: String,
    pub topic: String,
    pub payload: Value,
}

impl ScriptedBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse the next `n` connect attempts with a transport error.
    pub fn reject_first(self, n: usize) -> Self {
        self.script.lock().unwrap().reject_remaining = n;
        self
    }

    /// Answer connects with this token as "not authorized".
    pub fn deny_token(self, token: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .denied_tokens
            .insert(token.to_owned());
        self
    }

    pub fn attempts(&self) -> Vec<String> {
        self.script.lock().unwrap().attempts.clone()
    }

    /// Successful connects for `token`.
    pub fn connects(&self, token: &str) -> usize {
        self.script
            .lock()
            .unwrap()
            .connects
            .get(token)
            .copied()
            .unwrap_or(0)
    }

    pub fn is_subscribed(&self, token: &str) -> bool {
        self.script
            .lock()
            .unwrap()
            .sessions
            .get(token)
            .is_some_and(|s| s.connected.load(Ordering::SeqCst) && s.subscribed.load(Ordering::SeqCst))
    }

    pub fn published(&self, token: &str) -> Vec<Published> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.token == token)
            .cloned()
            .collect()
    }

    pub fn published_on(&self, token: &str, topic: &str) -> Vec<Value> {
        self.published(token)
            .into_iter()
            .filter(|p| p.topic == topic)
            .map(|p| p.payload)
            .collect()
    }

    /// Deliver a server-side RPC to the device's current connection.
    pub async fn send_rpc(&self, token: &str, request_id: &str, method: &str, params: Value) {
        let payload = json!({ "method": method, "params": params });
        self.send_raw(token, request_id, payload.to_string().into_bytes())
            .await;
    }

    pub async fn send_raw(&self, token: &str, request_id: &str, payload: Vec<u8>) {
        let link = self.script.lock().unwrap().links.get(token).cloned().unwrap();
        link.send(InboundMessage {
            topic: format!("v1/devices/me/rpc/request/{request_id}"),
            payload: Bytes::from(payload),
        })
        .await
        .unwrap();
    }

    /// Kill the device's connection from the broker side.
    pub fn drop_connection(&self, token: &str) {
        let mut script = self.script.lock().unwrap();
        if let Some(session) = script.sessions.get(token) {
            session.connected.store(false, Ordering::SeqCst);
        }
        script.links.remove(token);
    }
}

impl Broker for ScriptedBroker {
    fn connect(&self, params: ConnectParams) -> BoxFuture<'_, Result<Connection, Error>> {
        Box::pin(async move {
            let token = params.credential.expose_secret().to_owned();
            assert_eq!(params.client_id, token, "client id must be the access token");

            let mut script = self.script.lock().unwrap();
            script.attempts.push(token.clone());

            if script.reject_remaining > 0 {
                script.reject_remaining -= 1;
                return Err(Error::BrokerConnect("connection refused".into()));
            }
            if script.denied_tokens.contains(&token) {
                return Err(Error::NotAuthorized {
                    reason: "NotAuthorized".into(),
                });
            }

            let (tx, rx) = mpsc::channel(16);
            let session = Arc::new(ScriptedSession {
                token: token.clone(),
                connected: AtomicBool::new(true),
                subscribed: AtomicBool::new(false),
                published: Arc::clone(&self.published),
            });
            script.sessions.insert(token.clone(), Arc::clone(&session));
            script.links.insert(token.clone(), tx);
            *script.connects.entry(token).or_default() += 1;

            Ok(Connection {
                session,
                inbound: rx,
            })
        })
    }
}

struct ScriptedSession {
    token: String,
    connected: AtomicBool,
    subscribed: AtomicBool,
    published: Arc<Mutex<Vec<Published>>>,
}

impl BrokerSession for ScriptedSession {
    fn subscribe<'a>(&'a self, filter: &'a str) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            assert_eq!(filter, "v1/devices/me/rpc/request/+");
            if !self.is_connected() {
                return Err(Error::NotConnected);
            }
            self.subscribed.store(true, Ordering::SeqCst);
            Ok(())
        })
    }

    fn publish<'a>(&'a self, topic: &'a str, payload: Vec<u8>) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            if !self.is_connected() {
                return Err(Error::NotConnected);
            }
            self.published.lock().unwrap().push(Published {
                token: self.token.clone(),
                topic: topic.to_owned(),
                payload: serde_json::from_slice(&payload).unwrap(),
            });
            Ok(())
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

// ── Provisioning directory ──────────────────────────────────────────

/// Local directory that issues a fixed credential on every full save, the
/// way the live directory re-provisions devices.
pub struct ProvisioningDirectory {
    pub inner: LocalDirectory,
    issued: String,
    pub saves: AtomicUsize,
}

impl ProvisioningDirectory {
    pub fn new(entries: impl IntoIterator<Item = DeviceEntry>, issued: &str) -> Self {
        Self {
            inner: LocalDirectory::in_memory(entries),
            issued: issued.to_owned(),
            saves: AtomicUsize::new(0),
        }
    }
}

impl Directory for ProvisioningDirectory {
    fn list<'a>(
        &'a self,
        selector: &'a DeviceSelector,
    ) -> BoxFuture<'a, Result<Vec<DeviceEntry>, CoreError>> {
        self.inner.list(selector)
    }

    fn get(&self, id: DeviceId) -> BoxFuture<'_, Result<DeviceEntry, CoreError>> {
        self.inner.get(id)
    }

    fn save<'a>(&'a self, entry: &'a DeviceEntry) -> BoxFuture<'a, Result<(), CoreError>> {
        Box::pin(async move {
            self.saves.fetch_add(1, Ordering::SeqCst);
            let mut provisioned = entry.clone();
            provisioned.identity.credential = SecretString::from(self.issued.clone());
            self.inner.save(&provisioned).await
        })
    }

    fn save_state<'a>(
        &'a self,
        id: DeviceId,
        state: &'a DeviceState,
    ) -> BoxFuture<'a, Result<(), CoreError>> {
        self.inner.save_state(id, state)
    }

    fn bulk_save<'a>(&'a self, entries: &'a [DeviceEntry]) -> BoxFuture<'a, Result<(), CoreError>> {
        self.inner.bulk_save(entries)
    }
}

// ── Fixtures ────────────────────────────────────────────────────────

pub fn device(id: u64, device_type: &str, token: &str, state: Value) -> DeviceEntry {
    let record: DeviceRecord = serde_json::from_value(json!({
        "id": id,
        "device_id": format!("Device {id}"),
        "token": token,
        "device_type": device_type,
        "state": state,
    }))
    .unwrap();
    DeviceEntry::from(record)
}

pub fn state(value: Value) -> DeviceState {
    value.as_object().cloned().unwrap()
}

/// Poll `check` on virtual time until it holds (10s budget).
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
