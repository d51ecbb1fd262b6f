//! Broker session abstraction.
//!
//! A [`Broker`] opens one [`Connection`] per device: a shareable
//! [`BrokerSession`] for publish/subscribe plus the receiving half of the
//! inbound message stream. When the underlying event loop dies the stream
//! ends, which is how callers learn the connection dropped.
//!
//! [`MqttBroker`] is the production implementation on top of `rumqttc`.

mod mqtt;
pub mod topics;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use secrecy::SecretString;
use tokio::sync::mpsc;

use crate::error::Error;

pub use mqtt::MqttBroker;

/// Everything needed for one connect attempt.
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    /// MQTT client identifier.
    pub client_id: String,
    /// Device access token, sent as the MQTT username.
    pub credential: SecretString,
    pub keep_alive: Duration,
}

/// A message delivered on a subscribed topic.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

/// A live broker connection for a single device.
pub struct Connection {
    pub session: Arc<dyn BrokerSession>,
    /// Closed by the broker side once the connection is gone.
    pub inbound: mpsc::Receiver<InboundMessage>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("connected", &self.session.is_connected())
            .finish_non_exhaustive()
    }
}

/// Opens device connections.
pub trait Broker: Send + Sync {
    /// Perform the transport + protocol handshake.
    ///
    /// Resolves once the broker has acknowledged the session. An explicit
    /// authorization refusal must surface as [`Error::NotAuthorized`].
    fn connect(&self, params: ConnectParams) -> BoxFuture<'_, Result<Connection, Error>>;
}

/// Publish/subscribe handle for one connected device.
pub trait BrokerSession: Send + Sync {
    fn subscribe<'a>(&'a self, filter: &'a str) -> BoxFuture<'a, Result<(), Error>>;

    /// Fails fast with [`Error::NotConnected`] once the session is down.
    fn publish<'a>(&'a self, topic: &'a str, payload: Vec<u8>) -> BoxFuture<'a, Result<(), Error>>;

    fn is_connected(&self) -> bool;

    /// Best-effort graceful disconnect.
    fn close(&self) {}
}
