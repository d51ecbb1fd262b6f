// MQTT broker sessions on top of rumqttc.
//
// One `AsyncClient` + `EventLoop` pair per device. `connect` drives the
// event loop until CONNACK, then hands it to a pump task that forwards
// incoming PUBLISH packets into the connection's inbound channel. When the
// pump stops (network error, broker close), the inbound sender is dropped
// and the session flips to disconnected.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future::BoxFuture;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Packet, QoS,
};
use secrecy::ExposeSecret;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::{Broker, BrokerSession, ConnectParams, Connection, InboundMessage};
use crate::error::Error;

const REQUEST_CHANNEL_CAPACITY: usize = 64;
const INBOUND_CHANNEL_CAPACITY: usize = 64;

/// Production [`Broker`] speaking MQTT 3.1.1 (ThingsBoard device API).
#[derive(Debug, Clone, Default)]
pub struct MqttBroker;

impl MqttBroker {
    pub fn new() -> Self {
        Self
    }
}

impl Broker for MqttBroker {
    fn connect(&self, params: ConnectParams) -> BoxFuture<'_, Result<Connection, Error>> {
        Box::pin(async move {
            let mut options = MqttOptions::new(&params.client_id, &params.host, params.port);
            options
                .set_credentials(params.credential.expose_secret(), "")
                .set_keep_alive(params.keep_alive)
                .set_clean_session(true);

            let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);

            debug!(host = %params.host, port = params.port, "MQTT handshake");
            wait_for_connack(&mut eventloop).await?;

            let connected = Arc::new(AtomicBool::new(true));
            let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
            tokio::spawn(pump(eventloop, inbound_tx, Arc::clone(&connected)));

            let session = MqttSession { client, connected };
            Ok(Connection {
                session: Arc::new(session),
                inbound: inbound_rx,
            })
        })
    }
}

/// Poll until the broker accepts or refuses the session.
async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), Error> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return match ack.code {
                    ConnectReturnCode::Success => Ok(()),
                    code => Err(refusal(code)),
                };
            }
            Ok(event) => trace!(?event, "pre-CONNACK event"),
            Err(ConnectionError::ConnectionRefused(code)) => return Err(refusal(code)),
            Err(e) => return Err(Error::BrokerConnect(e.to_string())),
        }
    }
}

fn refusal(code: ConnectReturnCode) -> Error {
    match code {
        ConnectReturnCode::NotAuthorized | ConnectReturnCode::BadUserNamePassword => {
            Error::NotAuthorized {
                reason: format!("{code:?}"),
            }
        }
        other => Error::BrokerConnect(format!("connection refused: {other:?}")),
    }
}

/// Drive the event loop for the lifetime of the connection.
async fn pump(
    mut eventloop: EventLoop,
    inbound: mpsc::Sender<InboundMessage>,
    connected: Arc<AtomicBool>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = InboundMessage {
                    topic: publish.topic,
                    payload: publish.payload,
                };
                if inbound.send(message).await.is_err() {
                    debug!("inbound receiver dropped, stopping MQTT pump");
                    break;
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                debug!("broker sent DISCONNECT");
                break;
            }
            Ok(_) => {}
            Err(ConnectionError::RequestsDone) => {
                debug!("MQTT client dropped, stopping pump");
                break;
            }
            Err(e) => {
                warn!(error = %e, "MQTT connection lost");
                break;
            }
        }
    }
    connected.store(false, Ordering::Release);
}

struct MqttSession {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
}

impl BrokerSession for MqttSession {
    fn subscribe<'a>(&'a self, filter: &'a str) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            if !self.is_connected() {
                return Err(Error::NotConnected);
            }
            self.client
                .subscribe(filter, QoS::AtLeastOnce)
                .await
                .map_err(|e| Error::Subscribe {
                    filter: filter.to_owned(),
                    reason: e.to_string(),
                })
        })
    }

    fn publish<'a>(&'a self, topic: &'a str, payload: Vec<u8>) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            if !self.is_connected() {
                return Err(Error::NotConnected);
            }
            self.client
                .publish(topic, QoS::AtLeastOnce, false, payload)
                .await
                .map_err(|e| Error::Publish {
                    topic: topic.to_owned(),
                    reason: e.to_string(),
                })
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.connected.store(false, Ordering::Release);
        if let Err(e) = self.client.try_disconnect() {
            trace!(error = %e, "disconnect request not queued");
        }
    }
}
