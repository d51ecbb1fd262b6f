// simfleet-api: wire-level clients for the device simulator (MQTT, directory, metrics)

pub mod backoff;
pub mod broker;
pub mod directory;
pub mod error;
pub mod metrics;
pub mod transport;

pub use backoff::BackoffPolicy;
pub use broker::{Broker, BrokerSession, ConnectParams, Connection, InboundMessage, MqttBroker};
pub use directory::{DeviceQuery, DeviceRecord, DirectoryClient};
pub use error::Error;
pub use metrics::{InfluxSink, MetricRecord, MetricsSink};
pub use transport::{TlsMode, TransportConfig};
