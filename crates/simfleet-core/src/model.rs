// ── Domain model ──
//
// Canonical device types shared by every core component. Wire records from
// the directory convert into these at the boundary and back again on save.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use simfleet_api::DeviceRecord;

/// Last known readings of one device. Insertion-ordered.
pub type DeviceState = Map<String, Value>;

/// Directory primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub u64);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for DeviceId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Device type name, normalized to lower case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TypeTag(String);

impl TypeTag {
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TypeTag {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

impl From<TypeTag> for String {
    fn from(tag: TypeTag) -> Self {
        tag.0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who a simulated device is, as far as the broker and directory care.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    pub id: DeviceId,
    /// Display name, used as the metrics `sensor` tag.
    pub name: String,
    /// Platform-assigned id, `None` until provisioned.
    pub external_id: Option<String>,
    /// Broker access token. May be empty until provisioned.
    pub credential: SecretString,
    pub type_tag: TypeTag,
    /// Type name exactly as registered; written back on save.
    pub type_name: String,
    pub group: Option<String>,
}

impl DeviceIdentity {
    pub fn has_credential(&self) -> bool {
        !self.credential.expose_secret().is_empty()
    }
}

/// A directory entry: identity plus persisted state.
#[derive(Debug, Clone)]
pub struct DeviceEntry {
    pub identity: DeviceIdentity,
    pub state: DeviceState,
}

impl From<DeviceRecord> for DeviceEntry {
    fn from(record: DeviceRecord) -> Self {
        Self {
            identity: DeviceIdentity {
                id: DeviceId(record.id),
                name: record.name,
                external_id: record.external_id,
                credential: SecretString::from(record.token),
                type_tag: TypeTag::new(&record.device_type),
                type_name: record.device_type,
                group: record.group,
            },
            state: record.state,
        }
    }
}

impl From<&DeviceEntry> for DeviceRecord {
    fn from(entry: &DeviceEntry) -> Self {
        let identity = &entry.identity;
        Self {
            id: identity.id.0,
            name: identity.name.clone(),
            external_id: identity.external_id.clone(),
            token: identity.credential.expose_secret().to_owned(),
            device_type: identity.type_name.clone(),
            group: identity.group.clone(),
            state: entry.state.clone(),
        }
    }
}

/// A server-side RPC call addressed to one device.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub method: String,
    pub params: Value,
    /// Last segment of the request topic; the response topic reuses it.
    pub correlation_id: String,
}

/// Wire shape of an RPC request payload.
#[derive(Debug, Deserialize)]
pub(crate) struct RpcPayload {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}
