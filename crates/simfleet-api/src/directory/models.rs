// Wire types for the device directory REST API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A device record as stored by the directory.
///
/// `token` is empty until the device-management platform has provisioned
/// the device; `external_id` likewise stays `null` until then.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Directory primary key.
    pub id: u64,

    /// Human-readable device name, e.g. `"House 1 Living Room Light"`.
    #[serde(rename = "device_id")]
    pub name: String,

    /// Identifier assigned by the device-management platform.
    #[serde(default, alias = "thingsboard_id")]
    pub external_id: Option<String>,

    /// Broker access token.
    #[serde(default)]
    pub token: String,

    /// Device type name as registered, e.g. `"Lightbulb"`.
    pub device_type: String,

    /// Unit / system label, for display only.
    #[serde(default)]
    pub group: Option<String>,

    /// Last persisted sensor/actuator readings.
    #[serde(default)]
    pub state: Map<String, Value>,
}

/// Filter for `GET /api/devices`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceQuery {
    pub ids: Vec<u64>,
    pub group: Option<String>,
    pub device_type: Option<String>,
}

impl DeviceQuery {
    pub(crate) fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if !self.ids.is_empty() {
            let ids = self
                .ids
                .iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join(",");
            pairs.push(("ids", ids));
        }
        if let Some(ref group) = self.group {
            pairs.push(("group", group.clone()));
        }
        if let Some(ref device_type) = self.device_type {
            pairs.push(("type", device_type.clone()));
        }
        pairs
    }
}

/// Body of `PUT /api/devices/{id}/state`.
#[derive(Debug, Serialize)]
pub(crate) struct StateUpdate<'a> {
    pub state: &'a Map<String, Value>,
}
