// ThingsBoard device API topics.

/// Unsolicited telemetry, one fixed topic per device session.
pub const TELEMETRY: &str = "v1/devices/me/telemetry";

/// Subscription filter for server-side RPC requests.
pub const RPC_REQUEST_FILTER: &str = "v1/devices/me/rpc/request/+";

const RPC_REQUEST_PREFIX: &str = "v1/devices/me/rpc/request/";
const RPC_RESPONSE_PREFIX: &str = "v1/devices/me/rpc/response/";

/// Extract the request id from `v1/devices/me/rpc/request/{id}`.
pub fn correlation_id(topic: &str) -> Option<&str> {
    topic
        .strip_prefix(RPC_REQUEST_PREFIX)
        .filter(|id| !id.is_empty() && !id.contains('/'))
}

/// Response topic paired with a request id.
pub fn rpc_response(correlation_id: &str) -> String {
    format!("{RPC_RESPONSE_PREFIX}{correlation_id}")
}
