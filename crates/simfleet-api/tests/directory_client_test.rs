#![allow(clippy::unwrap_used)]
// Integration tests for `DirectoryClient` and `InfluxSink` using wiremock.

use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use simfleet_api::{DeviceQuery, DeviceRecord, DirectoryClient, Error, InfluxSink, MetricRecord, MetricsSink};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, DirectoryClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let client = DirectoryClient::with_client(reqwest::Client::new(), base_url);
    (server, client)
}

fn light_json() -> serde_json::Value {
    json!({
        "id": 7,
        "device_id": "House 1 Living Room Light",
        "thingsboard_id": "b6a1c2d0-0000-0000-0000-000000000001",
        "token": "A1_TEST_TOKEN",
        "device_type": "Lightbulb",
        "group": "House 1",
        "state": { "status": true }
    })
}

// ── Reads ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_list_devices_with_filters() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .and(query_param("ids", "7,9"))
        .and(query_param("type", "lightbulb"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([light_json()])))
        .mount(&server)
        .await;

    let query = DeviceQuery {
        ids: vec![7, 9],
        group: None,
        device_type: Some("lightbulb".into()),
    };
    let devices = client.list_devices(&query).await.unwrap();

    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].id, 7);
    assert_eq!(devices[0].name, "House 1 Living Room Light");
    assert_eq!(
        devices[0].external_id.as_deref(),
        Some("b6a1c2d0-0000-0000-0000-000000000001")
    );
    assert_eq!(devices[0].state["status"], json!(true));
}

#[tokio::test]
async fn test_get_device_defaults_missing_fields() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/devices/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 3,
            "device_id": "Pump 3",
            "device_type": "Pump"
        })))
        .mount(&server)
        .await;

    let device = client.get_device(3).await.unwrap();
    assert!(device.token.is_empty());
    assert!(device.external_id.is_none());
    assert!(device.state.is_empty());
}

#[tokio::test]
async fn test_get_device_not_found() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/devices/404"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = client.get_device(404).await;
    assert!(
        matches!(result, Err(ref e) if e.is_not_found()),
        "expected not-found, got: {result:?}"
    );
}

#[tokio::test]
async fn test_unauthorized_maps_to_authentication() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = client.list_devices(&DeviceQuery::default()).await;
    assert!(
        matches!(result, Err(Error::Authentication { .. })),
        "expected Authentication error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_malformed_body_is_deserialization_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/devices/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let result = client.get_device(1).await;
    assert!(matches!(result, Err(Error::Deserialization { .. })));
}

// ── Writes ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_save_device_puts_full_record() {
    let (server, client) = setup().await;
    let record: DeviceRecord = serde_json::from_value(light_json()).unwrap();

    Mock::given(method("PUT"))
        .and(path("/api/devices/7"))
        .and(body_json(serde_json::to_value(&record).unwrap()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client.save_device(&record).await.unwrap();
}

#[tokio::test]
async fn test_save_state_sends_state_only() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path("/api/devices/7/state"))
        .and(body_json(json!({ "state": { "status": false } })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let state = json!({ "status": false }).as_object().cloned().unwrap();
    client.save_state(7, &state).await.unwrap();
}

#[tokio::test]
async fn test_bulk_save_server_error() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/devices/bulk"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let record: DeviceRecord = serde_json::from_value(light_json()).unwrap();
    let err = client.bulk_save(&[record]).await.unwrap_err();

    assert!(err.is_transient());
    assert!(
        matches!(err, Error::Directory { status: 503, ref message } if message == "maintenance"),
        "unexpected error: {err:?}"
    );
}

// ── Metrics sink ────────────────────────────────────────────────────

#[tokio::test]
async fn test_influx_write_posts_line_protocol() {
    let server = MockServer::start().await;
    let base = Url::parse(&server.uri()).unwrap();
    let sink = InfluxSink::with_client(reqwest::Client::new(), &base, "acme", "iot_data").unwrap();

    Mock::given(method("POST"))
        .and(path("/api/v2/write"))
        .and(query_param("org", "acme"))
        .and(query_param("bucket", "iot_data"))
        .and(query_param("precision", "ms"))
        .and(header("content-type", "text/plain; charset=utf-8"))
        .and(body_string("device_data,sensor=Pump\\ 3 status=0 42"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let record = MetricRecord::new("device_data", 42)
        .tag("sensor", "Pump 3")
        .field("status", 0.0);
    sink.write(record).await.unwrap();
}

#[tokio::test]
async fn test_influx_rejection_surfaces_status() {
    let server = MockServer::start().await;
    let base = Url::parse(&server.uri()).unwrap();
    let sink = InfluxSink::with_client(reqwest::Client::new(), &base, "acme", "iot_data").unwrap();

    Mock::given(method("POST"))
        .and(path("/api/v2/write"))
        .respond_with(ResponseTemplate::new(400).set_body_string("unable to parse"))
        .mount(&server)
        .await;

    let err = sink
        .write(MetricRecord::new("device_data", 1).field("x", 1.0))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Metrics { status: 400, .. }));
}
