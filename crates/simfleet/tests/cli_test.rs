//! Integration tests for the `simfleet` CLI binary.
//!
//! These tests cover argument parsing, help output, configuration commands,
//! and the directory/metrics commands against a local JSON directory and a
//! mock InfluxDB endpoint. None of them need a live broker.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `simfleet` binary with env isolation.
///
/// Clears the `SIMFLEET_*` variables the CLI reads and points config
/// directories at a nonexistent path so tests never touch a real config.
fn simfleet_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("simfleet");
    cmd.env("HOME", "/tmp/simfleet-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/simfleet-cli-test-nonexistent")
        .env_remove("SIMFLEET_CONFIG")
        .env_remove("SIMFLEET_OUTPUT")
        .env_remove("SIMFLEET_DIRECTORY__TOKEN")
        .env_remove("SIMFLEET_METRICS__TOKEN")
        .env_remove("RUST_LOG");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

/// Temp dir holding `config.toml` that points at a file-backed directory.
struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new(extra: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let devices = dir.path().join("devices.json");
        let config = format!(
            "[directory]\nkind = \"file\"\npath = '{}'\n\n{extra}",
            devices.display()
        );
        std::fs::write(dir.path().join("config.toml"), config).unwrap();
        Self { dir }
    }

    fn with_devices(self) -> Self {
        let devices = json!([
            {
                "id": 1,
                "device_id": "Pump 3",
                "token": "pump-token",
                "device_type": "Pump",
                "group": "House 1",
                "state": { "status": true }
            },
            {
                "id": 2,
                "device_id": "Greenhouse DHT",
                "token": "",
                "device_type": "DHT22",
                "state": { "temperature": 21.5, "humidity": 60.0 }
            }
        ]);
        std::fs::write(self.devices_path(), devices.to_string()).unwrap();
        self
    }

    fn config_path(&self) -> PathBuf {
        self.dir.path().join("config.toml")
    }

    fn devices_path(&self) -> PathBuf {
        self.dir.path().join("devices.json")
    }

    fn cmd(&self) -> assert_cmd::Command {
        let mut cmd = simfleet_cmd();
        cmd.arg("--config").arg(self.config_path());
        cmd
    }
}

fn path_str(path: &Path) -> String {
    path.display().to_string()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = simfleet_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    simfleet_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("run")
            .and(predicate::str::contains("devices"))
            .and(predicate::str::contains("metrics-test"))
            .and(predicate::str::contains("config")),
    );
}

#[test]
fn test_version_flag() {
    simfleet_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("simfleet"));
}

#[test]
fn test_run_help_lists_overrides() {
    simfleet_cmd().args(["run", "--help"]).assert().success().stdout(
        predicate::str::contains("--randomize")
            .and(predicate::str::contains("--use-metrics"))
            .and(predicate::str::contains("--state-backend"))
            .and(predicate::str::contains("--heartbeat")),
    );
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    simfleet_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_invalid_shell() {
    simfleet_cmd()
        .args(["completions", "tcsh"])
        .assert()
        .failure()
        .code(2);
}

// ── Config commands ─────────────────────────────────────────────────

#[test]
fn test_config_path_honors_flag() {
    let ws = Workspace::new("");
    ws.cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(path_str(&ws.config_path())));
}

#[test]
fn test_config_init_refuses_to_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("nested").join("config.toml");

    simfleet_cmd()
        .arg("--config")
        .arg(&target)
        .args(["config", "init"])
        .assert()
        .success();
    let written = std::fs::read_to_string(&target).unwrap();
    assert!(written.contains("[broker]"));
    assert!(written.contains("demo.thingsboard.io"));

    let output = simfleet_cmd()
        .arg("--config")
        .arg(&target)
        .args(["config", "init"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("already exists"));

    simfleet_cmd()
        .arg("--config")
        .arg(&target)
        .args(["config", "init", "--force"])
        .assert()
        .success();
}

#[test]
fn test_config_show_redacts_tokens() {
    let ws = Workspace::new("[metrics]\ntoken = \"supersecret\"\n");
    ws.cmd()
        .args(["config", "show", "-o", "json"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("********")
                .and(predicate::str::contains("supersecret").not()),
        );
}

#[test]
fn test_config_env_override() {
    let ws = Workspace::new("");
    ws.cmd()
        .env("SIMFLEET_BROKER__HOST", "tb.example.net")
        .args(["config", "show", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tb.example.net"));
}

// ── Devices ─────────────────────────────────────────────────────────

#[test]
fn test_devices_list_json() {
    let ws = Workspace::new("").with_devices();
    let output = ws
        .cmd()
        .args(["devices", "list", "-o", "json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));

    let listed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0]["name"], "Pump 3");
    assert_eq!(listed[0]["family"], "pump");
    assert_eq!(listed[1]["family"], "temperature");
    assert_eq!(listed[1]["has_token"], false);
    // Credentials never leave the directory.
    assert!(!String::from_utf8_lossy(&output.stdout).contains("pump-token"));
}

#[test]
fn test_devices_list_filters_by_type() {
    let ws = Workspace::new("").with_devices();
    ws.cmd()
        .args(["devices", "list", "--type", "dht22", "-o", "plain"])
        .assert()
        .success()
        .stdout("2\n");
}

#[test]
fn test_devices_list_table() {
    let ws = Workspace::new("").with_devices();
    ws.cmd()
        .args(["devices", "list", "--color", "never"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Family")
                .and(predicate::str::contains("Greenhouse DHT"))
                .and(predicate::str::contains("House 1")),
        );
}

#[test]
fn test_devices_list_conflicting_filters() {
    let ws = Workspace::new("").with_devices();
    ws.cmd()
        .args(["devices", "list", "--device-id", "1", "--group", "House 1"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_devices_list_malformed_directory() {
    let ws = Workspace::new("");
    std::fs::write(ws.devices_path(), "{ not json").unwrap();
    ws.cmd()
        .args(["devices", "list"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Serialization"));
}

// ── Run ─────────────────────────────────────────────────────────────

#[test]
fn test_run_with_empty_directory_exits_cleanly() {
    let ws = Workspace::new("");
    ws.cmd()
        .arg("run")
        .assert()
        .success()
        .stderr(predicate::str::contains("No devices registered"));
}

#[test]
fn test_run_rejects_zero_heartbeat() {
    let ws = Workspace::new("[simulator]\nheartbeat_secs = 0\n");
    ws.cmd()
        .arg("run")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("heartbeat"));
}

#[test]
fn test_run_rejects_unknown_state_backend() {
    let ws = Workspace::new("");
    ws.cmd()
        .args(["run", "--state-backend", "disk"])
        .assert()
        .failure()
        .code(2);
}

// ── Metrics test ────────────────────────────────────────────────────

#[test]
fn test_metrics_test_unknown_device() {
    let ws = Workspace::new("").with_devices();
    ws.cmd()
        .args(["metrics-test", "--device-id", "Nope"])
        .assert()
        .failure()
        .code(4)
        .stderr(predicate::str::contains("not found"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_metrics_test_writes_point() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/write"))
        .and(query_param("org", "acme"))
        .and(query_param("bucket", "iot_data"))
        .and(query_param("precision", "ms"))
        .and(body_string_contains(
            "device_data,sensor=Pump\\ 3,source=simulator test_value=4.5,sent_timestamp=",
        ))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let ws = Workspace::new(&format!(
        "[metrics]\nurl = \"{}\"\norg = \"acme\"\n",
        server.uri()
    ))
    .with_devices();
    let mut cmd = ws.cmd();
    cmd.args(["metrics-test", "--device-id", "Pump 3", "--value", "4.5"]);

    let output = tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));
    assert!(String::from_utf8_lossy(&output.stdout).contains("test_value=4.5"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_metrics_test_reports_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/write"))
        .respond_with(ResponseTemplate::new(400).set_body_string("unable to parse"))
        .mount(&server)
        .await;

    let ws = Workspace::new(&format!("[metrics]\nurl = \"{}\"\n", server.uri())).with_devices();
    let mut cmd = ws.cmd();
    cmd.args(["metrics-test", "--device-id", "Pump 3"]);

    let output = tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(combined_output(&output).contains("Metrics write failed"));
}
