//! Metrics records and the InfluxDB v2 line-protocol sink.
//!
//! A [`MetricRecord`] renders to one line of line protocol:
//!
//! ```text
//! device_data,sensor=House\ 1\ Light,source=simulator status=1,received_timestamp=1700000000000 1700000000000
//! ```
//!
//! Writes are fire-and-forget from the simulator's point of view: callers log
//! failures and move on.

use futures_util::future::BoxFuture;
use secrecy::SecretString;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::{TransportConfig, error_body};

/// One timestamped point.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub measurement: String,
    pub tags: Vec<(String, String)>,
    pub fields: Vec<(String, f64)>,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
}

impl MetricRecord {
    pub fn new(measurement: impl Into<String>, timestamp_ms: i64) -> Self {
        Self {
            measurement: measurement.into(),
            tags: Vec::new(),
            fields: Vec::new(),
            timestamp_ms,
        }
    }

    #[must_use]
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: f64) -> Self {
        self.fields.push((key.into(), value));
        self
    }

    /// Render as a single line-protocol line (no trailing newline).
    ///
    /// Non-finite field values are skipped since line protocol cannot carry them.
    pub fn to_line(&self) -> String {
        let mut line = escape(&self.measurement, &[',', ' ']);

        for (key, value) in &self.tags {
            line.push(',');
            line.push_str(&escape_key(key));
            line.push('=');
            line.push_str(&escape_key(value));
        }

        let fields: Vec<String> = self
            .fields
            .iter()
            .filter(|(_, v)| v.is_finite())
            .map(|(k, v)| format!("{}={v}", escape_key(k)))
            .collect();
        line.push(' ');
        line.push_str(&fields.join(","));

        line.push(' ');
        line.push_str(&self.timestamp_ms.to_string());
        line
    }
}

/// Escape a tag key, tag value, or field key.
pub fn escape_key(raw: &str) -> String {
    escape(raw, &[',', ' ', '='])
}

fn escape(raw: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c == '\\' || special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Destination for metric records.
pub trait MetricsSink: Send + Sync {
    fn write(&self, record: MetricRecord) -> BoxFuture<'_, Result<(), Error>>;
}

/// InfluxDB v2 write endpoint.
#[derive(Debug, Clone)]
pub struct InfluxSink {
    http: reqwest::Client,
    write_url: Url,
}

impl InfluxSink {
    /// Build a sink writing to `{base_url}/api/v2/write?org=..&bucket=..&precision=ms`.
    pub fn new(
        base_url: &Url,
        org: &str,
        bucket: &str,
        token: Option<&SecretString>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client(token)?;
        Self::with_client(http, base_url, org, bucket)
    }

    /// Build a sink around a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        base_url: &Url,
        org: &str,
        bucket: &str,
    ) -> Result<Self, Error> {
        let base = base_url.as_str().trim_end_matches('/');
        let mut write_url = Url::parse(&format!("{base}/api/v2/write"))?;
        write_url
            .query_pairs_mut()
            .append_pair("org", org)
            .append_pair("bucket", bucket)
            .append_pair("precision", "ms");
        Ok(Self { http, write_url })
    }

    pub fn write_url(&self) -> &Url {
        &self.write_url
    }

    async fn write_line(&self, line: String) -> Result<(), Error> {
        debug!(%line, "metrics write");
        let resp = self
            .http
            .post(self.write_url.clone())
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(line)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Error::Metrics {
                status: status.as_u16(),
                message: error_body(resp).await,
            })
        }
    }
}

impl MetricsSink for InfluxSink {
    fn write(&self, record: MetricRecord) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(self.write_line(record.to_line()))
    }
}
