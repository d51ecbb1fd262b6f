// Metric emission for device readings.
//
// Wraps a `MetricsSink` with timestamping and record shaping. Writes run on
// their own task; failures are logged and swallowed, so metrics never affect
// device behavior.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use serde_json::Value;
use simfleet_api::{MetricRecord, MetricsSink};
use tracing::{debug, warn};

use crate::model::{DeviceIdentity, DeviceState};

pub const MEASUREMENT: &str = "device_data";
const SOURCE: &str = "simulator";

/// Which moment a record's extra timestamp field marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stamp {
    /// Periodic telemetry leaving the device.
    Sent,
    /// An RPC mutation arriving at the device.
    Received,
}

impl Stamp {
    fn field(self) -> &'static str {
        match self {
            Self::Sent => "sent_timestamp",
            Self::Received => "received_timestamp",
        }
    }
}

/// Shared metrics writer for a fleet run.
pub struct MetricsRecorder {
    sink: Arc<dyn MetricsSink>,
    last_ms: AtomicI64,
}

impl std::fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRecorder")
            .field("last_ms", &self.last_ms.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl MetricsRecorder {
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            sink,
            last_ms: AtomicI64::new(0),
        }
    }

    /// Wall-clock milliseconds, strictly increasing across calls.
    pub fn next_timestamp(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let mut prev = self.last_ms.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self
                .last_ms
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }

    /// Queue one record for `fields` of `device` and return immediately.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn record(&self, device: &DeviceIdentity, fields: &DeviceState, stamp: Stamp) {
        let ts = self.next_timestamp();
        let record = build_record(&device.name, fields, stamp, ts);
        if record.fields.len() <= 1 {
            debug!(device_id = %device.id, "no numeric fields to record");
            return;
        }

        let sink = Arc::clone(&self.sink);
        let device_id = device.id;
        tokio::spawn(async move {
            if let Err(e) = sink.write(record).await {
                warn!(%device_id, error = %e, "metrics write failed");
            }
        });
    }
}

/// Shape a record: bools as 0/1, numbers as-is, everything else skipped.
pub fn build_record(sensor: &str, fields: &DeviceState, stamp: Stamp, timestamp_ms: i64) -> MetricRecord {
    let mut record = MetricRecord::new(MEASUREMENT, timestamp_ms)
        .tag("sensor", sensor)
        .tag("source", SOURCE);

    for (key, value) in fields {
        let numeric = match value {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Number(n) => n.as_f64(),
            _ => None,
        };
        if let Some(v) = numeric {
            record = record.field(key.as_str(), v);
        }
    }

    #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
    let stamp_value = timestamp_ms as f64;
    record.field(stamp.field(), stamp_value)
}
