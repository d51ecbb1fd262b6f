// ── Fleet scheduler ──
//
// Enumerates the directory, runs one worker per device, and keeps looking
// for newly registered devices until cancelled. Devices that disappear from
// the directory keep running until the fleet stops; nothing retires them.

use std::collections::HashSet;
use std::sync::Arc;

use simfleet_api::{Broker, MetricsSink};
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{DeviceSelector, FleetConfig, StateMode};
use crate::directory::Directory;
use crate::error::CoreError;
use crate::metrics::MetricsRecorder;
use crate::model::{DeviceEntry, DeviceId};
use crate::rpc::RpcRegistry;
use crate::state::flush_all;
use crate::worker::{DeviceWorker, WorkerContext};

/// Final identities and states of every device a run simulated.
#[derive(Debug, Clone, Default)]
pub struct FleetReport {
    pub devices: Vec<DeviceEntry>,
    /// Devices whose state reached the directory at shutdown.
    pub flushed: usize,
}

impl FleetReport {
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn device(&self, id: DeviceId) -> Option<&DeviceEntry> {
        self.devices.iter().find(|d| d.identity.id == id)
    }
}

/// The fleet scheduler.
#[derive(Debug)]
pub struct Fleet {
    ctx: WorkerContext,
}

impl Fleet {
    pub fn new(config: FleetConfig, broker: Arc<dyn Broker>, directory: Arc<dyn Directory>) -> Self {
        Self {
            ctx: WorkerContext::new(broker, directory, config),
        }
    }

    /// Attach a metrics sink. Only used when `FleetConfig::metrics` is set.
    pub fn with_metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.ctx.metrics = Some(Arc::new(MetricsRecorder::new(sink)));
        self
    }

    pub fn with_registry(mut self, registry: RpcRegistry) -> Self {
        self.ctx.registry = Arc::new(registry);
        self
    }

    pub fn config(&self) -> &FleetConfig {
        &self.ctx.config
    }

    /// Simulate every device matching `selector` until `cancel` fires.
    ///
    /// Only the initial directory listing can fail the run.
    pub async fn run(
        &self,
        selector: DeviceSelector,
        cancel: CancellationToken,
    ) -> Result<FleetReport, CoreError> {
        let initial = self.ctx.directory.list(&selector).await?;
        if initial.is_empty() {
            info!("no devices registered");
            return Ok(FleetReport::default());
        }

        info!(
            devices = initial.len(),
            state_mode = %self.ctx.config.state_mode,
            randomize = self.ctx.config.randomize,
            "starting fleet"
        );

        let mut known = HashSet::new();
        let mut workers = JoinSet::new();
        let mut finished = Vec::new();

        for entry in initial {
            self.spawn_worker(&mut workers, &mut known, entry, &cancel);
        }

        let mut discovery = tokio::time::interval(self.ctx.config.discovery_interval);
        discovery.set_missed_tick_behavior(MissedTickBehavior::Delay);
        discovery.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                Some(joined) = workers.join_next() => collect(joined, &mut finished),
                _ = discovery.tick() => {
                    self.discover(&selector, &mut workers, &mut known, &cancel).await;
                }
            }
        }

        info!("stopping fleet");
        while let Some(joined) = workers.join_next().await {
            collect(joined, &mut finished);
        }
        finished.sort_by_key(|d| d.identity.id);

        let flushed = if self.ctx.config.state_mode == StateMode::Memory {
            let saved = flush_all(self.ctx.directory.as_ref(), &finished).await;
            info!(saved, total = finished.len(), "state flushed to directory");
            saved
        } else {
            0
        };

        Ok(FleetReport {
            devices: finished,
            flushed,
        })
    }

    fn spawn_worker(
        &self,
        workers: &mut JoinSet<DeviceEntry>,
        known: &mut HashSet<DeviceId>,
        entry: DeviceEntry,
        cancel: &CancellationToken,
    ) {
        let id = entry.identity.id;
        if !known.insert(id) {
            return;
        }
        debug!(device_id = %id, name = %entry.identity.name, "starting worker");
        let worker = DeviceWorker::new(entry, &self.ctx, cancel.child_token());
        workers.spawn(worker.run());
    }

    async fn discover(
        &self,
        selector: &DeviceSelector,
        workers: &mut JoinSet<DeviceEntry>,
        known: &mut HashSet<DeviceId>,
        cancel: &CancellationToken,
    ) {
        let entries = match self.ctx.directory.list(selector).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "device discovery failed");
                return;
            }
        };

        for entry in entries {
            if !known.contains(&entry.identity.id) {
                info!(device_id = %entry.identity.id, name = %entry.identity.name, "discovered new device");
                self.spawn_worker(workers, known, entry, cancel);
            }
        }
    }
}

fn collect(joined: Result<DeviceEntry, JoinError>, finished: &mut Vec<DeviceEntry>) {
    match joined {
        Ok(entry) => finished.push(entry),
        Err(e) => warn!(error = %e, "device worker aborted"),
    }
}
