//! Per-device state ownership.
//!
//! Each device worker owns exactly one [`StateStore`]; nothing else writes a
//! device's state, so no locking is involved. The [`StateMode`] picked for the
//! run decides whether the directory sees every write or only a final flush.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::StateMode;
use crate::directory::Directory;
use crate::model::{DeviceEntry, DeviceId, DeviceState};

/// One device's state, owned by its worker.
pub struct StateStore {
    id: DeviceId,
    mode: StateMode,
    cached: DeviceState,
    directory: Arc<dyn Directory>,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("cached", &self.cached)
            .finish_non_exhaustive()
    }
}

impl StateStore {
    pub fn new(
        id: DeviceId,
        initial: DeviceState,
        mode: StateMode,
        directory: Arc<dyn Directory>,
    ) -> Self {
        Self {
            id,
            mode,
            cached: initial,
            directory,
        }
    }

    pub fn mode(&self) -> StateMode {
        self.mode
    }

    /// Current state. In [`StateMode::Directory`] the record is re-read first
    /// so out-of-band edits are picked up; a failed read falls back to the
    /// cached copy.
    pub async fn get(&mut self) -> DeviceState {
        if self.mode == StateMode::Directory {
            match self.directory.get(self.id).await {
                Ok(entry) => self.cached = entry.state,
                Err(e) => warn!(device_id = %self.id, error = %e, "state refresh failed, using cached state"),
            }
        }
        self.cached.clone()
    }

    /// Replace the whole state. Last write wins.
    pub async fn set(&mut self, state: DeviceState) {
        self.cached = state;
        if self.mode == StateMode::Directory {
            if let Err(e) = self.directory.save_state(self.id, &self.cached).await {
                warn!(device_id = %self.id, error = %e, "state save failed");
            }
        }
    }

    /// Cached state without touching the directory.
    pub fn snapshot(&self) -> &DeviceState {
        &self.cached
    }

    pub fn into_state(self) -> DeviceState {
        self.cached
    }
}

/// Push every entry's state to the directory.
///
/// Tries one bulk save; when that fails, saves devices one at a time and
/// keeps going past individual failures. Returns how many devices were saved.
pub async fn flush_all(directory: &dyn Directory, entries: &[DeviceEntry]) -> usize {
    if entries.is_empty() {
        return 0;
    }

    match directory.bulk_save(entries).await {
        Ok(()) => {
            debug!(count = entries.len(), "bulk state flush complete");
            return entries.len();
        }
        Err(e) => warn!(error = %e, "bulk flush failed, falling back to per-device saves"),
    }

    let mut saved = 0;
    for entry in entries {
        let id = entry.identity.id;
        match directory.save_state(id, &entry.state).await {
            Ok(()) => saved += 1,
            Err(e) => warn!(device_id = %id, error = %e, "state flush failed"),
        }
    }
    saved
}
