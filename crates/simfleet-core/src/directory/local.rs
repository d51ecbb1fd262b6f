// File-backed (or purely in-memory) directory.
//
// The document is a JSON array of directory records, the same shape the
// REST service returns from `GET /api/devices`. Every mutation rewrites the
// whole file. No provisioning: a record saved without a token stays that way.

use std::path::{Path, PathBuf};

use futures_util::future::BoxFuture;
use simfleet_api::DeviceRecord;
use tokio::sync::Mutex;
use tracing::debug;

use super::Directory;
use crate::config::DeviceSelector;
use crate::error::CoreError;
use crate::model::{DeviceEntry, DeviceId, DeviceState, TypeTag};

/// [`Directory`] held in memory, optionally mirrored to a JSON file.
#[derive(Debug)]
pub struct LocalDirectory {
    records: Mutex<Vec<DeviceRecord>>,
    path: Option<PathBuf>,
}

impl LocalDirectory {
    /// A directory that never touches disk.
    pub fn in_memory(entries: impl IntoIterator<Item = DeviceEntry>) -> Self {
        let records = entries.into_iter().map(|e| DeviceRecord::from(&e)).collect();
        Self {
            records: Mutex::new(records),
            path: None,
        }
    }

    /// Load `path`. A missing file opens as an empty directory and is created
    /// on the first write.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let path = path.into();
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(CoreError::Io { path, source }),
        };
        debug!(path = %path.display(), "opened local directory");
        Ok(Self {
            records: Mutex::new(records),
            path: Some(path),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Add or replace a record.
    pub async fn insert(&self, entry: &DeviceEntry) -> Result<(), CoreError> {
        let mut records = self.records.lock().await;
        let record = DeviceRecord::from(entry);
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        self.persist(&records).await
    }

    /// Drop a record. Returns whether it existed.
    pub async fn remove(&self, id: DeviceId) -> Result<bool, CoreError> {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|r| r.id != id.0);
        let removed = records.len() != before;
        if removed {
            self.persist(&records).await?;
        }
        Ok(removed)
    }

    async fn persist(&self, records: &[DeviceRecord]) -> Result<(), CoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_vec_pretty(records)?;
        tokio::fs::write(path, json)
            .await
            .map_err(|source| CoreError::Io {
                path: path.clone(),
                source,
            })
    }
}

fn matches(record: &DeviceRecord, selector: &DeviceSelector) -> bool {
    match selector {
        DeviceSelector::All => true,
        DeviceSelector::Ids(ids) => ids.iter().any(|id| id.0 == record.id),
        DeviceSelector::Group(group) => record.group.as_deref() == Some(group.as_str()),
        DeviceSelector::Type(tag) => TypeTag::new(&record.device_type) == *tag,
    }
}

impl Directory for LocalDirectory {
    fn list<'a>(
        &'a self,
        selector: &'a DeviceSelector,
    ) -> BoxFuture<'a, Result<Vec<DeviceEntry>, CoreError>> {
        Box::pin(async move {
            let records = self.records.lock().await;
            Ok(records
                .iter()
                .filter(|r| matches(r, selector))
                .cloned()
                .map(DeviceEntry::from)
                .collect())
        })
    }

    fn get(&self, id: DeviceId) -> BoxFuture<'_, Result<DeviceEntry, CoreError>> {
        Box::pin(async move {
            let records = self.records.lock().await;
            records
                .iter()
                .find(|r| r.id == id.0)
                .cloned()
                .map(DeviceEntry::from)
                .ok_or(CoreError::DeviceNotFound { id })
        })
    }

    fn save<'a>(&'a self, entry: &'a DeviceEntry) -> BoxFuture<'a, Result<(), CoreError>> {
        Box::pin(async move {
            let id = entry.identity.id;
            let mut records = self.records.lock().await;
            let slot = records
                .iter_mut()
                .find(|r| r.id == id.0)
                .ok_or(CoreError::DeviceNotFound { id })?;
            *slot = DeviceRecord::from(entry);
            self.persist(&records).await
        })
    }

    fn save_state<'a>(
        &'a self,
        id: DeviceId,
        state: &'a DeviceState,
    ) -> BoxFuture<'a, Result<(), CoreError>> {
        Box::pin(async move {
            let mut records = self.records.lock().await;
            let slot = records
                .iter_mut()
                .find(|r| r.id == id.0)
                .ok_or(CoreError::DeviceNotFound { id })?;
            slot.state = state.clone();
            self.persist(&records).await
        })
    }

    fn bulk_save<'a>(&'a self, entries: &'a [DeviceEntry]) -> BoxFuture<'a, Result<(), CoreError>> {
        Box::pin(async move {
            let mut records = self.records.lock().await;
            for entry in entries {
                let record = DeviceRecord::from(entry);
                match records.iter_mut().find(|r| r.id == record.id) {
                    Some(existing) => *existing = record,
                    None => return Err(CoreError::DeviceNotFound { id: entry.identity.id }),
                }
            }
            self.persist(&records).await
        })
    }
}
