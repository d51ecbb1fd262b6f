//! Device directory seam.
//!
//! The directory is the system of record for device identities and their
//! persisted state. [`HttpDirectory`] talks to the REST service through
//! [`simfleet_api::DirectoryClient`]; [`LocalDirectory`] keeps records in a
//! JSON file (or purely in memory) for offline runs and tests.

mod http;
mod local;

use futures_util::future::BoxFuture;

use crate::config::DeviceSelector;
use crate::error::CoreError;
use crate::model::{DeviceEntry, DeviceId, DeviceState};

pub use http::HttpDirectory;
pub use local::LocalDirectory;

/// Read/write access to device records. Implementations must be safe to
/// share across every device worker.
pub trait Directory: Send + Sync {
    /// Records matching `selector`.
    fn list<'a>(
        &'a self,
        selector: &'a DeviceSelector,
    ) -> BoxFuture<'a, Result<Vec<DeviceEntry>, CoreError>>;

    fn get(&self, id: DeviceId) -> BoxFuture<'_, Result<DeviceEntry, CoreError>>;

    /// Save the full record. Against the live service, saving a record whose
    /// credential is missing or stale triggers re-provisioning.
    fn save<'a>(&'a self, entry: &'a DeviceEntry) -> BoxFuture<'a, Result<(), CoreError>>;

    /// Replace only the state of one record.
    fn save_state<'a>(
        &'a self,
        id: DeviceId,
        state: &'a DeviceState,
    ) -> BoxFuture<'a, Result<(), CoreError>>;

    fn bulk_save<'a>(&'a self, entries: &'a [DeviceEntry]) -> BoxFuture<'a, Result<(), CoreError>>;
}
