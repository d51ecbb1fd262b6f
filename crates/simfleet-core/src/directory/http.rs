// REST-backed directory.

use futures_util::future::BoxFuture;
use simfleet_api::{DeviceQuery, DeviceRecord, DirectoryClient};

use super::Directory;
use crate::config::DeviceSelector;
use crate::error::CoreError;
use crate::model::{DeviceEntry, DeviceId, DeviceState};

/// [`Directory`] over the directory REST API.
#[derive(Debug, Clone)]
pub struct HttpDirectory {
    client: DirectoryClient,
}

impl HttpDirectory {
    pub fn new(client: DirectoryClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &DirectoryClient {
        &self.client
    }
}

fn to_query(selector: &DeviceSelector) -> DeviceQuery {
    match selector {
        DeviceSelector::All => DeviceQuery::default(),
        DeviceSelector::Ids(ids) => DeviceQuery {
            ids: ids.iter().map(|id| id.0).collect(),
            ..DeviceQuery::default()
        },
        DeviceSelector::Group(group) => DeviceQuery {
            group: Some(group.clone()),
            ..DeviceQuery::default()
        },
        DeviceSelector::Type(tag) => DeviceQuery {
            device_type: Some(tag.as_str().to_owned()),
            ..DeviceQuery::default()
        },
    }
}

impl Directory for HttpDirectory {
    fn list<'a>(
        &'a self,
        selector: &'a DeviceSelector,
    ) -> BoxFuture<'a, Result<Vec<DeviceEntry>, CoreError>> {
        Box::pin(async move {
            let records = self.client.list_devices(&to_query(selector)).await?;
            Ok(records.into_iter().map(DeviceEntry::from).collect())
        })
    }

    fn get(&self, id: DeviceId) -> BoxFuture<'_, Result<DeviceEntry, CoreError>> {
        Box::pin(async move {
            match self.client.get_device(id.0).await {
                Ok(record) => Ok(DeviceEntry::from(record)),
                Err(e) if e.is_not_found() => Err(CoreError::DeviceNotFound { id }),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn save<'a>(&'a self, entry: &'a DeviceEntry) -> BoxFuture<'a, Result<(), CoreError>> {
        Box::pin(async move {
            self.client.save_device(&DeviceRecord::from(entry)).await?;
            Ok(())
        })
    }

    fn save_state<'a>(
        &'a self,
        id: DeviceId,
        state: &'a DeviceState,
    ) -> BoxFuture<'a, Result<(), CoreError>> {
        Box::pin(async move {
            self.client.save_state(id.0, state).await?;
            Ok(())
        })
    }

    fn bulk_save<'a>(&'a self, entries: &'a [DeviceEntry]) -> BoxFuture<'a, Result<(), CoreError>> {
        Box::pin(async move {
            let records: Vec<DeviceRecord> = entries.iter().map(DeviceRecord::from).collect();
            self.client.bulk_save(&records).await?;
            Ok(())
        })
    }
}
