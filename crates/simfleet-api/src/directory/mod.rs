// Device directory HTTP client
//
// Wraps `reqwest::Client` with directory URL construction and status
// mapping. Saving a record that lacks a token makes the directory run its
// provisioning round-trip against the device-management platform; callers
// re-read the record afterwards to pick up the fresh token.

mod models;

use secrecy::SecretString;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::{TransportConfig, error_body};

pub use models::{DeviceQuery, DeviceRecord};
use models::StateUpdate;

/// Raw HTTP client for the device directory.
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    http: reqwest::Client,
    base_url: Url,
}

impl DirectoryClient {
    /// Create a client from a `TransportConfig`, authenticating with `token`.
    pub fn new(
        base_url: Url,
        token: Option<&SecretString>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client(token)?;
        Ok(Self { http, base_url })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// The directory base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// `GET /api/devices` narrowed by `query`.
    pub async fn list_devices(&self, query: &DeviceQuery) -> Result<Vec<DeviceRecord>, Error> {
        let mut url = self.api_url("devices")?;
        let pairs = query.query_pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        debug!("GET {}", url);

        let resp = self.http.get(url).send().await?;
        parse_json(resp, "devices").await
    }

    /// `GET /api/devices/{id}`.
    pub async fn get_device(&self, id: u64) -> Result<DeviceRecord, Error> {
        let url = self.api_url(&format!("devices/{id}"))?;
        debug!("GET {}", url);

        let resp = self.http.get(url).send().await?;
        parse_json(resp, &format!("device {id}")).await
    }

    /// `PUT /api/devices/{id}` with the full record.
    pub async fn save_device(&self, record: &DeviceRecord) -> Result<(), Error> {
        let url = self.api_url(&format!("devices/{}", record.id))?;
        self.send_json(self.http.put(url), record, &format!("device {}", record.id))
            .await
    }

    /// `PUT /api/devices/{id}/state`: replace only the state column.
    pub async fn save_state(&self, id: u64, state: &Map<String, Value>) -> Result<(), Error> {
        let url = self.api_url(&format!("devices/{id}/state"))?;
        self.send_json(self.http.put(url), &StateUpdate { state }, &format!("device {id}"))
            .await
    }

    /// `POST /api/devices/bulk` with many records at once.
    pub async fn bulk_save(&self, records: &[DeviceRecord]) -> Result<(), Error> {
        let url = self.api_url("devices/bulk")?;
        self.send_json(self.http.post(url), records, "devices").await
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn api_url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/api/{path}"))?)
    }

    async fn send_json(
        &self,
        builder: reqwest::RequestBuilder,
        body: &(impl Serialize + ?Sized),
        resource: &str,
    ) -> Result<(), Error> {
        let resp = builder.json(body).send().await?;
        debug!(status = %resp.status(), resource, "directory write");
        check_status(resp, resource).await.map(drop)
    }
}

/// Map non-success statuses to typed errors.
async fn check_status(resp: reqwest::Response, resource: &str) -> Result<reqwest::Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    match status {
        reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
            Err(Error::Authentication {
                message: format!("directory refused token (HTTP {status})"),
            })
        }
        reqwest::StatusCode::NOT_FOUND => Err(Error::NotFound {
            resource: resource.to_owned(),
        }),
        _ => Err(Error::Directory {
            status: status.as_u16(),
            message: error_body(resp).await,
        }),
    }
}

async fn parse_json<T: DeserializeOwned>(resp: reqwest::Response, resource: &str) -> Result<T, Error> {
    let resp = check_status(resp, resource).await?;
    let body = resp.text().await?;

    serde_json::from_str(&body).map_err(|e| {
        let preview: String = body.chars().take(200).collect();
        Error::Deserialization {
            message: format!("{e} (body preview: {preview:?})"),
            body: body.clone(),
        }
    })
}
