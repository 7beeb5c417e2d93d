//! HTTP adapters for the dashboard backend: server snapshots, the release catalog
//! and action requests.

use crate::config::ClientConfig;
use crate::dispatch::ActionTransport;
use crate::error::SyncError;
use crate::network::{ReleaseSource, SnapshotSource};
use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::StatusCode;
use serde::Deserialize;
use shared::{ActionRequest, ReleaseCatalog, ServerId, ServerRecord, Snapshot};
use std::collections::BTreeMap;

const SERVERS_PATH: &str = "/api/v1/servers";
const RELEASES_PATH: &str = "/api/v1/releases";

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    hostname: String,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> Result<Self, SyncError> {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = config.session_cookie() {
            let value = HeaderValue::from_str(&cookie)
                .map_err(|e| SyncError::Transport(format!("bad session cookie: {}", e)))?;
            headers.insert(COOKIE, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            hostname: config.hostname.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl SnapshotSource for HttpBackend {
    async fn fetch_snapshot(&self) -> Result<Snapshot, SyncError> {
        let response = self.client.get(self.url(SERVERS_PATH)).send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            return Ok(Snapshot::Unauthenticated);
        }
        if !status.is_success() {
            return Err(SyncError::Transport(format!(
                "GET {} returned {}",
                SERVERS_PATH, status
            )));
        }

        let body = response.text().await?;
        parse_snapshot(&body, &self.hostname)
    }
}

#[async_trait]
impl ReleaseSource for HttpBackend {
    async fn fetch_releases(&self) -> Result<ReleaseCatalog, SyncError> {
        let response = self.client.get(self.url(RELEASES_PATH)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Transport(format!(
                "GET {} returned {}",
                RELEASES_PATH, status
            )));
        }

        Ok(response.json::<ReleaseCatalog>().await?)
    }
}

#[async_trait]
impl ActionTransport for HttpBackend {
    async fn send(&self, request: &ActionRequest) -> Result<(), SyncError> {
        let path = format!("/api/v1/server/{}/{}", request.uuid, request.kind.code());
        let mut builder = self.client.post(self.url(&path));

        if let (Some(field), Some(payload)) =
            (request.kind.payload_field(), request.payload.as_deref())
        {
            builder = builder.form(&[(field, payload.trim())]);
        }

        let response = builder.send().await?;
        let status = response.status();
        debug!("POST {} returned {}", path, status);

        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status, &body, &request.uuid))
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    servers: Option<BTreeMap<String, ServerRecord>>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

/// Validates a servers payload and re-keys it by each record's own uuid.
///
/// A body without a `servers` object means the caller is not logged in. Records
/// without a host get `hostname`.
pub fn parse_snapshot(body: &str, hostname: &str) -> Result<Snapshot, SyncError> {
    let envelope: Envelope = serde_json::from_str(body)?;
    let Some(servers) = envelope.servers else {
        return Ok(Snapshot::Unauthenticated);
    };

    let mut fleet = BTreeMap::new();
    for (_, mut record) in servers {
        if record.uuid.as_str().trim().is_empty() {
            return Err(SyncError::InvalidPayload(format!(
                "server {:?} has an empty uuid",
                record.name
            )));
        }
        if record.host.is_empty() {
            record.host = hostname.to_string();
        }

        let uuid = record.uuid.clone();
        if fleet.insert(uuid.clone(), record).is_some() {
            return Err(SyncError::InvalidPayload(format!(
                "duplicate server uuid {}",
                uuid
            )));
        }
    }

    Ok(Snapshot::Fleet(fleet))
}

fn classify_failure(status: StatusCode, body: &str, uuid: &ServerId) -> SyncError {
    let reason = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|body| body.error)
        .unwrap_or_default();

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SyncError::Authorization(reason),
        StatusCode::NOT_FOUND => SyncError::NotFound {
            uuid: uuid.clone(),
            reason,
        },
        _ => SyncError::Rejected(reason),
    }
}
