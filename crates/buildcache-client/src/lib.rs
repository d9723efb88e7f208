//! HTTP client for the remote build-cache transport service (spec.md §4.5,
//! §6), grounded on `clients/src/courier/v1/client.rs`.
//!
//! Every method maps non-2xx responses and transport failures to
//! [`CacheError::RemoteTransport`] rather than propagating `reqwest`'s own
//! error type, keeping the boundary explicit the way `buildcache-core`'s
//! other components do (spec.md §7).

use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;
use url::Url;

use buildcache_core::error::{CacheError, Result};
use buildcache_core::hash::Fingerprint;
use buildcache_core::model::{BuildRecord, ModuleId, ProjectIndex};

/// Whether a remote write created a new record or found one already there
/// (spec.md §4.6: a collision on `PUT /api/v1/build/...` means the save is
/// skipped, not retried).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Created,
    AlreadyExists,
}

/// Client for the remote transport service.
///
/// Cheaply cloneable; clones share the underlying connection pool, matching
/// `clients::courier::v1::Client`.
#[derive(Clone)]
pub struct RemoteClient {
    base: Arc<Url>,
    http: reqwest::Client,
    /// spec.md §5: "honor an offline flag that turns every remote read into
    /// 'absent' and every remote write into a no-op with a log line."
    offline: bool,
}

impl RemoteClient {
    pub fn new(base: Url, connect_timeout: Duration, request_timeout: Duration, offline: bool) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| CacheError::RemoteTransport { message: format!("build http client: {e}") })?;

        Ok(Self { base: Arc::new(base), http, offline })
    }

    #[instrument(skip(self))]
    pub async fn health(&self) -> Result<bool> {
        if self.offline {
            tracing::info!("offline: skipping remote health check");
            return Ok(false);
        }
        let url = self.join("api/v1/health")?;
        let response = self.http.get(url).send().await.map_err(transport_error)?;
        Ok(response.status().is_success())
    }

    #[instrument(skip(self))]
    pub async fn get_blob(&self, fingerprint: &Fingerprint) -> Result<Option<Vec<u8>>> {
        if self.offline {
            tracing::info!(%fingerprint, "offline: treating remote blob as absent");
            return Ok(None);
        }
        let url = self.join(&format!("api/v1/blob/{}/{}", fingerprint.algorithm(), fingerprint.to_hex()))?;
        let response = self.http.get(url).send().await.map_err(transport_error)?;

        match response.status() {
            status if status.is_success() => {
                let bytes = response.bytes().await.map_err(transport_error)?;
                Ok(Some(bytes.to_vec()))
            }
            status if status.as_u16() == 404 => Ok(None),
            status => Err(unexpected_status(status)),
        }
    }

    #[instrument(skip(self, content))]
    pub async fn put_blob(&self, fingerprint: &Fingerprint, content: Vec<u8>) -> Result<bool> {
        if self.offline {
            tracing::info!(%fingerprint, "offline: skipping remote blob save");
            return Ok(false);
        }
        let url = self.join(&format!("api/v1/blob/{}/{}", fingerprint.algorithm(), fingerprint.to_hex()))?;
        let response = self.http.put(url).body(content).send().await.map_err(transport_error)?;

        match response.status() {
            status if status.as_u16() == 201 => Ok(true),
            status if status.as_u16() == 200 => Ok(false),
            status => Err(unexpected_status(status)),
        }
    }

    #[instrument(skip(self))]
    pub async fn get_build(&self, module_id: &ModuleId, fingerprint_hex: &str) -> Result<Option<BuildRecord>> {
        if self.offline {
            tracing::info!(%module_id, fingerprint_hex, "offline: treating remote build record as absent");
            return Ok(None);
        }
        let url = self.join(&format!(
            "api/v1/build/{}/{}/{}",
            module_id.group, module_id.artifact, fingerprint_hex
        ))?;
        let response = self.http.get(url).send().await.map_err(transport_error)?;

        match response.status() {
            status if status.is_success() => {
                let xml = response.text().await.map_err(transport_error)?;
                let record = BuildRecord::from_xml(&xml)?;
                Ok(Some(record))
            }
            status if status.as_u16() == 404 => Ok(None),
            status => Err(unexpected_status(status)),
        }
    }

    #[instrument(skip(self, record))]
    pub async fn put_build(&self, module_id: &ModuleId, fingerprint_hex: &str, record: &BuildRecord) -> Result<PutOutcome> {
        if self.offline {
            tracing::info!(%module_id, fingerprint_hex, "offline: skipping remote build record save");
            return Ok(PutOutcome::AlreadyExists);
        }
        let url = self.join(&format!(
            "api/v1/build/{}/{}/{}",
            module_id.group, module_id.artifact, fingerprint_hex
        ))?;
        let xml = record.to_xml()?;
        let response = self.http.put(url).body(xml).send().await.map_err(transport_error)?;

        match response.status() {
            status if status.as_u16() == 201 => Ok(PutOutcome::Created),
            status if status.as_u16() == 409 => Ok(PutOutcome::AlreadyExists),
            status => Err(unexpected_status(status)),
        }
    }

    #[instrument(skip(self, index))]
    pub async fn put_report(&self, build_id: &str, index: &ProjectIndex) -> Result<()> {
        if self.offline {
            tracing::info!(build_id, "offline: skipping remote report save");
            return Ok(());
        }
        let url = self.join(&format!("api/v1/report/{build_id}"))?;
        let xml = index.to_xml()?;
        let response = self.http.put(url).body(xml).send().await.map_err(transport_error)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(unexpected_status(response.status()))
        }
    }

    fn join(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| CacheError::RemoteTransport { message: format!("build url {path:?}: {e}") })
    }
}

fn transport_error(e: reqwest::Error) -> CacheError {
    CacheError::RemoteTransport { message: e.to_string() }
}

fn unexpected_status(status: reqwest::StatusCode) -> CacheError {
    CacheError::RemoteTransport { message: format!("unexpected status code: {status}") }
}
