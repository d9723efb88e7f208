//! `CacheRepository` (spec.md §4.6): binds a fingerprint to a build-record
//! location and exposes find/restore/save, enforcing at-most-one-writer per
//! `(moduleId, fingerprint)`. Grounded on `hurry/src/cargo/cache/{save,
//! restore}.rs`'s local/remote dispatch, generalized from unit hashes to
//! module fingerprints.

use std::path::Path;

use tracing::{instrument, warn};
use uuid::Uuid;

use buildcache_core::error::{CacheError, Result};
use buildcache_core::hash::{Algorithm, Fingerprint};
use buildcache_core::model::{ArtifactEntry, BuildRecord, ModuleId, ProjectIndex};
use buildcache_store::{LockOutcome, WriteLock};

use crate::session::CacheSession;

/// Outcome of [`CacheRepository::restore_artifact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored,
    NotFound,
}

/// Outcome of [`CacheRepository::save_build`] (spec.md §4.6's at-most-one-
/// writer contract).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// Another writer already holds or has completed the save for this
    /// `(moduleId, fingerprint)`.
    Skipped,
}

pub struct CacheRepository<'a> {
    session: &'a CacheSession,
}

impl<'a> CacheRepository<'a> {
    pub fn new(session: &'a CacheSession) -> Self {
        Self { session }
    }

    /// Local store first; if absent and a remote store is configured, look
    /// there, and copy a found record into the local store atomically so
    /// subsequent lookups hit locally (spec.md §4.6).
    #[instrument(skip(self))]
    pub async fn find_build(&self, module_id: &ModuleId, fingerprint_hex: &str) -> Result<Option<BuildRecord>> {
        let record_path = self.record_dir(module_id, fingerprint_hex).join("build.xml");

        match tokio::fs::read_to_string(&record_path).await {
            Ok(xml) => return Ok(Some(BuildRecord::from_xml(&xml)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %record_path.display(), error = %e, "local store read failed; treating as absent");
                return Ok(None);
            }
        }

        let Some(remote) = self.session.remote_client() else {
            return Ok(None);
        };

        match remote.get_build(module_id, fingerprint_hex).await {
            Ok(Some(record)) => {
                self.copy_record_to_local(&record_path, &record).await;
                Ok(Some(record))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(%module_id, fingerprint_hex, error = %e, "remote build lookup failed; treating as absent");
                Ok(None)
            }
        }
    }

    async fn copy_record_to_local(&self, record_path: &Path, record: &BuildRecord) {
        let Some(parent) = record_path.parent() else { return };
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            warn!(path = %parent.display(), error = %e, "failed to create local record dir for remote copy");
            return;
        }
        let Ok(xml) = record.to_xml() else { return };
        let temp = record_path.with_extension(format!("tmp.{}", Uuid::new_v4()));
        if tokio::fs::write(&temp, &xml).await.is_ok() {
            if let Err(e) = tokio::fs::rename(&temp, record_path).await {
                warn!(path = %record_path.display(), error = %e, "failed to promote remote record into local store");
                let _ = tokio::fs::remove_file(&temp).await;
            }
        }
    }

    /// Transfers artifact bytes from the store (local, falling back to
    /// remote) to `target_path`, verifying the content digest after
    /// transfer (spec.md §4.6). The local store's own `get` already rejects
    /// a mismatching digest with [`CacheError::Integrity`].
    #[instrument(skip(self, record))]
    pub async fn restore_artifact(&self, record: &BuildRecord, artifact: &ArtifactEntry, target_path: &Path) -> Result<RestoreOutcome> {
        let algorithm = Algorithm::parse(&record.hash_algorithm)
            .map_err(|e| CacheError::Configuration { message: e.to_string() })?;
        let fingerprint = Fingerprint::from_hex(algorithm, &artifact.content_digest)
            .map_err(|e| CacheError::Configuration { message: format!("invalid content digest: {e}") })?;

        let bytes = match self.session.local_store().get(&fingerprint).await? {
            Some(bytes) => Some(bytes),
            None => match self.session.remote_client() {
                Some(remote) => match remote.get_blob(&fingerprint).await {
                    Ok(Some(bytes)) => {
                        let _ = self.session.local_store().put(&fingerprint, &bytes).await;
                        Some(bytes)
                    }
                    Ok(None) => None,
                    Err(e) => {
                        warn!(%fingerprint, error = %e, "remote artifact fetch failed; treating as absent");
                        None
                    }
                },
                None => None,
            },
        };

        let Some(bytes) = bytes else { return Ok(RestoreOutcome::NotFound) };

        if let Some(parent) = target_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CacheError::StoreIo { op: "mkdir", path: parent.display().to_string(), source: e })?;
        }
        tokio::fs::write(target_path, &bytes)
            .await
            .map_err(|e| CacheError::StoreIo { op: "write-artifact", path: target_path.display().to_string(), source: e })?;

        Ok(RestoreOutcome::Restored)
    }

    /// Writes artifact blobs, then the `BuildRecord` XML last (spec.md §4.6:
    /// "the record is written last so a reader observing the record is
    /// guaranteed to also find every artifact it references"). Enforces
    /// at-most-one-writer: the record's own existence is the permanent
    /// marker; a transient lock file guards only the narrow race between
    /// concurrent writers racing to create it.
    #[instrument(skip(self, record, produced_artifacts))]
    pub async fn save_build(&self, record: &BuildRecord, produced_artifacts: &[(ArtifactEntry, Vec<u8>)]) -> Result<SaveOutcome> {
        let algorithm = Algorithm::parse(&record.hash_algorithm)
            .map_err(|e| CacheError::Configuration { message: e.to_string() })?;

        for (artifact, bytes) in produced_artifacts {
            let fingerprint = Fingerprint::from_hex(algorithm, &artifact.content_digest)
                .map_err(|e| CacheError::Configuration { message: format!("invalid content digest: {e}") })?;
            self.session.local_store().put(&fingerprint, bytes).await?;
            if self.session.save_to_remote() {
                if let Some(remote) = self.session.remote_client() {
                    if let Err(e) = remote.put_blob(&fingerprint, bytes.clone()).await {
                        warn!(%fingerprint, error = %e, "remote artifact save failed; local save still proceeds");
                    }
                }
            }
        }

        let record_dir = self.record_dir(&record.module_id, &record.fingerprint);
        let record_path = record_dir.join("build.xml");

        if tokio::fs::metadata(&record_path).await.is_ok() {
            return Ok(SaveOutcome::Skipped);
        }

        let (lock, outcome) = WriteLock::acquire(&record_dir).await?;
        if outcome == LockOutcome::AlreadyHeld {
            return Ok(SaveOutcome::Skipped);
        }

        let xml = record.to_xml()?;
        let result = tokio::fs::write(&record_path, xml).await;
        drop(lock);
        result.map_err(|e| CacheError::StoreIo { op: "write-record", path: record_path.display().to_string(), source: e })?;

        if self.session.save_to_remote() {
            if let Some(remote) = self.session.remote_client() {
                if let Err(e) = remote.put_build(&record.module_id, &record.fingerprint, record).await {
                    warn!(module_id = %record.module_id, error = %e, "remote build record save failed; local save still succeeded");
                }
            }
        }

        Ok(SaveOutcome::Saved)
    }

    /// One-shot per top-level build (spec.md §4.6, §4.10).
    #[instrument(skip(self, index))]
    pub async fn save_report(&self, index: &ProjectIndex) -> Result<()> {
        let reports_dir = self.session.local_store().root().join("reports");
        tokio::fs::create_dir_all(&reports_dir)
            .await
            .map_err(|e| CacheError::StoreIo { op: "mkdir", path: reports_dir.display().to_string(), source: e })?;

        let path = reports_dir.join(format!("{}.xml", index.build_id));
        let xml = index.to_xml()?;
        let temp = path.with_extension(format!("tmp.{}", Uuid::new_v4()));
        tokio::fs::write(&temp, &xml)
            .await
            .map_err(|e| CacheError::StoreIo { op: "write-report", path: temp.display().to_string(), source: e })?;
        tokio::fs::rename(&temp, &path)
            .await
            .map_err(|e| CacheError::StoreIo { op: "rename-report", path: path.display().to_string(), source: e })?;

        if let Some(remote) = self.session.remote_client() {
            if self.session.save_to_remote() {
                if let Err(e) = remote.put_report(&index.build_id, index).await {
                    warn!(build_id = %index.build_id, error = %e, "remote report save failed; local report still succeeded");
                }
            }
        }
        Ok(())
    }

    fn record_dir(&self, module_id: &ModuleId, fingerprint_hex: &str) -> std::path::PathBuf {
        self.session.local_store().record_dir(&module_id.group, &module_id.artifact, fingerprint_hex)
    }
}
