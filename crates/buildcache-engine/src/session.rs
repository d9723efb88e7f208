//! `initialize(session)` (spec.md §6) and the `CacheSession` handle it
//! returns (spec.md §4.0's ambient addition): the single owner of parsed
//! configuration, the configured hash algorithm, both `BlobStore`s, and the
//! cross-module fingerprint index. Grounded on `hurry`'s `CargoCache::open_*`
//! constructors, generalized from Cargo-specific remote/local modes to the
//! single struct spec.md's redesign flags call for (no process-wide globals).

use std::path::Path;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{info, instrument, warn};

use buildcache_client::RemoteClient;
use buildcache_core::config::{CacheProperties, ConfigModel};
use buildcache_core::error::{CacheError, Result};
use buildcache_core::hash::{Algorithm, Fingerprint, HashEngine};
use buildcache_core::model::ModuleId;
use buildcache_core::CACHE_IMPLEMENTATION_VERSION;
use buildcache_store::LocalBlobStore;

/// Outcome of `initialize` (spec.md §6): caching is either disabled for the
/// whole build, or returns the handle every other operation is a method on.
pub enum InitOutcome {
    Disabled,
    Initialized(CacheSession),
}

/// Owns everything a build needs to talk to the cache: parsed
/// configuration, the selected hash algorithm, the local store (always) and
/// remote store (optional), and the append-only module→fingerprint index
/// shared across the reactor's workers (spec.md §5).
pub struct CacheSession {
    pub(crate) config: ConfigModel,
    pub(crate) properties: CacheProperties,
    pub(crate) hash_engine: HashEngine,
    pub(crate) local_store: LocalBlobStore,
    pub(crate) remote_client: Option<RemoteClient>,
    fingerprint_index: DashMap<ModuleId, Fingerprint>,
}

impl CacheSession {
    /// Reads configuration at `<multimoduleRoot>/.mvn/maven-cache-config.xml`
    /// unless overridden by `remote.cache.configPath` (spec.md §6). `raw`
    /// carries the `remote.cache.*` properties recognized at initialize time.
    #[instrument(skip(raw))]
    pub async fn initialize(multimodule_root: &Path, raw: &std::collections::BTreeMap<String, String>) -> Result<InitOutcome> {
        let properties = CacheProperties::from_raw(raw);
        if !properties.enabled {
            info!("cache disabled by remote.cache.enabled=false");
            return Ok(InitOutcome::Disabled);
        }

        let config_path = properties
            .config_path
            .clone()
            .unwrap_or_else(|| multimodule_root.join(".mvn").join("maven-cache-config.xml"));

        let config = match tokio::fs::read_to_string(&config_path).await {
            Ok(xml) => ConfigModel::parse_xml(&xml)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ConfigModel::default(),
            Err(e) => {
                return Err(CacheError::Configuration {
                    message: format!("read {}: {e}", config_path.display()),
                });
            }
        };

        let algorithm = Algorithm::parse(&config.configuration.hash_algorithm)
            .map_err(|e| CacheError::Configuration { message: e.to_string() })?;
        let hash_engine = HashEngine::new(algorithm);

        let local_dir = config
            .configuration
            .local
            .directory
            .clone()
            .unwrap_or_else(|| multimodule_root.join(".mvn").join("cache"));
        let local_store = LocalBlobStore::new(local_dir);

        let remote_client = match &config.configuration.remote {
            Some(remote_cfg) => {
                let url = url::Url::parse(&remote_cfg.url).map_err(|e| CacheError::Configuration {
                    message: format!("invalid remote store url {:?}: {e}", remote_cfg.url),
                })?;
                Some(RemoteClient::new(
                    url,
                    Duration::from_millis(remote_cfg.connect_timeout_ms),
                    Duration::from_millis(remote_cfg.request_timeout_ms),
                    remote_cfg.offline,
                )?)
            }
            None => None,
        };

        Ok(InitOutcome::Initialized(Self {
            config,
            properties,
            hash_engine,
            local_store,
            remote_client,
            fingerprint_index: DashMap::new(),
        }))
    }

    pub fn config(&self) -> &ConfigModel {
        &self.config
    }

    pub fn properties(&self) -> &CacheProperties {
        &self.properties
    }

    pub fn hash_engine(&self) -> &HashEngine {
        &self.hash_engine
    }

    pub fn local_store(&self) -> &LocalBlobStore {
        &self.local_store
    }

    pub fn remote_client(&self) -> Option<&RemoteClient> {
        self.remote_client.as_ref()
    }

    pub fn save_to_remote(&self) -> bool {
        self.remote_client.is_some()
            && self.config.configuration.remote.as_ref().is_some_and(|r| r.save_to_remote)
            && self.properties.save_enabled
    }

    pub fn cache_implementation_version(&self) -> &'static str {
        CACHE_IMPLEMENTATION_VERSION
    }

    /// Publishes a module's fingerprint to the shared index (spec.md §4.4,
    /// §5): "a module's ProjectFingerprinter is allowed to start only after
    /// every upstream module has ... published its fingerprint". Readers
    /// observe the value only after this call returns (DashMap's internal
    /// locking gives the happens-before relation spec.md §5 requires).
    #[instrument(skip(self, fingerprint))]
    pub fn publish_fingerprint(&self, module_id: ModuleId, fingerprint: Fingerprint) {
        self.fingerprint_index.insert(module_id, fingerprint);
    }

    /// Reads an upstream module's published fingerprint, or `None` if it was
    /// never published (skipped or declared ineligible — spec.md §4.4: the
    /// downstream module then itself becomes ineligible).
    pub fn published_fingerprint(&self, module_id: &ModuleId) -> Option<Fingerprint> {
        self.fingerprint_index.get(module_id).map(|entry| entry.value().clone())
    }

    /// Declares a module ineligible for caching without publishing a
    /// fingerprint, so downstream readers see an explicit absence rather
    /// than waiting forever (spec.md §4.4, §5 ordering guarantees).
    pub fn declare_ineligible(&self, module_id: &ModuleId) {
        warn!(%module_id, "module declared ineligible; downstream modules will also be ineligible");
        self.fingerprint_index.remove(module_id);
    }

}

/// Builds a session over a temp local store without touching the
/// filesystem for configuration, for tests elsewhere in this crate that
/// only care about a particular [`ConfigModel`].
#[cfg(test)]
pub(crate) fn test_session(config: ConfigModel) -> CacheSession {
    let algorithm = Algorithm::parse(&config.configuration.hash_algorithm).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    std::mem::forget(dir);
    let local_store = LocalBlobStore::new(root);
    CacheSession {
        config,
        properties: CacheProperties::default(),
        hash_engine: HashEngine::new(algorithm),
        local_store,
        remote_client: None,
        fingerprint_index: DashMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn initialize_defaults_to_enabled_with_empty_config() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = CacheSession::initialize(dir.path(), &Default::default()).await.unwrap();
        assert!(matches!(outcome, InitOutcome::Initialized(_)));
    }

    #[tokio::test]
    async fn initialize_honors_disabled_property() {
        let dir = tempfile::tempdir().unwrap();
        let mut raw = std::collections::BTreeMap::new();
        raw.insert("remote.cache.enabled".to_string(), "false".to_string());
        let outcome = CacheSession::initialize(dir.path(), &raw).await.unwrap();
        assert!(matches!(outcome, InitOutcome::Disabled));
    }

    #[tokio::test]
    async fn fingerprint_publication_is_visible_to_readers() {
        let dir = tempfile::tempdir().unwrap();
        let InitOutcome::Initialized(session) = CacheSession::initialize(dir.path(), &Default::default()).await.unwrap() else {
            panic!("expected initialized session");
        };
        let module_id = ModuleId::new("org.example", "lib", "1.0.0");
        assert!(session.published_fingerprint(&module_id).is_none());

        let fp = session.hash_engine().hash(b"inputs");
        session.publish_fingerprint(module_id.clone(), fp.clone());
        assert_eq!(session.published_fingerprint(&module_id), Some(fp));
    }
}
