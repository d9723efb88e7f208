//! Core types for the build-artifact caching engine: the digest
//! abstraction (spec.md §4.1), the data model (spec.md §3), the typed
//! configuration view (spec.md §4.2), and the error space (spec.md §7).
//!
//! Everything else in the workspace (`buildcache-scan`, `buildcache-store`,
//! `buildcache-engine`, ...) is built on top of these types and has no I/O
//! dependency on this crate beyond what's needed to parse configuration.

pub mod config;
pub mod error;
pub mod hash;
pub mod model;

pub use config::{CacheProperties, ConfigModel};
pub use error::{CacheError, Result};
pub use hash::{Algorithm, Fingerprint, HashEngine, Hasher};
pub use model::{
    ArtifactEntry, BuildId, BuildRecord, Diff, DiffSeverity, InputFileRecord, ModuleId, PluginId,
    Property, PropertyDiffEntry, PropertyList, ProjectIndex, ProjectIndexEntry, SourceTag,
    StepExecutionRecord, UpstreamEntry,
};

/// The cache implementation's own version, embedded in every persisted
/// [`BuildRecord`] and in cache paths (spec.md §4.7, §6). Bumping this
/// invalidates every previously cached record.
pub const CACHE_IMPLEMENTATION_VERSION: &str = "1";

/// Schema version of the persisted XML documents (spec.md §6).
pub const SCHEMA_VERSION: &str = "1";

/// `spec.md` §9: "isProcessPlugins" is documented as an always-true,
/// non-configurable constant; the source's intent for making it
/// configurable was unclear, so this workspace never exposes a knob for it.
pub const PROCESS_PLUGINS: bool = true;
