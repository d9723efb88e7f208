//! The error space of the caching engine (spec.md §7).
//!
//! Every recoverable error the engine produces is one of these kinds. Build
//! failures from the driven build itself are not part of this enum: they
//! pass through the caller unchanged.

use std::path::PathBuf;

use derive_more::{Display, Error};

/// A cache engine error, tagged with its recovery class.
///
/// Call sites decide what to do with each kind per spec.md §7: most are
/// logged at `WARN` and degrade the module to a miss or a skipped save;
/// [`CacheError::Integrity`] and [`CacheError::Configuration`] are fatal.
#[derive(Debug, Display, Error)]
pub enum CacheError {
    /// Invalid configuration: unknown hash algorithm, malformed rule. Fatal
    /// at `initialize` time.
    #[display("configuration error: {message}")]
    Configuration {
        message: String,
    },

    /// Reading a module's inputs failed. Degrades the module to MISS with
    /// forced execution.
    #[display("failed to read input {path:?}: {source}")]
    InputIo {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An on-disk digest mismatch during restore. Fatal; the corrupted
    /// record is deleted.
    #[display("integrity check failed for {path:?}: expected {expected}, found {found}")]
    Integrity {
        path: PathBuf,
        expected: String,
        found: String,
    },

    /// A local or remote `BlobStore` operation failed. Reads are treated as
    /// absent; writes become `SAVE_SKIPPED`.
    #[display("store error ({op}) at {path:?}: {source}")]
    StoreIo {
        op: &'static str,
        path: String,
        source: std::io::Error,
    },

    /// A transport-level failure talking to the remote store (connect
    /// timeout, non-2xx response, broken body).
    #[display("remote store transport error: {message}")]
    RemoteTransport { message: String },

    /// A tracked property differed from the reconciliation baseline. Fails
    /// the module only when `failFast` is configured.
    #[display("reconciliation mismatch for property {property}: baseline={baseline} current={current}")]
    Reconciliation {
        property: String,
        baseline: String,
        current: String,
    },

    /// Caching was disabled by configuration; signaled once at
    /// `initialize`. Subsequent API calls become no-ops rather than errors.
    #[display("cache disabled")]
    CacheDisabled,
}

pub type Result<T> = std::result::Result<T, CacheError>;
