//! Content-addressed blob storage (spec.md §4.5) and the at-most-one-writer
//! lock primitive underlying `CacheRepository` saves (spec.md §4.6).
//!
//! The local implementation lives here; the remote implementation wraps
//! `buildcache-client` and is added once that crate's HTTP types exist.

pub mod local;
pub mod lock;
pub mod remote;

use buildcache_core::error::Result;
use buildcache_core::hash::Fingerprint;

pub use local::LocalBlobStore;
pub use lock::{LockOutcome, WriteLock};
pub use remote::RemoteBlobStore;

/// Dispatches to whichever `BlobStore` implementation is configured,
/// mirroring `hurry`'s `CacheBackend` trait with `LocalBackend`/
/// `CourierBackend` implementations behind one enum rather than a trait
/// object (spec.md §4.5's ambient addition).
pub enum BlobStoreKind {
    Local(LocalBlobStore),
    Remote(RemoteBlobStore),
}

impl BlobStoreKind {
    pub async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Vec<u8>>> {
        match self {
            BlobStoreKind::Local(store) => store.get(fingerprint).await,
            BlobStoreKind::Remote(store) => store.get(fingerprint).await,
        }
    }

    pub async fn put(&self, fingerprint: &Fingerprint, content: &[u8]) -> Result<bool> {
        match self {
            BlobStoreKind::Local(store) => store.put(fingerprint, content).await,
            BlobStoreKind::Remote(store) => store.put(fingerprint, content).await,
        }
    }

    pub async fn exists(&self, fingerprint: &Fingerprint) -> Result<bool> {
        match self {
            BlobStoreKind::Local(store) => store.exists(fingerprint).await,
            BlobStoreKind::Remote(store) => store.exists(fingerprint).await,
        }
    }

    /// Local only, per spec.md §4.5: the remote store never deletes content
    /// it was asked to keep.
    pub async fn delete(&self, fingerprint: &Fingerprint) -> Result<()> {
        match self {
            BlobStoreKind::Local(store) => store.delete(fingerprint).await,
            BlobStoreKind::Remote(_) => Ok(()),
        }
    }
}
