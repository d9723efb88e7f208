//! Remote `BlobStore` (spec.md §4.5), a thin adapter over
//! [`buildcache_client::RemoteClient`] so `BlobStoreKind` can dispatch to it
//! the same way it dispatches to [`crate::LocalBlobStore`].

use buildcache_client::RemoteClient;
use buildcache_core::error::Result;
use buildcache_core::hash::Fingerprint;

#[derive(Clone)]
pub struct RemoteBlobStore {
    client: RemoteClient,
}

impl RemoteBlobStore {
    pub fn new(client: RemoteClient) -> Self {
        Self { client }
    }

    pub async fn exists(&self, fingerprint: &Fingerprint) -> Result<bool> {
        Ok(self.client.get_blob(fingerprint).await?.is_some())
    }

    pub async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Vec<u8>>> {
        self.client.get_blob(fingerprint).await
    }

    pub async fn put(&self, fingerprint: &Fingerprint, content: &[u8]) -> Result<bool> {
        self.client.put_blob(fingerprint, content.to_vec()).await
    }
}
