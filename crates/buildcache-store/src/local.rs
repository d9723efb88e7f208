//! Local filesystem `BlobStore` (spec.md §4.5).
//!
//! Blobs are content-addressed under `{root}/{key[0..2]}/{key[2..4]}/{key}`,
//! the same two-level hex-prefix layout used on the remote side (spec.md §6),
//! so the on-disk representation never needs translating between the two.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use async_compression::Level;
use async_compression::tokio::bufread::ZstdDecoder;
use async_compression::tokio::write::ZstdEncoder;
use tokio::fs::{File, create_dir_all, metadata, read_dir, remove_dir_all, remove_file, rename};
use tokio::io::{AsyncWriteExt, BufReader};
use tracing::{instrument, warn};
use uuid::Uuid;

use buildcache_core::error::{CacheError, Result};
use buildcache_core::hash::{Algorithm, Fingerprint};

const DEFAULT_BUF_SIZE: usize = 64 * 1024;

/// Local blob storage rooted at a configured directory (spec.md §4.5,
/// `configuration.local.directory`).
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        let hex = fingerprint.to_hex();
        let prefix1: String = hex.chars().take(2).collect();
        let prefix2: String = hex.chars().skip(2).take(2).collect();
        self.root.join("cas").join(prefix1).join(prefix2).join(hex)
    }

    /// The directory a fingerprint's `BuildRecord` and attached artifacts
    /// live under, used by the caller's LRU eviction (spec.md §5) and by
    /// `CacheRepository`'s at-most-one-writer lock (spec.md §4.6).
    pub fn record_dir(&self, group: &str, artifact: &str, fingerprint_hex: &str) -> PathBuf {
        self.root.join("records").join(group).join(artifact).join(fingerprint_hex)
    }

    #[instrument(skip(self))]
    pub async fn exists(&self, fingerprint: &Fingerprint) -> Result<bool> {
        let path = self.blob_path(fingerprint);
        match metadata(&path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::StoreIo { op: "exists", path: path.display().to_string(), source: e }),
        }
    }

    #[instrument(skip(self))]
    pub async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Vec<u8>>> {
        let path = self.blob_path(fingerprint);
        let file = match File::open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::StoreIo { op: "get", path: path.display().to_string(), source: e }),
        };

        let reader = BufReader::new(file);
        let mut decoder = BufReader::with_capacity(DEFAULT_BUF_SIZE, ZstdDecoder::new(reader));
        let mut buffer = Vec::new();
        tokio::io::copy(&mut decoder, &mut buffer)
            .await
            .map_err(|e| CacheError::StoreIo { op: "decompress", path: path.display().to_string(), source: e })?;

        let restored = Fingerprint::from_hex(fingerprint.algorithm(), &hash_bytes(fingerprint.algorithm(), &buffer))
            .ok();
        if restored.as_ref() != Some(fingerprint) {
            return Err(CacheError::Integrity {
                path: path.clone(),
                expected: fingerprint.to_hex(),
                found: hash_bytes(fingerprint.algorithm(), &buffer),
            });
        }

        Ok(Some(buffer))
    }

    /// Write `content`, returning `true` if newly written, `false` if the
    /// blob already existed (spec.md §4.5 put overwrite semantics: an
    /// existing blob under the same content-addressed key is never
    /// rewritten, since its bytes are definitionally identical).
    #[instrument(skip(self, content))]
    pub async fn put(&self, fingerprint: &Fingerprint, content: &[u8]) -> Result<bool> {
        let path = self.blob_path(fingerprint);
        if self.exists(fingerprint).await? {
            return Ok(false);
        }

        if let Some(parent) = path.parent() {
            create_dir_all(parent)
                .await
                .map_err(|e| CacheError::StoreIo { op: "mkdir", path: parent.display().to_string(), source: e })?;
        }

        let temp = temp_path(&path);
        let file = File::create(&temp)
            .await
            .map_err(|e| CacheError::StoreIo { op: "create-temp", path: temp.display().to_string(), source: e })?;

        let mut encoder = ZstdEncoder::with_quality(file, Level::Default);
        tokio::io::copy(&mut Cursor::new(content), &mut encoder)
            .await
            .map_err(|e| CacheError::StoreIo { op: "compress", path: temp.display().to_string(), source: e })?;
        encoder
            .shutdown()
            .await
            .map_err(|e| CacheError::StoreIo { op: "flush", path: temp.display().to_string(), source: e })?;

        match rename(&temp, &path).await {
            Ok(()) => Ok(true),
            Err(e) => {
                if let Err(cleanup_err) = remove_file(&temp).await {
                    warn!(path = %temp.display(), error = %cleanup_err, "failed to remove temp file");
                }
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    Ok(false)
                } else {
                    Err(CacheError::StoreIo { op: "rename", path: path.display().to_string(), source: e })
                }
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, fingerprint: &Fingerprint) -> Result<()> {
        let path = self.blob_path(fingerprint);
        match remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::StoreIo { op: "delete", path: path.display().to_string(), source: e }),
        }
    }

    /// LRU-evict record directories by mtime, keeping the `keep` most
    /// recently touched (spec.md §5: "eviction is LRU by record mtime and
    /// never deletes a record currently referenced by the ongoing build").
    /// `exclude` names record directories the caller is actively using.
    #[instrument(skip(self, exclude))]
    pub async fn evict_lru(&self, keep: usize, exclude: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let records_root = self.root.join("records");
        let mut dirs = Vec::new();
        collect_leaf_dirs(&records_root, &mut dirs).await?;

        let mut with_mtime = Vec::with_capacity(dirs.len());
        for dir in dirs {
            if exclude.contains(&dir) {
                continue;
            }
            let meta = metadata(&dir)
                .await
                .map_err(|e| CacheError::StoreIo { op: "stat", path: dir.display().to_string(), source: e })?;
            let mtime = meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            with_mtime.push((dir, mtime));
        }
        with_mtime.sort_by(|a, b| b.1.cmp(&a.1));

        let mut evicted = Vec::new();
        for (dir, _) in with_mtime.into_iter().skip(keep) {
            remove_dir_all(&dir)
                .await
                .map_err(|e| CacheError::StoreIo { op: "evict", path: dir.display().to_string(), source: e })?;
            evicted.push(dir);
        }
        Ok(evicted)
    }
}

async fn collect_leaf_dirs(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries = match read_dir(dir).await {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(CacheError::StoreIo { op: "readdir", path: dir.display().to_string(), source: e }),
    };

    let mut subdirs = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| CacheError::StoreIo { op: "readdir", path: dir.display().to_string(), source: e })?
    {
        if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            subdirs.push(entry.path());
        }
    }

    if subdirs.is_empty() {
        return Ok(());
    }

    // A record dir has a `build.xml` sibling to its artifacts; a group/artifact
    // directory only has further subdirectories. Distinguish by probing for
    // the build record file one level down.
    for subdir in subdirs {
        if metadata(subdir.join("build.xml")).await.is_ok() {
            out.push(subdir);
        } else {
            Box::pin(collect_leaf_dirs(&subdir, out)).await?;
        }
    }
    Ok(())
}

fn temp_path(target: &Path) -> PathBuf {
    let mut temp = target.as_os_str().to_owned();
    temp.push(".tmp.");
    temp.push(Uuid::new_v4().to_string());
    PathBuf::from(temp)
}

fn hash_bytes(algorithm: Algorithm, bytes: &[u8]) -> String {
    buildcache_core::hash::HashEngine::new(algorithm).hash(bytes).to_hex()
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildcache_core::hash::HashEngine;

    fn engine() -> HashEngine {
        HashEngine::new(Algorithm::Blake3)
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        let content = b"hello world";
        let fp = engine().hash(content);

        let newly_written = store.put(&fp, content).await.unwrap();
        assert!(newly_written);

        let restored = store.get(&fp).await.unwrap().unwrap();
        assert_eq!(restored, content);
    }

    #[tokio::test]
    async fn put_is_idempotent_for_identical_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        let content = b"same content";
        let fp = engine().hash(content);

        assert!(store.put(&fp, content).await.unwrap());
        assert!(!store.put(&fp, content).await.unwrap());
    }

    #[tokio::test]
    async fn get_missing_blob_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        let fp = engine().hash(b"never written");
        assert!(store.get(&fp).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_removes_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        let content = b"to be deleted";
        let fp = engine().hash(content);

        store.put(&fp, content).await.unwrap();
        store.delete(&fp).await.unwrap();
        assert!(store.get(&fp).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn evict_lru_keeps_most_recently_touched_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        for (i, fingerprint) in ["aaaa", "bbbb", "cccc"].iter().enumerate() {
            let record_dir = store.record_dir("org.example", "app", fingerprint);
            tokio::fs::create_dir_all(&record_dir).await.unwrap();
            tokio::fs::write(record_dir.join("build.xml"), b"<buildInfo/>").await.unwrap();
            let mtime = filetime::FileTime::from_unix_time(1_700_000_000 + i as i64, 0);
            filetime::set_file_mtime(&record_dir, mtime).unwrap();
        }

        let evicted = store.evict_lru(2, &[]).await.unwrap();
        assert_eq!(evicted.len(), 1);
        assert!(evicted[0].ends_with("aaaa"));
        assert!(store.record_dir("org.example", "app", "bbbb").exists());
        assert!(store.record_dir("org.example", "app", "cccc").exists());
    }
}
