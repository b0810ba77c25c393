//! Key-value backends.
//!
//! The store only needs `get` and `set` on opaque byte values. There is no
//! transactional isolation between keys; callers that read, modify and write
//! a record serialize through [`crate::KeyLocks`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::Result;

/// Minimal key-value contract.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a value. `Ok(None)` means the key was never written.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;
}

#[async_trait]
impl<T: KvStore + ?Sized> KvStore for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        (**self).set(key, value).await
    }
}

/// In-process backend.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys written so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}

/// File-per-key backend rooted at a data directory.
///
/// File names are the hex SHA-256 of the key, so arbitrary key characters
/// never reach the filesystem. Writes land in a temporary sibling that is
/// fsynced and renamed over the target; readers see the old or the new
/// value, never a torn one.
#[derive(Debug)]
pub struct FileKv {
    root: PathBuf,
    tmp_counter: AtomicU64,
}

impl FileKv {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tmp_counter: AtomicU64::new(0),
        }
    }

    /// Create the data directory if needed.
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.root.join(format!("{}.json", hex::encode(digest)))
    }
}

async fn write_then_rename(tmp: &Path, path: &Path, value: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(tmp)
        .await?;
    file.write_all(value).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(tmp, path).await
}

#[async_trait]
impl KvStore for FileKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let path = self.path_for(key);
        let seq = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("{seq}.tmp"));

        if let Err(e) = write_then_rename(&tmp, &path, &value).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        #[cfg(unix)]
        {
            if let Ok(dir) = fs::File::open(&self.root).await {
                let _ = dir.sync_all().await;
            }
        }

        debug!(key, bytes = value.len(), "Record written");
        Ok(())
    }
}

/// Prefixes every key with a per-deployment namespace.
#[derive(Debug)]
pub struct Namespaced<K> {
    inner: K,
    namespace: String,
}

impl<K: KvStore> Namespaced<K> {
    pub fn new(inner: K, namespace: impl Into<String>) -> Self {
        Self {
            inner,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }
}

#[async_trait]
impl<K: KvStore> KvStore for Namespaced<K> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(&self.scoped(key)).await
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.inner.set(&self.scoped(key), value).await
    }
}
