//! Disk-backed cache storage.
//!
//! Each bucket lives in its own JSON file so buckets survive restarts until
//! they are explicitly deleted.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::request::RequestKey;
use crate::storage::{Buckets, CacheBucket, CacheStorage, StoredResponse};
use crate::Result;

const BUCKET_EXTENSION: &str = "json";

/// On-disk layout of one bucket.
#[derive(Debug, Serialize, Deserialize)]
struct BucketFile {
    name: String,
    created_at: DateTime<Utc>,
    entries: Vec<(RequestKey, StoredResponse)>,
}

impl From<&CacheBucket> for BucketFile {
    fn from(bucket: &CacheBucket) -> Self {
        Self {
            name: bucket.name.clone(),
            created_at: bucket.created_at,
            entries: bucket.to_entries(),
        }
    }
}

/// Cache storage persisted under a directory.
#[derive(Debug)]
pub struct DiskCacheStorage {
    dir: PathBuf,
    buckets: RwLock<Buckets>,
}

impl DiskCacheStorage {
    /// Open the storage directory, loading every bucket found in it.
    ///
    /// Unreadable bucket files are skipped with a warning.
    pub async fn open_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;

        let mut loaded = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(BUCKET_EXTENSION) {
                continue;
            }
            match read_bucket(&path).await {
                Ok(bucket) => loaded.push(bucket),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable cache bucket"),
            }
        }

        debug!(dir = %dir.display(), buckets = loaded.len(), "Cache storage opened");

        Ok(Self {
            dir,
            buckets: RwLock::new(Buckets::from_vec(loaded)),
        })
    }

    /// Storage directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn bucket_path(&self, name: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", urlencoding::encode(name), BUCKET_EXTENSION))
    }

    async fn write_bucket(&self, bucket: &CacheBucket) -> Result<()> {
        let path = self.bucket_path(&bucket.name);
        let tmp = path.with_extension("tmp");
        let json = serde_json::to_vec(&BucketFile::from(bucket))?;
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

async fn read_bucket(path: &Path) -> Result<CacheBucket> {
    let bytes = fs::read(path).await?;
    let file: BucketFile = serde_json::from_slice(&bytes)?;
    Ok(CacheBucket::from_entries(
        file.name,
        file.created_at,
        file.entries,
    ))
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn open(&self, name: &str) -> Result<()> {
        let mut buckets = self.buckets.write().await;
        let (bucket, created) = buckets.open(name);
        if created {
            self.write_bucket(bucket).await?;
        }
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(self.buckets.read().await.get(name).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.buckets.read().await.names())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let mut buckets = self.buckets.write().await;
        // The file goes first; memory only forgets buckets with no file.
        match fs::remove_file(self.bucket_path(name)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(buckets.remove(name))
    }

    async fn put_all(&self, name: &str, entries: Vec<(RequestKey, StoredResponse)>) -> Result<()> {
        let mut buckets = self.buckets.write().await;
        let (bucket, _) = buckets.open(name);

        // Write a staged copy first so a failed write leaves memory untouched.
        let mut staged = bucket.clone();
        for (key, response) in entries {
            staged.put(key, response);
        }
        self.write_bucket(&staged).await?;
        *bucket = staged;
        Ok(())
    }

    async fn match_in(&self, name: &str, key: &RequestKey) -> Result<Option<StoredResponse>> {
        let buckets = self.buckets.read().await;
        Ok(buckets.get(name).and_then(|b| b.get(key)).cloned())
    }

    async fn match_any(&self, key: &RequestKey) -> Result<Option<StoredResponse>> {
        Ok(self.buckets.read().await.match_any(key).cloned())
    }

    async fn bucket_keys(&self, name: &str) -> Result<Vec<RequestKey>> {
        let buckets = self.buckets.read().await;
        Ok(buckets.get(name).map(|b| b.keys()).unwrap_or_default())
    }
}
