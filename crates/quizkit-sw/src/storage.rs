//! Cache storage substrate: named buckets of stored responses.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use url::Url;

use crate::request::{RequestKey, Response, ResponseType};
use crate::{Result, ServiceWorkerError};

// ==================== Stored Response ====================

/// Snapshot of a response at the time it was cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResponse {
    /// Final response URL.
    pub url: String,

    /// Response status.
    pub status: u16,

    /// Response headers, in order, repeated names allowed.
    pub headers: Vec<(String, String)>,

    /// Response body.
    pub body: Vec<u8>,

    /// Origin classification.
    pub response_type: ResponseType,

    /// Whether the network followed a redirect.
    pub redirected: bool,

    /// When the snapshot was taken.
    pub cached_at: DateTime<Utc>,
}

impl StoredResponse {
    /// Capture a response, consuming its body.
    pub fn capture(mut response: Response) -> Result<Self> {
        let body = response.take_body()?;
        let headers = response
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Ok(Self {
            url: response.url.to_string(),
            status: response.status.as_u16(),
            headers,
            body: body.to_vec(),
            response_type: response.response_type,
            redirected: response.redirected,
            cached_at: Utc::now(),
        })
    }

    /// Materialize a fresh response with an unconsumed body.
    pub fn to_response(&self) -> Result<Response> {
        let url = Url::parse(&self.url)?;
        let status = StatusCode::from_u16(self.status)
            .map_err(|e| ServiceWorkerError::cache(format!("{}: {}", self.url, e)))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(n), Ok(v)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                headers.append(n, v);
            }
        }

        let mut response = Response::new(url, status, self.body.clone())
            .with_type(self.response_type)
            .with_redirected(self.redirected);
        response.headers = headers;
        response.from_cache = true;
        Ok(response)
    }
}

// ==================== Cache Bucket ====================

/// A named, versioned store of request keys to responses.
#[derive(Debug, Clone)]
pub struct CacheBucket {
    /// Bucket name (the version string).
    pub name: String,

    /// When the bucket was first opened.
    pub created_at: DateTime<Utc>,

    entries: HashMap<RequestKey, StoredResponse>,
}

impl CacheBucket {
    /// Create an empty bucket.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            created_at: Utc::now(),
            entries: HashMap::new(),
        }
    }

    /// Match a request key.
    pub fn get(&self, key: &RequestKey) -> Option<&StoredResponse> {
        self.entries.get(key)
    }

    /// Store a response, replacing any previous one for the key.
    pub fn put(&mut self, key: RequestKey, response: StoredResponse) {
        self.entries.insert(key, response);
    }

    /// All keys, sorted for stable output.
    pub fn keys(&self) -> Vec<RequestKey> {
        let mut keys: Vec<_> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries as a list, for formats without structured map keys.
    pub fn to_entries(&self) -> Vec<(RequestKey, StoredResponse)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Rebuild a bucket from a list of entries.
    pub fn from_entries(
        name: String,
        created_at: DateTime<Utc>,
        entries: Vec<(RequestKey, StoredResponse)>,
    ) -> Self {
        Self {
            name,
            created_at,
            entries: entries.into_iter().collect(),
        }
    }
}

/// Buckets in creation order, shared by the storage implementations.
#[derive(Debug, Default)]
pub(crate) struct Buckets(Vec<CacheBucket>);

impl Buckets {
    pub(crate) fn from_vec(mut buckets: Vec<CacheBucket>) -> Self {
        buckets.sort_by_key(|b| b.created_at);
        Self(buckets)
    }

    pub(crate) fn get(&self, name: &str) -> Option<&CacheBucket> {
        self.0.iter().find(|b| b.name == name)
    }

    /// Returns the bucket and whether it was created by this call.
    pub(crate) fn open(&mut self, name: &str) -> (&mut CacheBucket, bool) {
        match self.0.iter().position(|b| b.name == name) {
            Some(index) => (&mut self.0[index], false),
            None => {
                self.0.push(CacheBucket::new(name));
                let last = self.0.len() - 1;
                (&mut self.0[last], true)
            }
        }
    }

    pub(crate) fn remove(&mut self, name: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|b| b.name != name);
        self.0.len() != before
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.0.iter().map(|b| b.name.clone()).collect()
    }

    /// First match across buckets, oldest bucket first.
    pub(crate) fn match_any(&self, key: &RequestKey) -> Option<&StoredResponse> {
        self.0.iter().find_map(|b| b.get(key))
    }
}

// ==================== Cache Storage ====================

/// Persistent mapping from bucket names to buckets.
///
/// Every operation is a suspension point. Concurrent writes to the same key
/// are unordered; the last write wins.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a bucket, creating it if it doesn't exist.
    async fn open(&self, name: &str) -> Result<()>;

    /// Check if a bucket exists.
    async fn has(&self, name: &str) -> Result<bool>;

    /// All bucket names, in creation order.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Delete a bucket. Deleting an absent bucket returns `Ok(false)`.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Store one entry, opening the bucket if needed.
    async fn put(&self, name: &str, key: RequestKey, response: StoredResponse) -> Result<()> {
        self.put_all(name, vec![(key, response)]).await
    }

    /// Store a batch of entries; either all land or none do.
    async fn put_all(&self, name: &str, entries: Vec<(RequestKey, StoredResponse)>) -> Result<()>;

    /// Match a key within one bucket.
    async fn match_in(&self, name: &str, key: &RequestKey) -> Result<Option<StoredResponse>>;

    /// Match a key across every bucket.
    async fn match_any(&self, key: &RequestKey) -> Result<Option<StoredResponse>>;

    /// Keys stored in one bucket; empty if the bucket doesn't exist.
    async fn bucket_keys(&self, name: &str) -> Result<Vec<RequestKey>>;
}

/// In-memory cache storage.
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    buckets: RwLock<Buckets>,
}

impl MemoryCacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<()> {
        self.buckets.write().await.open(name);
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(self.buckets.read().await.get(name).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.buckets.read().await.names())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.buckets.write().await.remove(name))
    }

    async fn put_all(&self, name: &str, entries: Vec<(RequestKey, StoredResponse)>) -> Result<()> {
        let mut buckets = self.buckets.write().await;
        let (bucket, _) = buckets.open(name);
        for (key, response) in entries {
            bucket.put(key, response);
        }
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
