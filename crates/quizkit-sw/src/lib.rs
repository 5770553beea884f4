//! # Quizkit Service Worker
//!
//! Offline resource cache controller for the Quizkit quiz app.
//!
//! ## Features
//!
//! - **Install**: pre-populate a versioned cache bucket with the app shell
//! - **Fetch**: cache-first arbitration with write-through population
//! - **Offline fallback**: serve the cached shell document to HTML requests
//! - **Activate**: prune buckets from older versions, claim clients
//!
//! ## Architecture
//!
//! ```text
//! OfflineCacheController
//!     ├── ControllerConfig (version name, scope, preload set)
//!     ├── CacheStorage (dyn)
//!     │       └── CacheBucket
//!     │               └── RequestKey → StoredResponse
//!     ├── Network (dyn)
//!     └── Clients
//! ```
//!
//! The host runtime drives the three lifecycle events; the controller never
//! schedules work of its own.

use thiserror::Error;

pub mod controller;
pub mod disk;
pub mod lifecycle;
pub mod network;
pub mod request;
pub mod storage;

pub use controller::{
    ActivateOutcome, ControllerConfig, FetchOutcome, InstallOutcome, OfflineCacheController,
    DEFAULT_CACHE_NAME, DEFAULT_OFFLINE_FALLBACK, DEFAULT_PRELOAD,
};
pub use disk::DiskCacheStorage;
pub use lifecycle::{Client, Clients, Lifecycle, WorkerState};
pub use network::{HttpNetwork, NetError, Network, NetworkConfig};
pub use request::{CacheMode, Request, RequestKey, Response, ResponseType};
pub use storage::{CacheBucket, CacheStorage, MemoryCacheStorage, StoredResponse};

// ==================== Errors ====================

/// Errors that can occur in cache controller operations.
#[derive(Error, Debug)]
pub enum ServiceWorkerError {
    #[error("Network error: {0}")]
    Network(#[from] NetError),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Response body already used: {0}")]
    BodyUsed(String),

    #[error("Preload of {url} returned status {status}")]
    BadPreloadResponse { url: String, status: u16 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ServiceWorkerError {
    /// Create a cache error.
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache(message.into())
    }
}

/// Result type alias for cache controller operations.
pub type Result<T> = std::result::Result<T, ServiceWorkerError>;
