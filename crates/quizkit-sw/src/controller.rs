//! The offline cache controller: install, fetch and activate handlers.

use std::sync::Arc;

use futures::future::{join_all, try_join_all};
use http::Method;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::lifecycle::{Client, Clients, Lifecycle, WorkerState};
use crate::network::Network;
use crate::request::{CacheMode, Request, RequestKey, Response};
use crate::storage::{CacheStorage, StoredResponse};
use crate::{Result, ServiceWorkerError};

/// Cache version shipped with the quiz. Bump it whenever the preload set or
/// the cached documents change.
pub const DEFAULT_CACHE_NAME: &str = "fußball-quiz-v1";

/// App shell resources cached at install time.
pub const DEFAULT_PRELOAD: &[&str] = &["./", "./index.html", "./manifest.json"];

/// Document served to HTML requests when the network is unreachable.
pub const DEFAULT_OFFLINE_FALLBACK: &str = "./index.html";

// ==================== Configuration ====================

/// Controller configuration.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Version-stamped name of the current bucket.
    pub cache_name: String,
    /// Base URL that preload and fallback paths resolve against.
    pub scope: Url,
    /// Root-relative paths cached at install time, in order.
    pub preload: Vec<String>,
    /// Root-relative path of the offline fallback document.
    pub offline_fallback: String,
}

impl ControllerConfig {
    /// Configuration with the shipped defaults for the given scope.
    pub fn new(scope: Url) -> Self {
        Self {
            cache_name: DEFAULT_CACHE_NAME.to_string(),
            scope,
            preload: DEFAULT_PRELOAD.iter().map(|p| p.to_string()).collect(),
            offline_fallback: DEFAULT_OFFLINE_FALLBACK.to_string(),
        }
    }

    /// Set the cache version name.
    pub fn with_cache_name(mut self, name: impl Into<String>) -> Self {
        self.cache_name = name.into();
        self
    }

    /// Replace the preload set.
    pub fn with_preload<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preload = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Set the offline fallback document.
    pub fn with_offline_fallback(mut self, path: impl Into<String>) -> Self {
        self.offline_fallback = path.into();
        self
    }

    /// Resolve a root-relative path against the scope.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        Ok(self.scope.join(path)?)
    }

    /// Cache-bypassing requests for the preload set.
    pub fn preload_requests(&self) -> Result<Vec<Request>> {
        self.preload
            .iter()
            .map(|path| Ok(Request::get(self.resolve(path)?).cache_mode(CacheMode::Reload)))
            .collect()
    }
}

// ==================== Outcomes ====================

/// Result of the install event. Preload failures never fail the install.
#[derive(Debug)]
pub enum InstallOutcome {
    /// Every preload resource was stored.
    Completed { cached: usize },
    /// The preload batch failed; nothing from it was stored.
    PreloadFailed(ServiceWorkerError),
}

impl InstallOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Decision for an intercepted request.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Not handled; the host sends the request to the network untouched.
    Passthrough(Request),
    /// Respond with this response.
    Respond(Response),
}

impl FetchOutcome {
    /// The response, if the controller produced one.
    pub fn into_response(self) -> Option<Response> {
        match self {
            Self::Respond(response) => Some(response),
            Self::Passthrough(_) => None,
        }
    }
}

/// Result of the activate event. Failed deletions never block activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateOutcome {
    /// Buckets removed because their version is stale.
    pub deleted: Vec<String>,
    /// Stale buckets whose deletion failed.
    pub failed: Vec<String>,
    /// Clients that switched to this controller.
    pub claimed: usize,
}

// ==================== Controller ====================

/// Versioned offline cache controller.
///
/// The host runtime calls [`on_install`](Self::on_install) once, then
/// [`on_activate`](Self::on_activate), then [`on_fetch`](Self::on_fetch) for
/// every outgoing request. Fetches are handled independently; two misses for
/// the same URL may both write, and the last write wins.
pub struct OfflineCacheController {
    config: ControllerConfig,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    lifecycle: RwLock<Lifecycle>,
    clients: RwLock<Clients>,
}

impl OfflineCacheController {
    pub fn new(
        config: ControllerConfig,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
    ) -> Self {
        Self {
            config,
            storage,
            network,
            lifecycle: RwLock::new(Lifecycle::default()),
            clients: RwLock::new(Clients::new()),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    pub async fn state(&self) -> WorkerState {
        self.lifecycle.read().await.state()
    }

    pub async fn skip_waiting_requested(&self) -> bool {
        self.lifecycle.read().await.skip_waiting_requested()
    }

    /// Register a page the host has opened.
    pub async fn add_client(&self, client: Client) {
        self.clients.write().await.add(client);
    }

    /// Number of clients controlled by this version.
    pub async fn controlled_clients(&self) -> usize {
        self.clients
            .read()
            .await
            .controlled_by(&self.config.cache_name)
            .len()
    }

    /// Mark this controller as replaced by a newer version.
    pub async fn mark_redundant(&self) {
        self.lifecycle.write().await.set_state(WorkerState::Redundant);
    }

    // ==================== Install ====================

    /// Handle the install event: pre-populate the current bucket.
    pub async fn on_install(&self) -> InstallOutcome {
        self.lifecycle.write().await.set_state(WorkerState::Installing);

        let outcome = match self.precache().await {
            Ok(cached) => {
                info!(cache = %self.config.cache_name, cached, "Cache opened and preloaded");
                InstallOutcome::Completed { cached }
            }
            Err(e) => {
                warn!(cache = %self.config.cache_name, error = %e, "Preloading cache failed");
                InstallOutcome::PreloadFailed(e)
            }
        };

        let mut lifecycle = self.lifecycle.write().await;
        lifecycle.set_state(WorkerState::Installed);
        lifecycle.skip_waiting();
        outcome
    }

    async fn precache(&self) -> Result<usize> {
        let name = &self.config.cache_name;
        self.storage.open(name).await?;

        let requests = self.config.preload_requests()?;
        let fetches = requests.iter().map(|request| async move {
            let response = self.network.fetch(request).await?;
            if !response.ok() {
                return Err(ServiceWorkerError::BadPreloadResponse {
                    url: request.url.to_string(),
                    status: response.status.as_u16(),
                });
            }
            Ok::<_, ServiceWorkerError>((request.key(), StoredResponse::capture(response)?))
        });

        // All-or-nothing: nothing is stored unless every fetch succeeded.
        let entries = try_join_all(fetches).await?;
        let cached = entries.len();
        self.storage.put_all(name, entries).await?;
        Ok(cached)
    }

    // ==================== Fetch ====================

    /// Handle an intercepted request.
    ///
    /// Cached entries always win over the network and are never revalidated.
    pub async fn on_fetch(&self, request: Request) -> Result<FetchOutcome> {
        if request.method != Method::GET {
            return Ok(FetchOutcome::Passthrough(request));
        }
        if !self.lifecycle.read().await.is_active() {
            debug!(url = %request.url, "Controller not active, passing through");
            return Ok(FetchOutcome::Passthrough(request));
        }

        let key = request.key();
        if let Some(stored) = self.storage.match_any(&key).await? {
            debug!(url = %request.url, "Cache hit");
            return Ok(FetchOutcome::Respond(stored.to_response()?));
        }

        match self.network.fetch(&request).await {
            Ok(response) => Ok(FetchOutcome::Respond(
                self.write_through(key, response).await,
            )),
            Err(e) => {
                debug!(url = %request.url, error = %e, "Network fetch failed");
                self.offline_fallback(&request)
                    .await?
                    .map(FetchOutcome::Respond)
                    .ok_or(ServiceWorkerError::Network(e))
            }
        }
    }

    /// Store a copy of a cacheable response and hand back the original.
    async fn write_through(&self, key: RequestKey, response: Response) -> Response {
        if !response.is_cacheable() {
            return response;
        }

        let stored = response.duplicate().and_then(StoredResponse::capture);
        let result = match stored {
            Ok(stored) => {
                self.storage
                    .put(&self.config.cache_name, key, stored)
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(url = %response.url, error = %e, "Failed to cache response");
        }
        response
    }

    /// Cached shell document for HTML requests, if there is one.
    async fn offline_fallback(&self, request: &Request) -> Result<Option<Response>> {
        if !request.accepts_html() {
            return Ok(None);
        }
        let key = RequestKey::get(&self.config.resolve(&self.config.offline_fallback)?);
        match self.storage.match_any(&key).await? {
            Some(stored) => {
                info!(url = %request.url, fallback = %key, "Serving offline fallback");
                Ok(Some(stored.to_response()?))
            }
            None => Ok(None),
        }
    }

    // ==================== Activate ====================

    /// Handle the activate event: delete stale buckets, then claim clients.
    ///
    /// Only listing the buckets can fail; a failed deletion is logged and
    /// reported in the outcome.
    pub async fn on_activate(&self) -> Result<ActivateOutcome> {
        self.lifecycle.write().await.set_state(WorkerState::Activating);

        let current = &self.config.cache_name;
        let stale: Vec<String> = self
            .storage
            .keys()
            .await?
            .into_iter()
            .filter(|name| name != current)
            .collect();

        let deletions = stale.iter().map(|name| async move {
            info!(cache = %name, "Deleting stale cache");
            (name, self.storage.delete(name).await)
        });

        let mut deleted = Vec::new();
        let mut failed = Vec::new();
        for (name, result) in join_all(deletions).await {
            match result {
                Ok(_) => deleted.push(name.clone()),
                Err(e) => {
                    warn!(cache = %name, error = %e, "Failed to delete stale cache");
                    failed.push(name.clone());
                }
            }
        }

        self.lifecycle.write().await.set_state(WorkerState::Activated);
        let claimed = self.clients.write().await.claim(current);
        info!(
            cache = %current,
            deleted = deleted.len(),
            failed = failed.len(),
            claimed,
            "Controller activated"
        );

        Ok(ActivateOutcome {
            deleted,
            failed,
            claimed,
        })
    }
}
