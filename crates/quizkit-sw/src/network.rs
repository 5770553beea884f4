//! Network transport used when the cache has no answer.

use std::time::Duration;

use async_trait::async_trait;
use http::header::{CACHE_CONTROL, PRAGMA};
use http::HeaderValue;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, trace};
use url::{Origin, Url};

use crate::request::{CacheMode, Request, Response, ResponseType};

/// Errors that can occur in the network transport.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Offline: {0}")]
    Offline(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Network transport seen by the cache controller.
///
/// A returned `Ok` means a response arrived, whatever its status; `Err` is a
/// transport-level failure such as lost connectivity.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError>;
}

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// User agent string.
    pub user_agent: String,
    /// Maximum redirects.
    pub max_redirects: usize,
    /// Request timeout. `None` relies on the transport's own failure signals.
    pub timeout: Option<Duration>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("Quizkit/{}", env!("CARGO_PKG_VERSION")),
            max_redirects: 10,
            timeout: None,
        }
    }
}

/// reqwest-backed network transport.
pub struct HttpNetwork {
    client: Client,
    origin: Origin,
}

impl HttpNetwork {
    /// Create a transport for the site at `site`; responses from its origin
    /// are classified as `basic`.
    pub fn new(config: NetworkConfig, site: &Url) -> Result<Self, NetError> {
        let mut builder = Client::builder()
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects));
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| NetError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            origin: site.origin(),
        })
    }

    fn classify(&self, url: &Url) -> ResponseType {
        if url.origin() == self.origin {
            ResponseType::Basic
        } else {
            ResponseType::Cors
        }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        debug!(url = %request.url, method = %request.method, "Fetching from network");

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());

        if request.cache == CacheMode::Reload {
            builder = builder
                .header(CACHE_CONTROL, HeaderValue::from_static("no-cache"))
                .header(PRAGMA, HeaderValue::from_static("no-cache"));
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_connect() {
                NetError::Offline(e.to_string())
            } else {
                NetError::HttpError(e)
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let redirected = url != request.url;
        let body = response.bytes().await?;

        trace!(url = %url, status = %status, body_len = body.len(), "Response received");

        let mut result = Response::new(url.clone(), status, body)
            .with_type(self.classify(&url))
            .with_redirected(redirected);
        result.headers = headers;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_network_config_default() {
        let config = NetworkConfig::default();
        assert!(config.user_agent.starts_with("Quizkit/"));
        assert!(config.timeout.is_none());
    }

    #[tokio::test]
    async fn test_fetch_same_origin_is_basic() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let site = Url::parse(&server.uri()).unwrap();
        let network = HttpNetwork::new(NetworkConfig::default(), &site).unwrap();
        let response = network
            .fetch(&Request::get(site.join("index.html").unwrap()))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.response_type, ResponseType::Basic);
        assert!(!response.redirected);
        assert_eq!(response.text().unwrap(), "<html>");
    }

    #[tokio::test]
    async fn test_reload_sends_no_cache_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/manifest.json"))
            .and(header("cache-control", "no-cache"))
            .and(header("pragma", "no-cache"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let site = Url::parse(&server.uri()).unwrap();
        let network = HttpNetwork::new(NetworkConfig::default(), &site).unwrap();
        let request =
            Request::get(site.join("manifest.json").unwrap()).cache_mode(CacheMode::Reload);

        let response = network.fetch(&request).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_foreign_origin_is_cors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let site = Url::parse("https://quiz.example/").unwrap();
        let network = HttpNetwork::new(NetworkConfig::default(), &site).unwrap();
        let url = Url::parse(&server.uri()).unwrap().join("font.woff2").unwrap();

        let response = network.fetch(&Request::get(url)).await.unwrap();
        assert_eq!(response.response_type, ResponseType::Cors);
        assert!(!response.is_cacheable());
    }

    #[tokio::test]
    async fn test_connection_refused_is_offline() {
        // Bind then drop a server so the port is known to be closed.
        let uri = {
            let server = MockServer::start().await;
            server.uri()
        };
        let site = Url::parse(&uri).unwrap();
        let network = HttpNetwork::new(NetworkConfig::default(), &site).unwrap();

        let err = network.fetch(&Request::get(site)).await.unwrap_err();
        assert!(matches!(err, NetError::Offline(_)));
    }
}
