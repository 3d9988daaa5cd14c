//! The network boundary.

use crate::client::{HttpConfig, ProxyPolicy};
use crate::error::{ConfigError, HttpError};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};

/// Sends one outbound request and returns the raw response.
///
/// [`HttpClient`](crate::HttpClient) calls this once per attempt. Any error
/// returned here ends dispatch immediately and is never retried.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Send the request.
    async fn send(&self, request: reqwest::Request) -> Result<reqwest::Response, HttpError>;
}

/// [`Connector`] backed by a configured [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct ReqwestConnector {
    inner: Client,
}

impl ReqwestConnector {
    /// Build the underlying client from `config`.
    pub fn new(config: &HttpConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            inner: build_client(config)?,
        })
    }

    /// Wrap an already configured client.
    pub fn from_client(inner: Client) -> Self {
        Self { inner }
    }

    /// Get the inner reqwest client.
    pub fn inner(&self) -> &Client {
        &self.inner
    }
}

#[async_trait]
impl Connector for ReqwestConnector {
    async fn send(&self, request: reqwest::Request) -> Result<reqwest::Response, HttpError> {
        self.inner.execute(request).await.map_err(HttpError::from)
    }
}

/// Build a reqwest client from the transport settings.
///
/// The handshake timeout bounds the whole connect phase, TLS included.
pub fn build_client(config: &HttpConfig) -> Result<Client, ConfigError> {
    let keep_alive = (!config.keep_alive.is_zero()).then_some(config.keep_alive);

    let mut builder = ClientBuilder::new()
        .tcp_keepalive(keep_alive)
        .connect_timeout(config.handshake_timeout)
        .user_agent(&config.user_agent)
        .pool_max_idle_per_host(config.pool_max_idle_per_host);

    if config.proxy == ProxyPolicy::Disabled {
        builder = builder.no_proxy();
    }

    if config.gzip {
        builder = builder.gzip(true);
    }

    builder.build().map_err(ConfigError::ClientBuild)
}
