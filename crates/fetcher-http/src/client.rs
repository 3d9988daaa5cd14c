//! HTTP client configuration and dispatch.

use crate::connector::{Connector, ReqwestConnector};
use crate::context::Context;
use crate::error::{ConfigError, HttpError};
use crate::request::{Request, RequestOptions};
use crate::response::Response;
use async_trait::async_trait;
use reqwest::Method;
use std::sync::Arc;
use std::time::Duration;

/// Default TCP keep-alive interval.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Default connect and TLS handshake timeout.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Environment variable names read by [`HttpConfig::from_env`].
pub mod vars {
    pub const KEEP_ALIVE_SECS: &str = "FETCHER_KEEP_ALIVE_SECS";
    pub const HANDSHAKE_TIMEOUT_SECS: &str = "FETCHER_HANDSHAKE_TIMEOUT_SECS";
    pub const USER_AGENT: &str = "FETCHER_USER_AGENT";
    pub const NO_PROXY: &str = "FETCHER_NO_PROXY";
}

/// How proxies are chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProxyPolicy {
    /// Use `HTTP_PROXY`, `HTTPS_PROXY` and `NO_PROXY` from the environment.
    #[default]
    FromEnvironment,
    /// Always connect directly.
    Disabled,
}

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// TCP keep-alive interval; zero disables keep-alive probes.
    pub keep_alive: Duration,
    /// Connect and TLS handshake timeout.
    pub handshake_timeout: Duration,
    /// Proxy selection.
    pub proxy: ProxyPolicy,
    /// User agent string.
    pub user_agent: String,
    /// Maximum idle connections per host.
    pub pool_max_idle_per_host: usize,
    /// Enable gzip decompression.
    pub gzip: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            keep_alive: DEFAULT_KEEP_ALIVE,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            proxy: ProxyPolicy::default(),
            user_agent: format!("fetcher/{}", env!("CARGO_PKG_VERSION")),
            pool_max_idle_per_host: 10,
            gzip: true,
        }
    }
}

impl HttpConfig {
    /// Defaults overridden by `FETCHER_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(vars::KEEP_ALIVE_SECS) {
            config.keep_alive = parse_secs(vars::KEEP_ALIVE_SECS, value)?;
        }

        if let Some(value) = lookup(vars::HANDSHAKE_TIMEOUT_SECS) {
            config.handshake_timeout = parse_secs(vars::HANDSHAKE_TIMEOUT_SECS, value)?;
        }

        if let Some(value) = lookup(vars::USER_AGENT) {
            config.user_agent = value;
        }

        if let Some(value) = lookup(vars::NO_PROXY) {
            config.proxy = match value.to_lowercase().as_str() {
                "true" | "1" | "yes" => ProxyPolicy::Disabled,
                "false" | "0" | "no" => ProxyPolicy::FromEnvironment,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: vars::NO_PROXY,
                        value,
                    })
                }
            };
        }

        Ok(config)
    }

    /// Check the final values before the connector is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.handshake_timeout.is_zero() {
            return Err(ConfigError::invalid("handshake_timeout", "must be non-zero"));
        }
        Ok(())
    }
}

fn parse_secs(var: &'static str, value: String) -> Result<Duration, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(_) => Err(ConfigError::InvalidEnv { var, value }),
    }
}

/// Assembles an [`HttpClient`].
///
/// Options apply in call order, so a later setter wins over an earlier one
/// for the same field. Once an option fails, the rest are skipped and
/// [`build`](Self::build) returns that error.
#[must_use]
pub struct HttpClientBuilder {
    config: HttpConfig,
    connector: Option<Box<dyn Connector>>,
    error: Option<ConfigError>,
}

impl HttpClientBuilder {
    fn new() -> Self {
        Self {
            config: HttpConfig::default(),
            connector: None,
            error: None,
        }
    }

    /// Apply a fallible option to the config.
    pub fn option<F>(mut self, apply: F) -> Self
    where
        F: FnOnce(&mut HttpConfig) -> Result<(), ConfigError>,
    {
        if self.error.is_none() {
            if let Err(e) = apply(&mut self.config) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Replace the whole config.
    pub fn config(self, config: HttpConfig) -> Self {
        self.option(|c| {
            *c = config;
            Ok(())
        })
    }

    /// Set the TCP keep-alive interval.
    pub fn keep_alive(self, keep_alive: Duration) -> Self {
        self.option(|c| {
            c.keep_alive = keep_alive;
            Ok(())
        })
    }

    /// Set the connect and TLS handshake timeout.
    pub fn handshake_timeout(self, timeout: Duration) -> Self {
        self.option(|c| {
            c.handshake_timeout = timeout;
            Ok(())
        })
    }

    /// Set the proxy policy.
    pub fn proxy(self, proxy: ProxyPolicy) -> Self {
        self.option(|c| {
            c.proxy = proxy;
            Ok(())
        })
    }

    /// Set the user agent.
    pub fn user_agent(self, user_agent: impl Into<String>) -> Self {
        let user_agent = user_agent.into();
        self.option(|c| {
            c.user_agent = user_agent;
            Ok(())
        })
    }

    /// Set the maximum idle connections per host.
    pub fn pool_max_idle_per_host(self, max: usize) -> Self {
        self.option(|c| {
            c.pool_max_idle_per_host = max;
            Ok(())
        })
    }

    /// Toggle gzip decompression.
    pub fn gzip(self, enabled: bool) -> Self {
        self.option(|c| {
            c.gzip = enabled;
            Ok(())
        })
    }

    /// Send through `connector` instead of a reqwest client built from the
    /// config.
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Box::new(connector));
        self
    }

    /// Validate the config and build the connector once.
    pub fn build(self) -> Result<HttpClient, ConfigError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        self.config.validate()?;

        let connector: Box<dyn Connector> = match self.connector {
            Some(connector) => connector,
            None => Box::new(ReqwestConnector::new(&self.config)?),
        };

        tracing::debug!(
            keep_alive = ?self.config.keep_alive,
            handshake_timeout = ?self.config.handshake_timeout,
            proxy = ?self.config.proxy,
            "built HTTP client"
        );

        Ok(HttpClient {
            inner: Arc::new(ClientInner {
                config: self.config,
                connector,
            }),
        })
    }
}

struct ClientInner {
    config: HttpConfig,
    connector: Box<dyn Connector>,
}

/// Executes requests with retry on server errors and post-response hooks.
///
/// Cloning is cheap and clones share the same connection pool.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<ClientInner>,
}

impl HttpClient {
    /// Create a new HTTP client with default config.
    pub fn new() -> Result<Self, ConfigError> {
        Self::builder().build()
    }

    /// Create a new HTTP client with custom config.
    pub fn with_config(config: HttpConfig) -> Result<Self, ConfigError> {
        Self::builder().config(config).build()
    }

    /// Start assembling a client from the default config.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// The config this client was built from.
    pub fn config(&self) -> &HttpConfig {
        &self.inner.config
    }

    /// Dispatch `request`.
    ///
    /// Fails up front if `ctx` is already done. Otherwise calls the
    /// connector up to `max_attempts` times, retrying only while the status
    /// is 500 or above, then runs the request's hooks in order against the
    /// last response. Connector errors and context cancellation end the
    /// dispatch immediately; running hooks are not interrupted.
    pub async fn execute(&self, ctx: &Context, mut request: Request) -> Result<Response, HttpError> {
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }

        request.bind(self.clone());

        let payload = request.body().payload();
        let max_attempts = request.max_attempts();

        tracing::debug!(
            method = %request.method(),
            url = %request.url(),
            max_attempts,
            "dispatching request"
        );

        let mut attempts = 0;
        let raw = loop {
            attempts += 1;
            let outbound = request.outbound(payload.as_ref());

            let raw = tokio::select! {
                biased;
                err = ctx.done() => return Err(err.into()),
                result = self.inner.connector.send(outbound) => result?,
            };

            let status = raw.status().as_u16();
            tracing::debug!(attempt = attempts, status, "attempt finished");

            if status < 500 || attempts >= max_attempts {
                break raw;
            }
            tracing::debug!(
                attempt = attempts,
                status,
                remaining = max_attempts - attempts,
                "server error, retrying"
            );
        };

        let response = Response::new(raw, attempts);

        for (index, hook) in request.hooks().iter().enumerate() {
            tracing::trace!(hook = index, "running after-do hook");
            hook(&request, &response).map_err(HttpError::Hook)?;
        }

        Ok(response)
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Dispatches requests; the per-method helpers build and then execute.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Dispatch a built request.
    async fn execute(&self, ctx: &Context, request: Request) -> Result<Response, HttpError>;

    /// Build a request with `method` and dispatch it.
    async fn fetch(
        &self,
        ctx: &Context,
        method: Method,
        url: &str,
        options: RequestOptions,
    ) -> Result<Response, HttpError> {
        let request = Request::build(method, url, options)?;
        self.execute(ctx, request).await
    }

    /// Dispatch a GET request.
    async fn get(&self, ctx: &Context, url: &str, options: RequestOptions) -> Result<Response, HttpError> {
        self.fetch(ctx, Method::GET, url, options).await
    }

    /// Dispatch a HEAD request.
    async fn head(&self, ctx: &Context, url: &str, options: RequestOptions) -> Result<Response, HttpError> {
        self.fetch(ctx, Method::HEAD, url, options).await
    }

    /// Dispatch a POST request.
    async fn post(&self, ctx: &Context, url: &str, options: RequestOptions) -> Result<Response, HttpError> {
        self.fetch(ctx, Method::POST, url, options).await
    }

    /// Dispatch a PUT request.
    async fn put(&self, ctx: &Context, url: &str, options: RequestOptions) -> Result<Response, HttpError> {
        self.fetch(ctx, Method::PUT, url, options).await
    }

    /// Dispatch a PATCH request.
    async fn patch(&self, ctx: &Context, url: &str, options: RequestOptions) -> Result<Response, HttpError> {
        self.fetch(ctx, Method::PATCH, url, options).await
    }

    /// Dispatch a DELETE request.
    async fn delete(&self, ctx: &Context, url: &str, options: RequestOptions) -> Result<Response, HttpError> {
        self.fetch(ctx, Method::DELETE, url, options).await
    }
}

#[async_trait]
impl Fetcher for HttpClient {
    async fn execute(&self, ctx: &Context, request: Request) -> Result<Response, HttpError> {
        HttpClient::execute(self, ctx, request).await
    }
}

const _: fn() = || {
    fn assert_fetcher<T: Fetcher + Clone + 'static>() {}
    assert_fetcher::<HttpClient>();
};
