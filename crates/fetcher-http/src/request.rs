//! Request descriptors and their options.

use crate::client::HttpClient;
use crate::error::{BoxError, BuildError};
use crate::pool::{BufferPool, PooledBuffer};
use crate::response::Response;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Url};
use serde::Serialize;

/// Common HTTP headers.
pub mod headers {
    pub const CONTENT_TYPE_JSON: &str = "application/json";
}

/// A hook run after the final response of a dispatch.
///
/// Returning an error aborts the dispatch and skips the remaining hooks.
pub type AfterDo = Box<dyn Fn(&Request, &Response) -> Result<(), BoxError> + Send + Sync>;

/// A request body.
#[derive(Debug, Default)]
pub enum Body {
    /// No body.
    #[default]
    Empty,
    /// An owned payload.
    Bytes(Bytes),
    /// A payload held in a pooled buffer, returned when the request drops.
    Pooled(PooledBuffer),
}

impl Body {
    /// Payload bytes to send on each attempt.
    pub(crate) fn payload(&self) -> Option<Bytes> {
        match self {
            Body::Empty => None,
            Body::Bytes(bytes) => Some(bytes.clone()),
            Body::Pooled(buf) => Some(Bytes::copy_from_slice(buf)),
        }
    }

    /// Length of the payload in bytes.
    pub fn len(&self) -> usize {
        match self {
            Body::Empty => 0,
            Body::Bytes(bytes) => bytes.len(),
            Body::Pooled(buf) => buf.len(),
        }
    }

    /// Whether there is no payload.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Options applied by [`Request::build`].
///
/// Setters never fail; the first invalid option is reported by the build.
#[derive(Default)]
pub struct RequestOptions {
    headers: Vec<(String, String)>,
    body: Body,
    max_attempts: Option<u32>,
    hooks: Vec<AfterDo>,
    error: Option<BuildError>,
}

impl RequestOptions {
    /// Create empty options: no headers, no body, one attempt, no hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header, replacing an earlier value for the same name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add bearer token authorization.
    pub fn bearer_auth(self, token: impl AsRef<str>) -> Self {
        let value = format!("Bearer {}", token.as_ref());
        self.header(AUTHORIZATION.as_str(), value)
    }

    /// Set content type to JSON.
    pub fn json_content(self) -> Self {
        self.header(CONTENT_TYPE.as_str(), headers::CONTENT_TYPE_JSON)
    }

    /// Send `body` as the payload.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Body::Bytes(body.into());
        self
    }

    /// Send the contents of a pooled buffer; it goes back to its pool once
    /// the dispatch is over.
    pub fn pooled_body(mut self, buf: PooledBuffer) -> Self {
        self.body = Body::Pooled(buf);
        self
    }

    /// Serialize `value` as JSON into a buffer from the global pool.
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Self {
        self.json_in(BufferPool::global(), value)
    }

    /// Serialize `value` as JSON into a buffer from `pool`.
    pub fn json_in<T: Serialize + ?Sized>(mut self, pool: &BufferPool, value: &T) -> Self {
        let mut buf = pool.checkout();
        match serde_json::to_writer(&mut buf, value) {
            Ok(()) => {
                self.body = Body::Pooled(buf);
                self.json_content()
            }
            Err(e) => {
                self.error.get_or_insert(BuildError::Body(e));
                self
            }
        }
    }

    /// Make up to `attempts` calls while the server answers with a 5xx.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Register a hook to run after the final response.
    pub fn after_do<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Request, &Response) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.hooks.push(Box::new(hook));
        self
    }
}

impl std::fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestOptions")
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("max_attempts", &self.max_attempts)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

/// A single-use description of one outbound call.
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Body,
    max_attempts: u32,
    hooks: Vec<AfterDo>,
    client: Option<HttpClient>,
}

impl Request {
    /// Build a request from a method, a URL and options.
    pub fn build<M>(method: M, url: &str, options: RequestOptions) -> Result<Self, BuildError>
    where
        M: TryInto<Method>,
        M::Error: std::fmt::Display,
    {
        let RequestOptions {
            headers: raw_headers,
            body,
            max_attempts,
            hooks,
            error,
        } = options;

        if let Some(err) = error {
            return Err(err);
        }

        let method = method
            .try_into()
            .map_err(|e| BuildError::InvalidMethod(e.to_string()))?;

        let url = Url::parse(url).map_err(|source| BuildError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(BuildError::UnsupportedScheme(url.scheme().to_string()));
        }

        let mut headers = HeaderMap::with_capacity(raw_headers.len());
        for (name, value) in raw_headers {
            match (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => return Err(BuildError::InvalidHeader { name }),
            }
        }

        let max_attempts = match max_attempts {
            Some(0) => return Err(BuildError::ZeroAttempts),
            Some(n) => n,
            None => 1,
        };

        Ok(Self {
            method,
            url,
            headers,
            body,
            max_attempts,
            hooks,
            client: None,
        })
    }

    /// The HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The target URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Headers sent with every attempt.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The body sent with every attempt.
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Upper bound on calls made for this request.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The client dispatching this request, once dispatch has started.
    pub fn client(&self) -> Option<&HttpClient> {
        self.client.as_ref()
    }

    pub(crate) fn bind(&mut self, client: HttpClient) {
        self.client = Some(client);
    }

    pub(crate) fn hooks(&self) -> &[AfterDo] {
        &self.hooks
    }

    /// A fresh outbound request for one attempt.
    pub(crate) fn outbound(&self, payload: Option<&Bytes>) -> reqwest::Request {
        let mut request = reqwest::Request::new(self.method.clone(), self.url.clone());
        *request.headers_mut() = self.headers.clone();
        if let Some(payload) = payload {
            *request.body_mut() = Some(payload.clone().into());
        }
        request
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("max_attempts", &self.max_attempts)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}
