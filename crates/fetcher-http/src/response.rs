//! HTTP response wrapper.

use crate::error::ResponseError;
use reqwest::header::HeaderMap;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// The final response of a dispatch.
///
/// A 5xx status here means every attempt failed on the server side.
#[derive(Debug)]
pub struct Response {
    inner: reqwest::Response,
    attempts: u32,
}

impl Response {
    pub(crate) fn new(inner: reqwest::Response, attempts: u32) -> Self {
        Self { inner, attempts }
    }

    /// The status code.
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    /// The response headers.
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// The final URL, after redirects.
    pub fn url(&self) -> &Url {
        self.inner.url()
    }

    /// Number of calls made to produce this response.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Get the raw reqwest response.
    pub fn inner(&self) -> &reqwest::Response {
        &self.inner
    }

    /// Take the raw reqwest response.
    pub fn into_inner(self) -> reqwest::Response {
        self.inner
    }

    /// Read the full body.
    pub async fn bytes(self) -> Result<bytes::Bytes, ResponseError> {
        self.inner.bytes().await.map_err(ResponseError::Read)
    }

    /// Read the full body as text.
    pub async fn text(self) -> Result<String, ResponseError> {
        self.inner.text().await.map_err(ResponseError::Read)
    }

    /// Parse the body as JSON.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T, ResponseError> {
        let status = self.status();
        let bytes = self.bytes().await?;

        serde_json::from_slice(&bytes).map_err(|e| ResponseError::Parse {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&bytes).to_string(),
            source: e,
        })
    }

    /// Turn a non-success status into an error.
    ///
    /// Informational and unfollowed redirect statuses are reported as
    /// [`ResponseError::UnexpectedStatus`].
    pub async fn check(self) -> Result<Self, ResponseError> {
        let status = self.status();

        if status.is_success() {
            return Ok(self);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = self
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);

            return Err(ResponseError::RateLimited { retry_after });
        }

        if !status.is_client_error() && !status.is_server_error() {
            return Err(ResponseError::UnexpectedStatus {
                status: status.as_u16(),
            });
        }

        let body = self.inner.text().await.unwrap_or_default();

        if status.is_server_error() {
            Err(ResponseError::ServerError {
                status: status.as_u16(),
                body,
            })
        } else {
            Err(ResponseError::ClientError {
                status: status.as_u16(),
                body,
            })
        }
    }
}
