//! HTTP request building and dispatch.
//!
//! Configure an [`HttpClient`] once, build [`Request`]s from
//! [`RequestOptions`], and dispatch them with [`HttpClient::execute`] or the
//! per-method helpers on [`Fetcher`]. Dispatch retries while the server
//! answers with a 5xx (up to the request's attempt limit), then runs the
//! request's after-do hooks against the final response.

pub mod client;
pub mod connector;
pub mod context;
pub mod error;
pub mod pool;
pub mod request;
pub mod response;

pub use client::{Fetcher, HttpClient, HttpClientBuilder, HttpConfig, ProxyPolicy};
pub use connector::{Connector, ReqwestConnector};
pub use context::Context;
pub use error::{BoxError, BuildError, ConfigError, ContextError, HttpError, ResponseError};
pub use pool::{BufferPool, PooledBuffer};
pub use request::{headers, AfterDo, Body, Request, RequestOptions};
pub use response::Response;
