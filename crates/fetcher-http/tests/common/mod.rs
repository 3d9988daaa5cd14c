//! Shared test setup.

use fetcher_http::{HttpClient, ProxyPolicy};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Route `tracing` output through the test writer; filter with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A client that talks to the local mock server directly.
pub fn client() -> HttpClient {
    init_tracing();
    HttpClient::builder()
        .proxy(ProxyPolicy::Disabled)
        .handshake_timeout(Duration::from_secs(2))
        .user_agent("fetcher-tests")
        .build()
        .expect("Failed to create client")
}
