//! Shared HTTP client construction for consistent timeout and TLS configuration.

use std::time::Duration;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Create an HTTP client with standard quarry configuration.
///
/// Config: 10s connect timeout, the given request timeout, rustls TLS,
/// `quarry/{version}` user-agent, redirect limit 10. Individual requests may
/// narrow the timeout further with `RequestBuilder::timeout`.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialized.
pub fn client_with_timeout(request_timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .timeout(request_timeout)
        .user_agent(concat!("quarry/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
}

/// # Errors
///
/// Returns an error if the TLS backend cannot be initialized.
pub fn default_client() -> reqwest::Result<reqwest::Client> {
    client_with_timeout(DEFAULT_REQUEST_TIMEOUT)
}
