//! Outbound HTTP client construction.

use ghgate_config::HttpConfig;
use std::time::Duration;

/// `User-Agent` sent on OAuth requests.
pub const USER_AGENT: &str = concat!("ghgate/", env!("CARGO_PKG_VERSION"));

/// Build the shared upstream HTTP client from configuration.
///
/// Timeouts are always set explicitly. An invalid `proxy_url` is logged and
/// ignored (direct connection).
#[must_use]
pub fn build_http_client(cfg: &HttpConfig) -> rquest::Client {
    let mut builder = rquest::Client::builder()
        .timeout(Duration::from_secs(cfg.timeout_secs))
        .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs));

    if let Some(url) = cfg.proxy_url.as_deref() {
        match rquest::Proxy::all(url) {
            Ok(proxy) => builder = builder.proxy(proxy),
            Err(e) => {
                tracing::warn!(url = url, error = %e, "invalid proxy_url, using direct connection");
            }
        }
    }

    builder.build().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to build configured HTTP client, using defaults");
        rquest::Client::new()
    })
}
