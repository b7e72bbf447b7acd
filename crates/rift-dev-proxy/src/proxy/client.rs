//! HTTP client creation and configuration.
//!
//! One pooled client is shared by every proxy rule and the live remote
//! forwarder. Rules with `tls_skip_verify` use a second client built with a
//! no-op certificate verifier.

use super::tls::NoVerifier;
use crate::config::{Config, ConnectionPoolConfig};
use http_body_util::combinators::BoxBody;
use hyper::body::Bytes;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Type alias for the HTTP client used by the proxy.
pub type HttpClient = Client<
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>,
    BoxBody<Bytes, hyper::Error>,
>;

/// Create an HTTP client with connection pooling.
pub fn create_http_client(
    pool: &ConnectionPoolConfig,
    skip_tls_verify: bool,
) -> Result<HttpClient, anyhow::Error> {
    let mut http_connector = hyper_util::client::legacy::connect::HttpConnector::new();
    http_connector.set_keepalive(Some(Duration::from_secs(pool.keepalive_timeout_secs)));
    http_connector.set_connect_timeout(Some(Duration::from_secs(pool.connect_timeout_secs)));
    http_connector.enforce_http(false); // Allow both HTTP and HTTPS

    // HTTP/1.1 only, so upgrades can be tunnelled
    let https_connector = if skip_tls_verify {
        warn!("TLS certificate verification DISABLED for one or more proxy targets (development only)");
        hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(
                rustls::ClientConfig::builder()
                    .dangerous()
                    .with_custom_certificate_verifier(Arc::new(NoVerifier))
                    .with_no_client_auth(),
            )
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector)
    } else {
        hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| anyhow::anyhow!("Failed to load native root certificates: {e}"))?
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector)
    };

    let http_client = Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(pool.idle_timeout_secs))
        .pool_max_idle_per_host(pool.max_idle_per_host)
        .build(https_connector);

    info!(
        "Connection pool configured (HTTP/1.1): max_idle={}, idle_timeout={}s, keepalive={}s, insecure={}",
        pool.max_idle_per_host, pool.idle_timeout_secs, pool.keepalive_timeout_secs, skip_tls_verify
    );

    Ok(http_client)
}

/// Check if any proxy rule needs TLS verification skipped.
pub fn should_skip_tls_verify(config: &Config) -> bool {
    config.proxy.iter().any(|rule| rule.tls_skip_verify)
}
