//! Proxy lifecycle hooks.

use hyper::{Method, StatusCode};
use tracing::{debug, error, info};

/// Observer of forwarded requests.
///
/// Every method has a no-op default so implementors only override what they need.
pub trait ProxyListener: Send + Sync {
    fn on_proxy_request(&self, _method: &Method, _target: &str) {}

    fn on_proxy_response(&self, _method: &Method, _target: &str, _status: StatusCode) {}

    fn on_error(&self, _method: &Method, _target: &str, _error: &str) {}

    fn on_upgrade(&self, _target: &str) {}
}

/// Listener that reports through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogListener;

impl ProxyListener for LogListener {
    fn on_proxy_request(&self, method: &Method, target: &str) {
        debug!("Forwarding {} {}", method, target);
    }

    fn on_proxy_response(&self, method: &Method, target: &str, status: StatusCode) {
        debug!("{} {} -> {}", method, target, status.as_u16());
    }

    fn on_error(&self, method: &Method, target: &str, err: &str) {
        error!("Failed to forward {} {}: {}", method, target, err);
    }

    fn on_upgrade(&self, target: &str) {
        info!("WebSocket tunnel opened to {}", target);
    }
}
