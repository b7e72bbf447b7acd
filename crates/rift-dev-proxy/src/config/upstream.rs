//! Upstream target and connection pool configuration.

use serde::{Deserialize, Serialize};

/// Scheme of a proxy target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }

    /// Parse protocol from URL scheme. WebSocket schemes map to their HTTP carrier.
    pub fn from_scheme(scheme: &str) -> Result<Self, String> {
        match scheme.to_lowercase().as_str() {
            "http" | "ws" => Ok(Protocol::Http),
            "https" | "wss" => Ok(Protocol::Https),
            _ => Err(format!("Unsupported protocol scheme: {scheme}")),
        }
    }

    /// Extract the protocol from a target URL.
    pub fn of_url(url: &str) -> Result<Self, String> {
        let url_parts: Vec<&str> = url.splitn(2, "://").collect();
        if url_parts.len() != 2 || url_parts[1].is_empty() {
            return Err(format!("Invalid URL format (missing scheme): {url}"));
        }
        Self::from_scheme(url_parts[0])
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionPoolConfig {
    #[serde(default = "default_pool_max_idle_per_host")]
    pub max_idle_per_host: usize,

    #[serde(default = "default_pool_idle_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_keepalive_timeout")]
    pub keepalive_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: default_pool_max_idle_per_host(),
            idle_timeout_secs: default_pool_idle_timeout(),
            keepalive_timeout_secs: default_keepalive_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_pool_max_idle_per_host() -> usize {
    100
}

fn default_pool_idle_timeout() -> u64 {
    90
}

fn default_keepalive_timeout() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_of_url() {
        assert_eq!(Protocol::of_url("http://localhost:8080"), Ok(Protocol::Http));
        assert_eq!(Protocol::of_url("HTTPS://example.com"), Ok(Protocol::Https));
        assert_eq!(Protocol::of_url("ws://localhost:9000"), Ok(Protocol::Http));
        assert!(Protocol::of_url("localhost:8080").is_err());
        assert!(Protocol::of_url("ftp://example.com").is_err());
    }
}
