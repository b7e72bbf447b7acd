//! Configuration types for the dev proxy.

mod body;
mod listen;
mod mock;
mod proxy;
mod remote;
mod upstream;

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub use body::{BodyDecoder, BodyParserConfig};
pub use listen::{ListenConfig, MetricsConfig};
pub use mock::MockConfig;
pub use proxy::{BypassRule, ContextSpec, ProxyRuleConfig};
pub use remote::RemoteConfig;
pub use upstream::{ConnectionPoolConfig, Protocol};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Default for proxy rules that do not set `change_host`.
    #[serde(default = "default_change_host")]
    pub change_host: bool,

    #[serde(default)]
    pub mock: MockConfig,
    #[serde(default)]
    pub body_parser: BodyParserConfig,
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Static proxy rules, evaluated in declaration order.
    #[serde(default)]
    pub proxy: Vec<ProxyRuleConfig>,

    #[serde(default)]
    pub connection_pool: ConnectionPoolConfig,
}

fn default_change_host() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: ListenConfig::default(),
            metrics: MetricsConfig::default(),
            change_host: default_change_host(),
            mock: MockConfig::default(),
            body_parser: BodyParserConfig::default(),
            remote: RemoteConfig::default(),
            proxy: Vec::new(),
            connection_pool: ConnectionPoolConfig::default(),
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub mock_dir: Option<PathBuf>,
    pub no_mock: bool,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(port) = overrides.port {
            self.listen.port = port;
        }
        if let Some(ref dir) = overrides.mock_dir {
            self.mock.dir = dir.clone();
        }
        if overrides.no_mock {
            self.mock.enabled = false;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.listen.socket_addr()?;

        if self.mock.enabled && self.mock.dir.as_os_str().is_empty() {
            anyhow::bail!("'mock.dir' is required when mocking is enabled");
        }

        if self.body_parser.limit_bytes == 0 {
            anyhow::bail!("'body_parser.limit_bytes' must be greater than zero");
        }

        let remote = &self.remote;
        let any_remote = remote.url.is_some()
            || remote.id.is_some()
            || remote.app_id.is_some()
            || remote.app_secret.is_some();
        if let Some(ref url) = remote.url {
            Protocol::of_url(url).map_err(|e| anyhow::anyhow!("Invalid 'remote.url': {e}"))?;
        }
        if any_remote && !remote.is_enabled() {
            warn!("Remote sync disabled: 'remote' needs url, id, app_id and app_secret");
        }

        for (idx, rule) in self.proxy.iter().enumerate() {
            rule.validate()
                .map_err(|e| anyhow::anyhow!("Invalid proxy rule #{idx}: {e}"))?;
        }

        Ok(())
    }

    /// Remote-sync mocking only runs alongside local mocking.
    pub fn remote_enabled(&self) -> bool {
        self.mock.enabled && self.remote.is_enabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::RemoteId;

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
listen:
  port: 4000
metrics:
  enabled: true
change_host: false
mock:
  dir: ./fixtures/mock
  watch: false
body_parser:
  types:
    text/plain: text
  limit_bytes: 2048
remote:
  url: http://rap.local
  id: 42
  app_id: app
  app_secret: secret
  cache: false
  refresh_interval_secs: 60
proxy:
  - context: /api
    target: http://localhost:8080
    change_host: true
  - context: ["*"]
    target: https://backend.local
    ws: true
    tls_skip_verify: true
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.listen.host, "127.0.0.1");
        assert_eq!(config.listen.port, 4000);
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.port, 9090);
        assert!(!config.change_host);
        assert!(config.mock.enabled);
        assert!(!config.mock.watch);
        assert_eq!(config.mock.dir, PathBuf::from("./fixtures/mock"));
        assert_eq!(
            config.body_parser.decoder_for(Some("text/plain")),
            BodyDecoder::Text
        );
        assert_eq!(config.body_parser.limit_bytes, 2048);
        assert_eq!(config.remote.id, Some(RemoteId::Num(42)));
        assert!(!config.remote.cache);
        assert_eq!(config.remote.collaborator_depth, 1);
        assert_eq!(config.proxy.len(), 2);
        assert_eq!(config.proxy[0].change_host, Some(true));
        assert!(config.proxy[1].ws);
        assert!(config.remote_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.listen.port, 3721);
        assert!(config.change_host);
        assert!(config.mock.enabled);
        assert!(config.mock.watch);
        assert_eq!(config.body_parser.limit_bytes, 102400);
        assert!(config.proxy.is_empty());
        assert!(!config.remote_enabled());
        assert_eq!(config.connection_pool.max_idle_per_host, 100);
    }

    #[test]
    fn test_string_remote_id() {
        let config: Config = serde_yaml::from_str("remote:\n  id: repo-a").unwrap();
        assert_eq!(config.remote.id, Some(RemoteId::Str("repo-a".to_string())));
    }

    #[test]
    fn test_no_mock_disables_remote() {
        let yaml = r#"
remote:
  url: http://rap.local
  id: 1
  app_id: a
  app_secret: s
"#;
        let mut config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.remote_enabled());
        config.apply_overrides(&ConfigOverrides {
            no_mock: true,
            ..Default::default()
        });
        assert!(!config.remote_enabled());
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply_overrides(&ConfigOverrides {
            port: Some(9999),
            mock_dir: Some(PathBuf::from("/tmp/mocks")),
            no_mock: false,
        });
        assert_eq!(config.listen.port, 9999);
        assert_eq!(config.mock.dir, PathBuf::from("/tmp/mocks"));
        assert!(config.mock.enabled);
    }

    #[test]
    fn test_validate_rejects_invalid_proxy_rule() {
        let yaml = r#"
proxy:
  - context: /api
    target: not-a-url
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("proxy rule #0"));
    }

    #[test]
    fn test_validate_rejects_bad_remote_url() {
        let config: Config = serde_yaml::from_str("remote:\n  url: rap.local").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rift-dev.yaml");
        std::fs::write(&path, "listen:\n  port: 5000\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.listen.port, 5000);

        let missing = Config::from_file(dir.path().join("nope.yaml")).unwrap_err();
        assert!(missing.to_string().contains("Failed to read config file"));
    }
}
