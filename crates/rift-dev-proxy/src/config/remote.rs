//! Remote interface-definition service configuration.

use crate::sync::{RemoteId, SyncOptions};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RemoteId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_secret: Option<String>,
    /// Cache payloads locally. When false, matched routes are proxied live.
    #[serde(default = "default_cache")]
    pub cache: bool,
    #[serde(default = "default_collaborator_depth")]
    pub collaborator_depth: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_interval_secs: Option<u64>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_cache() -> bool {
    true
}

fn default_collaborator_depth() -> usize {
    1
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: None,
            id: None,
            app_id: None,
            app_secret: None,
            cache: default_cache(),
            collaborator_depth: default_collaborator_depth(),
            refresh_interval_secs: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RemoteConfig {
    /// Sync runs only with url, id and both credentials present.
    pub fn is_enabled(&self) -> bool {
        self.url.as_deref().is_some_and(|u| !u.is_empty())
            && self.id.is_some()
            && self.app_id.as_deref().is_some_and(|a| !a.is_empty())
            && self.app_secret.as_deref().is_some_and(|s| !s.is_empty())
    }

    pub fn sync_options(&self) -> Option<SyncOptions> {
        let id = self.id.clone()?;
        Some(SyncOptions {
            repository_id: id,
            cache_payloads: self.cache,
            collaborator_depth: self.collaborator_depth,
        })
    }

    /// Live mock endpoint used when payload caching is off.
    pub fn live_target(&self) -> Option<String> {
        let url = self.url.as_deref()?.trim_end_matches('/');
        let id = self.id.as_ref()?;
        Some(format!("{url}/app/mock/{id}"))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full() -> RemoteConfig {
        RemoteConfig {
            url: Some("http://rap.local/".to_string()),
            id: Some(RemoteId::Num(42)),
            app_id: Some("app".to_string()),
            app_secret: Some("secret".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_enabled_requires_all_fields() {
        assert!(full().is_enabled());
        let mut cfg = full();
        cfg.app_secret = None;
        assert!(!cfg.is_enabled());
        assert!(!RemoteConfig::default().is_enabled());
    }

    #[test]
    fn test_live_target() {
        assert_eq!(
            full().live_target().as_deref(),
            Some("http://rap.local/app/mock/42")
        );
    }

    #[test]
    fn test_zero_refresh_is_disabled() {
        let mut cfg = full();
        cfg.refresh_interval_secs = Some(0);
        assert!(cfg.refresh_interval().is_none());
        cfg.refresh_interval_secs = Some(30);
        assert_eq!(cfg.refresh_interval(), Some(Duration::from_secs(30)));
    }
}
