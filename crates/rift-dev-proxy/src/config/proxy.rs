//! Static proxy rule configuration.

use super::upstream::Protocol;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// One path context or several.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ContextSpec {
    One(String),
    Many(Vec<String>),
}

impl ContextSpec {
    pub fn patterns(&self) -> Vec<&str> {
        match self {
            ContextSpec::One(p) => vec![p.as_str()],
            ContextSpec::Many(ps) => ps.iter().map(String::as_str).collect(),
        }
    }
}

/// Declarative bypass rule.
///
/// A rule applies when every condition it names holds. Without `rewrite` a
/// matching request skips the proxy; with `rewrite` the request is forwarded
/// with its path replaced.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BypassRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewrite: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyRuleConfig {
    pub context: ContextSpec,
    pub target: String,
    /// Rewrite `Host` to the target's host. Falls back to the top-level `change_host`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_host: Option<bool>,
    #[serde(default)]
    pub ws: bool,
    /// Regex to replacement, applied in declaration order.
    #[serde(
        default,
        deserialize_with = "ordered_pairs",
        serialize_with = "serialize_pairs",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub path_rewrite: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    /// Skip TLS certificate verification (for self-signed certs in dev/test)
    #[serde(default)]
    pub tls_skip_verify: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bypass: Vec<BypassRule>,
}

impl ProxyRuleConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.context.patterns().is_empty() {
            return Err(format!("Proxy rule for '{}' has no context", self.target));
        }
        if self.context.patterns().iter().any(|p| p.is_empty()) {
            return Err(format!(
                "Proxy rule for '{}' has an empty context",
                self.target
            ));
        }
        Protocol::of_url(&self.target)?;
        for (pattern, _) in &self.path_rewrite {
            regex::Regex::new(pattern)
                .map_err(|e| format!("Invalid path_rewrite pattern '{pattern}': {e}"))?;
        }
        for rule in &self.bypass {
            if rule.contains.is_some() && rule.header.is_none() {
                return Err(format!(
                    "Bypass rule for '{}' sets 'contains' without 'header'",
                    self.target
                ));
            }
        }
        Ok(())
    }
}

fn ordered_pairs<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct PairsVisitor;

    impl<'de> Visitor<'de> for PairsVisitor {
        type Value = Vec<(String, String)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a mapping of regex to replacement")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut pairs = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((k, v)) = map.next_entry::<String, String>()? {
                pairs.push((k, v));
            }
            Ok(pairs)
        }
    }

    deserializer.deserialize_map(PairsVisitor)
}

fn serialize_pairs<S>(pairs: &[(String, String)], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(pairs.len()))?;
    for (k, v) in pairs {
        map.serialize_entry(k, v)?;
    }
    map.end()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rule_with_ordered_rewrites() {
        let yaml = r#"
context: [/api, /auth]
target: http://localhost:8080
path_rewrite:
  "^/api/v1": /v1
  "^/api": ""
bypass:
  - header: accept
    contains: text/html
    rewrite: /index.html
"#;
        let rule: ProxyRuleConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rule.context.patterns(), vec!["/api", "/auth"]);
        assert_eq!(
            rule.path_rewrite,
            vec![
                ("^/api/v1".to_string(), "/v1".to_string()),
                ("^/api".to_string(), String::new()),
            ]
        );
        assert_eq!(rule.bypass[0].rewrite.as_deref(), Some("/index.html"));
        assert!(rule.change_host.is_none());
        assert!(rule.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_target() {
        let rule: ProxyRuleConfig =
            serde_yaml::from_str("context: /api\ntarget: localhost:8080").unwrap();
        assert!(rule.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_rewrite() {
        let rule: ProxyRuleConfig = serde_yaml::from_str(
            "context: /api\ntarget: http://localhost\npath_rewrite: { \"(\": x }",
        )
        .unwrap();
        assert!(rule.validate().is_err());
    }
}
