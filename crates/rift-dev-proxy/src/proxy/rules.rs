//! Compiled proxy rules: context matching, bypass, and path rewriting.

use super::context::RequestInfo;
use crate::config::{BypassRule, Protocol, ProxyRuleConfig};
use hyper::header::{HeaderName, HeaderValue};
use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// Result of consulting a rule's bypass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BypassOutcome {
    /// Proxy as usual.
    Proxy,
    /// Do not proxy with this rule.
    Skip,
    /// Proxy with the request path replaced.
    Rewrite(String),
}

/// Programmatic bypass, consulted after the declarative rules.
pub type BypassFn = Arc<dyn Fn(&RequestInfo) -> BypassOutcome + Send + Sync>;

/// One compiled path context.
#[derive(Debug, Clone)]
pub enum ContextMatcher {
    Prefix(String),
    Glob(Regex),
}

impl ContextMatcher {
    /// Compile one context. `*` alone means everything; a trailing `/*` is dropped.
    pub fn compile(raw: &str) -> Result<Self, String> {
        let corrected = if raw == "*" {
            "**"
        } else {
            raw.strip_suffix("/*").unwrap_or(raw)
        };
        if corrected.contains('*') || corrected.contains('?') {
            let regex = glob_to_regex(corrected);
            Regex::new(&regex)
                .map(ContextMatcher::Glob)
                .map_err(|e| format!("Invalid context '{raw}': {e}"))
        } else {
            Ok(ContextMatcher::Prefix(corrected.to_string()))
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            ContextMatcher::Prefix(prefix) => path.starts_with(prefix.as_str()),
            ContextMatcher::Glob(regex) => regex.is_match(path),
        }
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::from("^");
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str(".*");
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}

/// A static proxy rule ready for dispatch.
#[derive(Clone)]
pub struct ProxyRule {
    contexts: Vec<ContextMatcher>,
    target: String,
    target_host: Option<String>,
    change_host: bool,
    ws: bool,
    path_rewrite: Vec<(Regex, String)>,
    headers: Vec<(HeaderName, HeaderValue)>,
    tls_skip_verify: bool,
    bypass: Vec<BypassRule>,
    bypass_fn: Option<BypassFn>,
}

impl ProxyRule {
    pub fn from_config(
        config: &ProxyRuleConfig,
        default_change_host: bool,
    ) -> Result<Self, anyhow::Error> {
        config.validate().map_err(|e| anyhow::anyhow!(e))?;

        let contexts = config
            .context
            .patterns()
            .into_iter()
            .map(ContextMatcher::compile)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow::anyhow!(e))?;

        let path_rewrite = config
            .path_rewrite
            .iter()
            .map(|(pattern, replacement)| {
                Regex::new(pattern)
                    .map(|re| (re, replacement.clone()))
                    .map_err(|e| anyhow::anyhow!("Invalid path_rewrite '{pattern}': {e}"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let headers = config
            .headers
            .iter()
            .map(|(name, value)| {
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| anyhow::anyhow!("Invalid header name '{name}': {e}"))?;
                let value = HeaderValue::from_str(value)
                    .map_err(|e| anyhow::anyhow!("Invalid value for header '{name}': {e}"))?;
                Ok((name, value))
            })
            .collect::<Result<Vec<_>, anyhow::Error>>()?;

        Ok(Self {
            contexts,
            target: config.target.trim_end_matches('/').to_string(),
            target_host: target_host(&config.target),
            change_host: config.change_host.unwrap_or(default_change_host),
            ws: config.ws,
            path_rewrite,
            headers,
            tls_skip_verify: config.tls_skip_verify,
            bypass: config.bypass.clone(),
            bypass_fn: None,
        })
    }

    /// Attach a programmatic bypass.
    pub fn with_bypass<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestInfo) -> BypassOutcome + Send + Sync + 'static,
    {
        self.bypass_fn = Some(Arc::new(f));
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Host (with port) of the target, used when rewriting `Host`.
    pub fn target_host(&self) -> Option<&str> {
        self.target_host.as_deref()
    }

    pub fn change_host(&self) -> bool {
        self.change_host
    }

    pub fn ws(&self) -> bool {
        self.ws
    }

    pub fn tls_skip_verify(&self) -> bool {
        self.tls_skip_verify
    }

    pub fn extra_headers(&self) -> &[(HeaderName, HeaderValue)] {
        &self.headers
    }

    pub fn matches_context(&self, path: &str) -> bool {
        self.contexts.iter().any(|c| c.matches(path))
    }

    /// Consult declarative bypass rules first, then the programmatic one.
    pub fn bypass(&self, req: &RequestInfo) -> BypassOutcome {
        for rule in &self.bypass {
            if bypass_rule_applies(rule, req) {
                return match rule.rewrite {
                    Some(ref path) => BypassOutcome::Rewrite(path.clone()),
                    None => BypassOutcome::Skip,
                };
            }
        }
        match self.bypass_fn {
            Some(ref f) => f(req),
            None => BypassOutcome::Proxy,
        }
    }

    /// Apply `path_rewrite` in order to a path (query preserved).
    pub fn rewrite_path(&self, path_and_query: &str) -> String {
        let (path, query) = match path_and_query.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (path_and_query, None),
        };
        let mut path = path.to_string();
        for (re, replacement) in &self.path_rewrite {
            path = re.replace(&path, replacement.as_str()).into_owned();
        }
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        match query {
            Some(q) => format!("{path}?{q}"),
            None => path,
        }
    }

    /// Full upstream URI for a request path.
    pub fn upstream_uri(&self, path_and_query: &str) -> String {
        format!("{}{}", self.target, self.rewrite_path(path_and_query))
    }
}

impl fmt::Debug for ProxyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyRule")
            .field("contexts", &self.contexts)
            .field("target", &self.target)
            .field("change_host", &self.change_host)
            .field("ws", &self.ws)
            .field("bypass_fn", &self.bypass_fn.is_some())
            .finish()
    }
}

fn bypass_rule_applies(rule: &BypassRule, req: &RequestInfo) -> bool {
    if rule.path_prefix.is_none() && rule.header.is_none() {
        return false;
    }
    if let Some(ref prefix) = rule.path_prefix {
        if !req.uri.path().starts_with(prefix.as_str()) {
            return false;
        }
    }
    if let Some(ref header) = rule.header {
        let Some(value) = req.headers.get(header.as_str()).and_then(|v| v.to_str().ok()) else {
            return false;
        };
        if let Some(ref needle) = rule.contains {
            if !value.contains(needle.as_str()) {
                return false;
            }
        }
    }
    true
}

fn target_host(target: &str) -> Option<String> {
    Protocol::of_url(target).ok()?;
    let rest = target.split_once("://")?.1;
    let host = rest.split(['/', '?', '#']).next()?;
    (!host.is_empty()).then(|| host.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::Request;

    fn rule(yaml: &str) -> ProxyRule {
        let config: ProxyRuleConfig = serde_yaml::from_str(yaml).unwrap();
        ProxyRule::from_config(&config, true).unwrap()
    }

    fn info(path: &str, headers: &[(&str, &str)]) -> RequestInfo {
        let mut builder = Request::builder().uri(path);
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        RequestInfo::from_request(&builder.body(()).unwrap())
    }

    #[test]
    fn test_context_prefix_and_glob() {
        assert!(ContextMatcher::compile("/api").unwrap().matches("/api/users"));
        assert!(!ContextMatcher::compile("/api").unwrap().matches("/other"));
        assert!(ContextMatcher::compile("*").unwrap().matches("/anything/at/all"));
        assert!(ContextMatcher::compile("/api/*").unwrap().matches("/api/x/y"));
        let glob = ContextMatcher::compile("/api/*/detail").unwrap();
        assert!(glob.matches("/api/42/detail"));
        assert!(!glob.matches("/api/4/2/detail"));
    }

    #[test]
    fn test_change_host_default_applies() {
        let r = rule("context: /api\ntarget: http://localhost:8080/");
        assert!(r.change_host());
        assert_eq!(r.target(), "http://localhost:8080");
        assert_eq!(r.target_host(), Some("localhost:8080"));

        let r = rule("context: /api\ntarget: http://localhost:8080\nchange_host: false");
        assert!(!r.change_host());
    }

    #[test]
    fn test_path_rewrite_in_order() {
        let r = rule(
            "context: /api\ntarget: http://up\npath_rewrite:\n  \"^/api/v1\": /v1\n  \"^/api\": \"\"",
        );
        assert_eq!(r.rewrite_path("/api/v1/users?x=1"), "/v1/users?x=1");
        assert_eq!(r.rewrite_path("/api/users"), "/users");
        assert_eq!(r.rewrite_path("/api"), "/");
        assert_eq!(r.upstream_uri("/api/users"), "http://up/users");
    }

    #[test]
    fn test_declarative_bypass() {
        let r = rule(
            r#"
context: /
target: http://up
bypass:
  - header: accept
    contains: text/html
    rewrite: /index.html
  - path_prefix: /static
"#,
        );
        assert_eq!(
            r.bypass(&info("/app", &[("accept", "text/html,*/*")])),
            BypassOutcome::Rewrite("/index.html".to_string())
        );
        assert_eq!(r.bypass(&info("/static/a.js", &[])), BypassOutcome::Skip);
        assert_eq!(
            r.bypass(&info("/api", &[("accept", "application/json")])),
            BypassOutcome::Proxy
        );
    }

    #[test]
    fn test_programmatic_bypass() {
        let r = rule("context: /\ntarget: http://up").with_bypass(|req| {
            if req.uri.path() == "/skip" {
                BypassOutcome::Skip
            } else {
                BypassOutcome::Proxy
            }
        });
        assert_eq!(r.bypass(&info("/skip", &[])), BypassOutcome::Skip);
        assert_eq!(r.bypass(&info("/go", &[])), BypassOutcome::Proxy);
    }
}
