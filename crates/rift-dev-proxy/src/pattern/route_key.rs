//! `"METHOD path"` route keys.
//!
//! The method segment is removed with a prefix test against the *request*
//! method (`^METHOD `), never by splitting the key on whitespace. A key whose
//! prefix names another method keeps that prefix in its template, so it can
//! never match a path that starts with `/`. A key without a method prefix
//! matches every method.

use super::{CompiledPattern, PatternError, PatternOptions, ResolvedParams};
use std::fmt;

/// Verbs recognised as a key prefix.
pub const ROUTE_METHODS: &[&str] = &[
    "GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS", "CONNECT", "TRACE",
];

/// Parsed `"METHOD path"` key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    raw: String,
    method: Option<&'static str>,
}

impl RouteKey {
    pub fn parse(raw: &str) -> Self {
        let method = ROUTE_METHODS.iter().copied().find(|m| {
            raw.len() > m.len() && raw.starts_with(m) && raw.as_bytes()[m.len()] == b' '
        });
        Self {
            raw: raw.to_string(),
            method,
        }
    }

    /// The key exactly as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Declared method, or `None` for a method-less key.
    pub fn method(&self) -> Option<&'static str> {
        self.method
    }

    /// Template left after stripping the `"METHOD "` prefix.
    pub fn template(&self) -> &str {
        match self.method {
            Some(m) => &self.raw[m.len() + 1..],
            None => &self.raw,
        }
    }

    /// Whether this key can apply to a request with `method`.
    pub fn applies_to(&self, method: &str) -> bool {
        match self.method {
            Some(m) => m == method,
            None => true,
        }
    }

    /// True for keys declaring a verb other than OPTIONS.
    pub fn has_non_options_verb(&self) -> bool {
        matches!(self.method, Some(m) if m != "OPTIONS")
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A route key with its template compiled.
#[derive(Debug, Clone)]
pub struct CompiledRoute {
    key: RouteKey,
    pattern: CompiledPattern,
}

impl CompiledRoute {
    pub fn compile(raw: &str, options: PatternOptions) -> Result<Self, PatternError> {
        let key = RouteKey::parse(raw);
        let pattern = CompiledPattern::compile(key.template(), options)?;
        Ok(Self { key, pattern })
    }

    /// Compile with a template other than the one written in the key.
    pub fn compile_with_template(
        key: RouteKey,
        template: &str,
        options: PatternOptions,
    ) -> Result<Self, PatternError> {
        let pattern = CompiledPattern::compile(template, options)?;
        Ok(Self { key, pattern })
    }

    pub fn key(&self) -> &RouteKey {
        &self.key
    }

    pub fn pattern(&self) -> &CompiledPattern {
        &self.pattern
    }

    /// Match a concrete request, returning extracted parameters.
    pub fn match_request(&self, method: &str, path: &str) -> Option<ResolvedParams> {
        if !self.key.applies_to(method) {
            return None;
        }
        self.pattern.match_path(path)
    }

    /// Structural test ignoring the declared method.
    pub fn matches_path(&self, path: &str) -> bool {
        self.pattern.is_match(path)
    }
}
