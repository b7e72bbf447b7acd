//! Per-request route decision.
//!
//! Evaluation order is fixed and first match wins:
//!
//! 1. local mock table
//! 2. OPTIONS preflight for a path another verb mocks
//! 3. merged remote table
//! 4. static proxy rules, in declaration order
//! 5. pass through
//!
//! Locally authored mocks always beat remote definitions, which always beat
//! generic proxying. Within each table the first route in table order wins.

mod remote;

pub use remote::{normalize_url, RemoteMatch, RemoteRoutes, RemoteTable};

use crate::metrics;
use crate::mock::{MockMatch, MockStore};
use crate::proxy::{BypassOutcome, ProxyRule, RequestInfo};
use std::sync::Arc;
use tracing::debug;

/// A proxy rule chosen for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyMatch {
    /// Index into the dispatcher's rule list.
    pub rule: usize,
    /// Replacement path from a bypass rewrite.
    pub path_override: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Decision {
    Mock(MockMatch),
    Preflight,
    Remote(RemoteMatch),
    Proxy(ProxyMatch),
    PassThrough,
}

impl Decision {
    pub fn label(&self) -> &'static str {
        match self {
            Decision::Mock(_) => "mock",
            Decision::Preflight => "preflight",
            Decision::Remote(_) => "remote",
            Decision::Proxy(_) => "proxy",
            Decision::PassThrough => "pass_through",
        }
    }
}

/// Route dispatcher over the mock store, remote table and proxy rules.
///
/// A `None` mock store means mocking is disabled; a `None` remote table means
/// remote sync is disabled.
pub struct Dispatcher {
    mock: Option<Arc<MockStore>>,
    remote: Option<Arc<RemoteTable>>,
    proxies: Vec<ProxyRule>,
}

impl Dispatcher {
    pub fn new(
        mock: Option<Arc<MockStore>>,
        remote: Option<Arc<RemoteTable>>,
        proxies: Vec<ProxyRule>,
    ) -> Self {
        Self {
            mock,
            remote,
            proxies,
        }
    }

    pub fn mock_store(&self) -> Option<&Arc<MockStore>> {
        self.mock.as_ref()
    }

    pub fn remote_table(&self) -> Option<&Arc<RemoteTable>> {
        self.remote.as_ref()
    }

    pub fn proxy_rules(&self) -> &[ProxyRule] {
        &self.proxies
    }

    pub fn proxy_rule(&self, index: usize) -> Option<&ProxyRule> {
        self.proxies.get(index)
    }

    /// Decide how to serve `req`.
    pub fn dispatch(&self, req: &RequestInfo) -> Decision {
        let decision = self.decide(req, true);
        Self::record(req, &decision);
        decision
    }

    /// Decide again after a mock responder handed the request on.
    pub fn dispatch_after_mock(&self, req: &RequestInfo) -> Decision {
        let decision = self.decide(req, false);
        Self::record(req, &decision);
        decision
    }

    fn decide(&self, req: &RequestInfo, include_mock: bool) -> Decision {
        let method = req.method.as_str();
        let path = req.path();

        if include_mock {
            if let Some(ref store) = self.mock {
                if let Some(hit) = store.resolve(method, path) {
                    return Decision::Mock(hit);
                }
                if req.method == hyper::Method::OPTIONS && store.has_other_verb_route(path) {
                    return Decision::Preflight;
                }
            }
        }

        if let Some(ref remote) = self.remote {
            if let Some(hit) = remote.resolve(method, path) {
                return Decision::Remote(hit);
            }
        }

        match self.match_proxy(req) {
            Some(hit) => Decision::Proxy(hit),
            None => Decision::PassThrough,
        }
    }

    /// First proxy rule whose context matches and whose bypass does not skip.
    pub fn match_proxy(&self, req: &RequestInfo) -> Option<ProxyMatch> {
        let path = req.path();
        self.proxies
            .iter()
            .enumerate()
            .filter(|(_, rule)| rule.matches_context(path))
            .find_map(|(rule, proxy)| match proxy.bypass(req) {
                BypassOutcome::Proxy => Some(ProxyMatch {
                    rule,
                    path_override: None,
                }),
                BypassOutcome::Rewrite(path) => Some(ProxyMatch {
                    rule,
                    path_override: Some(path),
                }),
                BypassOutcome::Skip => {
                    debug!(rule, path, "Proxy rule bypassed");
                    None
                }
            })
    }

    /// Proxy rule for a WebSocket upgrade, if one with `ws` enabled matches.
    pub fn match_upgrade(&self, req: &RequestInfo) -> Option<ProxyMatch> {
        self.match_proxy(req)
            .filter(|m| self.proxies.get(m.rule).is_some_and(ProxyRule::ws))
    }

    fn record(req: &RequestInfo, decision: &Decision) {
        debug!(
            method = %req.method,
            path = req.path(),
            decision = decision.label(),
            "Dispatch decision"
        );
        metrics::record_decision(decision.label());
    }
}
