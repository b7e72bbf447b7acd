use crate::config::BodyParserConfig;
use crate::dispatch::Dispatcher;
use crate::proxy::client::HttpClient;
use crate::proxy::listeners::ProxyListener;
use hyper::Request;
use std::sync::Arc;

/// Shared state a request handler needs.
pub struct RequestHandlerContext<'a> {
    pub dispatcher: &'a Dispatcher,
    pub http_client: &'a HttpClient,
    /// Client for rules with `tls_skip_verify`.
    pub insecure_client: Option<&'a HttpClient>,
    pub body_parser: &'a BodyParserConfig,
    pub listener: &'a Arc<dyn ProxyListener>,
    /// Live remote mock endpoint, set when payload caching is off.
    pub remote_live_target: Option<&'a str>,
}

impl RequestHandlerContext<'_> {
    pub fn client_for(&self, skip_tls_verify: bool) -> &HttpClient {
        match (skip_tls_verify, self.insecure_client) {
            (true, Some(client)) => client,
            _ => self.http_client,
        }
    }
}

/// Extracted request metadata
#[derive(Clone, Debug)]
pub struct RequestInfo {
    pub method: hyper::Method,
    pub uri: hyper::Uri,
    pub headers: hyper::HeaderMap,
}

impl RequestInfo {
    pub fn from_request<B>(req: &Request<B>) -> Self {
        Self {
            method: req.method().clone(),
            uri: req.uri().clone(),
            headers: req.headers().clone(),
        }
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn path_and_query(&self) -> &str {
        self.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/")
    }

    /// Whether this is an HTTP/1.1 `Upgrade: websocket` request.
    pub fn is_websocket_upgrade(&self) -> bool {
        self.headers
            .get(hyper::header::UPGRADE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
    }
}
