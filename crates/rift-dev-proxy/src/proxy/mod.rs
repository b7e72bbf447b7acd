//! Proxy forwarding and the HTTP server loop.
//!
//! # Module Structure
//!
//! - `server` - DevServer struct, background tasks and main run loop
//! - `handler` - turns a dispatch decision into a response
//! - `rules` - compiled proxy rules: context, bypass, path rewrite
//! - `forwarding` - request forwarding to proxy targets
//! - `upgrade` - WebSocket tunnelling for `ws` rules
//! - `listeners` - proxy lifecycle hooks
//! - `body` - request body limits and decoders for mock responders
//! - `client` - HTTP client creation and configuration
//! - `tls` - certificate verifier for `tls_skip_verify` targets

mod body;
mod client;
mod context;
mod forwarding;
mod handler;
mod headers;
mod listeners;
mod response_ext;
mod rules;
mod server;
mod tls;
mod upgrade;

pub use body::{decode as decode_body, parse_query, BodyError};
pub use client::{create_http_client, HttpClient};
pub use context::{RequestHandlerContext, RequestInfo};
pub use forwarding::{forward_request, ForwardTarget};
pub use handler::{handle_request, HandlerOutcome};
pub use listeners::{LogListener, ProxyListener};
pub use response_ext::{error_response, full_body, ProxyBody};
pub use rules::{BypassFn, BypassOutcome, ContextMatcher, ProxyRule};
pub use server::DevServer;
