//! Request handling: runs the dispatcher and produces a response.
//!
//! A mock responder may hand the request on, in which case the remaining
//! stages (remote, proxy, pass through) run with the buffered body.

use super::body::{collect_limited, decode, parse_query};
use super::context::{RequestHandlerContext, RequestInfo};
use super::forwarding::{forward_request, ForwardTarget};
use super::headers::{
    RiftHeadersExt, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_REQUEST_HEADERS, ACCESS_CONTROL_REQUEST_METHOD, VALUE_LOCAL, VALUE_REMOTE,
    VALUE_TEXT_PLAIN, X_RIFT_MOCK,
};
use super::response_ext::{
    bytes_response, error_response, full_body, json_response, ProxyBody, ResponseExt,
};
use super::upgrade::proxy_upgrade;
use crate::dispatch::{Decision, ProxyMatch, RemoteMatch};
use crate::mock::{MockEntry, MockMatch, MockReply, MockRequest, ResponderOutcome};
use crate::sync::{offline_payload, template};
use hyper::header::CONTENT_TYPE;
use hyper::{Request, Response};
use std::collections::HashMap;
use tracing::{debug, error};

/// What the handler did with a request.
pub enum HandlerOutcome {
    Response(Response<ProxyBody>),
    /// No table claimed the request; it is returned untouched.
    PassThrough(Request<ProxyBody>),
}

impl HandlerOutcome {
    pub fn into_response(self) -> Option<Response<ProxyBody>> {
        match self {
            HandlerOutcome::Response(r) => Some(r),
            HandlerOutcome::PassThrough(_) => None,
        }
    }
}

/// Handle one inbound request.
pub async fn handle_request(
    ctx: &RequestHandlerContext<'_>,
    req: Request<ProxyBody>,
) -> HandlerOutcome {
    let info = RequestInfo::from_request(&req);
    debug!("Received request: {} {}", info.method, info.uri);

    if info.is_websocket_upgrade() {
        if let Some(hit) = ctx.dispatcher.match_upgrade(&info) {
            return HandlerOutcome::Response(handle_upgrade(ctx, req, &info, &hit).await);
        }
    }

    let mut req = req;
    let mut decision = ctx.dispatcher.dispatch(&info);
    loop {
        match decision {
            Decision::Mock(hit) => match handle_mock(ctx, req, &info, &hit).await {
                MockHandling::Done(response) => return HandlerOutcome::Response(response),
                MockHandling::Next(rebuilt) => {
                    debug!(key = hit.key(), "Mock responder passed request on");
                    req = rebuilt;
                    decision = ctx.dispatcher.dispatch_after_mock(&info);
                }
            },
            Decision::Preflight => {
                return HandlerOutcome::Response(preflight_response(&info.headers).into_boxed())
            }
            Decision::Remote(hit) => {
                return HandlerOutcome::Response(handle_remote(ctx, req, &info, &hit).await)
            }
            Decision::Proxy(hit) => {
                return HandlerOutcome::Response(handle_proxy(ctx, req, &info, &hit).await)
            }
            Decision::PassThrough => return HandlerOutcome::PassThrough(req),
        }
    }
}

enum MockHandling {
    Done(Response<ProxyBody>),
    Next(Request<ProxyBody>),
}

async fn handle_mock(
    ctx: &RequestHandlerContext<'_>,
    req: Request<ProxyBody>,
    info: &RequestInfo,
    hit: &MockMatch,
) -> MockHandling {
    let responder = match hit.entry() {
        MockEntry::Static(value) => {
            return MockHandling::Done(mock_response(json_response(200, value), &VALUE_LOCAL));
        }
        MockEntry::Responder(responder) => responder.clone(),
    };

    let (parts, body) = req.into_parts();
    let bytes = match collect_limited(body, ctx.body_parser.limit_bytes).await {
        Ok(b) => b,
        Err(e) => {
            debug!(key = hit.key(), "Rejecting mock request body: {}", e);
            return MockHandling::Done(error_response(e.status(), &e.to_string()).into_boxed());
        }
    };

    let content_type = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let decoder = ctx.body_parser.decoder_for(content_type);
    let decoded = match decode(decoder, &bytes) {
        Ok(v) => v,
        Err(e) => {
            return MockHandling::Done(error_response(e.status(), &e.to_string()).into_boxed())
        }
    };

    let mock_request = MockRequest {
        method: info.method.as_str().to_string(),
        path: info.path().to_string(),
        url: info.path_and_query().to_string(),
        query: parse_query(info.uri.query()),
        headers: lowercase_headers(&info.headers),
        body: decoded,
        params: hit.params.clone(),
    };

    let key = hit.key().to_string();
    let outcome =
        tokio::task::spawn_blocking(move || responder.respond(&mock_request)).await;

    match outcome {
        Ok(Ok(ResponderOutcome::Reply(reply))) => {
            MockHandling::Done(mock_response(reply_response(&reply), &VALUE_LOCAL))
        }
        Ok(Ok(ResponderOutcome::Next)) => {
            MockHandling::Next(Request::from_parts(parts, full_body(bytes)))
        }
        Ok(Err(e)) => {
            error!(key = %key, "Mock responder failed: {}", e);
            MockHandling::Done(error_response(500, &e.to_string()).into_boxed())
        }
        Err(e) => {
            error!(key = %key, "Mock responder panicked: {}", e);
            MockHandling::Done(error_response(500, "Mock responder panicked").into_boxed())
        }
    }
}

async fn handle_remote(
    ctx: &RequestHandlerContext<'_>,
    req: Request<ProxyBody>,
    info: &RequestInfo,
    hit: &RemoteMatch,
) -> Response<ProxyBody> {
    if let Some(live) = ctx.remote_live_target {
        let uri = format!("{live}{}", info.path_and_query());
        let mut response = forward_request(
            ctx.http_client,
            req,
            ForwardTarget {
                uri: &uri,
                host: live_host(live),
                extra_headers: &[],
            },
            ctx.listener.as_ref(),
        )
        .await;
        response.allow_any_origin();
        response.set_header(&X_RIFT_MOCK, &VALUE_REMOTE);
        return response;
    }

    let body = match hit.entry().data {
        Some(ref template_value) => template::expand(template_value),
        None => {
            debug!(key = hit.key(), "No cached payload, serving offline notice");
            offline_payload()
        }
    };
    mock_response(json_response(200, &body), &VALUE_REMOTE)
}

async fn handle_proxy(
    ctx: &RequestHandlerContext<'_>,
    req: Request<ProxyBody>,
    info: &RequestInfo,
    hit: &ProxyMatch,
) -> Response<ProxyBody> {
    let Some(rule) = ctx.dispatcher.proxy_rule(hit.rule) else {
        return error_response(500, "Proxy rule missing").into_boxed();
    };
    let path = hit
        .path_override
        .as_deref()
        .unwrap_or_else(|| info.path_and_query());
    let uri = rule.upstream_uri(path);
    forward_request(
        ctx.client_for(rule.tls_skip_verify()),
        req,
        ForwardTarget {
            uri: &uri,
            host: rule.change_host().then(|| rule.target_host()).flatten(),
            extra_headers: rule.extra_headers(),
        },
        ctx.listener.as_ref(),
    )
    .await
}

async fn handle_upgrade(
    ctx: &RequestHandlerContext<'_>,
    req: Request<ProxyBody>,
    info: &RequestInfo,
    hit: &ProxyMatch,
) -> Response<ProxyBody> {
    let Some(rule) = ctx.dispatcher.proxy_rule(hit.rule) else {
        return error_response(500, "Proxy rule missing").into_boxed();
    };
    let path = hit
        .path_override
        .as_deref()
        .unwrap_or_else(|| info.path_and_query());
    let uri = rule.upstream_uri(path);
    proxy_upgrade(
        ctx.client_for(rule.tls_skip_verify()),
        req,
        ForwardTarget {
            uri: &uri,
            host: rule.change_host().then(|| rule.target_host()).flatten(),
            extra_headers: rule.extra_headers(),
        },
        ctx.listener.as_ref(),
    )
    .await
}

/// `200 OK` that lets the browser go on with the actual request.
///
/// The requested method and headers are echoed back as allowed.
fn preflight_response(
    request_headers: &hyper::HeaderMap,
) -> Response<http_body_util::Full<hyper::body::Bytes>> {
    let mut response = bytes_response(200, "OK");
    response.set_header(&CONTENT_TYPE, &VALUE_TEXT_PLAIN);
    response.allow_any_origin();
    if let Some(method) = request_headers.get(&ACCESS_CONTROL_REQUEST_METHOD) {
        response.set_header(&ACCESS_CONTROL_ALLOW_METHODS, method);
    }
    if let Some(headers) = request_headers.get(&ACCESS_CONTROL_REQUEST_HEADERS) {
        response.set_header(&ACCESS_CONTROL_ALLOW_HEADERS, headers);
    }
    response
}

fn mock_response(
    response: Response<http_body_util::Full<hyper::body::Bytes>>,
    source: &hyper::header::HeaderValue,
) -> Response<ProxyBody> {
    let mut response = response;
    response.allow_any_origin();
    response.set_header(&X_RIFT_MOCK, source);
    response.into_boxed()
}

/// A string body with an explicit content type is sent as-is; anything else is JSON.
fn reply_response(reply: &MockReply) -> Response<http_body_util::Full<hyper::body::Bytes>> {
    let has_content_type = reply
        .headers
        .iter()
        .any(|(name, _)| name.eq_ignore_ascii_case("content-type"));
    let mut response = match (&reply.body, has_content_type) {
        (serde_json::Value::String(s), true) => bytes_response(reply.status, s.clone()),
        (body, _) => json_response(reply.status, body),
    };
    for (name, value) in &reply.headers {
        if !response.set_header_str(name, value) {
            debug!("Dropping invalid mock header {}", name);
        }
    }
    response
}

fn lowercase_headers(headers: &hyper::HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
        .collect()
}

fn live_host(target: &str) -> Option<&str> {
    let rest = target.split_once("://")?.1;
    rest.split('/').next().filter(|h| !h.is_empty())
}
