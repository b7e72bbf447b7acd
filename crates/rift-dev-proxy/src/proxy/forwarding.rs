//! Request forwarding to proxy targets.

use super::client::HttpClient;
use super::headers::{RiftHeadersExt, VALUE_TRUE, X_RIFT_PROXIED};
use super::listeners::ProxyListener;
use super::response_ext::{error_response, ProxyBody, ResponseExt};
use hyper::header::{HeaderName, HeaderValue, HOST};
use hyper::{Request, Response, Uri};

/// Where and how to forward one request.
#[derive(Debug, Clone, Copy)]
pub struct ForwardTarget<'a> {
    /// Absolute upstream URI including path and query.
    pub uri: &'a str,
    /// When set, `Host` is replaced with this value.
    pub host: Option<&'a str>,
    pub extra_headers: &'a [(HeaderName, HeaderValue)],
}

/// Build the upstream request from an inbound one.
pub fn build_upstream_request(
    req: Request<ProxyBody>,
    target: ForwardTarget<'_>,
) -> Result<Request<ProxyBody>, String> {
    let uri: Uri = target
        .uri
        .parse()
        .map_err(|e| format!("invalid upstream URI '{}': {e}", target.uri))?;

    let (mut parts, body) = req.into_parts();
    parts.uri = uri;
    if let Some(host) = target.host {
        let value =
            HeaderValue::from_str(host).map_err(|e| format!("invalid host '{host}': {e}"))?;
        parts.headers.insert(HOST, value);
    }
    for (name, value) in target.extra_headers {
        parts.headers.insert(name.clone(), value.clone());
    }
    Ok(Request::from_parts(parts, body))
}

/// Forward a request without buffering either body.
///
/// Upstream failures produce `502 {"error": "Bad Gateway"}`.
pub async fn forward_request(
    http_client: &HttpClient,
    req: Request<ProxyBody>,
    target: ForwardTarget<'_>,
    listener: &dyn ProxyListener,
) -> Response<ProxyBody> {
    let method = req.method().clone();

    let upstream_req = match build_upstream_request(req, target) {
        Ok(r) => r,
        Err(e) => {
            listener.on_error(&method, target.uri, &e);
            return error_response(502, "Bad Gateway").into_boxed();
        }
    };

    listener.on_proxy_request(&method, target.uri);
    match http_client.request(upstream_req).await {
        Ok(upstream_response) => {
            listener.on_proxy_response(&method, target.uri, upstream_response.status());
            let (mut parts, body) = upstream_response.into_parts();
            parts.set_header(&X_RIFT_PROXIED, &VALUE_TRUE);
            Response::from_parts(parts, ProxyBody::new(body))
        }
        Err(e) => {
            listener.on_error(&method, target.uri, &e.to_string());
            error_response(502, "Bad Gateway").into_boxed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::response_ext::full_body;

    fn request(host: &str) -> Request<ProxyBody> {
        Request::builder()
            .method("POST")
            .uri("/api/users?x=1")
            .header("host", host)
            .header("x-keep", "1")
            .body(full_body("payload"))
            .unwrap()
    }

    #[test]
    fn test_build_rewrites_host_when_asked() {
        let extra = [(
            HeaderName::from_static("x-extra"),
            HeaderValue::from_static("yes"),
        )];
        let upstream = build_upstream_request(
            request("localhost:3721"),
            ForwardTarget {
                uri: "http://backend:8080/users?x=1",
                host: Some("backend:8080"),
                extra_headers: &extra,
            },
        )
        .unwrap();
        assert_eq!(upstream.uri(), "http://backend:8080/users?x=1");
        assert_eq!(upstream.method(), "POST");
        assert_eq!(upstream.headers().get("host").unwrap(), "backend:8080");
        assert_eq!(upstream.headers().get("x-keep").unwrap(), "1");
        assert_eq!(upstream.headers().get("x-extra").unwrap(), "yes");
    }

    #[test]
    fn test_build_keeps_host_otherwise() {
        let upstream = build_upstream_request(
            request("localhost:3721"),
            ForwardTarget {
                uri: "http://backend:8080/users",
                host: None,
                extra_headers: &[],
            },
        )
        .unwrap();
        assert_eq!(upstream.headers().get("host").unwrap(), "localhost:3721");
    }

    #[test]
    fn test_build_rejects_invalid_uri() {
        let err = build_upstream_request(
            request("h"),
            ForwardTarget {
                uri: "http://bad host/",
                host: None,
                extra_headers: &[],
            },
        )
        .unwrap_err();
        assert!(err.contains("invalid upstream URI"));
    }
}
