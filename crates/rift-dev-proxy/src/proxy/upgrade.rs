//! WebSocket upgrade tunnelling for `ws: true` proxy rules.

use super::client::HttpClient;
use super::forwarding::{build_upstream_request, ForwardTarget};
use super::headers::{RiftHeadersExt, VALUE_TRUE, X_RIFT_PROXIED};
use super::listeners::ProxyListener;
use super::response_ext::{error_response, full_body, ProxyBody, ResponseExt};
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tracing::debug;

/// Forward an upgrade request and, on `101`, splice both connections together.
///
/// The inbound connection must be served with upgrades enabled.
pub async fn proxy_upgrade(
    http_client: &HttpClient,
    mut req: Request<ProxyBody>,
    target: ForwardTarget<'_>,
    listener: &dyn ProxyListener,
) -> Response<ProxyBody> {
    let method = req.method().clone();
    let inbound = hyper::upgrade::on(&mut req);

    let upstream_req = match build_upstream_request(req, target) {
        Ok(r) => r,
        Err(e) => {
            listener.on_error(&method, target.uri, &e);
            return error_response(502, "Bad Gateway").into_boxed();
        }
    };

    listener.on_proxy_request(&method, target.uri);
    let mut upstream_response = match http_client.request(upstream_req).await {
        Ok(r) => r,
        Err(e) => {
            listener.on_error(&method, target.uri, &e.to_string());
            return error_response(502, "Bad Gateway").into_boxed();
        }
    };
    listener.on_proxy_response(&method, target.uri, upstream_response.status());

    if upstream_response.status() != StatusCode::SWITCHING_PROTOCOLS {
        let (mut parts, body) = upstream_response.into_parts();
        parts.set_header(&X_RIFT_PROXIED, &VALUE_TRUE);
        return Response::from_parts(parts, ProxyBody::new(body));
    }

    let outbound = hyper::upgrade::on(&mut upstream_response);
    listener.on_upgrade(target.uri);
    let uri = target.uri.to_string();
    tokio::spawn(async move {
        let (client_io, upstream_io) = match tokio::try_join!(inbound, outbound) {
            Ok(pair) => pair,
            Err(e) => {
                debug!("Upgrade to {} failed: {}", uri, e);
                return;
            }
        };
        let mut client_io = TokioIo::new(client_io);
        let mut upstream_io = TokioIo::new(upstream_io);
        match tokio::io::copy_bidirectional(&mut client_io, &mut upstream_io).await {
            Ok((sent, received)) => {
                debug!("Tunnel to {} closed ({} bytes up, {} bytes down)", uri, sent, received)
            }
            Err(e) => debug!("Tunnel to {} ended: {}", uri, e),
        }
    });

    let (mut parts, _) = upstream_response.into_parts();
    parts.set_header(&X_RIFT_PROXIED, &VALUE_TRUE);
    Response::from_parts(parts, full_body(""))
}
