//! Response construction helpers.

use super::headers::{RiftHeadersExt, VALUE_JSON};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::{Response, StatusCode};
use std::convert::Infallible;

/// Boxed body type every handler returns.
pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// Extension trait for `Response<Full<Bytes>>` providing common transformations.
pub trait ResponseExt {
    /// Convert the response body into a boxed body type.
    fn into_boxed(self) -> Response<ProxyBody>;
}

impl ResponseExt for Response<Full<Bytes>> {
    fn into_boxed(self) -> Response<ProxyBody> {
        self.map(|b| BoxBody::new(b.map_err(|never: Infallible| match never {})))
    }
}

/// Box an in-memory body.
pub fn full_body(bytes: impl Into<Bytes>) -> ProxyBody {
    BoxBody::new(Full::new(bytes.into()).map_err(|never: Infallible| match never {}))
}

/// Response with `status` and raw bytes. Unknown status codes become 500.
pub fn bytes_response(status: u16, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    response
}

/// JSON response with `status`.
pub fn json_response(status: u16, body: &serde_json::Value) -> Response<Full<Bytes>> {
    let mut response = bytes_response(status, body.to_string());
    response.set_header(&CONTENT_TYPE, &VALUE_JSON);
    response
}

/// `{"error": message}` with `status`.
pub fn error_response(status: u16, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &serde_json::json!({ "error": message }))
}
