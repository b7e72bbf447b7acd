//! Static header names and values for responses the dev proxy produces.

use hyper::header::{HeaderName, HeaderValue};
use hyper::http::response::Parts;
use hyper::Response;

pub static X_RIFT_PROXIED: HeaderName = HeaderName::from_static("x-rift-proxied");
/// Which table served a mocked response.
pub static X_RIFT_MOCK: HeaderName = HeaderName::from_static("x-rift-mock");
pub static ACCESS_CONTROL_ALLOW_ORIGIN: HeaderName =
    HeaderName::from_static("access-control-allow-origin");
pub static ACCESS_CONTROL_ALLOW_METHODS: HeaderName =
    HeaderName::from_static("access-control-allow-methods");
pub static ACCESS_CONTROL_ALLOW_HEADERS: HeaderName =
    HeaderName::from_static("access-control-allow-headers");
pub static ACCESS_CONTROL_REQUEST_METHOD: HeaderName =
    HeaderName::from_static("access-control-request-method");
pub static ACCESS_CONTROL_REQUEST_HEADERS: HeaderName =
    HeaderName::from_static("access-control-request-headers");

pub static VALUE_TRUE: HeaderValue = HeaderValue::from_static("true");
pub static VALUE_ANY_ORIGIN: HeaderValue = HeaderValue::from_static("*");
pub static VALUE_LOCAL: HeaderValue = HeaderValue::from_static("local");
pub static VALUE_REMOTE: HeaderValue = HeaderValue::from_static("remote");
pub static VALUE_JSON: HeaderValue = HeaderValue::from_static("application/json");
pub static VALUE_TEXT_PLAIN: HeaderValue = HeaderValue::from_static("text/plain; charset=utf-8");

/// Extension trait for inserting headers into responses.
pub trait RiftHeadersExt {
    /// Insert a header with a static name and value.
    fn set_header(&mut self, name: &HeaderName, value: &HeaderValue);

    /// Insert a header with a dynamic name and value.
    /// Returns false if either could not be converted.
    fn set_header_str(&mut self, name: &str, value: &str) -> bool;

    /// Mark a mocked response as readable from any origin.
    fn allow_any_origin(&mut self) {
        self.set_header(&ACCESS_CONTROL_ALLOW_ORIGIN, &VALUE_ANY_ORIGIN);
    }
}

fn parse_pair(name: &str, value: &str) -> Option<(HeaderName, HeaderValue)> {
    let name = HeaderName::from_bytes(name.as_bytes()).ok()?;
    let value = HeaderValue::from_str(value).ok()?;
    Some((name, value))
}

impl<B> RiftHeadersExt for Response<B> {
    fn set_header(&mut self, name: &HeaderName, value: &HeaderValue) {
        self.headers_mut().insert(name.clone(), value.clone());
    }

    fn set_header_str(&mut self, name: &str, value: &str) -> bool {
        match parse_pair(name, value) {
            Some((name, value)) => {
                self.headers_mut().insert(name, value);
                true
            }
            None => false,
        }
    }
}

impl RiftHeadersExt for Parts {
    fn set_header(&mut self, name: &HeaderName, value: &HeaderValue) {
        self.headers.insert(name.clone(), value.clone());
    }

    fn set_header_str(&mut self, name: &str, value: &str) -> bool {
        match parse_pair(name, value) {
            Some((name, value)) => {
                self.headers.insert(name, value);
                true
            }
            None => false,
        }
    }
}
