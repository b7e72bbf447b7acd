//! Request body collection and decoding for mock responders.

use super::response_ext::ProxyBody;
use crate::config::BodyDecoder;
use base64::Engine as _;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Bytes;
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    #[error("request body exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("failed to read request body: {0}")]
    Read(String),
    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl BodyError {
    pub fn status(&self) -> u16 {
        match self {
            BodyError::TooLarge { .. } => 413,
            BodyError::Read(_) | BodyError::InvalidJson(_) => 400,
        }
    }
}

/// Buffer a body, refusing more than `limit` bytes.
pub async fn collect_limited(body: ProxyBody, limit: usize) -> Result<Bytes, BodyError> {
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(BodyError::TooLarge { limit })
        }
        Err(e) => Err(BodyError::Read(e.to_string())),
    }
}

/// Decode a buffered body. An empty body is `{}` for json and urlencoded.
pub fn decode(decoder: BodyDecoder, bytes: &[u8]) -> Result<Value, BodyError> {
    match decoder {
        BodyDecoder::Json => {
            if bytes.iter().all(u8::is_ascii_whitespace) {
                Ok(Value::Object(Map::new()))
            } else {
                Ok(serde_json::from_slice(bytes)?)
            }
        }
        BodyDecoder::Text => Ok(Value::String(String::from_utf8_lossy(bytes).into_owned())),
        BodyDecoder::Raw => Ok(Value::String(
            base64::engine::general_purpose::STANDARD.encode(bytes),
        )),
        BodyDecoder::Urlencoded => Ok(form_to_value(&String::from_utf8_lossy(bytes))),
        BodyDecoder::Ignore => Ok(Value::Object(Map::new())),
    }
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

/// Split `a=1&b=2` into decoded pairs, in order.
pub fn parse_pairs(input: &str) -> Vec<(String, String)> {
    input
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (decode_component(k), decode_component(v)),
            None => (decode_component(pair), String::new()),
        })
        .collect()
}

/// Form fields as an object. Repeated fields become arrays.
fn form_to_value(input: &str) -> Value {
    let mut map = Map::new();
    for (key, value) in parse_pairs(input) {
        match map.get_mut(&key) {
            Some(Value::Array(items)) => items.push(Value::String(value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
            None => {
                map.insert(key, Value::String(value));
            }
        }
    }
    Value::Object(map)
}

/// Query string as a flat map; the last value of a repeated key wins.
pub fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    query.map(parse_pairs).unwrap_or_default().into_iter().collect()
}
