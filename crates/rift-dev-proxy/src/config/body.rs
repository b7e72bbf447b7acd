//! Request body decoder selection.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Decoder applied to a mocked request's body before it reaches a responder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyDecoder {
    Json,
    Text,
    Raw,
    Urlencoded,
    /// Leave the body unparsed; responders see `{}`.
    Ignore,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BodyParserConfig {
    /// Content type (without parameters) to decoder. Wins over the defaults.
    #[serde(default)]
    pub types: HashMap<String, BodyDecoder>,
    #[serde(default = "default_limit_bytes")]
    pub limit_bytes: usize,
}

fn default_limit_bytes() -> usize {
    100 * 1024
}

impl Default for BodyParserConfig {
    fn default() -> Self {
        Self {
            types: HashMap::new(),
            limit_bytes: default_limit_bytes(),
        }
    }
}

impl BodyParserConfig {
    /// Pick the decoder for a `Content-Type` header value.
    pub fn decoder_for(&self, content_type: Option<&str>) -> BodyDecoder {
        let media = content_type
            .map(|ct| ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
            .unwrap_or_default();

        if let Some(decoder) = self.types.get(&media) {
            return *decoder;
        }
        match media.as_str() {
            "" | "application/json" => BodyDecoder::Json,
            "text/plain" => BodyDecoder::Raw,
            "text/html" => BodyDecoder::Text,
            "application/x-www-form-urlencoded" => BodyDecoder::Urlencoded,
            m if m.ends_with("+json") => BodyDecoder::Json,
            _ => BodyDecoder::Ignore,
        }
    }
}
