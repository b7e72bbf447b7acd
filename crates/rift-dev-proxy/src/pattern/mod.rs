//! Route pattern matching.
//!
//! A route table key is a `"METHOD path-template"` string (see [`RouteKey`]).
//! The template half is compiled by [`CompiledPattern`] into an anchored regex
//! that tests a concrete request path and extracts named parameters.
//!
//! # Module Structure
//!
//! - `compile` - template tokenizer and regex compilation
//! - `route_key` - `"METHOD path"` parsing and per-request method stripping

mod compile;
mod route_key;

use serde::Serialize;
use std::collections::HashMap;

pub use compile::{CompiledPattern, ParamKey, PatternOptions};
pub use route_key::{CompiledRoute, RouteKey, ROUTE_METHODS};

/// A single extracted parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Single(String),
    /// Repeated segments (`:name+`, `:name*`) in path order.
    Multi(Vec<String>),
}

/// Parameters extracted from one request path. Never persisted.
pub type ResolvedParams = HashMap<String, ParamValue>;

#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("invalid route template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },
}
