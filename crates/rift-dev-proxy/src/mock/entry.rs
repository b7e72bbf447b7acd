//! Mock entries and the responder capability.

use super::MockError;
use crate::pattern::ResolvedParams;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Request data handed to a responder.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MockRequest {
    pub method: String,
    /// Path without the query string.
    pub path: String,
    /// Path and query as received.
    pub url: String,
    pub query: HashMap<String, String>,
    /// Header names are lowercased.
    pub headers: HashMap<String, String>,
    /// Body decoded by the selected body decoder.
    pub body: Value,
    pub params: ResolvedParams,
}

/// A fully specified response produced by a responder.
#[derive(Debug, Clone, PartialEq)]
pub struct MockReply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl MockReply {
    pub fn json(body: Value) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body,
        }
    }
}

/// What a responder decided to do with the request.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponderOutcome {
    Reply(MockReply),
    /// Hand the request on to the remaining dispatch stages.
    Next,
}

/// A mock that computes its response from the request.
pub trait Responder: Send + Sync {
    fn respond(&self, request: &MockRequest) -> Result<ResponderOutcome, MockError>;

    /// Stable identity used to compare tables across reloads.
    fn fingerprint(&self) -> String;
}

/// Responder backed by a Rust closure.
pub struct FnResponder<F> {
    name: String,
    func: F,
}

impl<F> FnResponder<F>
where
    F: Fn(&MockRequest) -> ResponderOutcome + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Responder for FnResponder<F>
where
    F: Fn(&MockRequest) -> ResponderOutcome + Send + Sync,
{
    fn respond(&self, request: &MockRequest) -> Result<ResponderOutcome, MockError> {
        Ok((self.func)(request))
    }

    fn fingerprint(&self) -> String {
        format!("fn:{}", self.name)
    }
}

/// One value in the mock table.
#[derive(Clone)]
pub enum MockEntry {
    /// Served as a JSON body with status 200.
    Static(Value),
    Responder(Arc<dyn Responder>),
}

impl MockEntry {
    pub fn responder<R: Responder + 'static>(responder: R) -> Self {
        MockEntry::Responder(Arc::new(responder))
    }

    pub fn is_responder(&self) -> bool {
        matches!(self, MockEntry::Responder(_))
    }
}

impl PartialEq for MockEntry {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MockEntry::Static(a), MockEntry::Static(b)) => a == b,
            (MockEntry::Responder(a), MockEntry::Responder(b)) => {
                a.fingerprint() == b.fingerprint()
            }
            _ => false,
        }
    }
}

impl fmt::Debug for MockEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MockEntry::Static(v) => f.debug_tuple("Static").field(v).finish(),
            MockEntry::Responder(r) => f.debug_tuple("Responder").field(&r.fingerprint()).finish(),
        }
    }
}
