//! Rhai-backed responders.
//!
//! Two forms are supported:
//!
//! - inline scripts in declarative files, `{"_rift": {"script": "..."}}`,
//!   evaluated per request with `request` in scope;
//! - `.rhai` mock files, where `mock("GET /path", value)` registers entries in
//!   call order and a closure value becomes a responder:
//!
//! ```rhai
//! mock("GET /ping", #{ ok: true });
//! mock("GET /users/:id", |request| #{ id: request.params.id });
//! mock("POST /login", |request| {
//!     if request.body.user == "admin" { reply(200, #{ token: "t" }) } else { reply(401, "denied") }
//! });
//! ```
//!
//! A script may also evaluate to an object map; its entries are appended after
//! the `mock(...)` registrations in key order.
//!
//! Responder results: `()` hands the request on, `reply(...)` (a
//! `#{ _rift: #{ status, headers, body } }` map) sets the whole response, and
//! any other value is sent as a 200 JSON body.

use super::entry::{MockEntry, MockReply, MockRequest, Responder, ResponderOutcome};
use super::MockError;
use crate::pattern::ParamValue;
use parking_lot::Mutex;
use rhai::{Dynamic, Engine, FnPtr, ImmutableString, Map, Scope, AST};
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::{Arc, OnceLock};

/// Key marking a responder definition or a full reply map.
pub const RIFT_KEY: &str = "_rift";

const MAX_OPERATIONS: u64 = 1_000_000;
const MAX_CALL_LEVELS: usize = 64;

/// Build an engine with the responder helpers registered.
pub fn create_engine() -> Engine {
    let mut engine = Engine::new();
    engine.set_max_operations(MAX_OPERATIONS);
    engine.set_max_call_levels(MAX_CALL_LEVELS);

    engine.register_fn("reply", |status: i64, body: Dynamic| {
        reply_map(status, body, Map::new())
    });
    engine.register_fn("reply", |status: i64, body: Dynamic, headers: Map| {
        reply_map(status, body, headers)
    });

    engine
}

fn reply_map(status: i64, body: Dynamic, headers: Map) -> Dynamic {
    let mut inner = Map::new();
    inner.insert("status".into(), Dynamic::from(status));
    inner.insert("headers".into(), Dynamic::from_map(headers));
    inner.insert("body".into(), body);
    let mut outer = Map::new();
    outer.insert(RIFT_KEY.into(), Dynamic::from_map(inner));
    Dynamic::from_map(outer)
}

fn inline_engine() -> Arc<Engine> {
    static ENGINE: OnceLock<Arc<Engine>> = OnceLock::new();
    ENGINE.get_or_init(|| Arc::new(create_engine())).clone()
}

fn fingerprint_of(origin: &str, source: &str) -> String {
    let mut hasher = DefaultHasher::new();
    source.hash(&mut hasher);
    format!("rhai:{origin}:{:016x}", hasher.finish())
}

enum ScriptKind {
    Inline,
    Function(FnPtr),
}

/// A responder implemented in Rhai.
pub struct ScriptResponder {
    origin: String,
    fingerprint: String,
    engine: Arc<Engine>,
    ast: Arc<AST>,
    kind: ScriptKind,
}

impl ScriptResponder {
    /// Compile an inline responder script.
    pub fn inline(origin: impl Into<String>, script: &str) -> Result<Self, MockError> {
        let origin = origin.into();
        let engine = inline_engine();
        let ast = engine
            .compile(script)
            .map_err(|e| MockError::script(origin.clone(), e))?;
        Ok(Self {
            fingerprint: fingerprint_of(&origin, script),
            origin,
            engine,
            ast: Arc::new(ast),
            kind: ScriptKind::Inline,
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }
}

impl Responder for ScriptResponder {
    fn respond(&self, request: &MockRequest) -> Result<ResponderOutcome, MockError> {
        let request_map = request_to_dynamic(request);
        let result = match &self.kind {
            ScriptKind::Inline => {
                let mut scope = Scope::new();
                scope.push("request", request_map);
                self.engine
                    .eval_ast_with_scope::<Dynamic>(&mut scope, &self.ast)
            }
            ScriptKind::Function(f) => f.call::<Dynamic>(&self.engine, &self.ast, (request_map,)),
        }
        .map_err(|e| MockError::script(self.origin.clone(), e))?;

        interpret(result).map_err(|reason| MockError::script(self.origin.clone(), reason))
    }

    fn fingerprint(&self) -> String {
        self.fingerprint.clone()
    }
}

/// Turn a declarative JSON value into an entry, recognising `_rift.script`.
pub fn entry_from_value(origin: &str, value: Value) -> Result<MockEntry, MockError> {
    let script = value
        .as_object()
        .filter(|obj| obj.len() == 1)
        .and_then(|obj| obj.get(RIFT_KEY))
        .and_then(|marker| marker.get("script"))
        .and_then(Value::as_str);

    match script {
        Some(script) => Ok(MockEntry::responder(ScriptResponder::inline(origin, script)?)),
        None => Ok(MockEntry::Static(value)),
    }
}

/// Evaluate a `.rhai` mock file into ordered `(key, entry)` pairs.
pub fn load_script_file(path: &Path, source: &str) -> Result<Vec<(String, MockEntry)>, MockError> {
    let origin = path.display().to_string();
    let registered: Arc<Mutex<Vec<(String, Dynamic)>>> = Arc::new(Mutex::new(Vec::new()));

    let mut engine = create_engine();
    let sink = registered.clone();
    engine.register_fn("mock", move |key: ImmutableString, value: Dynamic| {
        sink.lock().push((key.to_string(), value));
    });

    let ast = engine
        .compile(source)
        .map_err(|e| MockError::script(origin.clone(), e))?;
    let result = engine
        .eval_ast::<Dynamic>(&ast)
        .map_err(|e| MockError::script(origin.clone(), e))?;

    let mut values = std::mem::take(&mut *registered.lock());
    if let Some(map) = result.clone().try_cast::<Map>() {
        values.extend(map.into_iter().map(|(k, v)| (k.to_string(), v)));
    } else if !result.is_unit() {
        return Err(MockError::NotAMapping {
            path: path.to_path_buf(),
        });
    }

    let engine = Arc::new(engine);
    let ast = Arc::new(ast);
    let file_fingerprint = fingerprint_of(&origin, source);

    values
        .into_iter()
        .map(|(key, value)| {
            let entry = if let Some(f) = value.clone().try_cast::<FnPtr>() {
                MockEntry::responder(ScriptResponder {
                    origin: format!("{origin}#{key}"),
                    fingerprint: format!("{file_fingerprint}#{key}"),
                    engine: engine.clone(),
                    ast: ast.clone(),
                    kind: ScriptKind::Function(f),
                })
            } else {
                entry_from_value(&format!("{origin}#{key}"), dynamic_to_json(value))?
            };
            Ok((key, entry))
        })
        .collect()
}

/// Interpret a responder's return value.
pub(crate) fn interpret(result: Dynamic) -> Result<ResponderOutcome, String> {
    if result.is_unit() {
        return Ok(ResponderOutcome::Next);
    }

    let reply = result
        .clone()
        .try_cast::<Map>()
        .and_then(|map| map.get(RIFT_KEY).cloned())
        .and_then(|inner| inner.try_cast::<Map>());

    let Some(reply) = reply else {
        return Ok(ResponderOutcome::Reply(MockReply::json(dynamic_to_json(
            result,
        ))));
    };

    let status = match reply.get("status") {
        Some(v) => v
            .as_int()
            .ok()
            .filter(|s| (100..=999).contains(s))
            .ok_or_else(|| format!("invalid reply status: {v}"))? as u16,
        None => 200,
    };

    let mut headers = Vec::new();
    if let Some(map) = reply
        .get("headers")
        .and_then(|h| h.clone().try_cast::<Map>())
    {
        for (name, value) in map {
            let value = if value.is_string() {
                value.into_string().unwrap_or_default()
            } else {
                value.to_string()
            };
            headers.push((name.to_string(), value));
        }
    }

    let body = reply
        .get("body")
        .cloned()
        .map(dynamic_to_json)
        .unwrap_or(Value::Null);

    Ok(ResponderOutcome::Reply(MockReply {
        status,
        headers,
        body,
    }))
}

fn request_to_dynamic(request: &MockRequest) -> Dynamic {
    let mut map = Map::new();
    map.insert("method".into(), Dynamic::from(request.method.clone()));
    map.insert("path".into(), Dynamic::from(request.path.clone()));
    map.insert("url".into(), Dynamic::from(request.url.clone()));

    let mut query = Map::new();
    for (k, v) in &request.query {
        query.insert(k.as_str().into(), Dynamic::from(v.clone()));
    }
    map.insert("query".into(), Dynamic::from_map(query));

    let mut headers = Map::new();
    for (k, v) in &request.headers {
        headers.insert(k.as_str().into(), Dynamic::from(v.clone()));
    }
    map.insert("headers".into(), Dynamic::from_map(headers));

    let mut params = Map::new();
    for (k, v) in &request.params {
        let value = match v {
            ParamValue::Single(s) => Dynamic::from(s.clone()),
            ParamValue::Multi(items) => {
                Dynamic::from_array(items.iter().cloned().map(Dynamic::from).collect())
            }
        };
        params.insert(k.as_str().into(), value);
    }
    map.insert("params".into(), Dynamic::from_map(params));

    map.insert("body".into(), json_to_dynamic(request.body.clone()));
    Dynamic::from_map(map)
}

pub(crate) fn json_to_dynamic(value: Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from(b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Dynamic::from(i)
            } else if let Some(f) = n.as_f64() {
                Dynamic::from(f)
            } else {
                Dynamic::UNIT
            }
        }
        Value::String(s) => Dynamic::from(s),
        Value::Array(arr) => Dynamic::from_array(arr.into_iter().map(json_to_dynamic).collect()),
        Value::Object(obj) => {
            let mut map = Map::new();
            for (k, v) in obj {
                map.insert(k.into(), json_to_dynamic(v));
            }
            Dynamic::from_map(map)
        }
    }
}

pub(crate) fn dynamic_to_json(value: Dynamic) -> Value {
    if value.is_unit() {
        Value::Null
    } else if let Ok(b) = value.as_bool() {
        Value::Bool(b)
    } else if let Ok(i) = value.as_int() {
        Value::Number(i.into())
    } else if let Ok(f) = value.as_float() {
        serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    } else if value.is_string() {
        Value::String(value.into_string().unwrap_or_default())
    } else if let Some(arr) = value.clone().try_cast::<rhai::Array>() {
        Value::Array(arr.into_iter().map(dynamic_to_json).collect())
    } else if let Some(map) = value.clone().try_cast::<Map>() {
        let mut obj = serde_json::Map::new();
        for (k, v) in map {
            obj.insert(k.to_string(), dynamic_to_json(v));
        }
        Value::Object(obj)
    } else {
        Value::String(value.to_string())
    }
}
