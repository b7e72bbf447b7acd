//! Expansion of remote mock payload templates.
//!
//! Payloads use the Mock.js template dialect. Supported here:
//!
//! - property rules `name|rule`:
//!   - strings: `|count`, `|min-max` repeat the string
//!   - numbers: `|min-max` random integer, `|min-max.dmin-dmax` random float,
//!     `|+step` keeps the value
//!   - booleans: `|1` random, `|min-max` value with probability min/(min+max)
//!   - objects: `|count`, `|min-max` pick that many properties
//!   - arrays: `|1` pick one item, `|+1` first item, `|count`, `|min-max`
//!     repeat the items
//! - `@placeholder` and `@placeholder(args)` in strings
//!
//! A string made of a single placeholder takes the placeholder's type, so
//! `"@integer(1, 5)"` becomes a number. Unknown placeholders are left as-is.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use serde_json::{Map, Number, Value};
use std::sync::OnceLock;

const MAX_SAFE_INTEGER: i64 = 9_007_199_254_740_991;

const FIRST_NAMES: &[&str] = &[
    "James", "Mary", "John", "Patricia", "Robert", "Linda", "Michael", "Barbara", "William",
    "Elizabeth", "David", "Jennifer", "Richard", "Susan", "Joseph", "Margaret",
];
const LAST_NAMES: &[&str] = &[
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Miller", "Davis", "Garcia", "Rodriguez",
    "Wilson", "Martinez", "Anderson", "Taylor", "Thomas", "Moore", "Martin",
];
const DOMAINS: &[&str] = &["com", "net", "org", "io", "dev"];

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"@([A-Za-z]+)(?:\(([^)]*)\))?").expect("placeholder regex is valid")
    })
}

/// Expand `template` with the thread-local RNG.
pub fn expand(template: &Value) -> Value {
    expand_with(template, &mut rand::thread_rng())
}

/// Expand `template` with a caller-provided RNG.
pub fn expand_with<R: Rng + ?Sized>(template: &Value, rng: &mut R) -> Value {
    match template {
        Value::Object(map) => expand_object(map, rng),
        Value::Array(items) => Value::Array(items.iter().map(|v| expand_with(v, rng)).collect()),
        Value::String(s) => expand_string(s, rng),
        other => other.clone(),
    }
}

fn expand_object<R: Rng + ?Sized>(map: &Map<String, Value>, rng: &mut R) -> Value {
    let mut out = Map::new();
    for (raw_key, value) in map {
        match raw_key.split_once('|') {
            Some((name, rule)) => {
                let rule = Rule::parse(rule);
                out.insert(name.to_string(), apply_rule(&rule, value, rng));
            }
            None => {
                out.insert(raw_key.clone(), expand_with(value, rng));
            }
        }
    }
    Value::Object(out)
}

/// Upper bound on string repeats and array copies from a `|count` rule.
const MAX_REPEAT: usize = 1000;

#[derive(Debug, Default, Clone, PartialEq)]
struct Rule {
    min: Option<i64>,
    max: Option<i64>,
    dmin: Option<u32>,
    dmax: Option<u32>,
    step: Option<i64>,
}

impl Rule {
    fn parse(rule: &str) -> Self {
        let rule = rule.trim();
        if let Some(step) = rule.strip_prefix('+') {
            return Rule {
                step: step.parse().ok(),
                ..Default::default()
            };
        }

        let (int_part, dec_part) = match rule.split_once('.') {
            Some((i, d)) => (i, Some(d)),
            None => (rule, None),
        };
        let (min, max) = parse_range(int_part);
        let (dmin, dmax) = dec_part.map(parse_range).unwrap_or((None, None));

        Rule {
            min,
            max,
            dmin: dmin.map(|d| d.clamp(0, 17) as u32),
            dmax: dmax.map(|d| d.clamp(0, 17) as u32),
            step: None,
        }
    }

    /// Count in `[min, max]`, or `min` when no max is given.
    fn count<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<i64> {
        match (self.min, self.max) {
            (Some(min), Some(max)) if max >= min => Some(rng.gen_range(min..=max)),
            (Some(min), Some(max)) => Some(rng.gen_range(max..=min)),
            (Some(min), None) => Some(min),
            _ => None,
        }
    }

    /// [`Rule::count`] as a repeat count, capped at [`MAX_REPEAT`].
    fn repeat<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<usize> {
        self.count(rng)
            .map(|n| n.clamp(0, MAX_REPEAT as i64) as usize)
    }
}

fn parse_range(s: &str) -> (Option<i64>, Option<i64>) {
    // A leading '-' belongs to the first number.
    let (lead, rest) = if let Some(r) = s.strip_prefix('-') {
        ("-", r)
    } else {
        ("", s)
    };
    match rest.split_once('-') {
        Some((a, b)) => (
            format!("{lead}{a}").parse().ok(),
            b.parse().ok(),
        ),
        None => (format!("{lead}{rest}").parse().ok(), None),
    }
}

fn apply_rule<R: Rng + ?Sized>(rule: &Rule, value: &Value, rng: &mut R) -> Value {
    match value {
        Value::String(s) => match rule.repeat(rng) {
            Some(n) => {
                let repeated = s.repeat(n);
                expand_string(&repeated, rng)
            }
            None => expand_string(s, rng),
        },
        Value::Number(n) => number_rule(rule, n, rng),
        Value::Bool(b) => match (rule.min, rule.max) {
            (Some(min), Some(max)) if min.checked_add(max).is_some_and(|t| t > 0) => {
                let p = min as f64 / (min as f64 + max as f64);
                Value::Bool(if rng.gen_bool(p.clamp(0.0, 1.0)) { *b } else { !*b })
            }
            (Some(_), None) => Value::Bool(if rng.gen_bool(0.5) { *b } else { !*b }),
            _ => Value::Bool(*b),
        },
        Value::Object(map) => match rule.count(rng) {
            Some(n) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.shuffle(rng);
                keys.truncate(n.clamp(0, map.len() as i64) as usize);
                let picked: Map<String, Value> = map
                    .iter()
                    .filter(|(k, _)| keys.contains(k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                expand_object(&picked, rng)
            }
            None => expand_object(map, rng),
        },
        Value::Array(items) => array_rule(rule, items, rng),
        Value::Null => Value::Null,
    }
}

fn number_rule<R: Rng + ?Sized>(rule: &Rule, n: &Number, rng: &mut R) -> Value {
    if rule.step.is_some() {
        return Value::Number(n.clone());
    }
    let Some(int) = rule.count(rng) else {
        return Value::Number(n.clone());
    };
    match (rule.dmin, rule.dmax) {
        (None, None) => Value::from(int),
        (dmin, dmax) => {
            let dmin = dmin.unwrap_or(0);
            let dmax = dmax.unwrap_or(dmin).max(dmin);
            let digits = rng.gen_range(dmin..=dmax);
            let mut text = int.to_string();
            if digits > 0 {
                text.push('.');
                for i in 0..digits {
                    // Last decimal is never zero so the precision is kept.
                    let d = if i + 1 == digits {
                        rng.gen_range(1..=9)
                    } else {
                        rng.gen_range(0..=9)
                    };
                    text.push(char::from(b'0' + d as u8));
                }
            }
            text.parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| Value::from(int))
        }
    }
}

fn array_rule<R: Rng + ?Sized>(rule: &Rule, items: &[Value], rng: &mut R) -> Value {
    if items.is_empty() {
        return Value::Array(Vec::new());
    }
    if rule.step.is_some() {
        return expand_with(&items[0], rng);
    }
    match (rule.min, rule.max) {
        (Some(1), None) => items
            .choose(rng)
            .map(|v| expand_with(v, rng))
            .unwrap_or(Value::Null),
        _ => match rule.repeat(rng) {
            Some(n) => {
                let mut out = Vec::with_capacity(items.len().saturating_mul(n));
                for _ in 0..n {
                    out.extend(items.iter().map(|v| expand_with(v, rng)));
                }
                Value::Array(out)
            }
            None => Value::Array(items.iter().map(|v| expand_with(v, rng)).collect()),
        },
    }
}

fn expand_string<R: Rng + ?Sized>(s: &str, rng: &mut R) -> Value {
    let re = placeholder_regex();
    if !s.contains('@') {
        return Value::String(s.to_string());
    }

    if let Some(caps) = re.captures(s) {
        if caps.get(0).map(|m| m.as_str().len()) == Some(s.len()) {
            let name = &caps[1];
            let args = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            if let Some(value) = placeholder(name, args, rng) {
                return value;
            }
            return Value::String(s.to_string());
        }
    }

    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for caps in re.captures_iter(s) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&s[last..whole.start()]);
        let args = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        match placeholder(&caps[1], args, rng) {
            Some(Value::String(v)) => out.push_str(&v),
            Some(other) => out.push_str(&other.to_string()),
            None => out.push_str(whole.as_str()),
        }
        last = whole.end();
    }
    out.push_str(&s[last..]);
    Value::String(out)
}

fn int_args(args: &str) -> Vec<i64> {
    args.split(',')
        .filter_map(|a| a.trim().parse::<i64>().ok())
        .collect()
}

fn int_between<R: Rng + ?Sized>(rng: &mut R, args: &str, min: i64, max: i64) -> i64 {
    let parsed = int_args(args);
    let lo = parsed.first().copied().unwrap_or(min);
    let hi = parsed.get(1).copied().unwrap_or(max);
    if lo <= hi {
        rng.gen_range(lo..=hi)
    } else {
        rng.gen_range(hi..=lo)
    }
}

fn word<R: Rng + ?Sized>(rng: &mut R, min: usize, max: usize) -> String {
    let len = rng.gen_range(min..=max);
    (0..len)
        .map(|_| char::from(b'a' + rng.gen_range(0..26u8)))
        .collect()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn random_datetime<R: Rng + ?Sized>(rng: &mut R) -> DateTime<Utc> {
    let now = Utc::now().timestamp();
    let secs = rng.gen_range(0..=now.max(1));
    DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
}

fn placeholder<R: Rng + ?Sized>(name: &str, args: &str, rng: &mut R) -> Option<Value> {
    let value = match name.to_ascii_lowercase().as_str() {
        "id" => Value::String((0..18).map(|_| char::from(b'0' + rng.gen_range(0..10u8))).collect()),
        "guid" | "uuid" => {
            let bytes: [u8; 16] = rng.gen();
            let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
            Value::String(format!(
                "{}-{}-4{}-{}-{}",
                &hex[0..8],
                &hex[8..12],
                &hex[13..16],
                &hex[16..20],
                &hex[20..32]
            ))
        }
        "integer" | "int" => Value::from(int_between(rng, args, -MAX_SAFE_INTEGER, MAX_SAFE_INTEGER)),
        "natural" => Value::from(int_between(rng, args, 0, MAX_SAFE_INTEGER)),
        "float" => {
            let parsed = int_args(args);
            let lo = parsed.first().copied().unwrap_or(0) as f64;
            let hi = parsed.get(1).copied().unwrap_or(10_000) as f64;
            let v = if lo < hi { rng.gen_range(lo..hi) } else { lo };
            Number::from_f64((v * 100.0).round() / 100.0)
                .map(Value::Number)
                .unwrap_or(Value::Null)
        }
        "boolean" | "bool" => Value::Bool(rng.gen_bool(0.5)),
        "first" => Value::String(FIRST_NAMES.choose(rng)?.to_string()),
        "last" => Value::String(LAST_NAMES.choose(rng)?.to_string()),
        "name" => Value::String(format!(
            "{} {}",
            FIRST_NAMES.choose(rng)?,
            LAST_NAMES.choose(rng)?
        )),
        "word" => Value::String(word(rng, 3, 10)),
        "title" => {
            let n = rng.gen_range(3..=7);
            let words: Vec<String> = (0..n).map(|_| capitalize(&word(rng, 3, 10))).collect();
            Value::String(words.join(" "))
        }
        "sentence" => {
            let n = rng.gen_range(12..=18);
            let words: Vec<String> = (0..n).map(|_| word(rng, 3, 10)).collect();
            Value::String(format!("{}.", capitalize(&words.join(" "))))
        }
        "email" => Value::String(format!(
            "{}@{}.{}",
            word(rng, 3, 10),
            word(rng, 3, 10),
            DOMAINS.choose(rng)?
        )),
        "url" => Value::String(format!(
            "http://{}.{}/{}",
            word(rng, 3, 10),
            DOMAINS.choose(rng)?,
            word(rng, 3, 10)
        )),
        "date" => Value::String(random_datetime(rng).format("%Y-%m-%d").to_string()),
        "time" => Value::String(random_datetime(rng).format("%H:%M:%S").to_string()),
        "datetime" => Value::String(random_datetime(rng).format("%Y-%m-%d %H:%M:%S").to_string()),
        "now" => Value::String(Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()),
        _ => return None,
    };
    Some(value)
}
