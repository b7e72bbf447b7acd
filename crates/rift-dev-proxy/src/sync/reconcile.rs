//! Incremental reconciliation of a fresh repository graph against its cache.

use super::types::{CacheEntry, PathTable, RepositoryGraph, SyncError};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
];

/// Convert a remote `updatedAt` into epoch milliseconds.
///
/// Accepts RFC 3339, common naive date-time layouts (taken as UTC), plain
/// dates, and numbers already in milliseconds.
pub fn parse_sync_time(value: &Value) -> Result<i64, SyncError> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| SyncError::RemoteData(format!("invalid updatedAt: {n}"))),
        Value::String(s) => parse_time_str(s.trim())
            .ok_or_else(|| SyncError::RemoteData(format!("invalid updatedAt: {s}"))),
        other => Err(SyncError::RemoteData(format!("invalid updatedAt: {other}"))),
    }
}

fn parse_time_str(s: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis());
    }
    s.parse::<i64>().ok()
}

/// Build the pending table for `graph`.
///
/// An interface whose `syncTime` equals the cached entry for the same
/// `"METHOD URL"` key reuses that entry, payload included. Everything else
/// starts without data and needs a payload fetch.
pub fn reconcile(graph: &RepositoryGraph, previous: &PathTable) -> Result<PathTable, SyncError> {
    let mut table = PathTable::new();

    for module in &graph.modules {
        for itf in &module.interfaces {
            let path = format!("{} {}", itf.method, itf.url);
            let sync_time = parse_sync_time(&itf.updated_at)?;

            let entry = match previous.get(&path) {
                Some(cached) if cached.sync_time == sync_time => cached.clone(),
                _ => CacheEntry {
                    id: itf.id.clone(),
                    path,
                    sync_time,
                    data: None,
                },
            };
            table.insert(entry);
        }
    }

    Ok(table)
}
