//! Remote interface-definition sync.
//!
//! Pulls a repository of interface definitions (and its collaborator
//! repositories) from a Rap2-style service, caches it on disk per repository
//! keyed by each interface's update time, and degrades to the cached copy
//! when the service is unavailable.
//!
//! # Module Structure
//!
//! - `api` - [`RemoteApi`] trait and its HTTP implementation
//! - `cache` - [`SyncCache`], one JSON file per repository
//! - `client` - [`RepositorySyncClient`] state machine
//! - `progress` - [`ProgressSink`] for payload fetch progress
//! - `reconcile` - incremental reuse of cached payloads
//! - `template` - expansion of payload templates when served
//! - `types` - remote data model and [`SyncError`]

mod api;
mod cache;
mod client;
mod progress;
mod reconcile;
pub mod template;
mod types;

pub use api::{HttpRemoteApi, RemoteApi};
pub use cache::SyncCache;
pub use client::{RepositorySyncClient, SyncOptions, SyncOutcome, SyncReport, SyncState};
pub use progress::{LogProgress, ProgressSink};
pub use reconcile::{parse_sync_time, reconcile};
pub use types::{
    CacheEntry, CollaboratorRef, InterfaceDef, PathTable, RemoteId, RepoCache, RepoInfo,
    RepositoryGraph, RepositoryModule, RepositoryResponse, SyncError,
};

/// Body served for a matched remote route with no cached payload.
pub fn offline_payload() -> serde_json::Value {
    serde_json::json!({
        "isOk": false,
        "errMsg": "no cached mock rule, cannot mock offline"
    })
}
