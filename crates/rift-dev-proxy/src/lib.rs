//! Development-time HTTP interceptor.
//!
//! Every request is served from exactly one place, chosen in a fixed order:
//! a locally authored mock, a mock synchronised from a remote
//! interface-definition service, a static proxy target, or nothing at all.
//! Mock files are reloaded as they change and the remote repository is
//! cached on disk so it keeps working offline.

pub mod config;
pub mod dispatch;
pub mod metrics;
pub mod mock;
pub mod pattern;
pub mod proxy;
pub mod sync;

pub use config::Config;
pub use dispatch::{Decision, Dispatcher, RemoteTable};
pub use mock::MockStore;
pub use proxy::DevServer;
pub use sync::RepositorySyncClient;
