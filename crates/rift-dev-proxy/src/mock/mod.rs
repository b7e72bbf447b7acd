//! Local mock definitions.
//!
//! Mock files live in a directory tree. Each file yields an ordered mapping
//! from `"METHOD path"` keys to either a static JSON body or a responder. All
//! files are merged in traversal order into one [`MockTable`]; a key defined
//! again by a later file takes the later value.
//!
//! # Module Structure
//!
//! - `entry` - mock entries and the [`Responder`] capability
//! - `loader` - directory discovery and table construction
//! - `script` - Rhai responders and `.rhai` mock files
//! - `store` - [`MockStore`], the atomically swapped table
//! - `watcher` - file watch bridge driving hot reload

mod entry;
mod loader;
mod script;
mod store;
mod types;
mod watcher;

pub use entry::{FnResponder, MockEntry, MockReply, MockRequest, Responder, ResponderOutcome};
pub use loader::{discover, load, load_file, MockRoute, MockTable, CACHE_DIR_NAME};
pub use script::{create_engine, ScriptResponder};
pub use store::{MockMatch, MockStore};
pub use types::MockError;
pub use watcher::{should_reload, MockWatcher, WatchEvent, WatchEventKind};
