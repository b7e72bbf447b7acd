//! Error types for mock loading and reloading.

use crate::pattern::PatternError;
use std::path::PathBuf;

/// Errors raised while building or reloading the mock table.
///
/// At startup any of these is fatal. During a hot reload they are reported to
/// the caller and the previous table stays in place.
#[derive(Debug, thiserror::Error)]
pub enum MockError {
    #[error("mock directory {0} does not exist or is not a directory")]
    MissingRoot(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to walk mock directory: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("mock file {path} must define a mapping of \"METHOD path\" keys")]
    NotAMapping { path: PathBuf },
    #[error("unsupported mock file {0} (expected .json, .yaml, .yml or .rhai)")]
    UnsupportedFile(PathBuf),
    #[error("script error in {origin}: {reason}")]
    Script { origin: String, reason: String },
    #[error("invalid route key in {path}: {source}")]
    Route {
        path: PathBuf,
        #[source]
        source: PatternError,
    },
}

impl MockError {
    pub(crate) fn script(origin: impl Into<String>, reason: impl ToString) -> Self {
        MockError::Script {
            origin: origin.into(),
            reason: reason.to_string(),
        }
    }
}
