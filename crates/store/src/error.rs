//! Typed error type for the store crate.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialise flow document: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("flow document '{name}' not found")]
    NotFound { name: String },

    #[error("invalid flow document name '{name}': expected a plain file name")]
    InvalidName { name: String },

    #[error("no per-user {kind} directory on this platform")]
    NoUserDir { kind: &'static str },

    #[error(transparent)]
    Document(#[from] engine::EngineError),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
