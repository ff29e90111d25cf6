//! Crate-wide error type.
//!
//! Internal, already-typed failures are returned as `ArchiverError` directly; failures
//! crossing an I/O or HTTP boundary are wrapped with `anyhow::Context` at the call site
//! and converted through `ArchiverError::Other` so the chain survives to the caller.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ArchiverError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to write {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize run manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("{0:#}")]
    Other(#[from] anyhow::Error),
}

pub type ArchiverResult<T> = Result<T, ArchiverError>;
