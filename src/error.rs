//! Error taxonomy for indexing and query operations.
//!
//! Decode and coordinate-resolution failures are absorbed where they
//! happen (logged and counted, never fatal); everything that crosses a
//! module boundary is one of the variants below. The CLI wraps these in
//! `anyhow::Result` at its own boundary.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexingError {
    /// The external extractor exited abnormally or wrote to stderr.
    /// The store is left cleared when this is returned from a reindex.
    #[error("extractor failed with exit code {status}: {stderr}")]
    Extractor { status: i32, stderr: String },

    /// The external syntax checker misbehaved. Soft: diagnostics are
    /// cleared for the affected files and reindex is deferred.
    #[error("syntax checker failed: {0}")]
    SyntaxCheck(String),

    /// The file list could not be read or parsed.
    #[error("file list {path}: {message}")]
    FileList { path: PathBuf, message: String },

    /// Cooperative cancellation between ingest phases. The store keeps
    /// whatever partial state ingest reached; the next reindex repairs
    /// it.
    #[error("indexing cancelled")]
    Cancelled,

    /// An on-disk store uses an older, incompatible schema.
    #[error("unsupported index schema version {found}; expected {expected} (reindex to migrate)")]
    SchemaVersion { found: String, expected: String },

    #[error(transparent)]
    Store(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = IndexingError> = std::result::Result<T, E>;
