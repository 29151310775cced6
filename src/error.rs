//! Crate-wide error type.
//!
//! Mirrors the teacher storage engine's own `crate::Error` / `crate::Result`
//! convention: one flat enum covering I/O failures and the handful of
//! domain-specific ways a request can be malformed, with `?`-friendly
//! `From` conversions via `thiserror`.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ingest record is missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid segment id: {0:?}")]
    InvalidSegmentId(String),

    #[error("code string has fewer than two tokens")]
    ShortCodeString,

    #[error("backend call to {backend} timed out after {elapsed_ms}ms")]
    Timeout { backend: &'static str, elapsed_ms: u64 },

    #[error("corrupt on-disk record in {path:?}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("replication error: {0}")]
    Replication(String),
}

pub type Result<T> = std::result::Result<T, Error>;
