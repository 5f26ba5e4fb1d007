//! crates/pr_io/src/lib.rs
//! Local JSON I/O for the end-result engine. No network access.
//!
//! - `canonical_json`: sorted-key compact bytes and atomic file writes.
//! - `hasher`: SHA-256 over canonical bytes; basis digests of matrix inputs.
//! - `loader`: scenario files (definitions, audited counting circles, second-factor fixtures).
//! - `config`: `EngineConfig` with defaults for every missing field.

#![forbid(unsafe_code)]

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::de::DeserializeOwned;
use thiserror::Error;

pub mod canonical_json;
pub mod config;
pub mod hasher;
pub mod loader;

pub use hasher::HashError;

/// Unified error for pr_io.
#[derive(Debug, Error)]
pub enum IoError {
    /// Filesystem / path errors (open, create_dir_all, rename, fsync).
    #[error("io/path error: {0}")]
    Path(String),

    /// JSON (de)serialization errors with a JSON Pointer hint.
    #[error("json error at {pointer}: {msg}")]
    Json { pointer: String, msg: String },

    #[error(transparent)]
    Hash(#[from] HashError),

    /// Cross-reference or shape problems in a loaded file.
    #[error("invalid: {0}")]
    Invalid(String),

    #[error("input too large: {size} bytes (limit {limit})")]
    Limit { size: u64, limit: u64 },
}

pub type IoResult<T> = Result<T, IoError>;

impl From<std::io::Error> for IoError {
    fn from(e: std::io::Error) -> Self {
        IoError::Path(e.to_string())
    }
}

impl From<serde_json::Error> for IoError {
    fn from(e: serde_json::Error) -> Self {
        // serde_json keeps line/column, not a pointer.
        IoError::Json { pointer: format!("line {}:{}", e.line(), e.column()), msg: e.to_string() }
    }
}

/// Inputs above this size are rejected before parsing.
pub const MAX_INPUT_BYTES: u64 = 64 * 1024 * 1024;

/// Read and deserialize one JSON file, bounded by `MAX_INPUT_BYTES`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> IoResult<T> {
    let f = File::open(path).map_err(|e| IoError::Path(format!("{}: {e}", path.display())))?;
    let size = f.metadata()?.len();
    if size > MAX_INPUT_BYTES {
        return Err(IoError::Limit { size, limit: MAX_INPUT_BYTES });
    }
    let mut buf = Vec::with_capacity(size as usize);
    f.take(MAX_INPUT_BYTES).read_to_end(&mut buf)?;
    Ok(serde_json::from_slice(&buf)?)
}
