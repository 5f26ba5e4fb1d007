//! crates/pr_io/src/hasher.rs
//!
//! SHA-256 over canonical JSON bytes. Hex digests are lowercase.
//!
//! - `sha256_canonical(..)` for values/structs (goes through canonical_json).
//! - `sha256_hex(..)` for raw bytes.
//! - `basis_digest(..)` fingerprints the matrix input a double-proportional result was
//!   computed from; lot decisions carry it to detect stale submissions.

#![forbid(unsafe_code)]

use pr_core::ids::ResultDigest;
use serde::Serialize;
use digest::Digest;
use sha2::Sha256;
use thiserror::Error;

use crate::canonical_json::to_canonical_bytes_of;

#[derive(Error, Debug)]
pub enum HashError {
    #[error("JSON serialization error while hashing: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("digest is not lowercase 64-hex: {0}")]
    InvalidHex(String),
}

fn finish(hasher: Sha256) -> String {
    hex::encode(hasher.finalize())
}

/// SHA-256 over raw bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    finish(hasher)
}

/// SHA-256 over the canonical JSON bytes of any serializable value.
pub fn sha256_canonical<T: Serialize>(value: &T) -> Result<String, HashError> {
    Ok(sha256_hex(&to_canonical_bytes_of(value)?))
}

pub fn basis_digest<T: Serialize>(input: &T) -> Result<ResultDigest, HashError> {
    let hex = sha256_canonical(input)?;
    hex.parse().map_err(|_| HashError::InvalidHex(hex))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hex_encoding_is_lowercase() {
        assert_eq!(sha256_hex(b"abc"), "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    }

    #[test]
    fn canonical_hashing_ignores_field_order() {
        #[derive(Serialize)]
        struct T {
            b: u32,
            a: u32,
        }
        let h1 = sha256_canonical(&T { b: 2, a: 1 }).unwrap();
        let h2 = sha256_canonical(&json!({"a": 1, "b": 2})).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn basis_digest_changes_with_input() {
        let a = basis_digest(&json!({"cells": [[1, 2]]})).unwrap();
        let b = basis_digest(&json!({"cells": [[1, 3]]})).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }
}
