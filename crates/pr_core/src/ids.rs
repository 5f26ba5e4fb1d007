//! crates/pr_core/src/ids.rs
//! Entity ids (token-shaped) and the result basis digest.
//! Deterministic, ASCII-only, strict shapes; no I/O.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

const HEX64_LEN: usize = 64;
const TOKEN_MAX_LEN: usize = 64;

/// Token: ^[A-Za-z0-9_.:-]{1,64}$ (ASCII only)
#[inline]
pub fn is_valid_token(s: &str) -> bool {
    let len = s.len();
    if !(1..=TOKEN_MAX_LEN).contains(&len) {
        return false;
    }
    s.bytes().all(|b| {
        matches!(b,
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' |
            b'_' | b'-' | b':' | b'.'
        )
    })
}

/// Lowercase hex, exactly 64 chars.
#[inline]
pub fn is_valid_sha256(s: &str) -> bool {
    s.len() == HEX64_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

macro_rules! def_token {
    ($(#[$m:meta])* $name:ident) => {
        $(#[$m])*
        #[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        #[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Result<Self, CoreError> {
                let s = s.into();
                if is_valid_token(&s) { Ok(Self(s)) } else { Err(CoreError::InvalidToken) }
            }
            pub fn as_str(&self) -> &str { &self.0 }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
        }

        impl FromStr for $name {
            type Err = CoreError;
            fn from_str(s: &str) -> Result<Self, Self::Err> { Self::new(s) }
        }

        impl TryFrom<String> for $name {
            type Error = CoreError;
            fn try_from(s: String) -> Result<Self, Self::Error> { Self::new(s) }
        }

        impl From<$name> for String {
            fn from(v: $name) -> String { v.0 }
        }
    };
}

def_token!(
    /// One proportional election (a row of a union matrix).
    ElectionId
);
def_token!(
    /// Cross-election union that shares one biproportional computation.
    UnionId
);
def_token!(ListId);
def_token!(
    /// Groups the lists of one party across the member elections of a union.
    UnionListId
);
def_token!(CandidateId);
def_token!(CountingCircleId);

/// SHA-256 fingerprint (64-hex lowercase) of the input a result was computed from.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct ResultDigest(String);

impl ResultDigest {
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for ResultDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ResultDigest {
    type Err = CoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if is_valid_sha256(s) { Ok(Self(s.to_string())) } else { Err(CoreError::InvalidHex) }
    }
}

impl TryFrom<String> for ResultDigest {
    type Error = CoreError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        if is_valid_sha256(&s) { Ok(Self(s)) } else { Err(CoreError::InvalidHex) }
    }
}

impl From<ResultDigest> for String {
    fn from(v: ResultDigest) -> String { v.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_accept_guid_like_ids() {
        let id: ListId = "3a1f-00b2_party.SP:2027".parse().unwrap();
        assert_eq!(id.as_str(), "3a1f-00b2_party.SP:2027");
        assert!(ElectionId::new("").is_err());
        assert!(ElectionId::new("has space").is_err());
        assert!(CandidateId::new("x".repeat(65)).is_err());
    }

    #[test]
    fn digest_requires_lowercase_hex64() {
        let ok = "a".repeat(64);
        assert!(ok.parse::<ResultDigest>().is_ok());
        assert_eq!(
            "A".repeat(64).parse::<ResultDigest>().unwrap_err(),
            CoreError::InvalidHex
        );
        assert!("abc".parse::<ResultDigest>().is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserialize_rejects_bad_token() {
        let bad: Result<UnionId, _> = serde_json::from_str("\"no spaces allowed\"");
        assert!(bad.is_err());
        let good: UnionId = serde_json::from_str("\"kr-zug\"").unwrap();
        assert_eq!(good.to_string(), "kr-zug");
    }
}
