//! pr_core: core types for the proportional end-result engine.
//!
//! This crate is **I/O-free**. It defines stable types/APIs used across the
//! engine (`pr_io`, `pr_algo`, `pr_pipeline`, `pr_cli`).
//!
//! - Entity ids: `ElectionId`, `UnionId`, `ListId`, `UnionListId`, `CandidateId`,
//!   `CountingCircleId`, and the `ResultDigest` fingerprint
//! - Exact rational numerics (`Ratio`) with overflow-free comparison
//! - Election entities (lists, candidates, unions, counting-circle snapshots)
//! - Settings domains (mandate algorithm, quorum, contest settings, solver options)
//!
//! Serialization derives are gated behind the `serde` feature.

pub mod errors {
    use core::fmt;

    /// Minimal error set for core-domain validation & parsing.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub enum CoreError {
        InvalidId,
        InvalidToken,
        InvalidHex,
        InvalidRatio,
        /// Checked rational arithmetic left the `i128` range.
        Overflow,
        DomainOutOfRange(&'static str),
    }

    impl fmt::Display for CoreError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                CoreError::InvalidId => write!(f, "invalid id"),
                CoreError::InvalidToken => write!(f, "invalid token"),
                CoreError::InvalidHex => write!(f, "invalid hex"),
                CoreError::InvalidRatio => write!(f, "invalid ratio"),
                CoreError::Overflow => write!(f, "arithmetic overflow in exact ratio"),
                CoreError::DomainOutOfRange(k) => write!(f, "domain out of range: {k}"),
            }
        }
    }

    impl std::error::Error for CoreError {}
}

pub mod entities;
pub mod ids;
pub mod rounding;
pub mod variables;

pub use errors::CoreError;
pub use rounding::Ratio;
