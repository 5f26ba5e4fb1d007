// crates/pr_algo/src/lib.rs
//! Pure apportionment algorithms. No I/O, no persistence, no clocks.
//!
//! Determinism:
//! - Every quotient is an exact `Ratio`; no floats enter a comparison.
//! - Scans run in input order (rows, then columns) so equal inputs give equal outputs.

#![forbid(unsafe_code)]

pub use pr_core::{
    ids::{CandidateId, ElectionId, ListId, UnionListId},
    rounding::Ratio,
    CoreError,
};

// ----------------------------- Errors ---------------------------------------------

/// Which margin of the matrix an error refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Row,
    Column,
}

impl core::fmt::Display for Axis {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self { Axis::Row => "row", Axis::Column => "column" })
    }
}

/// Computation faults. None of these is transient; callers report, never retry.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    #[error("no column with positive weight can take {seats} seat(s)")]
    NoEligibleColumns { seats: u64 },
    #[error("matrix dimensions do not match the marginals")]
    DimensionMismatch,
    #[error("row marginals sum to {rows} but column marginals sum to {columns}")]
    MarginalsMismatch { rows: u64, columns: u64 },
    #[error("{axis} {index} has a seat target but no weight")]
    ZeroWeightWithTarget { axis: Axis, index: usize },
    #[error("no seat matrix with this pattern of zero weights meets both marginals")]
    InfeasibleMarginals,
    #[error("biproportional solver did not converge within {iterations} iterations")]
    NotConverged { iterations: u32 },
    #[error("more than {limit} lot decision variants")]
    TooManyVariants { limit: usize },
    #[error(transparent)]
    Arithmetic(#[from] CoreError),
}

// ----------------------------- Allocation (public surface) ---------------------------

pub mod allocation {
    pub mod biproportional;
    pub mod divisor;
    pub mod quorum;

    pub use biproportional::{solve as solve_biproportional, BiproportionalSolution, CellPos};
    pub use divisor::{apportion, round_standard, Apportionment, DivisorMethod, OpenTie, RoundedSeats};
    pub use quorum::{evaluate_quorum, voter_numbers};
}

pub mod double_proportional;
pub mod lot_decision;
pub mod matrix;
pub mod ranking;

pub use double_proportional::{ApportionmentState, DoubleProportionalResult};
pub use lot_decision::{LotDecision, LotDecisionEntry, LotDecisionError, ResolveError};
pub use matrix::{CellRef, ColumnKey, MatrixInput};
