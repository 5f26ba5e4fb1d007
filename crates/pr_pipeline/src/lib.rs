//! pr_pipeline: end-result lifecycle over an event store.
//!
//! Commands are decided by pure `decide_*` functions of (state, command) that return
//! events; the projection applies them. Every rejection happens before anything is
//! appended. Math lives in `pr_algo`, hashing in `pr_io`.
//!
//! Determinism:
//! - State is held in `BTreeMap`s; iteration order never depends on insertion.
//! - Replaying the same event log yields the same projection.

#![forbid(unsafe_code)]

use core::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use pr_algo::ranking::ManualEntryError;
use pr_algo::{AllocError, LotDecisionError};
use pr_core::ids::{ElectionId, ResultDigest, UnionId};
use pr_core::variables::ResultPhase;

pub mod aggregate;
pub mod allocate;
pub mod build_result;
pub mod events;
pub mod lifecycle;
pub mod projection;
pub mod resolve_ties;
pub mod service;
pub mod store;
pub mod union;
pub mod validate;

pub use events::{ElectionEvent, Event, EventEnvelope, RevertCause, UnionEvent};
pub use projection::EndResultProjection;
pub use service::{Command, DpTarget, EndResultService, SecondFactorOutcome, SecondFactorVerifier};
pub use store::{EventStore, InMemoryEventStore, StoreError, StreamAppend};

// ----------------------------- Stream keys ------------------------------------------

/// One end result: an election in one result phase.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElectionKey {
    pub election_id: ElectionId,
    pub phase: ResultPhase,
}

impl ElectionKey {
    pub fn new(election_id: ElectionId, phase: ResultPhase) -> Self {
        Self { election_id, phase }
    }
}

impl fmt::Display for ElectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.election_id, self.phase.as_token())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnionKey {
    pub union_id: UnionId,
    pub phase: ResultPhase,
}

impl UnionKey {
    pub fn new(union_id: UnionId, phase: ResultPhase) -> Self {
        Self { union_id, phase }
    }

    pub fn member(&self, election_id: &ElectionId) -> ElectionKey {
        ElectionKey::new(election_id.clone(), self.phase)
    }
}

impl fmt::Display for UnionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.union_id, self.phase.as_token())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamId {
    Election(ElectionKey),
    Union(UnionKey),
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamId::Election(k) => write!(f, "election/{k}"),
            StreamId::Union(k) => write!(f, "union/{k}"),
        }
    }
}

// ----------------------------- Errors -----------------------------------------------

/// One finding of definition validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub code: &'static str,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Caller-fixable input problems.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error(transparent)]
    LotDecision(#[from] LotDecisionError),
    #[error(transparent)]
    ManualEntry(#[from] ManualEntryError),
    #[error("invalid definition: {}", first_issue(.0))]
    Definition(Vec<ValidationIssue>),
    #[error("invalid counting circle: {0}")]
    CountingCircle(String),
    #[error("list {0} is not part of this election")]
    UnknownList(String),
}

fn first_issue(issues: &[ValidationIssue]) -> String {
    match issues {
        [] => "no details".to_string(),
        [one] => one.to_string(),
        [first, rest @ ..] => format!("{first} (+{} more)", rest.len()),
    }
}

/// The aggregate is not in a state that allows the command.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("contest is locked")]
    ContestLocked,
    #[error("{0} is already defined")]
    AlreadyDefined(String),
    #[error("counting circle {0} is already audited")]
    AlreadyAudited(String),
    #[error("counting circle {0} is not audited")]
    NotAudited(String),
    #[error("only {done} of {total} counting circles are done")]
    NotAllCountingCirclesDone { done: u32, total: u32 },
    #[error("mandate distribution already triggered")]
    AlreadyTriggered,
    #[error("mandate distribution not yet triggered")]
    NotTriggered,
    #[error("mandates of election {0} are distributed by its union")]
    UnionAlgorithm(String),
    #[error("election {0} does not use a double proportional algorithm")]
    NotDoubleProportional(String),
    #[error("end result is already finalized")]
    AlreadyFinalized,
    #[error("end result is not finalized")]
    NotFinalized,
    #[error("manual finalize is disabled for this contest")]
    FinalizeDisabled,
    #[error("end result is not finalizable: {0}")]
    NotFinalizable(&'static str),
    #[error("no open lot decision")]
    NoOpenLotDecision,
    #[error("manual end result is not required")]
    ManualEndResultNotRequired,
    #[error("manual end result is required; lot decisions are not applied per list")]
    ManualEndResultRequired,
    #[error("mandates of list {0} are not distributed yet")]
    MandatesNotDistributed(String),
    #[error("second factor transaction required")]
    SecondFactorRequired,
    #[error("second factor transaction {0} is not verified")]
    SecondFactorNotVerified(String),
}

/// The command was decided against data that changed since.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StaleReason {
    #[error("double proportional result was invalidated by a counting circle reset")]
    ResultInvalidated,
    #[error("result basis changed (expected {expected}, current {actual})")]
    BasisMismatch { expected: ResultDigest, actual: ResultDigest },
    #[error("stream {stream} moved on (expected version {expected}, found {actual})")]
    Conflict { stream: String, expected: u64, actual: u64 },
    #[error("data changed since second factor transaction {0} was issued")]
    SecondFactorDataChanged(String),
}

/// Fatal computation problems. Logged at error level and never retried.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ComputationFault {
    #[error(transparent)]
    Allocation(#[from] AllocError),
    #[error("basis digest: {0}")]
    Digest(String),
}

#[derive(Debug, Error)]
pub enum EndResultError {
    #[error("validation: {0}")]
    Validation(#[from] ValidationError),
    #[error("precondition: {0}")]
    Precondition(#[from] PreconditionError),
    #[error("stale: {0}")]
    Stale(#[from] StaleReason),
    #[error("computation fault: {0}")]
    Computation(#[from] ComputationFault),
    #[error("event store: {0}")]
    Store(StoreError),
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<StoreError> for EndResultError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict { stream, expected, actual } => {
                EndResultError::Stale(StaleReason::Conflict { stream: stream.to_string(), expected, actual })
            }
            other => EndResultError::Store(other),
        }
    }
}

impl From<AllocError> for EndResultError {
    fn from(e: AllocError) -> Self {
        EndResultError::Computation(e.into())
    }
}

impl From<LotDecisionError> for EndResultError {
    fn from(e: LotDecisionError) -> Self {
        EndResultError::Validation(e.into())
    }
}

impl From<pr_algo::ResolveError> for EndResultError {
    fn from(e: pr_algo::ResolveError) -> Self {
        match e {
            pr_algo::ResolveError::NotOpen => PreconditionError::NoOpenLotDecision.into(),
            pr_algo::ResolveError::Invalid(e) => e.into(),
            pr_algo::ResolveError::Fault(e) => e.into(),
        }
    }
}

impl From<ManualEntryError> for EndResultError {
    fn from(e: ManualEntryError) -> Self {
        EndResultError::Validation(e.into())
    }
}

pub type EndResultResult<T> = Result<T, EndResultError>;
