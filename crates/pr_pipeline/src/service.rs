//! Command entry point: decide, append atomically, apply to the projection.
//!
//! Contract:
//! - A locked contest rejects every command.
//! - A rejected command appends nothing and leaves the projection untouched.
//! - The projection is only advanced with envelopes the store accepted.

use core::fmt;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use pr_algo::ranking::{CandidateLotDecisionEntry, ManualCandidateEntry};
use pr_algo::{CellRef, ColumnKey, LotDecisionEntry};
use pr_core::entities::{CountingCircleSnapshot, Election, ElectionUnion};
use pr_core::ids::{CountingCircleId, ListId, ResultDigest};
use pr_core::variables::{ContestSettings, ResultPhase, SolverOptions};

use crate::aggregate::DoubleProportionalState;
use crate::build_result::{self, AvailableLotDecisions, EndResultView};
use crate::events::EventEnvelope;
use crate::projection::EndResultProjection;
use crate::store::{EventStore, StreamAppend};
use crate::{lifecycle, resolve_ties, union};
use crate::{ElectionKey, EndResultError, PreconditionError, UnionKey};

// ----------------------------- Second factor ----------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SecondFactorOutcome {
    Verified,
    NotVerified,
    /// Verified, but for data that has changed since the transaction was issued.
    DataChanged,
}

pub trait SecondFactorVerifier {
    fn verify(&self, transaction_id: &str, key: &ElectionKey) -> SecondFactorOutcome;
}

/// Transaction ids known up front, e.g. from a scenario file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KnownTransactions {
    pub verified: BTreeSet<String>,
    pub data_changed: BTreeSet<String>,
}

impl SecondFactorVerifier for KnownTransactions {
    fn verify(&self, transaction_id: &str, _key: &ElectionKey) -> SecondFactorOutcome {
        if self.data_changed.contains(transaction_id) {
            SecondFactorOutcome::DataChanged
        } else if self.verified.contains(transaction_id) {
            SecondFactorOutcome::Verified
        } else {
            SecondFactorOutcome::NotVerified
        }
    }
}

// ----------------------------- Commands ---------------------------------------------

/// Owner of a double proportional result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DpTarget {
    Election(ElectionKey),
    Union(UnionKey),
}

impl fmt::Display for DpTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DpTarget::Election(k) => write!(f, "election/{k}"),
            DpTarget::Union(k) => write!(f, "union/{k}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    DefineElection { phase: ResultPhase, election: Election },
    DefineUnion { phase: ResultPhase, union: ElectionUnion },
    RecordCountingCircleAudited { key: ElectionKey, snapshot: CountingCircleSnapshot },
    RecordCountingCircleReset { key: ElectionKey, counting_circle_id: CountingCircleId },
    StartMandateDistribution { key: ElectionKey },
    StartUnionMandateDistribution { key: UnionKey },
    ApplySuperApportionmentLotDecision {
        target: DpTarget,
        number: u32,
        entries: Vec<LotDecisionEntry<ColumnKey>>,
        #[serde(default)]
        expected_basis: Option<ResultDigest>,
    },
    ApplySubApportionmentLotDecision {
        target: DpTarget,
        number: u32,
        entries: Vec<LotDecisionEntry<CellRef>>,
        #[serde(default)]
        expected_basis: Option<ResultDigest>,
    },
    ApplyListLotDecision { key: ElectionKey, list_id: ListId, entries: Vec<CandidateLotDecisionEntry> },
    EnterManualListEndResult { key: ElectionKey, list_id: ListId, entries: Vec<ManualCandidateEntry> },
    Finalize {
        key: ElectionKey,
        #[serde(default)]
        second_factor_transaction_id: Option<String>,
    },
    RevertMandateDistribution { key: ElectionKey },
    RevertUnionMandateDistribution { key: UnionKey },
    RevertFinalization { key: ElectionKey },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::DefineElection { .. } => "define_election",
            Command::DefineUnion { .. } => "define_union",
            Command::RecordCountingCircleAudited { .. } => "record_counting_circle_audited",
            Command::RecordCountingCircleReset { .. } => "record_counting_circle_reset",
            Command::StartMandateDistribution { .. } => "start_mandate_distribution",
            Command::StartUnionMandateDistribution { .. } => "start_union_mandate_distribution",
            Command::ApplySuperApportionmentLotDecision { .. } => "apply_super_apportionment_lot_decision",
            Command::ApplySubApportionmentLotDecision { .. } => "apply_sub_apportionment_lot_decision",
            Command::ApplyListLotDecision { .. } => "apply_list_lot_decision",
            Command::EnterManualListEndResult { .. } => "enter_manual_list_end_result",
            Command::Finalize { .. } => "finalize",
            Command::RevertMandateDistribution { .. } => "revert_mandate_distribution",
            Command::RevertUnionMandateDistribution { .. } => "revert_union_mandate_distribution",
            Command::RevertFinalization { .. } => "revert_finalization",
        }
    }
}

// ----------------------------- Service ----------------------------------------------

pub struct EndResultService<S, V> {
    store: S,
    verifier: V,
    settings: ContestSettings,
    solver: SolverOptions,
    projection: EndResultProjection,
}

impl<S: EventStore, V: SecondFactorVerifier> EndResultService<S, V> {
    /// Replays the store into a fresh projection.
    pub fn new(store: S, verifier: V, settings: ContestSettings, solver: SolverOptions) -> Result<Self, EndResultError> {
        let projection = EndResultProjection::rebuild(&store.load_all()?)?;
        Ok(Self { store, verifier, settings, solver, projection })
    }

    pub fn projection(&self) -> &EndResultProjection {
        &self.projection
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn settings(&self) -> &ContestSettings {
        &self.settings
    }

    pub fn handle(&mut self, command: Command) -> Result<Vec<EventEnvelope>, EndResultError> {
        let name = command.name();
        let parts = match self.decide(command) {
            Ok(parts) => parts,
            Err(e) => {
                match &e {
                    EndResultError::Computation(fault) => error!(command = name, error = %fault, "computation fault"),
                    other => warn!(command = name, error = %other, "command rejected"),
                }
                return Err(e);
            }
        };

        let stored = self.store.append(parts).map_err(|e| {
            warn!(command = name, error = %e, "append rejected");
            EndResultError::from(e)
        })?;
        for env in &stored {
            self.projection.apply(env)?;
            info!(command = name, stream = %env.stream, sequence = env.sequence, event = env.event.name(), "event appended");
        }
        Ok(stored)
    }

    fn decide(&self, command: Command) -> Result<Vec<StreamAppend>, EndResultError> {
        if self.settings.locked {
            return Err(PreconditionError::ContestLocked.into());
        }
        let p = &self.projection;
        let finalizes_itself = !matches!(command, Command::RevertFinalization { .. });
        let parts = match command {
            Command::DefineElection { phase, election } => lifecycle::decide_define_election(p, phase, election)?,
            Command::DefineUnion { phase, union: u } => union::decide_define_union(p, phase, u)?,
            Command::RecordCountingCircleAudited { key, snapshot } => lifecycle::decide_audit(p, &key, snapshot)?,
            Command::RecordCountingCircleReset { key, counting_circle_id } => {
                lifecycle::decide_reset(p, &key, &counting_circle_id)?
            }
            Command::StartMandateDistribution { key } => lifecycle::decide_start(p, &key, &self.solver)?,
            Command::StartUnionMandateDistribution { key } => union::decide_start_union(p, &key, &self.solver)?,
            Command::ApplySuperApportionmentLotDecision { target, number, entries, expected_basis } => {
                resolve_ties::decide_super_lot(p, &target, number, &entries, expected_basis.as_ref(), &self.solver)?
            }
            Command::ApplySubApportionmentLotDecision { target, number, entries, expected_basis } => {
                resolve_ties::decide_sub_lot(p, &target, number, &entries, expected_basis.as_ref())?
            }
            Command::ApplyListLotDecision { key, list_id, entries } => {
                resolve_ties::decide_list_lot(p, &key, &list_id, &entries)?
            }
            Command::EnterManualListEndResult { key, list_id, entries } => {
                lifecycle::decide_manual_entry(p, &key, &list_id, &entries)?
            }
            Command::Finalize { key, second_factor_transaction_id } => lifecycle::decide_finalize(
                p,
                &key,
                &self.settings,
                second_factor_transaction_id.as_deref(),
                &self.verifier,
            )?,
            Command::RevertMandateDistribution { key } => lifecycle::decide_revert_distribution(p, &key)?,
            Command::RevertUnionMandateDistribution { key } => union::decide_revert_union(p, &key)?,
            Command::RevertFinalization { key } => lifecycle::decide_revert_finalization(p, &key)?,
        };
        if finalizes_itself {
            lifecycle::auto_finalize(p, &self.settings, parts)
        } else {
            Ok(parts)
        }
    }

    // ---- queries ----

    pub fn end_result(&self, key: &ElectionKey) -> Result<EndResultView, EndResultError> {
        build_result::end_result(&self.projection, key)
    }

    pub fn double_proportional_result(&self, target: &DpTarget) -> Result<&DoubleProportionalState, EndResultError> {
        build_result::double_proportional_of(&self.projection, target)
    }

    pub fn available_lot_decisions(&self, key: &ElectionKey) -> Result<AvailableLotDecisions, EndResultError> {
        build_result::available_lot_decisions(&self.projection, key)
    }
}
