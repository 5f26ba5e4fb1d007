//! Lot decisions on double proportional results and on candidate rankings.
//!
//! Contract:
//! - A super/sub decision is addressed to whoever owns the result: a
//!   `double_proportional_single` election or an election union.
//! - A caller that passes the basis digest it decided on gets `Stale` when the result
//!   was recomputed from other votes since; a result withdrawn by a counting circle
//!   reset is `Stale` as well.
//! - Union decisions that complete the result hand the list mandates to every member
//!   in the same batch.

use pr_algo::ranking::{apply_list_lot_decision, CandidateLotDecisionEntry};
use pr_algo::{CellRef, ColumnKey, DoubleProportionalResult, LotDecisionEntry, ResolveError};
use pr_core::ids::{ListId, ResultDigest};
use pr_core::variables::{MandateAlgorithm, SolverOptions};
use tracing::info;

use crate::aggregate::DoubleProportionalState;
use crate::allocate;
use crate::events::{ElectionEvent, UnionEvent};
use crate::projection::{Batch, EndResultProjection};
use crate::service::DpTarget;
use crate::store::StreamAppend;
use crate::union::distribute_to_members;
use crate::{ElectionKey, EndResultError, PreconditionError, StaleReason, ValidationError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Apportionment {
    Super,
    Sub,
}

/// Current result of the target, checked against the caller's basis.
fn current<'p>(
    p: &'p EndResultProjection,
    target: &DpTarget,
    expected_basis: Option<&ResultDigest>,
) -> Result<&'p DoubleProportionalState, EndResultError> {
    let (state, invalidated) = match target {
        DpTarget::Election(key) => {
            let agg = p.require_election(key)?;
            match agg.election.mandate_algorithm {
                MandateAlgorithm::DoubleProportionalSingle => {}
                MandateAlgorithm::DoubleProportionalUnion => {
                    return Err(PreconditionError::UnionAlgorithm(key.election_id.to_string()).into())
                }
                MandateAlgorithm::HagenbachBischoff => {
                    return Err(PreconditionError::NotDoubleProportional(key.election_id.to_string()).into())
                }
            }
            if agg.finalized {
                return Err(PreconditionError::AlreadyFinalized.into());
            }
            let state = agg.distribution.as_ref().and_then(|d| d.double_proportional.as_ref());
            (state, agg.double_proportional_invalidated)
        }
        DpTarget::Union(key) => {
            let u = p.require_union(key)?;
            (u.double_proportional.as_ref(), u.double_proportional_invalidated)
        }
    };

    let state = match state {
        Some(s) => s,
        None if invalidated => return Err(StaleReason::ResultInvalidated.into()),
        None => return Err(PreconditionError::NotTriggered.into()),
    };
    if let Some(expected) = expected_basis {
        if expected != &state.basis {
            return Err(StaleReason::BasisMismatch { expected: expected.clone(), actual: state.basis.clone() }.into());
        }
    }
    Ok(state)
}

fn decide(
    p: &EndResultProjection,
    target: &DpTarget,
    kind: Apportionment,
    number: u32,
    expected_basis: Option<&ResultDigest>,
    resolve: impl FnOnce(&DoubleProportionalResult) -> Result<DoubleProportionalResult, ResolveError>,
) -> Result<Vec<StreamAppend>, EndResultError> {
    let state = current(p, target, expected_basis)?;
    let next = DoubleProportionalState { basis: state.basis.clone(), result: resolve(&state.result)? };
    info!(
        target = %target,
        apportionment = ?kind,
        number,
        complete = next.result.is_fully_distributed(),
        "lot decision applied"
    );

    let mut batch = Batch::new(p);
    match target {
        DpTarget::Election(key) => {
            let agg = p.require_election(key)?;
            let lists = allocate::lists_from_double_proportional(&agg.election, &agg.tally(), &next.result);
            let event = match kind {
                Apportionment::Super => {
                    ElectionEvent::SuperApportionmentLotDecisionApplied { number, double_proportional: next, lists }
                }
                Apportionment::Sub => {
                    ElectionEvent::SubApportionmentLotDecisionApplied { number, double_proportional: next, lists }
                }
            };
            batch.election(key, event);
        }
        DpTarget::Union(key) => {
            let u = p.require_union(key)?;
            let event = match kind {
                Apportionment::Super => {
                    UnionEvent::SuperApportionmentLotDecisionApplied { number, double_proportional: next.clone() }
                }
                Apportionment::Sub => {
                    UnionEvent::SubApportionmentLotDecisionApplied { number, double_proportional: next.clone() }
                }
            };
            batch.union(key, event);
            distribute_to_members(p, u, &next, &mut batch);
        }
    }
    Ok(batch.into_parts())
}

pub fn decide_super_lot(
    p: &EndResultProjection,
    target: &DpTarget,
    number: u32,
    entries: &[LotDecisionEntry<ColumnKey>],
    expected_basis: Option<&ResultDigest>,
    solver: &SolverOptions,
) -> Result<Vec<StreamAppend>, EndResultError> {
    decide(p, target, Apportionment::Super, number, expected_basis, |r| {
        r.apply_super_apportionment_lot_decision(number, entries, solver)
    })
}

pub fn decide_sub_lot(
    p: &EndResultProjection,
    target: &DpTarget,
    number: u32,
    entries: &[LotDecisionEntry<CellRef>],
    expected_basis: Option<&ResultDigest>,
) -> Result<Vec<StreamAppend>, EndResultError> {
    decide(p, target, Apportionment::Sub, number, expected_basis, |r| {
        r.apply_sub_apportionment_lot_decision(number, entries)
    })
}

pub fn decide_list_lot(
    p: &EndResultProjection,
    key: &ElectionKey,
    list_id: &ListId,
    entries: &[CandidateLotDecisionEntry],
) -> Result<Vec<StreamAppend>, EndResultError> {
    let agg = p.require_election(key)?;
    let distribution = agg.distribution.as_ref().ok_or(PreconditionError::NotTriggered)?;
    if agg.finalized {
        return Err(PreconditionError::AlreadyFinalized.into());
    }
    if distribution.manual_end_result_required {
        return Err(PreconditionError::ManualEndResultRequired.into());
    }
    let list = distribution.list(list_id).ok_or_else(|| ValidationError::UnknownList(list_id.to_string()))?;
    let ranking = apply_list_lot_decision(&list.ranking, entries)?;
    info!(election = %key, list = %list_id, "list lot decision applied");

    let mut batch = Batch::new(p);
    batch.election(key, ElectionEvent::ListLotDecisionApplied { list_id: list_id.clone(), ranking });
    Ok(batch.into_parts())
}
