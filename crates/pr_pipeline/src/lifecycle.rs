//! End-result lifecycle of one election:
//! `Pending -> MandateDistributionStarted -> (manual end result) -> Finalized`,
//! with `RevertMandateDistribution` and `RevertFinalization` going back.
//!
//! Every `decide_*` reads the projection and returns the events to append; nothing
//! here mutates state. Guards are checked in a fixed order so the same command
//! against the same state always fails with the same error.

use pr_algo::ranking::{apply_manual_end_result, ManualCandidateEntry};
use pr_core::entities::{CountingCircleSnapshot, Election};
use pr_core::ids::{CountingCircleId, ListId};
use pr_core::variables::{ContestSettings, MandateAlgorithm, ResultPhase, SolverOptions};
use tracing::{info, warn};

use crate::aggregate::ElectionEndResult;
use crate::allocate;
use crate::events::{ElectionEvent, RevertCause, UnionEvent};
use crate::projection::{Batch, EndResultProjection};
use crate::service::{SecondFactorOutcome, SecondFactorVerifier};
use crate::store::StreamAppend;
use crate::union::revert_members;
use crate::validate::{into_result, validate_election, validate_snapshot};
use crate::{
    ElectionKey, EndResultError, PreconditionError, StaleReason, StreamId, ValidationError,
};

// ----------------------------- Definition & counting circles ------------------------

pub fn decide_define_election(
    p: &EndResultProjection,
    phase: ResultPhase,
    election: Election,
) -> Result<Vec<StreamAppend>, EndResultError> {
    let key = ElectionKey::new(election.id.clone(), phase);
    if p.election(&key).is_some() {
        return Err(PreconditionError::AlreadyDefined(format!("election {key}")).into());
    }
    into_result(validate_election(&election))?;

    let mut batch = Batch::new(p);
    batch.election(&key, ElectionEvent::ElectionDefined { election });
    Ok(batch.into_parts())
}

pub fn decide_audit(
    p: &EndResultProjection,
    key: &ElectionKey,
    snapshot: CountingCircleSnapshot,
) -> Result<Vec<StreamAppend>, EndResultError> {
    let agg = p.require_election(key)?;
    if agg.counting_circles.contains_key(&snapshot.counting_circle_id) {
        return Err(PreconditionError::AlreadyAudited(snapshot.counting_circle_id.to_string()).into());
    }
    validate_snapshot(&agg.election, &snapshot)?;
    if agg.all_counting_circles_done() {
        return Err(ValidationError::CountingCircle(format!(
            "election {key} has only {} counting circle(s)",
            agg.election.total_counting_circles
        ))
        .into());
    }

    let mut batch = Batch::new(p);
    batch.election(key, ElectionEvent::CountingCircleAudited { snapshot });
    Ok(batch.into_parts())
}

/// A reset takes the circle out of the tally and withdraws every result computed
/// with it: the election's own, or the union's together with all its members.
pub fn decide_reset(
    p: &EndResultProjection,
    key: &ElectionKey,
    counting_circle_id: &CountingCircleId,
) -> Result<Vec<StreamAppend>, EndResultError> {
    let agg = p.require_election(key)?;
    if !agg.counting_circles.contains_key(counting_circle_id) {
        return Err(PreconditionError::NotAudited(counting_circle_id.to_string()).into());
    }

    let mut batch = Batch::new(p);
    batch.election(key, ElectionEvent::CountingCircleReset { counting_circle_id: counting_circle_id.clone() });
    let cause = RevertCause::CountingCircleReset {
        election_id: key.election_id.clone(),
        counting_circle_id: counting_circle_id.clone(),
    };

    match p.union_of(key) {
        Some(u) if u.mandate_distribution_triggered() => {
            warn!(union = %u.key, election = %key, counting_circle = %counting_circle_id, "union result invalidated by counting circle reset");
            batch.union(&u.key, UnionEvent::DoubleProportionalResultInvalidated { cause: cause.clone() });
            revert_members(p, u, &cause, &mut batch);
        }
        Some(_) => {}
        None => {
            let own_result = agg.distribution.as_ref().map_or(false, |d| d.double_proportional.is_some());
            if own_result {
                warn!(election = %key, counting_circle = %counting_circle_id, "double proportional result invalidated by counting circle reset");
                batch.election(key, ElectionEvent::DoubleProportionalResultInvalidated { cause: cause.clone() });
            }
            if agg.mandate_distribution_triggered() {
                warn!(election = %key, counting_circle = %counting_circle_id, "mandate distribution reverted by counting circle reset");
                batch.election(key, ElectionEvent::MandateDistributionReverted { cause });
            }
        }
    }
    Ok(batch.into_parts())
}

// ----------------------------- Mandate distribution ---------------------------------

pub fn decide_start(
    p: &EndResultProjection,
    key: &ElectionKey,
    solver: &SolverOptions,
) -> Result<Vec<StreamAppend>, EndResultError> {
    let agg = p.require_election(key)?;
    if agg.election.mandate_algorithm.is_union() {
        return Err(PreconditionError::UnionAlgorithm(key.election_id.to_string()).into());
    }
    if agg.mandate_distribution_triggered() {
        return Err(PreconditionError::AlreadyTriggered.into());
    }
    if !agg.all_counting_circles_done() {
        return Err(PreconditionError::NotAllCountingCirclesDone {
            done: agg.count_of_done_counting_circles(),
            total: agg.election.total_counting_circles,
        }
        .into());
    }

    let tally = agg.tally();
    let distribution = match agg.election.mandate_algorithm {
        MandateAlgorithm::HagenbachBischoff => allocate::hagenbach_bischoff(&agg.election, &tally)?,
        MandateAlgorithm::DoubleProportionalSingle => {
            allocate::double_proportional_single(&agg.election, &tally, solver)?
        }
        MandateAlgorithm::DoubleProportionalUnion => {
            return Err(PreconditionError::UnionAlgorithm(key.election_id.to_string()).into())
        }
    };
    info!(
        election = %key,
        manual = distribution.manual_end_result_required,
        "mandate distribution started"
    );

    let mut batch = Batch::new(p);
    batch.election(key, ElectionEvent::MandateDistributionStarted { distribution });
    Ok(batch.into_parts())
}

/// Reverting the distribution also reverts a finalization. Union members go through
/// their union.
pub fn decide_revert_distribution(
    p: &EndResultProjection,
    key: &ElectionKey,
) -> Result<Vec<StreamAppend>, EndResultError> {
    let agg = p.require_election(key)?;
    if agg.election.mandate_algorithm.is_union() {
        return Err(PreconditionError::UnionAlgorithm(key.election_id.to_string()).into());
    }
    if !agg.mandate_distribution_triggered() {
        return Err(PreconditionError::NotTriggered.into());
    }
    let mut batch = Batch::new(p);
    batch.election(key, ElectionEvent::MandateDistributionReverted { cause: RevertCause::Manual });
    Ok(batch.into_parts())
}

// ----------------------------- Manual end result ------------------------------------

pub fn decide_manual_entry(
    p: &EndResultProjection,
    key: &ElectionKey,
    list_id: &ListId,
    entries: &[ManualCandidateEntry],
) -> Result<Vec<StreamAppend>, EndResultError> {
    let agg = p.require_election(key)?;
    let distribution = agg.distribution.as_ref().ok_or(PreconditionError::NotTriggered)?;
    if agg.finalized {
        return Err(PreconditionError::AlreadyFinalized.into());
    }
    if !distribution.manual_end_result_required {
        return Err(PreconditionError::ManualEndResultNotRequired.into());
    }
    let list = agg.election.list(list_id).ok_or_else(|| ValidationError::UnknownList(list_id.to_string()))?;
    let result = distribution.list(list_id).ok_or_else(|| ValidationError::UnknownList(list_id.to_string()))?;
    // Double proportional lists get their mandates from the result, never from the entry.
    if result.number_of_mandates.is_none() && agg.election.mandate_algorithm.is_double_proportional() {
        return Err(PreconditionError::MandatesNotDistributed(list_id.to_string()).into());
    }

    let candidates = agg.tally().candidate_votes(list);
    let ranking = apply_manual_end_result(&candidates, entries, result.min_mandates..=result.max_mandates)?;
    info!(election = %key, list = %list_id, mandates = ranking.number_of_mandates, "manual list end result entered");

    let mut batch = Batch::new(p);
    batch.election(key, ElectionEvent::ManualListEndResultEntered { list_id: list_id.clone(), ranking });
    Ok(batch.into_parts())
}

// ----------------------------- Finalization -----------------------------------------

/// `Ok` when the end result could be finalized now, otherwise why not.
pub fn finalizable(p: &EndResultProjection, agg: &ElectionEndResult) -> Result<(), &'static str> {
    let distribution = agg.distribution.as_ref().ok_or("mandate distribution not triggered")?;

    match agg.election.mandate_algorithm {
        MandateAlgorithm::DoubleProportionalSingle => {
            let complete = distribution
                .double_proportional
                .as_ref()
                .map_or(false, |dp| dp.result.is_fully_distributed());
            if !complete {
                return Err("double proportional result is not complete");
            }
        }
        MandateAlgorithm::DoubleProportionalUnion => {
            if !p.union_of(&agg.key).map_or(false, |u| u.is_fully_distributed()) {
                return Err("union double proportional result is not complete");
            }
        }
        MandateAlgorithm::HagenbachBischoff => {}
    }

    if distribution.manual_end_result_required {
        if !distribution.lists.iter().all(|l| l.manual_entered) {
            return Err("manual end result missing for a list");
        }
        let total: u64 = distribution.lists.iter().filter_map(|l| l.number_of_mandates).sum();
        if total != u64::from(agg.election.number_of_mandates) {
            return Err("list mandates do not add up to the election mandates");
        }
        return Ok(());
    }

    if distribution.lists.iter().any(|l| l.number_of_mandates.is_none()) {
        return Err("list mandates are not distributed");
    }
    if distribution.lists.iter().any(|l| l.has_open_lot_decision()) {
        return Err("a list lot decision is open");
    }
    Ok(())
}

pub fn decide_finalize<V: SecondFactorVerifier + ?Sized>(
    p: &EndResultProjection,
    key: &ElectionKey,
    settings: &ContestSettings,
    second_factor_transaction_id: Option<&str>,
    verifier: &V,
) -> Result<Vec<StreamAppend>, EndResultError> {
    let agg = p.require_election(key)?;
    if settings.end_result_finalize_disabled {
        return Err(PreconditionError::FinalizeDisabled.into());
    }
    if !agg.mandate_distribution_triggered() {
        return Err(PreconditionError::NotTriggered.into());
    }
    if agg.finalized {
        return Err(PreconditionError::AlreadyFinalized.into());
    }
    finalizable(p, agg).map_err(PreconditionError::NotFinalizable)?;

    if settings.second_factor_required {
        let id = second_factor_transaction_id.ok_or(PreconditionError::SecondFactorRequired)?;
        match verifier.verify(id, key) {
            SecondFactorOutcome::Verified => {}
            SecondFactorOutcome::NotVerified => {
                return Err(PreconditionError::SecondFactorNotVerified(id.to_string()).into())
            }
            SecondFactorOutcome::DataChanged => return Err(StaleReason::SecondFactorDataChanged(id.to_string()).into()),
        }
    }
    info!(election = %key, "end result finalized");

    let mut batch = Batch::new(p);
    batch.election(key, ElectionEvent::EndResultFinalized);
    Ok(batch.into_parts())
}

pub fn decide_revert_finalization(
    p: &EndResultProjection,
    key: &ElectionKey,
) -> Result<Vec<StreamAppend>, EndResultError> {
    let agg = p.require_election(key)?;
    if !agg.finalized {
        return Err(PreconditionError::NotFinalized.into());
    }
    let mut batch = Batch::new(p);
    batch.election(key, ElectionEvent::FinalizationReverted);
    Ok(batch.into_parts())
}

/// With manual finalize disabled, every election touched by `parts` that becomes
/// finalizable is finalized in the same batch.
pub fn auto_finalize(
    p: &EndResultProjection,
    settings: &ContestSettings,
    mut parts: Vec<StreamAppend>,
) -> Result<Vec<StreamAppend>, EndResultError> {
    if !settings.end_result_finalize_disabled {
        return Ok(parts);
    }
    let next = p.preview(&parts)?;
    for part in &mut parts {
        let StreamId::Election(key) = &part.stream else { continue };
        let Some(agg) = next.election(key) else { continue };
        if agg.mandate_distribution_triggered() && !agg.finalized && finalizable(&next, agg).is_ok() {
            info!(election = %key, "end result finalized automatically");
            part.events.push(crate::Event::Election(ElectionEvent::EndResultFinalized));
        }
    }
    Ok(parts)
}
