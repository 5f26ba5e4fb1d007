//! Query views over the projection. Views are plain serializable snapshots; they
//! never change state.

use serde::Serialize;

use pr_algo::ranking::{unranked, ListLotDecisionState, RankedCandidate};
use pr_algo::{CellRef, ColumnKey, LotDecision};
use pr_core::ids::{CandidateId, ElectionId, ListId, ResultDigest};
use pr_core::variables::{MandateAlgorithm, ResultPhase};

use crate::aggregate::{DoubleProportionalState, ElectionEndResult};
use crate::lifecycle::finalizable;
use crate::projection::EndResultProjection;
use crate::service::DpTarget;
use crate::{ElectionKey, EndResultError, PreconditionError, StaleReason};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ListEndResultView {
    pub list_id: ListId,
    pub order_number: String,
    pub description: String,
    pub list_votes: u64,
    pub number_of_mandates: Option<u64>,
    pub min_mandates: u64,
    pub max_mandates: u64,
    pub manual_entered: bool,
    pub lot_decision_state: ListLotDecisionState,
    pub candidates: Vec<RankedCandidate>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EndResultView {
    pub election_id: ElectionId,
    pub phase: ResultPhase,
    pub mandate_algorithm: MandateAlgorithm,
    pub number_of_mandates: u32,
    pub count_of_done_counting_circles: u32,
    pub total_count_of_counting_circles: u32,
    pub all_counting_circles_done: bool,
    pub mandate_distribution_triggered: bool,
    pub manual_end_result_required: bool,
    pub finalized: bool,
    pub finalizable: bool,
    pub double_proportional_invalidated: bool,
    pub lists: Vec<ListEndResultView>,
}

pub fn end_result(p: &EndResultProjection, key: &ElectionKey) -> Result<EndResultView, EndResultError> {
    let agg = p.require_election(key)?;
    let tally = agg.tally();

    let lists = agg
        .election
        .lists
        .iter()
        .map(|l| match agg.distribution.as_ref().and_then(|d| d.list(&l.id)) {
            Some(r) => ListEndResultView {
                list_id: l.id.clone(),
                order_number: l.order_number.clone(),
                description: l.description.clone(),
                list_votes: r.list_votes,
                number_of_mandates: r.number_of_mandates,
                min_mandates: r.min_mandates,
                max_mandates: r.max_mandates,
                manual_entered: r.manual_entered,
                lot_decision_state: r.ranking.lot_decision_state,
                candidates: r.ranking.candidates.clone(),
            },
            // Not distributed yet: running totals only.
            None => ListEndResultView {
                list_id: l.id.clone(),
                order_number: l.order_number.clone(),
                description: l.description.clone(),
                list_votes: tally.list_votes(&l.id),
                number_of_mandates: None,
                min_mandates: 0,
                max_mandates: 0,
                manual_entered: false,
                lot_decision_state: ListLotDecisionState::None,
                candidates: unranked(&tally.candidate_votes(l), 0).candidates,
            },
        })
        .collect();

    Ok(EndResultView {
        election_id: key.election_id.clone(),
        phase: key.phase,
        mandate_algorithm: agg.election.mandate_algorithm,
        number_of_mandates: agg.election.number_of_mandates,
        count_of_done_counting_circles: agg.count_of_done_counting_circles(),
        total_count_of_counting_circles: agg.election.total_counting_circles,
        all_counting_circles_done: agg.all_counting_circles_done(),
        mandate_distribution_triggered: agg.mandate_distribution_triggered(),
        manual_end_result_required: agg.distribution.as_ref().map_or(
            agg.election.manual_end_result_required,
            |d| d.manual_end_result_required,
        ),
        finalized: agg.finalized,
        finalizable: !agg.finalized && finalizable(p, agg).is_ok(),
        double_proportional_invalidated: agg.double_proportional_invalidated,
        lists,
    })
}

/// The double proportional result an election's mandates come from.
pub fn double_proportional_of<'p>(
    p: &'p EndResultProjection,
    target: &DpTarget,
) -> Result<&'p DoubleProportionalState, EndResultError> {
    let (state, invalidated) = match target {
        DpTarget::Election(key) => {
            let agg = p.require_election(key)?;
            if agg.election.mandate_algorithm.is_union() {
                let u = p.union_of(key).ok_or_else(|| EndResultError::NotFound(format!("union of {key}")))?;
                (u.double_proportional.as_ref(), u.double_proportional_invalidated)
            } else if agg.election.mandate_algorithm.is_double_proportional() {
                (own_result(agg), agg.double_proportional_invalidated)
            } else {
                return Err(PreconditionError::NotDoubleProportional(key.election_id.to_string()).into());
            }
        }
        DpTarget::Union(key) => {
            let u = p.require_union(key)?;
            (u.double_proportional.as_ref(), u.double_proportional_invalidated)
        }
    };
    match state {
        Some(s) => Ok(s),
        None if invalidated => Err(StaleReason::ResultInvalidated.into()),
        None => Err(PreconditionError::NotTriggered.into()),
    }
}

fn own_result(agg: &ElectionEndResult) -> Option<&DoubleProportionalState> {
    agg.distribution.as_ref().and_then(|d| d.double_proportional.as_ref())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ListLotDecisionView {
    pub list_id: ListId,
    pub open_mandates: u64,
    pub contenders: Vec<CandidateId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AvailableLotDecisions {
    /// Basis the listed decisions belong to; pass it back to detect staleness.
    pub basis: Option<ResultDigest>,
    pub super_apportionment: Vec<LotDecision<ColumnKey>>,
    pub super_apportionment_number_of_mandates: u64,
    pub sub_apportionment: Vec<LotDecision<CellRef>>,
    pub sub_apportionment_number_of_mandates: u64,
    pub lists: Vec<ListLotDecisionView>,
}

pub fn available_lot_decisions(
    p: &EndResultProjection,
    key: &ElectionKey,
) -> Result<AvailableLotDecisions, EndResultError> {
    let agg = p.require_election(key)?;
    let mut out = AvailableLotDecisions::default();

    let dp = if agg.election.mandate_algorithm.is_union() {
        p.union_of(key).and_then(|u| u.double_proportional.as_ref())
    } else {
        own_result(agg)
    };
    if let Some(dp) = dp {
        out.basis = Some(dp.basis.clone());
        out.super_apportionment = dp.result.super_apportionment.lot_decisions.clone();
        out.super_apportionment_number_of_mandates = dp.result.super_apportionment.number_of_mandates_for_lot_decision;
        out.sub_apportionment = dp.result.sub_apportionment.lot_decisions.clone();
        out.sub_apportionment_number_of_mandates = dp.result.sub_apportionment.number_of_mandates_for_lot_decision;
    }

    if let Some(d) = &agg.distribution {
        out.lists = d
            .lists
            .iter()
            .filter(|l| l.has_open_lot_decision())
            .map(|l| ListLotDecisionView {
                list_id: l.list_id.clone(),
                open_mandates: l.ranking.open_mandates,
                contenders: l
                    .ranking
                    .candidates
                    .iter()
                    .filter(|c| c.lot_decision_required)
                    .map(|c| c.candidate_id.clone())
                    .collect(),
            })
            .collect();
    }
    Ok(out)
}
