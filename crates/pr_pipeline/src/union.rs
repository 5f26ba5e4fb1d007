//! Election unions: one double proportional result shared by every member election.
//!
//! The union aggregate owns the result. Members receive their list mandates through
//! their own `MandateDistributionStarted` once the union result is fully distributed;
//! reverting or invalidating the union reverts every distributed member.

use std::collections::BTreeMap;

use pr_core::entities::{Election, ElectionUnion};
use pr_core::ids::ElectionId;
use pr_core::variables::{ResultPhase, SolverOptions};
use tracing::{debug, info};

use crate::aggregate::{DoubleProportionalState, ElectionEndResult};
use crate::allocate;
use crate::events::{ElectionEvent, RevertCause, UnionEvent};
use crate::projection::{Batch, EndResultProjection};
use crate::store::StreamAppend;
use crate::validate::{into_result, validate_union};
use crate::{EndResultError, PreconditionError, UnionKey};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnionEndResult {
    pub key: UnionKey,
    pub union: ElectionUnion,
    pub double_proportional: Option<DoubleProportionalState>,
    pub double_proportional_invalidated: bool,
}

impl UnionEndResult {
    pub fn defined(key: UnionKey, union: ElectionUnion) -> Self {
        Self { key, union, double_proportional: None, double_proportional_invalidated: false }
    }

    pub fn mandate_distribution_triggered(&self) -> bool {
        self.double_proportional.is_some()
    }

    pub fn is_fully_distributed(&self) -> bool {
        self.double_proportional.as_ref().map_or(false, |dp| dp.result.is_fully_distributed())
    }

    pub fn apply(&mut self, event: &UnionEvent) {
        match event {
            UnionEvent::UnionDefined { union } => self.union = union.clone(),
            UnionEvent::MandateDistributionStarted { double_proportional } => {
                self.double_proportional = Some(double_proportional.clone());
                self.double_proportional_invalidated = false;
            }
            UnionEvent::SuperApportionmentLotDecisionApplied { double_proportional, .. }
            | UnionEvent::SubApportionmentLotDecisionApplied { double_proportional, .. } => {
                self.double_proportional = Some(double_proportional.clone());
            }
            UnionEvent::MandateDistributionReverted { .. } => self.double_proportional = None,
            UnionEvent::DoubleProportionalResultInvalidated { .. } => {
                self.double_proportional = None;
                self.double_proportional_invalidated = true;
            }
        }
    }
}

// ----------------------------- Decisions --------------------------------------------

pub fn decide_define_union(
    p: &EndResultProjection,
    phase: ResultPhase,
    union: ElectionUnion,
) -> Result<Vec<StreamAppend>, EndResultError> {
    let key = UnionKey::new(union.id.clone(), phase);
    if p.union(&key).is_some() {
        return Err(PreconditionError::AlreadyDefined(format!("union {key}")).into());
    }
    let members: BTreeMap<&ElectionId, &Election> = union
        .election_ids
        .iter()
        .filter_map(|id| p.election(&key.member(id)).map(|e| (id, &e.election)))
        .collect();
    into_result(validate_union(&union, &members))?;

    let mut batch = Batch::new(p);
    batch.union(&key, UnionEvent::UnionDefined { union });
    Ok(batch.into_parts())
}

/// Member aggregates in `union.election_ids` order.
fn members<'p>(p: &'p EndResultProjection, u: &UnionEndResult) -> Result<Vec<&'p ElectionEndResult>, EndResultError> {
    u.union
        .election_ids
        .iter()
        .map(|id| p.require_election(&u.key.member(id)))
        .collect()
}

pub fn decide_start_union(
    p: &EndResultProjection,
    key: &UnionKey,
    solver: &SolverOptions,
) -> Result<Vec<StreamAppend>, EndResultError> {
    let u = p.require_union(key)?;
    if u.mandate_distribution_triggered() {
        return Err(PreconditionError::AlreadyTriggered.into());
    }
    let members = members(p, u)?;
    for m in &members {
        if !m.all_counting_circles_done() {
            return Err(PreconditionError::NotAllCountingCirclesDone {
                done: m.count_of_done_counting_circles(),
                total: m.election.total_counting_circles,
            }
            .into());
        }
    }

    let tallies: Vec<(&Election, _)> = members.iter().map(|m| (&m.election, m.tally())).collect();
    let input = allocate::union_matrix(&u.union, &tallies);
    let state = allocate::compute_double_proportional(&input, &u.union.quorum, solver)?;
    info!(union = %key, basis = %state.basis, complete = state.result.is_fully_distributed(), "union mandate distribution started");

    let mut batch = Batch::new(p);
    batch.union(key, UnionEvent::MandateDistributionStarted { double_proportional: state.clone() });
    distribute_to_members(p, u, &state, &mut batch);
    Ok(batch.into_parts())
}

/// Member distributions for a fully distributed union result; nothing otherwise.
pub(crate) fn distribute_to_members(
    p: &EndResultProjection,
    u: &UnionEndResult,
    state: &DoubleProportionalState,
    batch: &mut Batch<'_>,
) {
    if !state.result.is_fully_distributed() {
        return;
    }
    for id in &u.union.election_ids {
        let key = u.key.member(id);
        if let Some(m) = p.election(&key) {
            let distribution = allocate::union_member(&m.election, &m.tally(), &state.result);
            debug!(election = %key, "member mandates distributed by union");
            batch.election(&key, ElectionEvent::MandateDistributionStarted { distribution });
        }
    }
}

pub fn decide_revert_union(p: &EndResultProjection, key: &UnionKey) -> Result<Vec<StreamAppend>, EndResultError> {
    let u = p.require_union(key)?;
    if !u.mandate_distribution_triggered() {
        return Err(PreconditionError::NotTriggered.into());
    }
    let mut batch = Batch::new(p);
    batch.union(key, UnionEvent::MandateDistributionReverted { cause: RevertCause::Manual });
    let cause = RevertCause::UnionReverted { union_id: key.union_id.clone() };
    revert_members(p, u, &cause, &mut batch);
    Ok(batch.into_parts())
}

/// Revert every member with a distribution.
pub(crate) fn revert_members(p: &EndResultProjection, u: &UnionEndResult, cause: &RevertCause, batch: &mut Batch<'_>) {
    for id in &u.union.election_ids {
        let key = u.key.member(id);
        if p.election(&key).map_or(false, |m| m.mandate_distribution_triggered()) {
            batch.election(&key, ElectionEvent::MandateDistributionReverted { cause: cause.clone() });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pr_algo::MatrixInput;
    use pr_core::variables::QuorumRule;

    fn state() -> DoubleProportionalState {
        let input = MatrixInput::single("e".parse().unwrap(), 1, &[("a".parse().unwrap(), 10)]);
        allocate::compute_double_proportional(&input, &QuorumRule::default(), &SolverOptions::default()).unwrap()
    }

    #[test]
    fn invalidation_is_remembered_until_the_next_start() {
        let key = UnionKey::new("u".parse().unwrap(), ResultPhase::Live);
        let union = ElectionUnion {
            id: "u".parse().unwrap(),
            description: String::new(),
            election_ids: vec![],
            union_lists: vec![],
            quorum: QuorumRule::default(),
        };
        let mut u = UnionEndResult::defined(key, union);
        u.apply(&UnionEvent::MandateDistributionStarted { double_proportional: state() });
        assert!(u.is_fully_distributed());

        let cause = RevertCause::Manual;
        u.apply(&UnionEvent::DoubleProportionalResultInvalidated { cause: cause.clone() });
        assert!(!u.mandate_distribution_triggered() && u.double_proportional_invalidated);

        u.apply(&UnionEvent::MandateDistributionStarted { double_proportional: state() });
        assert!(!u.double_proportional_invalidated);
        u.apply(&UnionEvent::MandateDistributionReverted { cause });
        assert!(!u.mandate_distribution_triggered() && !u.double_proportional_invalidated);
    }
}
