//! ALLOCATE stage: list mandates per election and the list end results built on them.
//!
//! Input: an election definition and its vote `Tally`. Output: a `MandateDistribution`
//! ready to be carried by a `MandateDistributionStarted` event.
//!
//! - `hagenbach_bischoff`: D'Hondt over list votes. A tie at the last seat leaves the
//!   tied lists with an admissible range and forces a manual end result.
//! - `double_proportional_single`: one-row matrix, own basis digest and result.
//! - Union members: list mandates are read from the union's result.

use std::collections::{BTreeMap, BTreeSet};

use pr_algo::allocation::{apportion, DivisorMethod};
use pr_algo::matrix::{ColumnKey, MatrixCell, MatrixColumn, MatrixInput, MatrixRow};
use pr_algo::ranking::{rank_candidates, unranked};
use pr_algo::{DoubleProportionalResult, Ratio};
use pr_core::entities::{Election, ElectionList, ElectionUnion};
use pr_core::ids::ListId;
use pr_core::variables::{QuorumRule, SolverOptions};
use tracing::debug;

use crate::aggregate::{DoubleProportionalState, ListEndResult, MandateDistribution, Tally};
use crate::ComputationFault;

/// One list end result. Lists without decided mandates (or in manual mode) stay unranked.
pub fn list_end_result(
    list: &ElectionList,
    tally: &Tally,
    mandates: Option<u64>,
    range: (u64, u64),
    manual: bool,
) -> ListEndResult {
    let candidates = tally.candidate_votes(list);
    let ranking = match mandates {
        Some(m) if !manual => rank_candidates(&candidates, m),
        _ => unranked(&candidates, mandates.unwrap_or(0)),
    };
    ListEndResult {
        list_id: list.id.clone(),
        list_votes: tally.list_votes(&list.id),
        number_of_mandates: mandates,
        min_mandates: range.0,
        max_mandates: range.1,
        manual_entered: false,
        ranking,
    }
}

pub fn hagenbach_bischoff(election: &Election, tally: &Tally) -> Result<MandateDistribution, ComputationFault> {
    let weights: Vec<Ratio> = election.lists.iter().map(|l| Ratio::from(tally.list_votes(&l.id))).collect();
    let alloc = apportion(&weights, u64::from(election.number_of_mandates), DivisorMethod::DHondt)?;
    let tied: BTreeSet<usize> = alloc.tie.iter().flat_map(|t| t.contenders.iter().copied()).collect();
    let manual = election.manual_end_result_required || alloc.tie.is_some();
    if let Some(tie) = &alloc.tie {
        debug!(election = %election.id, contenders = tie.contenders.len(), seats = tie.seats, "hagenbach-bischoff tie");
    }

    let lists = election
        .lists
        .iter()
        .enumerate()
        .map(|(i, l)| {
            let assured = alloc.seats[i];
            if tied.contains(&i) {
                list_end_result(l, tally, None, (assured, assured + 1), manual)
            } else {
                list_end_result(l, tally, Some(assured), (assured, assured), manual)
            }
        })
        .collect();
    Ok(MandateDistribution { manual_end_result_required: manual, lists, double_proportional: None })
}

pub fn single_matrix(election: &Election, tally: &Tally) -> MatrixInput {
    let lists: Vec<(ListId, u64)> =
        election.lists.iter().map(|l| (l.id.clone(), tally.list_votes(&l.id))).collect();
    MatrixInput::single(election.id.clone(), u64::from(election.number_of_mandates), &lists)
}

/// Rows follow `union.election_ids`, columns follow `union.union_lists`.
pub fn union_matrix(union: &ElectionUnion, members: &[(&Election, Tally)]) -> MatrixInput {
    MatrixInput {
        rows: members
            .iter()
            .map(|(e, _)| MatrixRow { election_id: e.id.clone(), number_of_mandates: u64::from(e.number_of_mandates) })
            .collect(),
        columns: union
            .union_lists
            .iter()
            .map(|ul| MatrixColumn { key: ColumnKey::UnionList(ul.id.clone()), list_ids: ul.list_ids.clone() })
            .collect(),
        cells: members
            .iter()
            .map(|(e, t)| {
                union
                    .union_lists
                    .iter()
                    .map(|ul| {
                        let list_id = ul.list_ids.iter().find(|id| e.list(id).is_some()).cloned();
                        let vote_count = list_id.as_ref().map_or(0, |id| t.list_votes(id));
                        MatrixCell { list_id, vote_count }
                    })
                    .collect()
            })
            .collect(),
    }
}

pub fn compute_double_proportional(
    input: &MatrixInput,
    quorum: &QuorumRule,
    solver: &SolverOptions,
) -> Result<DoubleProportionalState, ComputationFault> {
    let basis = pr_io::hasher::basis_digest(input).map_err(|e| ComputationFault::Digest(e.to_string()))?;
    let result = DoubleProportionalResult::compute(input, quorum, solver)?;
    debug!(
        basis = %basis,
        super_state = ?result.super_apportionment.state,
        sub_state = ?result.sub_apportionment.state,
        iterations = result.sub_apportionment.iterations,
        "double proportional result computed"
    );
    Ok(DoubleProportionalState { basis, result })
}

/// List end results of one election from a double proportional result. Mandates stay
/// open until the result is fully distributed.
pub fn lists_from_double_proportional(
    election: &Election,
    tally: &Tally,
    result: &DoubleProportionalResult,
) -> Vec<ListEndResult> {
    let mandates: Option<BTreeMap<ListId, u64>> = if result.is_fully_distributed() {
        result.list_mandates(&election.id).map(|v| v.into_iter().collect())
    } else {
        None
    };
    election
        .lists
        .iter()
        .map(|l| {
            let m = mandates.as_ref().map(|m| m.get(&l.id).copied().unwrap_or(0));
            let range = m.map_or((0, 0), |m| (m, m));
            list_end_result(l, tally, m, range, election.manual_end_result_required)
        })
        .collect()
}

pub fn double_proportional_single(
    election: &Election,
    tally: &Tally,
    solver: &SolverOptions,
) -> Result<MandateDistribution, ComputationFault> {
    let input = single_matrix(election, tally);
    let state = compute_double_proportional(&input, &election.quorum, solver)?;
    Ok(MandateDistribution {
        manual_end_result_required: election.manual_end_result_required,
        lists: lists_from_double_proportional(election, tally, &state.result),
        double_proportional: Some(state),
    })
}

/// Distribution handed to a union member once the union result is complete.
pub fn union_member(election: &Election, tally: &Tally, result: &DoubleProportionalResult) -> MandateDistribution {
    MandateDistribution {
        manual_end_result_required: election.manual_end_result_required,
        lists: lists_from_double_proportional(election, tally, result),
        double_proportional: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::tally;
    use pr_algo::ranking::{CandidateState, ListLotDecisionState};
    use pr_core::entities::{Candidate, CandidateVoteSnapshot, CountingCircleSnapshot, ListVoteSnapshot};
    use pr_core::variables::MandateAlgorithm;

    fn list(id: &str, cands: &[&str]) -> ElectionList {
        ElectionList {
            id: id.parse().unwrap(),
            order_number: id.into(),
            description: String::new(),
            candidates: cands
                .iter()
                .enumerate()
                .map(|(i, c)| Candidate { id: c.parse().unwrap(), position: i as u32 + 1, description: String::new() })
                .collect(),
        }
    }

    fn election(mandates: u32, algo: MandateAlgorithm) -> Election {
        Election {
            id: "e".parse().unwrap(),
            description: String::new(),
            number_of_mandates: mandates,
            mandate_algorithm: algo,
            quorum: QuorumRule::default(),
            total_counting_circles: 1,
            manual_end_result_required: false,
            union_id: None,
            lists: vec![list("a", &["a1", "a2", "a3"]), list("b", &["b1", "b2"])],
        }
    }

    fn votes(lists: &[(&str, u64)], cands: &[(&str, u64)]) -> CountingCircleSnapshot {
        CountingCircleSnapshot {
            counting_circle_id: "cc".parse().unwrap(),
            lists: lists
                .iter()
                .map(|(id, v)| ListVoteSnapshot { list_id: id.parse().unwrap(), unmodified_list_votes: *v, modified_list_votes: 0 })
                .collect(),
            candidates: cands
                .iter()
                .map(|(id, v)| CandidateVoteSnapshot { candidate_id: id.parse().unwrap(), vote_count: *v })
                .collect(),
        }
    }

    #[test]
    fn dhondt_distribution_ranks_candidates() {
        let e = election(3, MandateAlgorithm::HagenbachBischoff);
        let t = tally(&e, &[votes(&[("a", 700), ("b", 300)], &[("a1", 100), ("a2", 100), ("a3", 50), ("b1", 80), ("b2", 80)])]);
        let d = hagenbach_bischoff(&e, &t).unwrap();
        assert!(!d.manual_end_result_required);
        assert_eq!(d.lists[0].number_of_mandates, Some(2));
        assert_eq!(d.lists[1].number_of_mandates, Some(1));
        assert_eq!(d.lists[0].ranking.candidates[2].state, CandidateState::NotElected);
        assert_eq!(d.lists[1].ranking.lot_decision_state, ListLotDecisionState::OpenAndRequired);
    }

    #[test]
    fn dhondt_tie_forces_manual_with_range() {
        let e = election(1, MandateAlgorithm::HagenbachBischoff);
        let t = tally(&e, &[votes(&[("a", 100), ("b", 100)], &[])]);
        let d = hagenbach_bischoff(&e, &t).unwrap();
        assert!(d.manual_end_result_required);
        assert_eq!(d.lists[0].number_of_mandates, None);
        assert_eq!((d.lists[0].min_mandates, d.lists[0].max_mandates), (0, 1));
        assert!(d.lists[0].ranking.candidates.iter().all(|c| c.rank.is_none()));
    }

    #[test]
    fn single_double_proportional_hands_out_list_mandates() {
        let e = election(3, MandateAlgorithm::DoubleProportionalSingle);
        let t = tally(&e, &[votes(&[("a", 700), ("b", 300)], &[("a1", 5), ("b1", 5)])]);
        let d = double_proportional_single(&e, &t, &SolverOptions::default()).unwrap();
        let dp = d.double_proportional.as_ref().unwrap();
        assert!(dp.result.is_fully_distributed());
        let total: u64 = d.lists.iter().filter_map(|l| l.number_of_mandates).sum();
        assert_eq!(total, 3);
        // Sainte-Laguë quotients: 1400 (a), 600 (b), 466.7 (a).
        assert_eq!(d.lists[0].number_of_mandates, Some(2));
        assert_eq!(d.lists[1].number_of_mandates, Some(1));
    }
}
