//! Per-election end-result aggregate and vote aggregation over audited snapshots.
//!
//! Contract:
//! - List votes and candidate votes are plain sums over the audited snapshots;
//!   lists and candidates without votes count zero.
//! - `apply` is a pure state transition; sequence bookkeeping lives in the projection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use pr_algo::ranking::{CandidateVotes, ListLotDecisionState, ListRanking};
use pr_algo::DoubleProportionalResult;
use pr_core::entities::{CountingCircleSnapshot, Election, ElectionList};
use pr_core::ids::{CandidateId, CountingCircleId, ListId, ResultDigest};

use crate::events::ElectionEvent;
use crate::ElectionKey;

// ----------------------------- Distribution state -----------------------------------

/// A double proportional result with the digest of the matrix it was computed from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoubleProportionalState {
    pub basis: ResultDigest,
    pub result: DoubleProportionalResult,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEndResult {
    pub list_id: ListId,
    pub list_votes: u64,
    /// `None` while a super/sub lot decision or a manual entry still decides it.
    pub number_of_mandates: Option<u64>,
    /// Admissible mandates for a manual entry.
    pub min_mandates: u64,
    pub max_mandates: u64,
    pub manual_entered: bool,
    pub ranking: ListRanking,
}

impl ListEndResult {
    pub fn has_open_lot_decision(&self) -> bool {
        self.ranking.lot_decision_state == ListLotDecisionState::OpenAndRequired
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MandateDistribution {
    pub manual_end_result_required: bool,
    pub lists: Vec<ListEndResult>,
    /// Own result of a `double_proportional_single` election; unions keep theirs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub double_proportional: Option<DoubleProportionalState>,
}

impl MandateDistribution {
    pub fn list(&self, id: &ListId) -> Option<&ListEndResult> {
        self.lists.iter().find(|l| &l.list_id == id)
    }

    fn list_mut(&mut self, id: &ListId) -> Option<&mut ListEndResult> {
        self.lists.iter_mut().find(|l| &l.list_id == id)
    }
}

// ----------------------------- Aggregation ------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    pub lists: BTreeMap<ListId, u64>,
    pub candidates: BTreeMap<CandidateId, u64>,
}

impl Tally {
    pub fn list_votes(&self, id: &ListId) -> u64 {
        self.lists.get(id).copied().unwrap_or(0)
    }

    pub fn candidate_votes(&self, list: &ElectionList) -> Vec<CandidateVotes> {
        list.candidates
            .iter()
            .map(|c| CandidateVotes {
                candidate_id: c.id.clone(),
                position: c.position,
                vote_count: self.candidates.get(&c.id).copied().unwrap_or(0),
            })
            .collect()
    }
}

pub fn tally<'a>(election: &Election, snapshots: impl IntoIterator<Item = &'a CountingCircleSnapshot>) -> Tally {
    let mut t = Tally::default();
    for l in &election.lists {
        t.lists.insert(l.id.clone(), 0);
        for c in &l.candidates {
            t.candidates.insert(c.id.clone(), 0);
        }
    }
    for s in snapshots {
        for l in &s.lists {
            let v = t.lists.entry(l.list_id.clone()).or_default();
            *v = v.saturating_add(l.list_votes());
        }
        for c in &s.candidates {
            let v = t.candidates.entry(c.candidate_id.clone()).or_default();
            *v = v.saturating_add(c.vote_count);
        }
    }
    t
}

// ----------------------------- Aggregate --------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElectionEndResult {
    pub key: ElectionKey,
    pub election: Election,
    pub counting_circles: BTreeMap<CountingCircleId, CountingCircleSnapshot>,
    /// `Some` once the mandate distribution is triggered.
    pub distribution: Option<MandateDistribution>,
    pub finalized: bool,
    /// Set by a counting circle reset; cleared by the next distribution.
    pub double_proportional_invalidated: bool,
}

impl ElectionEndResult {
    pub fn defined(key: ElectionKey, election: Election) -> Self {
        Self {
            key,
            election,
            counting_circles: BTreeMap::new(),
            distribution: None,
            finalized: false,
            double_proportional_invalidated: false,
        }
    }

    pub fn count_of_done_counting_circles(&self) -> u32 {
        self.counting_circles.len() as u32
    }

    pub fn all_counting_circles_done(&self) -> bool {
        self.count_of_done_counting_circles() >= self.election.total_counting_circles
    }

    pub fn mandate_distribution_triggered(&self) -> bool {
        self.distribution.is_some()
    }

    pub fn tally(&self) -> Tally {
        tally(&self.election, self.counting_circles.values())
    }

    pub fn apply(&mut self, event: &ElectionEvent) {
        match event {
            ElectionEvent::ElectionDefined { election } => self.election = election.clone(),
            ElectionEvent::CountingCircleAudited { snapshot } => {
                self.counting_circles.insert(snapshot.counting_circle_id.clone(), snapshot.clone());
            }
            ElectionEvent::CountingCircleReset { counting_circle_id } => {
                self.counting_circles.remove(counting_circle_id);
            }
            ElectionEvent::MandateDistributionStarted { distribution } => {
                self.distribution = Some(distribution.clone());
                self.finalized = false;
                self.double_proportional_invalidated = false;
            }
            ElectionEvent::SuperApportionmentLotDecisionApplied { double_proportional, lists, .. }
            | ElectionEvent::SubApportionmentLotDecisionApplied { double_proportional, lists, .. } => {
                if let Some(d) = &mut self.distribution {
                    d.double_proportional = Some(double_proportional.clone());
                    d.lists = lists.clone();
                }
            }
            ElectionEvent::ListLotDecisionApplied { list_id, ranking } => {
                if let Some(l) = self.distribution.as_mut().and_then(|d| d.list_mut(list_id)) {
                    l.ranking = ranking.clone();
                }
            }
            ElectionEvent::ManualListEndResultEntered { list_id, ranking } => {
                if let Some(l) = self.distribution.as_mut().and_then(|d| d.list_mut(list_id)) {
                    l.number_of_mandates = Some(ranking.number_of_mandates);
                    l.manual_entered = true;
                    l.ranking = ranking.clone();
                }
            }
            ElectionEvent::EndResultFinalized => self.finalized = true,
            ElectionEvent::FinalizationReverted => self.finalized = false,
            ElectionEvent::MandateDistributionReverted { .. } => {
                self.distribution = None;
                self.finalized = false;
            }
            ElectionEvent::DoubleProportionalResultInvalidated { .. } => {
                self.double_proportional_invalidated = true;
                if let Some(d) = &mut self.distribution {
                    d.double_proportional = None;
                }
            }
        }
    }
}
