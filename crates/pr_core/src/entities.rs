//! Election entities: lists, candidates, unions, audited counting-circle snapshots.
//!
//! These are plain value structs; validation of cross references lives in
//! `pr_io::loader` and `pr_pipeline::validate`.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::ids::{CandidateId, CountingCircleId, ElectionId, ListId, UnionId, UnionListId};
use crate::variables::{MandateAlgorithm, QuorumRule};

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Candidate {
    pub id: CandidateId,
    /// Ballot position within the list (1-based).
    pub position: u32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ElectionList {
    pub id: ListId,
    pub order_number: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub description: String,
    pub candidates: Vec<Candidate>,
}

impl ElectionList {
    pub fn candidate(&self, id: &CandidateId) -> Option<&Candidate> {
        self.candidates.iter().find(|c| &c.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Election {
    pub id: ElectionId,
    #[cfg_attr(feature = "serde", serde(default))]
    pub description: String,
    pub number_of_mandates: u32,
    pub mandate_algorithm: MandateAlgorithm,
    /// Only read by `double_proportional_single`; unions carry their own rule.
    #[cfg_attr(feature = "serde", serde(default))]
    pub quorum: QuorumRule,
    pub total_counting_circles: u32,
    /// Skip automatic candidate election; every list is entered manually.
    #[cfg_attr(feature = "serde", serde(default))]
    pub manual_end_result_required: bool,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub union_id: Option<UnionId>,
    pub lists: Vec<ElectionList>,
}

impl Election {
    pub fn list(&self, id: &ListId) -> Option<&ElectionList> {
        self.lists.iter().find(|l| &l.id == id)
    }
}

/// One party across the member elections of a union (at most one list per election).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UnionList {
    pub id: UnionListId,
    #[cfg_attr(feature = "serde", serde(default))]
    pub description: String,
    pub list_ids: Vec<ListId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ElectionUnion {
    pub id: UnionId,
    #[cfg_attr(feature = "serde", serde(default))]
    pub description: String,
    pub election_ids: Vec<ElectionId>,
    pub union_lists: Vec<UnionList>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub quorum: QuorumRule,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ListVoteSnapshot {
    pub list_id: ListId,
    pub unmodified_list_votes: u64,
    pub modified_list_votes: u64,
}

impl ListVoteSnapshot {
    #[inline]
    pub fn list_votes(&self) -> u64 {
        self.unmodified_list_votes.saturating_add(self.modified_list_votes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CandidateVoteSnapshot {
    pub candidate_id: CandidateId,
    pub vote_count: u64,
}

/// Immutable totals of one counting circle once its submission is audited.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CountingCircleSnapshot {
    pub counting_circle_id: CountingCircleId,
    pub lists: Vec<ListVoteSnapshot>,
    pub candidates: Vec<CandidateVoteSnapshot>,
}
