//! Candidate ranking within a list, list lot decisions, and manual end results.
//!
//! Contract:
//! - Candidates are ordered by vote count (descending); ballot position only orders
//!   the display within a vote-count group.
//! - Ranks are dense per vote-count group: equal votes share a rank.
//! - Groups fully inside the list's mandates are `Elected`; the group straddling the
//!   last mandate is `Pending` with an open lot decision; the rest `NotElected`.
//! - A list lot decision must settle the whole pending group at once.

use std::collections::BTreeSet;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use pr_core::ids::CandidateId;

use crate::lot_decision::{validate_entries, LotDecisionEntry, LotDecisionError, ResolveError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateState {
    Pending,
    Elected,
    NotElected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListLotDecisionState {
    None,
    OpenAndRequired,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandidateVotes {
    pub candidate_id: CandidateId,
    pub position: u32,
    pub vote_count: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub candidate_id: CandidateId,
    pub position: u32,
    pub vote_count: u64,
    /// `None` for manual end results.
    pub rank: Option<u32>,
    pub state: CandidateState,
    pub lot_decision_required: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRanking {
    pub number_of_mandates: u64,
    pub lot_decision_state: ListLotDecisionState,
    /// Mandates the pending group competes for.
    pub open_mandates: u64,
    pub candidates: Vec<RankedCandidate>,
}

pub type CandidateLotDecisionEntry = LotDecisionEntry<CandidateId>;

fn sorted(candidates: &[CandidateVotes]) -> Vec<CandidateVotes> {
    let mut v = candidates.to_vec();
    v.sort_by(|a, b| {
        b.vote_count
            .cmp(&a.vote_count)
            .then(a.position.cmp(&b.position))
            .then_with(|| a.candidate_id.cmp(&b.candidate_id))
    });
    v
}

pub fn rank_candidates(candidates: &[CandidateVotes], mandates: u64) -> ListRanking {
    let ordered = sorted(candidates);
    let mut out: Vec<RankedCandidate> = Vec::with_capacity(ordered.len());
    let mut filled: u64 = 0;
    let mut open: u64 = 0;
    let mut rank: u32 = 0;

    let mut i = 0;
    while i < ordered.len() {
        let votes = ordered[i].vote_count;
        let end = ordered[i..]
            .iter()
            .position(|c| c.vote_count != votes)
            .map_or(ordered.len(), |p| i + p);
        let group_len = (end - i) as u64;
        rank += 1;

        let (state, lot) = if filled + group_len <= mandates {
            filled += group_len;
            (CandidateState::Elected, false)
        } else if filled < mandates {
            open = mandates - filled;
            filled = mandates;
            (CandidateState::Pending, true)
        } else {
            (CandidateState::NotElected, false)
        };

        for c in &ordered[i..end] {
            out.push(RankedCandidate {
                candidate_id: c.candidate_id.clone(),
                position: c.position,
                vote_count: c.vote_count,
                rank: Some(rank),
                state,
                lot_decision_required: lot,
            });
        }
        i = end;
    }

    ListRanking {
        number_of_mandates: mandates,
        lot_decision_state: if open > 0 { ListLotDecisionState::OpenAndRequired } else { ListLotDecisionState::None },
        open_mandates: open,
        candidates: out,
    }
}

/// Manual mode: every candidate waits for a manual entry, without rank.
pub fn unranked(candidates: &[CandidateVotes], mandates: u64) -> ListRanking {
    ListRanking {
        number_of_mandates: mandates,
        lot_decision_state: ListLotDecisionState::None,
        open_mandates: 0,
        candidates: sorted(candidates)
            .into_iter()
            .map(|c| RankedCandidate {
                candidate_id: c.candidate_id,
                position: c.position,
                vote_count: c.vote_count,
                rank: None,
                state: CandidateState::Pending,
                lot_decision_required: false,
            })
            .collect(),
    }
}

/// Settle the pending group. Winners keep the group rank, losers move one rank
/// down together with every later group.
pub fn apply_list_lot_decision(
    ranking: &ListRanking,
    entries: &[CandidateLotDecisionEntry],
) -> Result<ListRanking, ResolveError> {
    if ranking.lot_decision_state != ListLotDecisionState::OpenAndRequired {
        return Err(ResolveError::NotOpen);
    }
    let pending: Vec<CandidateId> = ranking
        .candidates
        .iter()
        .filter(|c| c.lot_decision_required)
        .map(|c| c.candidate_id.clone())
        .collect();
    validate_entries(entries, &pending, |_, _| false)?;

    let winners: BTreeSet<&CandidateId> = entries.iter().filter(|e| e.winning).map(|e| &e.reference).collect();
    if winners.len() as u64 != ranking.open_mandates {
        return Err(LotDecisionError::WrongNumberOfWinners {
            expected: ranking.open_mandates,
            actual: winners.len() as u64,
        }
        .into());
    }

    let group_rank = ranking
        .candidates
        .iter()
        .find(|c| c.lot_decision_required)
        .and_then(|c| c.rank)
        .unwrap_or(0);

    let mut next = ranking.clone();
    for c in &mut next.candidates {
        if c.lot_decision_required {
            c.lot_decision_required = false;
            if winners.contains(&c.candidate_id) {
                c.state = CandidateState::Elected;
            } else {
                c.state = CandidateState::NotElected;
                c.rank = Some(group_rank + 1);
            }
        } else if let Some(r) = c.rank.filter(|&r| r > group_rank) {
            c.rank = Some(r + 1);
        }
    }
    // Keep winners ahead of losers inside the former group.
    next.candidates.sort_by(|a, b| {
        a.rank
            .cmp(&b.rank)
            .then(b.vote_count.cmp(&a.vote_count))
            .then(a.position.cmp(&b.position))
    });
    next.lot_decision_state = ListLotDecisionState::None;
    next.open_mandates = 0;
    Ok(next)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualCandidateEntry {
    pub candidate_id: CandidateId,
    pub state: CandidateState,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ManualEntryError {
    #[error("candidate {0} is missing from the manual end result")]
    MissingCandidate(String),
    #[error("candidate {0} appears more than once")]
    DuplicateCandidate(String),
    #[error("candidate {0} is not on this list")]
    UnknownCandidate(String),
    #[error("candidate {0} must be elected or not elected")]
    InvalidState(String),
    #[error("{elected} elected candidate(s), expected between {min} and {max}")]
    ElectedCountOutOfRange { elected: u64, min: u64, max: u64 },
}

/// Validate a manual end result for one list. The list's mandates become the
/// number of elected candidates, which must lie in `allowed`.
pub fn apply_manual_end_result(
    candidates: &[CandidateVotes],
    entries: &[ManualCandidateEntry],
    allowed: RangeInclusive<u64>,
) -> Result<ListRanking, ManualEntryError> {
    let known: BTreeSet<&CandidateId> = candidates.iter().map(|c| &c.candidate_id).collect();
    let mut seen: BTreeSet<&CandidateId> = BTreeSet::new();
    for e in entries {
        if !known.contains(&e.candidate_id) {
            return Err(ManualEntryError::UnknownCandidate(e.candidate_id.to_string()));
        }
        if !seen.insert(&e.candidate_id) {
            return Err(ManualEntryError::DuplicateCandidate(e.candidate_id.to_string()));
        }
        if e.state == CandidateState::Pending {
            return Err(ManualEntryError::InvalidState(e.candidate_id.to_string()));
        }
    }
    if let Some(missing) = candidates.iter().find(|c| !seen.contains(&c.candidate_id)) {
        return Err(ManualEntryError::MissingCandidate(missing.candidate_id.to_string()));
    }

    let elected = entries.iter().filter(|e| e.state == CandidateState::Elected).count() as u64;
    if !allowed.contains(&elected) {
        return Err(ManualEntryError::ElectedCountOutOfRange {
            elected,
            min: *allowed.start(),
            max: *allowed.end(),
        });
    }

    let mut ranking = unranked(candidates, elected);
    for c in &mut ranking.candidates {
        if let Some(e) = entries.iter().find(|e| e.candidate_id == c.candidate_id) {
            c.state = e.state;
        }
    }
    Ok(ranking)
}
