//! crates/pr_pipeline/src/validate.rs
//! Structural checks on definitions and snapshots before anything is recorded.
//! Issues are sorted (code, message) so the same input always reports the same way.

use std::collections::{BTreeMap, BTreeSet};

use pr_core::entities::{CountingCircleSnapshot, Election, ElectionUnion};
use pr_core::ids::{CandidateId, ElectionId, ListId, UnionListId};

use crate::{ValidationError, ValidationIssue};

fn issue(code: &'static str, message: String) -> ValidationIssue {
    ValidationIssue { code, message }
}

/// Single-election checks.
pub fn validate_election(e: &Election) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if e.number_of_mandates == 0 {
        issues.push(issue("Election.NoMandates", format!("election {} has no mandates", e.id)));
    }
    if e.total_counting_circles == 0 {
        issues.push(issue("Election.NoCountingCircles", format!("election {} has no counting circles", e.id)));
    }
    if e.lists.is_empty() {
        issues.push(issue("Election.NoLists", format!("election {} has no lists", e.id)));
    }
    match (e.mandate_algorithm.is_union(), &e.union_id) {
        (true, None) => issues.push(issue("Election.UnionMissing", format!("election {} needs a union", e.id))),
        (false, Some(u)) => issues.push(issue(
            "Election.UnionUnexpected",
            format!("election {} names union {u} but does not use the union algorithm", e.id),
        )),
        _ => {}
    }

    let mut lists: BTreeSet<&ListId> = BTreeSet::new();
    let mut candidates: BTreeSet<&CandidateId> = BTreeSet::new();
    for l in &e.lists {
        if !lists.insert(&l.id) {
            issues.push(issue("List.Duplicate", format!("list {} appears twice", l.id)));
        }
        let mut positions = BTreeSet::new();
        for c in &l.candidates {
            if !candidates.insert(&c.id) {
                issues.push(issue("Candidate.Duplicate", format!("candidate {} appears twice", c.id)));
            }
            if !positions.insert(c.position) {
                issues.push(issue(
                    "Candidate.PositionDuplicate",
                    format!("position {} is taken twice on list {}", c.position, l.id),
                ));
            }
        }
    }

    sort_issues_stably(&mut issues);
    issues
}

/// Union checks against the already defined member elections.
pub fn validate_union(u: &ElectionUnion, members: &BTreeMap<&ElectionId, &Election>) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if u.election_ids.is_empty() {
        issues.push(issue("Union.NoElections", format!("union {} has no elections", u.id)));
    }
    let mut seen_elections = BTreeSet::new();
    for eid in &u.election_ids {
        if !seen_elections.insert(eid) {
            issues.push(issue("Union.DuplicateElection", format!("election {eid} appears twice")));
        }
        match members.get(eid) {
            None => issues.push(issue("Union.UnknownElection", format!("election {eid} is not defined"))),
            Some(e) if e.union_id.as_ref() != Some(&u.id) || !e.mandate_algorithm.is_union() => issues.push(issue(
                "Union.MemberMismatch",
                format!("election {eid} is not a union election of {}", u.id),
            )),
            Some(_) => {}
        }
    }

    // Every member list sits in exactly one union list; at most one list per election.
    let mut owner: BTreeMap<&ListId, &UnionListId> = BTreeMap::new();
    let mut union_lists = BTreeSet::new();
    for ul in &u.union_lists {
        if !union_lists.insert(&ul.id) {
            issues.push(issue("UnionList.Duplicate", format!("union list {} appears twice", ul.id)));
        }
        let mut per_election = BTreeSet::new();
        for lid in &ul.list_ids {
            let election = u
                .election_ids
                .iter()
                .find(|eid| members.get(eid).map_or(false, |e| e.list(lid).is_some()));
            match election {
                None => issues.push(issue(
                    "UnionList.UnknownList",
                    format!("union list {} names list {lid} outside the union", ul.id),
                )),
                Some(eid) if !per_election.insert(eid) => issues.push(issue(
                    "UnionList.TwoListsInElection",
                    format!("union list {} has two lists of election {eid}", ul.id),
                )),
                Some(_) => {}
            }
            if let Some(prev) = owner.insert(lid, &ul.id) {
                issues.push(issue(
                    "List.InTwoUnionLists",
                    format!("list {lid} is in union lists {prev} and {}", ul.id),
                ));
            }
        }
    }
    for eid in &u.election_ids {
        if let Some(e) = members.get(eid) {
            for l in &e.lists {
                if !owner.contains_key(&l.id) {
                    issues.push(issue("List.NotInUnionList", format!("list {} of election {eid} has no union list", l.id)));
                }
            }
        }
    }

    sort_issues_stably(&mut issues);
    issues
}

/// Votes may only name lists and candidates of the election.
pub fn validate_snapshot(e: &Election, s: &CountingCircleSnapshot) -> Result<(), ValidationError> {
    let mut lists = BTreeSet::new();
    for l in &s.lists {
        if e.list(&l.list_id).is_none() {
            return Err(ValidationError::CountingCircle(format!("unknown list {}", l.list_id)));
        }
        if !lists.insert(&l.list_id) {
            return Err(ValidationError::CountingCircle(format!("list {} counted twice", l.list_id)));
        }
    }
    let mut candidates = BTreeSet::new();
    for c in &s.candidates {
        if !e.lists.iter().any(|l| l.candidate(&c.candidate_id).is_some()) {
            return Err(ValidationError::CountingCircle(format!("unknown candidate {}", c.candidate_id)));
        }
        if !candidates.insert(&c.candidate_id) {
            return Err(ValidationError::CountingCircle(format!("candidate {} counted twice", c.candidate_id)));
        }
    }
    Ok(())
}

pub fn into_result(issues: Vec<ValidationIssue>) -> Result<(), ValidationError> {
    if issues.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::Definition(issues))
    }
}

fn sort_issues_stably(issues: &mut [ValidationIssue]) {
    issues.sort_by(|a, b| a.code.cmp(b.code).then_with(|| a.message.cmp(&b.message)));
}
