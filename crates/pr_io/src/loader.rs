//! Loader: read a local scenario file (definitions, audited counting circles,
//! second-factor fixtures), normalize ordering, and check cross references.
//! No network I/O.

#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use pr_core::entities::{CountingCircleSnapshot, Election, ElectionUnion};
use pr_core::ids::{CountingCircleId, ElectionId, ListId, UnionId};
use serde::{Deserialize, Serialize};

use crate::{read_json, IoError, IoResult};

// ----------------------------- Wire-facing types -----------------------------

/// One audited counting circle, addressed to its election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditedCountingCircle {
    pub election_id: ElectionId,
    pub snapshot: CountingCircleSnapshot,
}

/// Second-factor transactions known to the local verifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecondFactorFixture {
    pub verified: Vec<String>,
    /// Confirmed, but the data it was issued for changed since.
    pub data_changed: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub elections: Vec<Election>,
    pub unions: Vec<ElectionUnion>,
    pub counting_circles: Vec<AuditedCountingCircle>,
    pub second_factor: SecondFactorFixture,
}

// ----------------------------- Orchestration -----------------------------

pub fn load_scenario(path: &Path) -> IoResult<Scenario> {
    let mut scenario: Scenario = read_json(path)?;
    normalize(&mut scenario);
    check_cross_refs(&scenario)?;
    tracing::info!(
        path = %path.display(),
        elections = scenario.elections.len(),
        unions = scenario.unions.len(),
        counting_circles = scenario.counting_circles.len(),
        "scenario loaded"
    );
    Ok(scenario)
}

/// Lists by order number, candidates by position; counting circles by (election, id).
pub fn normalize(s: &mut Scenario) {
    for e in &mut s.elections {
        e.lists.sort_by(|a, b| a.order_number.cmp(&b.order_number).then_with(|| a.id.cmp(&b.id)));
        for l in &mut e.lists {
            l.candidates.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));
        }
    }
    s.counting_circles.sort_by(|a, b| {
        a.election_id
            .cmp(&b.election_id)
            .then_with(|| a.snapshot.counting_circle_id.cmp(&b.snapshot.counting_circle_id))
    });
}

// ----------------------------- Cross references -----------------------------

fn invalid(msg: String) -> IoError {
    IoError::Invalid(msg)
}

/// Referential checks across the file. Per-definition shape checks belong to the
/// pipeline's command validation.
pub fn check_cross_refs(s: &Scenario) -> IoResult<()> {
    let mut elections: BTreeMap<&ElectionId, &Election> = BTreeMap::new();
    for e in &s.elections {
        if elections.insert(&e.id, e).is_some() {
            return Err(invalid(format!("duplicate election {}", e.id)));
        }
    }

    let mut unions: BTreeSet<&UnionId> = BTreeSet::new();
    for u in &s.unions {
        if !unions.insert(&u.id) {
            return Err(invalid(format!("duplicate union {}", u.id)));
        }
        for eid in &u.election_ids {
            let e = elections
                .get(eid)
                .ok_or_else(|| invalid(format!("union {} references unknown election {eid}", u.id)))?;
            if e.union_id.as_ref() != Some(&u.id) {
                return Err(invalid(format!("election {eid} does not point back to union {}", u.id)));
            }
        }
        for ul in &u.union_lists {
            let mut per_election: BTreeSet<&ElectionId> = BTreeSet::new();
            for lid in &ul.list_ids {
                let owner = u
                    .election_ids
                    .iter()
                    .find(|eid| elections.get(eid).map_or(false, |e| e.list(lid).is_some()))
                    .ok_or_else(|| invalid(format!("union list {} references unknown list {lid}", ul.id)))?;
                if !per_election.insert(owner) {
                    return Err(invalid(format!("union list {} has two lists of election {owner}", ul.id)));
                }
            }
        }
    }

    for e in &s.elections {
        match (&e.union_id, e.mandate_algorithm.is_union()) {
            (Some(uid), true) if unions.contains(uid) => {}
            (Some(uid), true) => return Err(invalid(format!("election {} references unknown union {uid}", e.id))),
            (None, true) => return Err(invalid(format!("union election {} has no union", e.id))),
            (Some(uid), false) => {
                return Err(invalid(format!("election {} joins union {uid} without a union algorithm", e.id)))
            }
            (None, false) => {}
        }
    }

    let mut seen: BTreeSet<(&ElectionId, &CountingCircleId)> = BTreeSet::new();
    let mut per_election: BTreeMap<&ElectionId, u32> = BTreeMap::new();
    for cc in &s.counting_circles {
        let e = elections
            .get(&cc.election_id)
            .ok_or_else(|| invalid(format!("counting circle for unknown election {}", cc.election_id)))?;
        let cc_id = &cc.snapshot.counting_circle_id;
        if !seen.insert((&cc.election_id, cc_id)) {
            return Err(invalid(format!("counting circle {cc_id} appears twice for election {}", e.id)));
        }
        *per_election.entry(&e.id).or_default() += 1;
        let known_lists: BTreeSet<&ListId> = e.lists.iter().map(|l| &l.id).collect();
        if let Some(l) = cc.snapshot.lists.iter().find(|l| !known_lists.contains(&l.list_id)) {
            return Err(invalid(format!("counting circle {cc_id} has votes for unknown list {}", l.list_id)));
        }
        if let Some(c) = cc
            .snapshot
            .candidates
            .iter()
            .find(|c| !e.lists.iter().any(|l| l.candidate(&c.candidate_id).is_some()))
        {
            return Err(invalid(format!("counting circle {cc_id} has votes for unknown candidate {}", c.candidate_id)));
        }
    }
    for (eid, n) in per_election {
        let total = elections.get(eid).map_or(0, |e| e.total_counting_circles);
        if n > total {
            return Err(invalid(format!("election {eid} has {n} counting circles but expects {total}")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scenario(v: serde_json::Value) -> Scenario {
        serde_json::from_value(v).unwrap()
    }

    fn base() -> serde_json::Value {
        json!({
            "elections": [{
                "id": "nr",
                "number_of_mandates": 2,
                "mandate_algorithm": "double_proportional_single",
                "total_counting_circles": 1,
                "lists": [
                    { "id": "b", "order_number": "02", "candidates": [{ "id": "b1", "position": 1 }] },
                    { "id": "a", "order_number": "01", "candidates": [
                        { "id": "a2", "position": 2 }, { "id": "a1", "position": 1 }
                    ] }
                ]
            }],
            "counting_circles": [{
                "election_id": "nr",
                "snapshot": {
                    "counting_circle_id": "cc1",
                    "lists": [{ "list_id": "a", "unmodified_list_votes": 10, "modified_list_votes": 2 }],
                    "candidates": [{ "candidate_id": "a1", "vote_count": 9 }]
                }
            }]
        })
    }

    #[test]
    fn loads_and_normalizes_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("scenario.json");
        std::fs::write(&p, base().to_string()).unwrap();
        let s = load_scenario(&p).unwrap();
        let e = &s.elections[0];
        assert_eq!(e.lists[0].id.as_str(), "a");
        assert_eq!(e.lists[0].candidates[0].id.as_str(), "a1");
        assert!(s.second_factor.verified.is_empty());
    }

    #[test]
    fn unknown_candidate_rejected() {
        let mut v = base();
        v["counting_circles"][0]["snapshot"]["candidates"][0]["candidate_id"] = json!("zz");
        let err = check_cross_refs(&scenario(v)).unwrap_err();
        assert!(err.to_string().contains("unknown candidate zz"), "{err}");
    }

    #[test]
    fn too_many_counting_circles_rejected() {
        let mut v = base();
        let mut second = v["counting_circles"][0].clone();
        second["snapshot"]["counting_circle_id"] = json!("cc2");
        v["counting_circles"].as_array_mut().unwrap().push(second);
        assert!(matches!(check_cross_refs(&scenario(v)), Err(IoError::Invalid(_))));
    }

    #[test]
    fn union_member_must_point_back() {
        let mut v = base();
        v["unions"] = json!([{ "id": "u", "election_ids": ["nr"], "union_lists": [] }]);
        let err = check_cross_refs(&scenario(v)).unwrap_err();
        assert!(err.to_string().contains("does not point back"), "{err}");
    }

    #[test]
    fn malformed_json_reports_position() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("bad.json");
        std::fs::write(&p, "{\"elections\": [").unwrap();
        assert!(matches!(load_scenario(&p), Err(IoError::Json { .. })));
    }
}
