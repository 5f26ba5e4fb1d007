//! Builders shared by the pipeline integration tests.
#![allow(dead_code)]

use pr_core::entities::{
    Candidate, CandidateVoteSnapshot, CountingCircleSnapshot, Election, ElectionList, ElectionUnion, ListVoteSnapshot,
    UnionList,
};
use pr_core::variables::{ContestSettings, MandateAlgorithm, QuorumRule, ResultPhase, SolverOptions};
use pr_pipeline::service::KnownTransactions;
use pr_pipeline::{Command, ElectionKey, EndResultService, InMemoryEventStore, UnionKey};

pub type Service = EndResultService<InMemoryEventStore, KnownTransactions>;

pub fn list(id: &str, candidates: &[&str]) -> ElectionList {
    ElectionList {
        id: id.parse().unwrap(),
        order_number: id.to_string(),
        description: String::new(),
        candidates: candidates
            .iter()
            .enumerate()
            .map(|(i, c)| Candidate { id: c.parse().unwrap(), position: i as u32 + 1, description: String::new() })
            .collect(),
    }
}

pub fn election(id: &str, mandates: u32, algorithm: MandateAlgorithm, circles: u32, lists: Vec<ElectionList>) -> Election {
    Election {
        id: id.parse().unwrap(),
        description: String::new(),
        number_of_mandates: mandates,
        mandate_algorithm: algorithm,
        quorum: QuorumRule::default(),
        total_counting_circles: circles,
        manual_end_result_required: false,
        union_id: None,
        lists,
    }
}

pub fn member(id: &str, union: &str, mandates: u32, lists: Vec<ElectionList>) -> Election {
    Election {
        union_id: Some(union.parse().unwrap()),
        ..election(id, mandates, MandateAlgorithm::DoubleProportionalUnion, 1, lists)
    }
}

pub fn union(id: &str, elections: &[&str], union_lists: &[(&str, &[&str])]) -> ElectionUnion {
    ElectionUnion {
        id: id.parse().unwrap(),
        description: String::new(),
        election_ids: elections.iter().map(|e| e.parse().unwrap()).collect(),
        union_lists: union_lists
            .iter()
            .map(|(ul, lists)| UnionList {
                id: ul.parse().unwrap(),
                description: String::new(),
                list_ids: lists.iter().map(|l| l.parse().unwrap()).collect(),
            })
            .collect(),
        quorum: QuorumRule::default(),
    }
}

pub fn snapshot(cc: &str, lists: &[(&str, u64)], candidates: &[(&str, u64)]) -> CountingCircleSnapshot {
    CountingCircleSnapshot {
        counting_circle_id: cc.parse().unwrap(),
        lists: lists
            .iter()
            .map(|(id, v)| ListVoteSnapshot { list_id: id.parse().unwrap(), unmodified_list_votes: *v, modified_list_votes: 0 })
            .collect(),
        candidates: candidates
            .iter()
            .map(|(id, v)| CandidateVoteSnapshot { candidate_id: id.parse().unwrap(), vote_count: *v })
            .collect(),
    }
}

pub fn key(id: &str) -> ElectionKey {
    ElectionKey::new(id.parse().unwrap(), ResultPhase::Live)
}

pub fn union_key(id: &str) -> UnionKey {
    UnionKey::new(id.parse().unwrap(), ResultPhase::Live)
}

pub fn service(settings: ContestSettings) -> Service {
    service_with(settings, KnownTransactions::default())
}

pub fn service_with(settings: ContestSettings, verifier: KnownTransactions) -> Service {
    EndResultService::new(InMemoryEventStore::new(), verifier, settings, SolverOptions::default()).unwrap()
}

pub fn define(svc: &mut Service, e: Election) {
    svc.handle(Command::DefineElection { phase: ResultPhase::Live, election: e }).unwrap();
}

pub fn audit(svc: &mut Service, election: &str, s: CountingCircleSnapshot) {
    svc.handle(Command::RecordCountingCircleAudited { key: key(election), snapshot: s }).unwrap();
}
