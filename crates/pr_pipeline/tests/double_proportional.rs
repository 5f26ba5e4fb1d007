mod common;

use common::*;
use pr_algo::{ColumnKey, LotDecisionEntry};
use pr_core::ids::ResultDigest;
use pr_core::variables::{ContestSettings, MandateAlgorithm, ResultPhase};
use pr_pipeline::{Command, DpTarget, EndResultError, PreconditionError, StaleReason};

fn column(list: &str) -> ColumnKey {
    ColumnKey::List(list.parse().unwrap())
}

fn b_wins() -> Vec<LotDecisionEntry<ColumnKey>> {
    vec![
        LotDecisionEntry { reference: column("a"), winning: false },
        LotDecisionEntry { reference: column("b"), winning: true },
    ]
}

/// One seat, A and B with equal voter numbers: the super-apportionment stays open.
fn tied_single() -> Service {
    let mut svc = service(ContestSettings::default());
    define(
        &mut svc,
        election("gr", 1, MandateAlgorithm::DoubleProportionalSingle, 1, vec![list("a", &["a1"]), list("b", &["b1", "b2"])]),
    );
    audit(&mut svc, "gr", snapshot("cc1", &[("a", 100), ("b", 100)], &[("a1", 70), ("b1", 60), ("b2", 40)]));
    svc.handle(Command::StartMandateDistribution { key: key("gr") }).unwrap();
    svc
}

fn super_lot(number: u32, expected_basis: Option<ResultDigest>) -> Command {
    Command::ApplySuperApportionmentLotDecision {
        target: DpTarget::Election(key("gr")),
        number,
        entries: b_wins(),
        expected_basis,
    }
}

#[test]
fn super_apportionment_tie_blocks_until_decided() {
    let mut svc = tied_single();
    let view = svc.end_result(&key("gr")).unwrap();
    assert!(view.mandate_distribution_triggered);
    assert!(view.lists.iter().all(|l| l.number_of_mandates.is_none()));
    assert!(matches!(
        svc.handle(Command::Finalize { key: key("gr"), second_factor_transaction_id: None }),
        Err(EndResultError::Precondition(PreconditionError::NotFinalizable(_)))
    ));

    let open = svc.available_lot_decisions(&key("gr")).unwrap();
    assert_eq!(open.super_apportionment.len(), 2);
    assert_eq!(open.super_apportionment_number_of_mandates, 1);
    let basis = open.basis.clone().unwrap();

    // Decision 1 hands the seat to A; the submitted entries describe decision 2.
    assert!(matches!(svc.handle(super_lot(1, None)), Err(EndResultError::Validation(_))));

    svc.handle(super_lot(2, Some(basis))).unwrap();
    let dp = svc.double_proportional_result(&DpTarget::Election(key("gr"))).unwrap();
    assert!(dp.result.is_fully_distributed());

    let view = svc.end_result(&key("gr")).unwrap();
    assert_eq!(view.lists[0].number_of_mandates, Some(0));
    assert_eq!(view.lists[1].number_of_mandates, Some(1));
    assert_eq!(view.lists[1].candidates[0].candidate_id.as_str(), "b1");
    assert!(view.finalizable);

    assert!(matches!(
        svc.handle(super_lot(2, None)),
        Err(EndResultError::Precondition(PreconditionError::NoOpenLotDecision))
    ));
    svc.handle(Command::Finalize { key: key("gr"), second_factor_transaction_id: None }).unwrap();
}

#[test]
fn decision_on_another_basis_is_stale() {
    let mut svc = tied_single();
    let other: ResultDigest = "0".repeat(64).parse().unwrap();
    let err = svc.handle(super_lot(2, Some(other))).unwrap_err();
    assert!(matches!(err, EndResultError::Stale(StaleReason::BasisMismatch { .. })));
}

#[test]
fn reset_invalidates_the_result() {
    let mut svc = tied_single();
    let stored = svc
        .handle(Command::RecordCountingCircleReset { key: key("gr"), counting_circle_id: "cc1".parse().unwrap() })
        .unwrap();
    let names: Vec<&str> = stored.iter().map(|e| e.event.name()).collect();
    assert_eq!(
        names,
        vec!["counting_circle_reset", "double_proportional_result_invalidated", "mandate_distribution_reverted"]
    );

    let err = svc.handle(super_lot(2, None)).unwrap_err();
    assert!(matches!(err, EndResultError::Stale(StaleReason::ResultInvalidated)));
    assert!(svc.end_result(&key("gr")).unwrap().double_proportional_invalidated);

    // Recounted votes give a fresh result.
    audit(&mut svc, "gr", snapshot("cc1", &[("a", 100), ("b", 300)], &[]));
    svc.handle(Command::StartMandateDistribution { key: key("gr") }).unwrap();
    let view = svc.end_result(&key("gr")).unwrap();
    assert!(!view.double_proportional_invalidated);
    assert_eq!(view.lists[1].number_of_mandates, Some(1));
}

#[test]
fn hagenbach_bischoff_has_no_double_proportional_result() {
    let mut svc = service(ContestSettings::default());
    define(&mut svc, election("hb", 1, MandateAlgorithm::HagenbachBischoff, 1, vec![list("a", &["a1"])]));
    let err = svc
        .handle(Command::ApplySuperApportionmentLotDecision {
            target: DpTarget::Election(key("hb")),
            number: 1,
            entries: b_wins(),
            expected_basis: None,
        })
        .unwrap_err();
    assert!(matches!(err, EndResultError::Precondition(PreconditionError::NotDoubleProportional(_))));
}

// ----------------------------- Unions -----------------------------------------------

/// e1 (2 seats): A 1000, B 600. e2 (1 seat): A 200, B 600.
/// Voter numbers A 700, B 900 give A 1, B 2; the districts then split [[1,1],[0,1]].
fn cantonal_union() -> Service {
    let mut svc = service(ContestSettings::default());
    define(&mut svc, member("e1", "u", 2, vec![list("e1-a", &["a11", "a12"]), list("e1-b", &["b11", "b12"])]));
    define(&mut svc, member("e2", "u", 1, vec![list("e2-a", &["a21"]), list("e2-b", &["b21", "b22"])]));
    svc.handle(Command::DefineUnion {
        phase: ResultPhase::Live,
        union: union("u", &["e1", "e2"], &[("ua", &["e1-a", "e2-a"]), ("ub", &["e1-b", "e2-b"])]),
    })
    .unwrap();
    audit(
        &mut svc,
        "e1",
        snapshot("cc1", &[("e1-a", 1000), ("e1-b", 600)], &[("a11", 300), ("a12", 200), ("b11", 100), ("b12", 90)]),
    );
    svc
}

fn audit_e2(svc: &mut Service) {
    audit(svc, "e2", snapshot("cc2", &[("e2-a", 200), ("e2-b", 600)], &[("a21", 10), ("b21", 50), ("b22", 50)]));
}

#[test]
fn union_members_are_distributed_by_their_union() {
    let mut svc = cantonal_union();
    assert!(matches!(
        svc.handle(Command::StartMandateDistribution { key: key("e1") }),
        Err(EndResultError::Precondition(PreconditionError::UnionAlgorithm(_)))
    ));
    assert!(matches!(
        svc.handle(Command::StartUnionMandateDistribution { key: union_key("u") }),
        Err(EndResultError::Precondition(PreconditionError::NotAllCountingCirclesDone { done: 0, total: 1 }))
    ));

    audit_e2(&mut svc);
    let stored = svc.handle(Command::StartUnionMandateDistribution { key: union_key("u") }).unwrap();
    let names: Vec<&str> = stored.iter().map(|e| e.event.name()).collect();
    assert_eq!(
        names,
        vec!["union_mandate_distribution_started", "mandate_distribution_started", "mandate_distribution_started"]
    );

    let dp = svc.double_proportional_result(&DpTarget::Union(union_key("u"))).unwrap();
    let seats: Vec<Vec<u64>> =
        dp.result.cells.iter().map(|r| r.iter().map(|c| c.number_of_mandates).collect()).collect();
    assert_eq!(seats, vec![vec![1, 1], vec![0, 1]]);
    // Members read the same result.
    assert_eq!(svc.double_proportional_result(&DpTarget::Election(key("e2"))).unwrap(), dp);

    let e1 = svc.end_result(&key("e1")).unwrap();
    assert_eq!(e1.lists.iter().map(|l| l.number_of_mandates).collect::<Vec<_>>(), vec![Some(1), Some(1)]);
    assert!(e1.finalizable);

    let e2 = svc.end_result(&key("e2")).unwrap();
    assert_eq!(e2.lists.iter().map(|l| l.number_of_mandates).collect::<Vec<_>>(), vec![Some(0), Some(1)]);
    assert!(!e2.finalizable);
    assert_eq!(svc.available_lot_decisions(&key("e2")).unwrap().lists.len(), 1);

    svc.handle(Command::Finalize { key: key("e1"), second_factor_transaction_id: None }).unwrap();
    assert!(matches!(
        svc.handle(Command::RevertMandateDistribution { key: key("e1") }),
        Err(EndResultError::Precondition(PreconditionError::UnionAlgorithm(_)))
    ));
}

#[test]
fn reset_in_one_member_reverts_the_whole_union() {
    let mut svc = cantonal_union();
    audit_e2(&mut svc);
    svc.handle(Command::StartUnionMandateDistribution { key: union_key("u") }).unwrap();
    svc.handle(Command::Finalize { key: key("e1"), second_factor_transaction_id: None }).unwrap();

    let stored = svc
        .handle(Command::RecordCountingCircleReset { key: key("e2"), counting_circle_id: "cc2".parse().unwrap() })
        .unwrap();
    let names: Vec<&str> = stored.iter().map(|e| e.event.name()).collect();
    assert_eq!(
        names,
        vec![
            "counting_circle_reset",
            "mandate_distribution_reverted",
            "union_double_proportional_result_invalidated",
            "mandate_distribution_reverted",
        ]
    );

    for id in ["e1", "e2"] {
        let view = svc.end_result(&key(id)).unwrap();
        assert!(!view.mandate_distribution_triggered && !view.finalized, "{id} still distributed");
    }
    assert!(matches!(
        svc.double_proportional_result(&DpTarget::Union(union_key("u"))),
        Err(EndResultError::Stale(StaleReason::ResultInvalidated))
    ));
    assert!(matches!(
        svc.handle(Command::RevertUnionMandateDistribution { key: union_key("u") }),
        Err(EndResultError::Precondition(PreconditionError::NotTriggered))
    ));
}

#[test]
fn union_revert_reverts_every_member() {
    let mut svc = cantonal_union();
    audit_e2(&mut svc);
    svc.handle(Command::StartUnionMandateDistribution { key: union_key("u") }).unwrap();
    assert!(matches!(
        svc.handle(Command::StartUnionMandateDistribution { key: union_key("u") }),
        Err(EndResultError::Precondition(PreconditionError::AlreadyTriggered))
    ));

    let stored = svc.handle(Command::RevertUnionMandateDistribution { key: union_key("u") }).unwrap();
    assert_eq!(stored.len(), 3);
    assert!(!svc.end_result(&key("e1")).unwrap().mandate_distribution_triggered);
    assert!(!svc.end_result(&key("e2")).unwrap().mandate_distribution_triggered);

    svc.handle(Command::StartUnionMandateDistribution { key: union_key("u") }).unwrap();
    assert!(svc.end_result(&key("e2")).unwrap().mandate_distribution_triggered);
}

#[test]
fn union_definition_is_checked_against_members() {
    let mut svc = service(ContestSettings::default());
    define(&mut svc, member("e1", "u", 1, vec![list("e1-a", &["a11"]), list("e1-b", &["b11"])]));
    let err = svc
        .handle(Command::DefineUnion {
            phase: ResultPhase::Live,
            union: union("u", &["e1"], &[("ua", &["e1-a"])]),
        })
        .unwrap_err();
    assert!(matches!(err, EndResultError::Validation(_)));
}

/// Two identical districts with one seat each: which list wins where is a lot decision.
#[test]
fn union_sub_apportionment_tie_distributes_members_once_decided() {
    let mut svc = service(ContestSettings::default());
    define(&mut svc, member("e1", "u", 1, vec![list("e1-a", &["a11"]), list("e1-b", &["b11"])]));
    define(&mut svc, member("e2", "u", 1, vec![list("e2-a", &["a21"]), list("e2-b", &["b21"])]));
    svc.handle(Command::DefineUnion {
        phase: ResultPhase::Live,
        union: union("u", &["e1", "e2"], &[("ua", &["e1-a", "e2-a"]), ("ub", &["e1-b", "e2-b"])]),
    })
    .unwrap();
    audit(&mut svc, "e1", snapshot("cc1", &[("e1-a", 100), ("e1-b", 100)], &[]));
    audit(&mut svc, "e2", snapshot("cc2", &[("e2-a", 100), ("e2-b", 100)], &[]));

    let stored = svc.handle(Command::StartUnionMandateDistribution { key: union_key("u") }).unwrap();
    assert_eq!(stored.len(), 1);
    assert!(!svc.end_result(&key("e1")).unwrap().mandate_distribution_triggered);
    assert!(matches!(
        svc.handle(Command::Finalize { key: key("e1"), second_factor_transaction_id: None }),
        Err(EndResultError::Precondition(PreconditionError::NotTriggered))
    ));

    let open = svc.available_lot_decisions(&key("e1")).unwrap();
    assert_eq!(open.sub_apportionment.len(), 2);
    assert_eq!(open.sub_apportionment_number_of_mandates, 2);
    let decision = open.sub_apportionment[1].clone();

    let stored = svc
        .handle(Command::ApplySubApportionmentLotDecision {
            target: DpTarget::Union(union_key("u")),
            number: decision.number,
            entries: decision.entries,
            expected_basis: open.basis,
        })
        .unwrap();
    assert_eq!(stored.len(), 3);

    let e1 = svc.end_result(&key("e1")).unwrap();
    let e2 = svc.end_result(&key("e2")).unwrap();
    assert_eq!(e1.lists.iter().map(|l| l.number_of_mandates).collect::<Vec<_>>(), vec![Some(0), Some(1)]);
    assert_eq!(e2.lists.iter().map(|l| l.number_of_mandates).collect::<Vec<_>>(), vec![Some(1), Some(0)]);
    assert!(e1.finalizable && e2.finalizable);
}
