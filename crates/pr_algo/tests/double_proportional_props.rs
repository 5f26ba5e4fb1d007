//! Properties of the full double proportional computation over random union matrices,
//! with any tie settled by its first available lot decision.

use proptest::prelude::*;

use pr_algo::matrix::{MatrixCell, MatrixColumn, MatrixRow};
use pr_algo::{ColumnKey, DoubleProportionalResult, MatrixInput};
use pr_core::variables::{QuorumRule, SolverOptions};

fn union_matrix(mandates: &[u64], votes: &[Vec<u64>]) -> MatrixInput {
    let cols = votes[0].len();
    MatrixInput {
        rows: mandates
            .iter()
            .enumerate()
            .map(|(r, m)| MatrixRow { election_id: format!("e{r}").parse().unwrap(), number_of_mandates: *m })
            .collect(),
        columns: (0..cols)
            .map(|c| MatrixColumn {
                key: ColumnKey::UnionList(format!("u{c}").parse().unwrap()),
                list_ids: (0..mandates.len()).map(|r| format!("l{r}{c}").parse().unwrap()).collect(),
            })
            .collect(),
        cells: votes
            .iter()
            .enumerate()
            .map(|(r, row)| {
                row.iter()
                    .enumerate()
                    .map(|(c, &v)| MatrixCell { list_id: Some(format!("l{r}{c}").parse().unwrap()), vote_count: v })
                    .collect()
            })
            .collect(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn distributed_results_respect_both_margins(
        votes in proptest::collection::vec(proptest::collection::vec(1u64..5_000, 3), 2..=3),
        mandates in proptest::collection::vec(1u64..6, 3),
    ) {
        let mandates = &mandates[..votes.len()];
        let input = union_matrix(mandates, &votes);
        let opts = SolverOptions::default();

        let first = DoubleProportionalResult::compute(&input, &QuorumRule::default(), &opts);
        let again = DoubleProportionalResult::compute(&input, &QuorumRule::default(), &opts);
        prop_assert_eq!(&first, &again);
        // Every weight is positive, so any marginals are reachable.
        prop_assert!(first.is_ok(), "computation failed: {:?}", first);
        let mut result = first.unwrap();

        // Settle any tie with its first available decision; margins must then hold.
        if let Some(d) = result.super_apportionment.lot_decisions.first().cloned() {
            let next = result.apply_super_apportionment_lot_decision(d.number, &d.entries, &opts);
            prop_assert!(next.is_ok(), "super decision failed: {:?}", next);
            result = next.unwrap();
        }
        if let Some(d) = result.sub_apportionment.lot_decisions.first().cloned() {
            let next = result.apply_sub_apportionment_lot_decision(d.number, &d.entries);
            prop_assert!(next.is_ok(), "sub decision failed: {:?}", next);
            result = next.unwrap();
        }
        prop_assert!(result.is_fully_distributed());

        let super_total: u64 = result.columns.iter().map(|c| c.super_apportionment_number_of_mandates).sum();
        prop_assert_eq!(super_total, input.number_of_mandates());
        for (r, row) in result.cells.iter().enumerate() {
            let seats: u64 = row.iter().map(|c| c.number_of_mandates).sum();
            prop_assert_eq!(seats, mandates[r]);
        }
        for (c, col) in result.columns.iter().enumerate() {
            let seats: u64 = result.cells.iter().map(|row| row[c].number_of_mandates).sum();
            prop_assert_eq!(seats, col.super_apportionment_number_of_mandates);
        }
    }
}
