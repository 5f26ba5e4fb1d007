//! Double-proportional result: super-apportionment over columns, then the
//! biproportional sub-apportionment over the whole matrix.
//!
//! Contract:
//! - Super-apportionment weights are exact voter numbers; columns failing the
//!   quorum weigh zero and end with zero seats everywhere.
//! - A tie at the last super seat(s) stops the computation with every winner
//!   combination enumerated; the sub-apportionment waits for the lot decision.
//! - The sub-apportionment fixes row targets to the row mandates and column targets
//!   to the super result. More than one admissible boundary rounding opens a
//!   sub-apportionment lot decision.
//! - Once both phases are `Completed`: Σ column seats == Σ row seats == mandates.

use serde::{Deserialize, Serialize};
use tracing::debug;

use pr_core::ids::{ElectionId, ListId};
use pr_core::rounding::Ratio;
use pr_core::variables::{QuorumRule, SolverOptions};

use crate::allocation::biproportional::{solve, CellPos};
use crate::allocation::divisor::{apportion, DivisorMethod};
use crate::allocation::quorum::{evaluate_quorum, voter_numbers};
use crate::lot_decision::{
    combinations, contenders_of, select_decision, validate_entries, LotDecision, LotDecisionEntry,
    ResolveError,
};
use crate::matrix::{CellRef, ColumnKey, MatrixInput};
use crate::AllocError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApportionmentState {
    Unspecified,
    HasOpenLotDecision,
    Completed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpRow {
    pub election_id: ElectionId,
    pub number_of_mandates: u64,
    pub vote_count: u64,
    pub divisor: Option<Ratio>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpColumn {
    pub key: ColumnKey,
    pub list_ids: Vec<ListId>,
    pub vote_count: u64,
    pub voter_number: Ratio,
    pub quorum_reached: bool,
    /// Assured super-apportionment seats (contested seats excluded while open).
    pub super_apportionment_number_of_mandates: u64,
    pub super_apportionment_lot_decision_required: bool,
    pub sub_apportionment_number_of_mandates: u64,
    pub divisor: Option<Ratio>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpCell {
    pub list_id: Option<ListId>,
    pub vote_count: u64,
    /// Assured seats (contested seats excluded while a sub lot decision is open).
    pub number_of_mandates: u64,
    pub lot_decision_required: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperApportionment {
    pub state: ApportionmentState,
    /// Election key (divisor on the voter numbers).
    pub election_key: Option<Ratio>,
    pub number_of_mandates_for_lot_decision: u64,
    pub lot_decisions: Vec<LotDecision<ColumnKey>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubApportionment {
    pub state: ApportionmentState,
    pub number_of_mandates_for_lot_decision: u64,
    pub lot_decisions: Vec<LotDecision<CellRef>>,
    pub iterations: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoubleProportionalResult {
    pub number_of_mandates: u64,
    pub rows: Vec<DpRow>,
    pub columns: Vec<DpColumn>,
    /// `cells[row][column]`
    pub cells: Vec<Vec<DpCell>>,
    pub super_apportionment: SuperApportionment,
    pub sub_apportionment: SubApportionment,
}

impl DoubleProportionalResult {
    /// Run the quorum, the super-apportionment and, if it completes, the
    /// sub-apportionment.
    pub fn compute(input: &MatrixInput, quorum: &QuorumRule, opts: &SolverOptions) -> Result<Self, AllocError> {
        input.validate()?;
        let passed = evaluate_quorum(input, quorum)?;
        let vn = voter_numbers(input)?;
        let weights: Vec<Ratio> = vn
            .iter()
            .zip(&passed)
            .map(|(v, &ok)| if ok { *v } else { Ratio::ZERO })
            .collect();

        let total = input.number_of_mandates();
        let super_alloc = apportion(&weights, total, DivisorMethod::SainteLague)?;

        let mut result = DoubleProportionalResult {
            number_of_mandates: total,
            rows: input
                .rows
                .iter()
                .enumerate()
                .map(|(r, row)| DpRow {
                    election_id: row.election_id.clone(),
                    number_of_mandates: row.number_of_mandates,
                    vote_count: input.row_vote_count(r),
                    divisor: None,
                })
                .collect(),
            columns: input
                .columns
                .iter()
                .enumerate()
                .map(|(c, col)| DpColumn {
                    key: col.key.clone(),
                    list_ids: col.list_ids.clone(),
                    vote_count: input.column_vote_count(c),
                    voter_number: vn[c],
                    quorum_reached: passed[c],
                    super_apportionment_number_of_mandates: super_alloc.seats[c],
                    super_apportionment_lot_decision_required: false,
                    sub_apportionment_number_of_mandates: 0,
                    divisor: None,
                })
                .collect(),
            cells: input
                .cells
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|cell| DpCell {
                            list_id: cell.list_id.clone(),
                            vote_count: cell.vote_count,
                            number_of_mandates: 0,
                            lot_decision_required: false,
                        })
                        .collect()
                })
                .collect(),
            super_apportionment: SuperApportionment {
                state: ApportionmentState::Completed,
                election_key: super_alloc.divisor,
                number_of_mandates_for_lot_decision: 0,
                lot_decisions: Vec::new(),
            },
            sub_apportionment: SubApportionment {
                state: ApportionmentState::Unspecified,
                number_of_mandates_for_lot_decision: 0,
                lot_decisions: Vec::new(),
                iterations: 0,
            },
        };

        match super_alloc.tie {
            Some(tie) => {
                let decisions = combinations(tie.contenders.len(), tie.seats as usize, opts.max_lot_decision_variants)?
                    .into_iter()
                    .enumerate()
                    .map(|(i, winners)| LotDecision {
                        number: i as u32 + 1,
                        entries: tie
                            .contenders
                            .iter()
                            .enumerate()
                            .map(|(pos, &c)| LotDecisionEntry {
                                reference: result.columns[c].key.clone(),
                                winning: winners.contains(&pos),
                            })
                            .collect(),
                    })
                    .collect();
                for &c in &tie.contenders {
                    result.columns[c].super_apportionment_lot_decision_required = true;
                }
                result.super_apportionment.state = ApportionmentState::HasOpenLotDecision;
                result.super_apportionment.number_of_mandates_for_lot_decision = tie.seats;
                result.super_apportionment.lot_decisions = decisions;
                debug!(contenders = tie.contenders.len(), seats = tie.seats, "super-apportionment tie");
            }
            None => result.run_sub_apportionment(opts)?,
        }
        Ok(result)
    }

    pub fn is_fully_distributed(&self) -> bool {
        self.super_apportionment.state == ApportionmentState::Completed
            && self.sub_apportionment.state == ApportionmentState::Completed
    }

    pub fn has_open_lot_decision(&self) -> bool {
        self.super_apportionment.state == ApportionmentState::HasOpenLotDecision
            || self.sub_apportionment.state == ApportionmentState::HasOpenLotDecision
    }

    pub fn row_index(&self, election_id: &ElectionId) -> Option<usize> {
        self.rows.iter().position(|r| &r.election_id == election_id)
    }

    pub fn column_index(&self, key: &ColumnKey) -> Option<usize> {
        self.columns.iter().position(|c| &c.key == key)
    }

    /// Seats per list of one row (zero for lists in columns without seats).
    pub fn list_mandates(&self, election_id: &ElectionId) -> Option<Vec<(ListId, u64)>> {
        let r = self.row_index(election_id)?;
        Some(
            self.cells[r]
                .iter()
                .filter_map(|cell| cell.list_id.clone().map(|id| (id, cell.number_of_mandates)))
                .collect(),
        )
    }

    /// A list column and the union-list column that contains it cannot share a decision.
    fn mixes(&self, a: &ColumnKey, b: &ColumnKey) -> bool {
        match (a, b) {
            (ColumnKey::List(list), ColumnKey::UnionList(_)) => self
                .column_index(b)
                .map(|c| self.columns[c].list_ids.contains(list))
                .unwrap_or(false),
            _ => false,
        }
    }

    pub fn apply_super_apportionment_lot_decision(
        &self,
        number: u32,
        entries: &[LotDecisionEntry<ColumnKey>],
        opts: &SolverOptions,
    ) -> Result<Self, ResolveError> {
        if self.super_apportionment.state != ApportionmentState::HasOpenLotDecision {
            return Err(ResolveError::NotOpen);
        }
        let available = &self.super_apportionment.lot_decisions;
        validate_entries(entries, &contenders_of(available), |a, b| self.mixes(a, b))?;
        let decision = select_decision(
            available,
            number,
            entries,
            self.super_apportionment.number_of_mandates_for_lot_decision,
        )?;

        let mut next = self.clone();
        for key in decision.winners() {
            if let Some(c) = next.column_index(key) {
                next.columns[c].super_apportionment_number_of_mandates += 1;
            }
        }
        for col in &mut next.columns {
            col.super_apportionment_lot_decision_required = false;
        }
        next.super_apportionment.state = ApportionmentState::Completed;
        next.super_apportionment.number_of_mandates_for_lot_decision = 0;
        next.super_apportionment.lot_decisions.clear();
        next.run_sub_apportionment(opts)?;
        Ok(next)
    }

    pub fn apply_sub_apportionment_lot_decision(
        &self,
        number: u32,
        entries: &[LotDecisionEntry<CellRef>],
    ) -> Result<Self, ResolveError> {
        if self.sub_apportionment.state != ApportionmentState::HasOpenLotDecision {
            return Err(ResolveError::NotOpen);
        }
        let available = &self.sub_apportionment.lot_decisions;
        validate_entries(entries, &contenders_of(available), |_, _| false)?;
        let decision = select_decision(
            available,
            number,
            entries,
            self.sub_apportionment.number_of_mandates_for_lot_decision,
        )?;

        let mut next = self.clone();
        for cell in decision.winners() {
            if let (Some(r), Some(c)) = (next.row_index(&cell.election_id), next.column_index(&cell.column)) {
                next.cells[r][c].number_of_mandates += 1;
            }
        }
        for row in &mut next.cells {
            for cell in row {
                cell.lot_decision_required = false;
            }
        }
        next.sub_apportionment.state = ApportionmentState::Completed;
        next.sub_apportionment.number_of_mandates_for_lot_decision = 0;
        next.sub_apportionment.lot_decisions.clear();
        next.refresh_column_totals();
        Ok(next)
    }

    fn run_sub_apportionment(&mut self, opts: &SolverOptions) -> Result<(), AllocError> {
        let weights: Vec<Vec<u64>> = self
            .cells
            .iter()
            .map(|row| row.iter().map(|c| c.vote_count).collect())
            .collect();
        let row_targets: Vec<u64> = self.rows.iter().map(|r| r.number_of_mandates).collect();
        let column_targets: Vec<u64> = self
            .columns
            .iter()
            .map(|c| c.super_apportionment_number_of_mandates)
            .collect();

        let sol = solve(&weights, &row_targets, &column_targets, opts)?;
        for (row, d) in self.rows.iter_mut().zip(&sol.row_divisors) {
            row.divisor = *d;
        }
        for (col, e) in self.columns.iter_mut().zip(&sol.column_divisors) {
            col.divisor = *e;
        }
        self.sub_apportionment.iterations = sol.iterations;

        if sol.is_unique() {
            let seats = sol.seats_for(0);
            for (r, row) in self.cells.iter_mut().enumerate() {
                for (c, cell) in row.iter_mut().enumerate() {
                    cell.number_of_mandates = seats[r][c];
                }
            }
            self.sub_apportionment.state = ApportionmentState::Completed;
        } else {
            // Cells rounded up in every variant are settled; the rest are contested.
            let always: Vec<CellPos> = sol
                .boundary_cells
                .iter()
                .copied()
                .filter(|p| sol.variants.iter().all(|v| v.contains(p)))
                .collect();
            let contested: Vec<CellPos> = sol
                .boundary_cells
                .iter()
                .copied()
                .filter(|p| !always.contains(p) && sol.variants.iter().any(|v| v.contains(p)))
                .collect();

            for (r, row) in self.cells.iter_mut().enumerate() {
                for (c, cell) in row.iter_mut().enumerate() {
                    cell.number_of_mandates = sol.base_seats[r][c];
                }
            }
            for p in &always {
                self.cells[p.row][p.col].number_of_mandates += 1;
            }
            for p in &contested {
                self.cells[p.row][p.col].lot_decision_required = true;
            }

            let decisions = sol
                .variants
                .iter()
                .enumerate()
                .map(|(i, v)| LotDecision {
                    number: i as u32 + 1,
                    entries: contested
                        .iter()
                        .map(|p| LotDecisionEntry { reference: self.cell_ref(*p), winning: v.contains(p) })
                        .collect(),
                })
                .collect();
            let open = sol.variants[0].len().saturating_sub(always.len()) as u64;
            self.sub_apportionment.state = ApportionmentState::HasOpenLotDecision;
            self.sub_apportionment.number_of_mandates_for_lot_decision = open;
            self.sub_apportionment.lot_decisions = decisions;
            debug!(contested = contested.len(), seats = open, "sub-apportionment tie");
        }
        self.refresh_column_totals();
        Ok(())
    }

    fn cell_ref(&self, p: CellPos) -> CellRef {
        CellRef { election_id: self.rows[p.row].election_id.clone(), column: self.columns[p.col].key.clone() }
    }

    fn refresh_column_totals(&mut self) {
        for (c, col) in self.columns.iter_mut().enumerate() {
            col.sub_apportionment_number_of_mandates =
                self.cells.iter().map(|row| row[c].number_of_mandates).sum();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::{MatrixCell, MatrixColumn, MatrixRow};
    use crate::LotDecisionError;
    use pr_core::variables::Pct;

    fn union_matrix(mandates: &[u64], votes: &[&[u64]]) -> MatrixInput {
        let cols = votes[0].len();
        MatrixInput {
            rows: mandates
                .iter()
                .enumerate()
                .map(|(i, m)| MatrixRow { election_id: format!("e{i}").parse().unwrap(), number_of_mandates: *m })
                .collect(),
            columns: (0..cols)
                .map(|c| MatrixColumn {
                    key: ColumnKey::UnionList(format!("u{c}").parse().unwrap()),
                    list_ids: (0..mandates.len()).map(|r| format!("l{r}-{c}").parse().unwrap()).collect(),
                })
                .collect(),
            cells: votes
                .iter()
                .enumerate()
                .map(|(r, row)| {
                    row.iter()
                        .enumerate()
                        .map(|(c, &v)| MatrixCell { list_id: Some(format!("l{r}-{c}").parse().unwrap()), vote_count: v })
                        .collect()
                })
                .collect(),
        }
    }

    fn seats(res: &DoubleProportionalResult) -> Vec<Vec<u64>> {
        res.cells.iter().map(|r| r.iter().map(|c| c.number_of_mandates).collect()).collect()
    }

    fn uk(s: &str) -> ColumnKey {
        ColumnKey::UnionList(s.parse().unwrap())
    }

    #[test]
    fn completed_result_meets_both_margins() {
        let m = union_matrix(&[5, 3], &[&[4000, 2500, 1000], &[1200, 1800, 300]]);
        let res = DoubleProportionalResult::compute(&m, &QuorumRule::default(), &SolverOptions::default()).unwrap();
        assert!(res.is_fully_distributed());
        let s = seats(&res);
        let row_sums: Vec<u64> = s.iter().map(|r| r.iter().sum()).collect();
        assert_eq!(row_sums, vec![5, 3]);
        for (c, col) in res.columns.iter().enumerate() {
            let sum: u64 = s.iter().map(|r| r[c]).sum();
            assert_eq!(sum, col.super_apportionment_number_of_mandates);
            assert_eq!(sum, col.sub_apportionment_number_of_mandates);
        }
        let total: u64 = res.columns.iter().map(|c| c.sub_apportionment_number_of_mandates).sum();
        assert_eq!(total, 8);
    }

    #[test]
    fn filtered_column_gets_nothing_despite_more_raw_votes() {
        // u2 only runs in the large district: 700 raw votes but a voter number of
        // 35 out of 690, below 6%. u1 has 500 raw votes, mostly in the small
        // district, and passes with a voter number of 205.
        let m = union_matrix(&[20, 2], &[&[6000, 100, 700], &[300, 400, 0]]);
        let rule = QuorumRule { district_pct: None, total_pct: Some(Pct::new(6).unwrap()) };
        let res = DoubleProportionalResult::compute(&m, &rule, &SolverOptions::default()).unwrap();
        assert!(!res.columns[2].quorum_reached);
        assert!(res.columns[2].vote_count > res.columns[1].vote_count);
        assert!(res.columns[1].super_apportionment_number_of_mandates > 0);
        assert_eq!(res.columns[2].super_apportionment_number_of_mandates, 0);
        assert_eq!(res.columns[2].divisor, None);
        assert!(res.cells.iter().all(|row| row[2].number_of_mandates == 0));
    }

    #[test]
    fn super_tie_opens_lot_decision_then_resolves() {
        // Equal voter numbers at the only seat.
        let m = MatrixInput::single(
            "e".parse().unwrap(),
            1,
            &[("a".parse().unwrap(), 500), ("b".parse().unwrap(), 500), ("c".parse().unwrap(), 100)],
        );
        let res = DoubleProportionalResult::compute(&m, &QuorumRule::default(), &SolverOptions::default()).unwrap();
        assert_eq!(res.super_apportionment.state, ApportionmentState::HasOpenLotDecision);
        assert_eq!(res.super_apportionment.number_of_mandates_for_lot_decision, 1);
        assert_eq!(res.sub_apportionment.state, ApportionmentState::Unspecified);
        assert_eq!(res.super_apportionment.lot_decisions.len(), 2);

        let a = ColumnKey::List("a".parse().unwrap());
        let b = ColumnKey::List("b".parse().unwrap());
        let entries = vec![
            LotDecisionEntry { reference: a.clone(), winning: false },
            LotDecisionEntry { reference: b.clone(), winning: true },
        ];
        // Decision 1 gives the seat to `a`.
        assert_eq!(
            res.apply_super_apportionment_lot_decision(1, &entries, &SolverOptions::default()),
            Err(ResolveError::Invalid(LotDecisionError::EntriesDoNotMatch(1)))
        );
        let done = res
            .apply_super_apportionment_lot_decision(2, &entries, &SolverOptions::default())
            .unwrap();
        assert!(done.is_fully_distributed());
        assert_eq!(
            done.list_mandates(&"e".parse().unwrap()).unwrap(),
            vec![("a".parse().unwrap(), 0), ("b".parse().unwrap(), 1), ("c".parse().unwrap(), 0)]
        );
        assert_eq!(
            done.apply_super_apportionment_lot_decision(2, &entries, &SolverOptions::default()),
            Err(ResolveError::NotOpen)
        );
    }

    #[test]
    fn sub_tie_enumerates_cells() {
        let m = union_matrix(&[1, 1], &[&[100, 100], &[100, 100]]);
        let res = DoubleProportionalResult::compute(&m, &QuorumRule::default(), &SolverOptions::default()).unwrap();
        assert_eq!(res.super_apportionment.state, ApportionmentState::Completed);
        assert_eq!(res.sub_apportionment.state, ApportionmentState::HasOpenLotDecision);
        assert_eq!(res.sub_apportionment.number_of_mandates_for_lot_decision, 2);
        assert_eq!(res.sub_apportionment.lot_decisions.len(), 2);

        let decision = res.sub_apportionment.lot_decisions[1].clone();
        let done = res.apply_sub_apportionment_lot_decision(decision.number, &decision.entries).unwrap();
        assert!(done.is_fully_distributed());
        assert_eq!(seats(&done), vec![vec![0, 1], vec![1, 0]]);
        assert_eq!(done.columns[0].sub_apportionment_number_of_mandates, 1);
        assert_eq!(uk("u0"), done.columns[0].key);
    }
}
