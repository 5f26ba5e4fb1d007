//! Biproportional matrix solver (alternating scaling).
//!
//! Contract:
//! - Input: weights `w[r][c]`, row targets `R[r]`, column targets `C[c]`, Σ R == Σ C.
//! - Output: divisors `d[r]`, `e[c]` such that standard rounding of
//!   `w[r][c] / (d[r] * e[c])` reproduces both marginals, allowing cells that sit
//!   exactly on a `n + 1/2` boundary to round either way.
//! - Rows/columns with a zero target are inactive: zero seats, no divisor.
//!   An active row/column without weight among active partners is a fault.
//! - Marginals no integer matrix with the input's zero pattern can meet are rejected
//!   up front (max-flow), before any divisor search.
//! - Every boundary assignment satisfying the marginals is enumerated (bounded);
//!   more than one means the apportionment needs a lot decision.
//! - Non-convergence within `max_iterations` is a fault, never retried.
//!
//! Determinism:
//! - Divisors are the simplest rationals inside each valid interval, so the same
//!   input always walks the same path to the same divisors.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use pr_core::rounding::Ratio;
use pr_core::variables::SolverOptions;

use crate::allocation::divisor::{apportion, round_standard, DivisorMethod};
use crate::{AllocError, Axis};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellPos {
    pub row: usize,
    pub col: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BiproportionalSolution {
    pub row_divisors: Vec<Option<Ratio>>,
    pub column_divisors: Vec<Option<Ratio>>,
    /// Seats with every boundary cell rounded down.
    pub base_seats: Vec<Vec<u64>>,
    /// Cells whose quotient sits exactly on a rounding boundary (row-major order).
    pub boundary_cells: Vec<CellPos>,
    /// Each variant lists the boundary cells rounded up; all satisfy both marginals.
    pub variants: Vec<Vec<CellPos>>,
    pub iterations: u32,
}

impl BiproportionalSolution {
    pub fn is_unique(&self) -> bool {
        self.variants.len() == 1
    }

    pub fn seats_for(&self, variant: usize) -> Vec<Vec<u64>> {
        let mut seats = self.base_seats.clone();
        if let Some(cells) = self.variants.get(variant) {
            for p in cells {
                seats[p.row][p.col] += 1;
            }
        }
        seats
    }
}

pub fn solve(
    weights: &[Vec<u64>],
    row_targets: &[u64],
    column_targets: &[u64],
    opts: &SolverOptions,
) -> Result<BiproportionalSolution, AllocError> {
    let rows = row_targets.len();
    let cols = column_targets.len();
    if weights.len() != rows || weights.iter().any(|w| w.len() != cols) {
        return Err(AllocError::DimensionMismatch);
    }
    let row_sum: u64 = row_targets.iter().sum();
    let col_sum: u64 = column_targets.iter().sum();
    if row_sum != col_sum {
        return Err(AllocError::MarginalsMismatch { rows: row_sum, columns: col_sum });
    }

    let row_active: Vec<bool> = row_targets.iter().map(|&t| t > 0).collect();
    let col_active: Vec<bool> = column_targets.iter().map(|&t| t > 0).collect();

    for r in (0..rows).filter(|&r| row_active[r]) {
        if (0..cols).all(|c| !col_active[c] || weights[r][c] == 0) {
            return Err(AllocError::ZeroWeightWithTarget { axis: Axis::Row, index: r });
        }
    }
    for c in (0..cols).filter(|&c| col_active[c]) {
        if (0..rows).all(|r| !row_active[r] || weights[r][c] == 0) {
            return Err(AllocError::ZeroWeightWithTarget { axis: Axis::Column, index: c });
        }
    }

    if !zero_pattern_admits(weights, row_targets, column_targets) {
        return Err(AllocError::InfeasibleMarginals);
    }

    let problem = Problem { weights, row_targets, column_targets, row_active, col_active };
    let mut row_div: Vec<Option<Ratio>> = vec![None; rows];
    let mut col_div: Vec<Option<Ratio>> =
        problem.col_active.iter().map(|&a| a.then_some(Ratio::ONE)).collect();

    for iteration in 1..=opts.max_iterations {
        // Row step: column divisors fixed.
        for r in (0..rows).filter(|&r| problem.row_active[r]) {
            let scaled = (0..cols)
                .map(|c| scaled_weight(weights[r][c], problem.col_active[c], col_div[c]))
                .collect::<Result<Vec<_>, _>>()?;
            row_div[r] = Some(step_divisor(&scaled, row_targets[r])?);
        }
        if let Some(sol) = problem.fit(&row_div, &col_div, iteration, opts)? {
            return Ok(sol);
        }

        // Column step: row divisors fixed.
        for c in (0..cols).filter(|&c| problem.col_active[c]) {
            let scaled = (0..rows)
                .map(|r| scaled_weight(weights[r][c], problem.row_active[r], row_div[r]))
                .collect::<Result<Vec<_>, _>>()?;
            col_div[c] = Some(step_divisor(&scaled, column_targets[c])?);
        }
        if let Some(sol) = problem.fit(&row_div, &col_div, iteration, opts)? {
            return Ok(sol);
        }

        debug!(iteration, "alternating scaling round left a margin unmet");
    }

    Err(AllocError::NotConverged { iterations: opts.max_iterations })
}

/// Max-flow from row targets to column targets over cells with positive weight.
/// A full flow means some non-negative integer matrix meets both marginals.
fn zero_pattern_admits(weights: &[Vec<u64>], row_targets: &[u64], column_targets: &[u64]) -> bool {
    let (rows, cols) = (row_targets.len(), column_targets.len());
    let n = rows + cols + 2;
    let (source, sink) = (0, n - 1);
    let mut cap = vec![vec![0u64; n]; n];
    for (r, &target) in row_targets.iter().enumerate() {
        cap[source][1 + r] = target;
        for c in 0..cols {
            if weights[r][c] > 0 {
                cap[1 + r][1 + rows + c] = u64::MAX;
            }
        }
    }
    for (c, &target) in column_targets.iter().enumerate() {
        cap[1 + rows + c][sink] = target;
    }

    let wanted: u64 = row_targets.iter().sum();
    let mut flow = 0u64;
    loop {
        let mut prev = vec![usize::MAX; n];
        prev[source] = source;
        let mut queue = VecDeque::from([source]);
        while let Some(u) = queue.pop_front() {
            for v in 0..n {
                if prev[v] == usize::MAX && cap[u][v] > 0 {
                    prev[v] = u;
                    queue.push_back(v);
                }
            }
        }
        if prev[sink] == usize::MAX {
            return flow == wanted;
        }

        let mut push = u64::MAX;
        let mut v = sink;
        while v != source {
            push = push.min(cap[prev[v]][v]);
            v = prev[v];
        }
        let mut v = sink;
        while v != source {
            let u = prev[v];
            cap[u][v] -= push;
            cap[v][u] = cap[v][u].saturating_add(push);
            v = u;
        }
        flow += push;
    }
}

struct Problem<'a> {
    weights: &'a [Vec<u64>],
    row_targets: &'a [u64],
    column_targets: &'a [u64],
    row_active: Vec<bool>,
    col_active: Vec<bool>,
}

fn scaled_weight(w: u64, active: bool, divisor: Option<Ratio>) -> Result<Ratio, AllocError> {
    match (active, divisor) {
        (true, Some(d)) if w > 0 => Ok(Ratio::from(w).checked_div(d)?),
        _ => Ok(Ratio::ZERO),
    }
}

fn step_divisor(scaled: &[Ratio], target: u64) -> Result<Ratio, AllocError> {
    apportion(scaled, target, DivisorMethod::SainteLague)?
        .divisor
        .ok_or(AllocError::NoEligibleColumns { seats: target })
}

impl Problem<'_> {
    /// Round with the current divisors; `Some` when both margins can be met.
    fn fit(
        &self,
        row_div: &[Option<Ratio>],
        col_div: &[Option<Ratio>],
        iteration: u32,
        opts: &SolverOptions,
    ) -> Result<Option<BiproportionalSolution>, AllocError> {
        let rows = self.row_targets.len();
        let cols = self.column_targets.len();
        let mut base = vec![vec![0u64; cols]; rows];
        let mut boundary: Vec<CellPos> = Vec::new();

        for r in 0..rows {
            for c in 0..cols {
                let w = self.weights[r][c];
                if w == 0 || !self.row_active[r] || !self.col_active[c] {
                    continue;
                }
                let (Some(d), Some(e)) = (row_div[r], col_div[c]) else {
                    return Ok(None);
                };
                let q = Ratio::from(w).checked_div(d.checked_mul(e)?)?;
                let rounded = round_standard(q);
                if rounded.at_boundary {
                    base[r][c] = rounded.seats - 1;
                    boundary.push(CellPos { row: r, col: c });
                } else {
                    base[r][c] = rounded.seats;
                }
            }
        }

        let Some(row_need) = margin_need(
            self.row_targets,
            (0..rows).map(|r| base[r].iter().sum()),
            (0..rows).map(|r| boundary.iter().filter(|p| p.row == r).count() as u64),
        ) else {
            return Ok(None);
        };
        let Some(col_need) = margin_need(
            self.column_targets,
            (0..cols).map(|c| base.iter().map(|row| row[c]).sum()),
            (0..cols).map(|c| boundary.iter().filter(|p| p.col == c).count() as u64),
        ) else {
            return Ok(None);
        };

        let variants = enumerate_variants(&boundary, row_need, col_need, rows, cols, opts.max_lot_decision_variants)?;
        if variants.is_empty() {
            return Ok(None);
        }

        debug!(iteration, boundary = boundary.len(), variants = variants.len(), "biproportional fit found");
        Ok(Some(BiproportionalSolution {
            row_divisors: row_div.to_vec(),
            column_divisors: col_div.to_vec(),
            base_seats: base,
            boundary_cells: boundary,
            variants,
            iterations: iteration,
        }))
    }
}

/// Seats still needed per margin from boundary cells; `None` if out of reach.
fn margin_need(
    targets: &[u64],
    base_sums: impl Iterator<Item = u64>,
    boundary_counts: impl Iterator<Item = u64>,
) -> Option<Vec<u64>> {
    targets
        .iter()
        .zip(base_sums.zip(boundary_counts))
        .map(|(&t, (lo, flex))| (lo <= t && t <= lo + flex).then(|| t - lo))
        .collect()
}

/// All subsets of `cells` that cover `row_need`/`col_need` exactly, in depth-first
/// order with "round up" explored before "round down".
fn enumerate_variants(
    cells: &[CellPos],
    row_need: Vec<u64>,
    col_need: Vec<u64>,
    rows: usize,
    cols: usize,
    limit: usize,
) -> Result<Vec<Vec<CellPos>>, AllocError> {
    let mut row_left = vec![0u64; rows];
    let mut col_left = vec![0u64; cols];
    for p in cells {
        row_left[p.row] += 1;
        col_left[p.col] += 1;
    }
    let mut search = VariantSearch {
        cells,
        row_need,
        col_need,
        row_left,
        col_left,
        chosen: Vec::new(),
        found: Vec::new(),
        limit,
    };
    search.descend(0)?;
    Ok(search.found)
}

struct VariantSearch<'a> {
    cells: &'a [CellPos],
    row_need: Vec<u64>,
    col_need: Vec<u64>,
    row_left: Vec<u64>,
    col_left: Vec<u64>,
    chosen: Vec<CellPos>,
    found: Vec<Vec<CellPos>>,
    limit: usize,
}

impl VariantSearch<'_> {
    fn descend(&mut self, idx: usize) -> Result<(), AllocError> {
        if idx == self.cells.len() {
            if self.row_need.iter().all(|&n| n == 0) && self.col_need.iter().all(|&n| n == 0) {
                if self.found.len() >= self.limit {
                    return Err(AllocError::TooManyVariants { limit: self.limit });
                }
                self.found.push(self.chosen.clone());
            }
            return Ok(());
        }

        let p = self.cells[idx];
        self.row_left[p.row] -= 1;
        self.col_left[p.col] -= 1;

        if self.row_need[p.row] > 0 && self.col_need[p.col] > 0 {
            self.row_need[p.row] -= 1;
            self.col_need[p.col] -= 1;
            self.chosen.push(p);
            let res = self.descend(idx + 1);
            self.chosen.pop();
            self.row_need[p.row] += 1;
            self.col_need[p.col] += 1;
            res?;
        }

        if self.row_need[p.row] <= self.row_left[p.row] && self.col_need[p.col] <= self.col_left[p.col] {
            self.descend(idx + 1)?;
        }

        self.row_left[p.row] += 1;
        self.col_left[p.col] += 1;
        Ok(())
    }
}
