//! Quorum filter and voter numbers.
//!
//! Contract:
//! - Voter number of a column = Σ_r votes[r][c] / mandates[r], exact.
//! - A column passes if `100 * votes[r][c] >= district_pct * row_votes[r]` in some row,
//!   OR `100 * voter_number[c] >= total_pct * Σ voter_numbers`.
//! - No configured threshold: every column passes.
//! - Pure integers / exact ratios; cross-multiplied, no division in comparisons.

use pr_core::rounding::Ratio;
use pr_core::variables::QuorumRule;

use crate::matrix::MatrixInput;
use crate::AllocError;

/// Exact voter number per column. Rows without mandates contribute nothing.
pub fn voter_numbers(input: &MatrixInput) -> Result<Vec<Ratio>, AllocError> {
    let mut out = vec![Ratio::ZERO; input.columns.len()];
    for (row, cells) in input.rows.iter().zip(&input.cells) {
        if row.number_of_mandates == 0 {
            continue;
        }
        let mandates = Ratio::from(row.number_of_mandates);
        for (acc, cell) in out.iter_mut().zip(cells) {
            if cell.vote_count > 0 {
                *acc = acc.checked_add(Ratio::from(cell.vote_count).checked_div(mandates)?)?;
            }
        }
    }
    Ok(out)
}

/// One flag per column: `true` when the column takes part in the apportionment.
pub fn evaluate_quorum(input: &MatrixInput, rule: &QuorumRule) -> Result<Vec<bool>, AllocError> {
    input.validate()?;
    let n = input.columns.len();
    if !rule.is_configured() {
        return Ok(vec![true; n]);
    }

    let mut passed = vec![false; n];

    if let Some(pct) = rule.district_pct {
        let t = pct.as_u8() as u128;
        for (r, cells) in input.cells.iter().enumerate() {
            let row_total = input.row_vote_count(r) as u128;
            if row_total == 0 {
                continue;
            }
            for (c, cell) in cells.iter().enumerate() {
                let v = cell.vote_count as u128;
                if v > 0 && v * 100 >= t * row_total {
                    passed[c] = true;
                }
            }
        }
    }

    if let Some(pct) = rule.total_pct {
        let vn = voter_numbers(input)?;
        let mut total = Ratio::ZERO;
        for v in &vn {
            total = total.checked_add(*v)?;
        }
        let threshold = total.checked_mul(Ratio::from(pct.as_u8() as u64))?;
        for (c, v) in vn.iter().enumerate() {
            if v.is_positive() && v.checked_mul(Ratio::from(100u64))? >= threshold {
                passed[c] = true;
            }
        }
    }

    Ok(passed)
}
