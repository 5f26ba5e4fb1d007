//! Lot decisions: enumeration of admissible tie resolutions and validation of
//! user-submitted ones.
//!
//! A lot decision names every contender of one tie with a winning flag. Available
//! decisions are numbered from 1 in enumeration order; a submission must reproduce
//! one of them exactly.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::AllocError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotDecisionEntry<R> {
    pub reference: R,
    pub winning: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotDecision<R> {
    pub number: u32,
    pub entries: Vec<LotDecisionEntry<R>>,
}

impl<R: Ord + Clone> LotDecision<R> {
    pub fn winners(&self) -> impl Iterator<Item = &R> {
        self.entries.iter().filter(|e| e.winning).map(|e| &e.reference)
    }

    /// Same references with the same flags, in any order.
    pub fn matches(&self, entries: &[LotDecisionEntry<R>]) -> bool {
        let mine: BTreeMap<&R, bool> = self.entries.iter().map(|e| (&e.reference, e.winning)).collect();
        let theirs: BTreeMap<&R, bool> = entries.iter().map(|e| (&e.reference, e.winning)).collect();
        mine == theirs && theirs.len() == entries.len()
    }
}

/// Caller-fixable problems with a submitted lot decision.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LotDecisionError {
    #[error("a lot decision needs at least 2 entries, got {count}")]
    TooFewEntries { count: usize },
    #[error("a lot decision needs at least one winning entry")]
    NoWinningEntry,
    #[error("duplicate lot decision entry {0}")]
    DuplicateEntry(String),
    #[error("lot decision mixes list {list} with its union list {union_list}")]
    MixedListAndUnionList { list: String, union_list: String },
    #[error("{0} is not contesting this lot decision")]
    UnknownEntry(String),
    #[error("lot decision must resolve the whole tie; {0} is missing")]
    MissingContender(String),
    #[error("lot decision number {0} does not exist")]
    NumberDoesNotExist(u32),
    #[error("lot decision must name {expected} winner(s), got {actual}")]
    WrongNumberOfWinners { expected: u64, actual: u64 },
    #[error("entries do not match lot decision number {0}")]
    EntriesDoNotMatch(u32),
}

/// Outcome of applying a decision to an apportionment phase or a list.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("no open lot decision")]
    NotOpen,
    #[error(transparent)]
    Invalid(#[from] LotDecisionError),
    #[error(transparent)]
    Fault(#[from] AllocError),
}

/// Structural checks shared by every kind of lot decision.
///
/// `mixes(a, b)` reports references that must not appear together (a list and the
/// union list containing it).
pub fn validate_entries<R, F>(
    entries: &[LotDecisionEntry<R>],
    contenders: &[R],
    mixes: F,
) -> Result<(), LotDecisionError>
where
    R: Ord + Display,
    F: Fn(&R, &R) -> bool,
{
    if entries.len() < 2 {
        return Err(LotDecisionError::TooFewEntries { count: entries.len() });
    }
    if !entries.iter().any(|e| e.winning) {
        return Err(LotDecisionError::NoWinningEntry);
    }

    let mut seen: BTreeSet<&R> = BTreeSet::new();
    for e in entries {
        if !seen.insert(&e.reference) {
            return Err(LotDecisionError::DuplicateEntry(e.reference.to_string()));
        }
    }

    for (i, a) in entries.iter().enumerate() {
        for b in &entries[i + 1..] {
            if mixes(&a.reference, &b.reference) {
                return Err(LotDecisionError::MixedListAndUnionList {
                    list: a.reference.to_string(),
                    union_list: b.reference.to_string(),
                });
            }
            if mixes(&b.reference, &a.reference) {
                return Err(LotDecisionError::MixedListAndUnionList {
                    list: b.reference.to_string(),
                    union_list: a.reference.to_string(),
                });
            }
        }
    }

    for e in entries {
        if !contenders.contains(&e.reference) {
            return Err(LotDecisionError::UnknownEntry(e.reference.to_string()));
        }
    }
    for c in contenders {
        if !seen.contains(c) {
            return Err(LotDecisionError::MissingContender(c.to_string()));
        }
    }
    Ok(())
}

/// Pick the available decision `number` and check the submission reproduces it.
pub fn select_decision<'a, R: Ord + Clone>(
    available: &'a [LotDecision<R>],
    number: u32,
    entries: &[LotDecisionEntry<R>],
    contested_seats: u64,
) -> Result<&'a LotDecision<R>, LotDecisionError> {
    let decision = available
        .iter()
        .find(|d| d.number == number)
        .ok_or(LotDecisionError::NumberDoesNotExist(number))?;
    let winners = entries.iter().filter(|e| e.winning).count() as u64;
    if winners != contested_seats {
        return Err(LotDecisionError::WrongNumberOfWinners { expected: contested_seats, actual: winners });
    }
    if !decision.matches(entries) {
        return Err(LotDecisionError::EntriesDoNotMatch(number));
    }
    Ok(decision)
}

/// References in enumeration order (every available decision lists the same ones).
pub fn contenders_of<R: Clone>(available: &[LotDecision<R>]) -> Vec<R> {
    available
        .first()
        .map(|d| d.entries.iter().map(|e| e.reference.clone()).collect())
        .unwrap_or_default()
}

/// All `k`-subsets of `0..n` in lexicographic order, bounded by `limit`.
pub fn combinations(n: usize, k: usize, limit: usize) -> Result<Vec<Vec<usize>>, AllocError> {
    if k > n {
        return Ok(Vec::new());
    }
    let mut count: u128 = 1;
    for i in 0..k {
        count = count * (n - i) as u128 / (i + 1) as u128;
        if count > limit as u128 {
            return Err(AllocError::TooManyVariants { limit });
        }
    }

    let mut out = Vec::with_capacity(count as usize);
    let mut idx: Vec<usize> = (0..k).collect();
    loop {
        out.push(idx.clone());
        // Advance the rightmost index that still has room.
        let mut i = k;
        loop {
            if i == 0 {
                return Ok(out);
            }
            i -= 1;
            if idx[i] < n - k + i {
                break;
            }
        }
        idx[i] += 1;
        for j in i + 1..k {
            idx[j] = idx[j - 1] + 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::ColumnKey;

    fn list(s: &str) -> ColumnKey {
        ColumnKey::List(s.parse().unwrap())
    }

    fn entry(r: ColumnKey, winning: bool) -> LotDecisionEntry<ColumnKey> {
        LotDecisionEntry { reference: r, winning }
    }

    fn no_mix(_: &ColumnKey, _: &ColumnKey) -> bool {
        false
    }

    #[test]
    fn single_entry_rejected() {
        let e = vec![entry(list("a"), true)];
        assert_eq!(
            validate_entries(&e, &[list("a"), list("b")], no_mix),
            Err(LotDecisionError::TooFewEntries { count: 1 })
        );
    }

    #[test]
    fn no_winner_rejected() {
        let e = vec![entry(list("a"), false), entry(list("b"), false)];
        assert_eq!(validate_entries(&e, &[list("a"), list("b")], no_mix), Err(LotDecisionError::NoWinningEntry));
    }

    #[test]
    fn duplicate_rejected() {
        let e = vec![entry(list("a"), true), entry(list("a"), false)];
        assert_eq!(
            validate_entries(&e, &[list("a"), list("b")], no_mix),
            Err(LotDecisionError::DuplicateEntry("list:a".into()))
        );
    }

    #[test]
    fn non_contender_rejected() {
        let e = vec![entry(list("a"), true), entry(list("z"), false)];
        assert_eq!(
            validate_entries(&e, &[list("a"), list("b")], no_mix),
            Err(LotDecisionError::UnknownEntry("list:z".into()))
        );
    }

    #[test]
    fn partial_resolution_rejected() {
        let e = vec![entry(list("a"), true), entry(list("b"), false)];
        assert_eq!(
            validate_entries(&e, &[list("a"), list("b"), list("c")], no_mix),
            Err(LotDecisionError::MissingContender("list:c".into()))
        );
    }

    #[test]
    fn mixing_list_with_its_union_rejected() {
        let u = ColumnKey::UnionList("u".parse().unwrap());
        let e = vec![entry(u.clone(), true), entry(list("a"), false)];
        let mixes = |a: &ColumnKey, b: &ColumnKey| matches!((a, b), (ColumnKey::List(_), ColumnKey::UnionList(_)));
        assert_eq!(
            validate_entries(&e, &[u, list("a")], mixes),
            Err(LotDecisionError::MixedListAndUnionList { list: "list:a".into(), union_list: "union_list:u".into() })
        );
    }

    #[test]
    fn select_checks_number_winners_and_shape() {
        let available = vec![
            LotDecision { number: 1, entries: vec![entry(list("a"), true), entry(list("b"), false)] },
            LotDecision { number: 2, entries: vec![entry(list("a"), false), entry(list("b"), true)] },
        ];
        let submitted = vec![entry(list("b"), true), entry(list("a"), false)];
        assert_eq!(select_decision(&available, 2, &submitted, 1).unwrap().number, 2);
        assert_eq!(select_decision(&available, 3, &submitted, 1), Err(LotDecisionError::NumberDoesNotExist(3)));
        assert_eq!(select_decision(&available, 1, &submitted, 1), Err(LotDecisionError::EntriesDoNotMatch(1)));
        let both = vec![entry(list("a"), true), entry(list("b"), true)];
        assert_eq!(
            select_decision(&available, 1, &both, 1),
            Err(LotDecisionError::WrongNumberOfWinners { expected: 1, actual: 2 })
        );
    }

    #[test]
    fn combinations_lexicographic() {
        assert_eq!(
            combinations(4, 2, 100).unwrap(),
            vec![vec![0, 1], vec![0, 2], vec![0, 3], vec![1, 2], vec![1, 3], vec![2, 3]]
        );
        assert_eq!(combinations(3, 0, 10).unwrap(), vec![Vec::<usize>::new()]);
        assert_eq!(combinations(40, 20, 1000), Err(AllocError::TooManyVariants { limit: 1000 }));
    }
}
