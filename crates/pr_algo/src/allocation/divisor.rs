//! Divisor rounding primitive and 1-D highest-quotient apportionment.
//!
//! Contract:
//! - Standard rounding (Sainte-Laguë): nearest integer, `n + 1/2` rounds up and is
//!   reported as a boundary. Downward rounding (D'Hondt): floor, exact integers are
//!   the boundary.
//! - Seats are awarded one round at a time to the highest quotient `w / signpost(s)`.
//!   Equal quotients are awarded together; if they outnumber the remaining seats the
//!   apportionment stops with an open tie instead of picking a winner.
//! - Zero-weight entries never receive seats and never set the divisor.
//!
//! Determinism:
//! - Pure exact-rational arithmetic; scans run in slice order.

use core::cmp::Ordering;

use pr_core::rounding::{simplest_between, Ratio};

use crate::AllocError;

/// Divisor method: where the rounding signposts sit between integers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivisorMethod {
    /// Signposts at `s + 1/2` (standard rounding).
    SainteLague,
    /// Signposts at `s + 1` (downward rounding), used for Hagenbach-Bischoff.
    DHondt,
}

impl DivisorMethod {
    /// The quotient threshold at which an entry holding `seats` earns its next seat.
    pub fn signpost(self, seats: u64) -> Result<Ratio, AllocError> {
        let s = seats as i128;
        Ok(match self {
            DivisorMethod::SainteLague => Ratio::new(2 * s + 1, 2)?,
            DivisorMethod::DHondt => Ratio::from_int(s + 1),
        })
    }
}

/// Seat count for one quotient. `at_boundary` means the quotient sits exactly on a
/// signpost, so `seats` and `seats - 1` are both valid roundings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoundedSeats {
    pub seats: u64,
    pub at_boundary: bool,
}

#[inline]
fn to_seats(n: i128) -> u64 {
    u64::try_from(n.max(0)).unwrap_or(u64::MAX)
}

/// Standard rounding of a non-negative quotient; `n + 1/2` rounds up and is flagged.
pub fn round_standard(q: Ratio) -> RoundedSeats {
    let floor = q.floor();
    let frac = q.fract();
    // frac ? 1/2  <=>  num ? den - num  (no doubling, no overflow)
    match frac.num().cmp(&(frac.den() - frac.num())) {
        Ordering::Less => RoundedSeats { seats: to_seats(floor), at_boundary: false },
        Ordering::Equal => RoundedSeats { seats: to_seats(floor + 1), at_boundary: true },
        Ordering::Greater => RoundedSeats { seats: to_seats(floor + 1), at_boundary: false },
    }
}

/// Seats that rounding cannot settle: `seats` of them go to some of `contenders`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OpenTie {
    pub contenders: Vec<usize>,
    pub seats: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Apportionment {
    /// Assured seats; contested seats of an open tie are not included.
    pub seats: Vec<u64>,
    /// Divisor reproducing `seats` by rounding. On an open tie this is the tied
    /// quotient itself. `None` when nothing was allocated.
    pub divisor: Option<Ratio>,
    pub tie: Option<OpenTie>,
}

/// Apportion `house` seats to `weights` with the given divisor method.
///
/// Without a tie, the divisor is the simplest rational strictly between the best
/// unawarded quotient and the last awarded one, so no entry sits on a boundary.
pub fn apportion(weights: &[Ratio], house: u64, method: DivisorMethod) -> Result<Apportionment, AllocError> {
    let mut seats = vec![0u64; weights.len()];
    if house == 0 {
        return Ok(Apportionment { seats, divisor: None, tie: None });
    }

    let eligible: Vec<usize> = weights
        .iter()
        .enumerate()
        .filter(|(_, w)| w.is_positive())
        .map(|(i, _)| i)
        .collect();
    if eligible.is_empty() {
        return Err(AllocError::NoEligibleColumns { seats: house });
    }

    let mut remaining = house;
    loop {
        let (best, tied) = highest_quotient(weights, &seats, &eligible, method)?;
        let n = tied.len() as u64;
        if n > remaining {
            return Ok(Apportionment {
                seats,
                divisor: Some(best),
                tie: Some(OpenTie { contenders: tied, seats: remaining }),
            });
        }
        for &i in &tied {
            seats[i] += 1;
        }
        remaining -= n;
        if remaining == 0 {
            let (next, _) = highest_quotient(weights, &seats, &eligible, method)?;
            let divisor = simplest_between(next, best)?;
            return Ok(Apportionment { seats, divisor: Some(divisor), tie: None });
        }
    }
}

/// Max of `w / signpost(s)` over `eligible`, with every index reaching it (slice order).
fn highest_quotient(
    weights: &[Ratio],
    seats: &[u64],
    eligible: &[usize],
    method: DivisorMethod,
) -> Result<(Ratio, Vec<usize>), AllocError> {
    let mut best = Ratio::ZERO;
    let mut tied: Vec<usize> = Vec::new();
    for &i in eligible {
        let q = weights[i].checked_div(method.signpost(seats[i])?)?;
        match q.cmp(&best) {
            Ordering::Greater => {
                best = q;
                tied.clear();
                tied.push(i);
            }
            Ordering::Equal => tied.push(i),
            Ordering::Less => {}
        }
    }
    Ok((best, tied))
}
