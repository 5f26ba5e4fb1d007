//! Integer-first exact ratio type and helpers.
//!
//! Contract:
//! - `Ratio` is always normalized: `den > 0`, `gcd(|num|, den) == 1`.
//! - Comparison is exact and never overflows (continued-fraction walk in `u128`).
//! - Arithmetic is checked; leaving the `i128` range is `CoreError::Overflow`,
//!   never a silent wrap or a float fallback.
//!
//! Wire shape (serde): the string `"num/den"` (or `"num"` when `den == 1`).

use core::cmp::Ordering;
use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

/// Exact ratio with normalized sign and positive denominator.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct Ratio {
    num: i128,
    den: i128,
}

fn gcd_u128(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    if a == 0 { 1 } else { a }
}

#[inline]
fn gcd_i128(a: i128, b: i128) -> i128 {
    // Both operands come from normalized ratios, so the gcd fits back into i128.
    gcd_u128(a.unsigned_abs(), b.unsigned_abs()) as i128
}

impl Ratio {
    pub const ZERO: Ratio = Ratio { num: 0, den: 1 };
    pub const ONE: Ratio = Ratio { num: 1, den: 1 };

    pub fn new(num: i128, den: i128) -> Result<Self, CoreError> {
        if den == 0 {
            return Err(CoreError::InvalidRatio);
        }
        let (mut n, mut d) = (num, den);
        if d < 0 {
            n = n.checked_neg().ok_or(CoreError::Overflow)?;
            d = d.checked_neg().ok_or(CoreError::Overflow)?;
        }
        let g = gcd_u128(n.unsigned_abs(), d.unsigned_abs()) as i128;
        Ok(Ratio { num: n / g, den: d / g })
    }

    #[inline]
    pub const fn from_int(n: i128) -> Self {
        Ratio { num: n, den: 1 }
    }

    #[inline]
    pub fn num(&self) -> i128 { self.num }
    #[inline]
    pub fn den(&self) -> i128 { self.den }

    #[inline]
    pub fn is_zero(&self) -> bool { self.num == 0 }
    #[inline]
    pub fn is_positive(&self) -> bool { self.num > 0 }
    #[inline]
    pub fn is_negative(&self) -> bool { self.num < 0 }

    /// Largest integer `<= self`.
    #[inline]
    pub fn floor(&self) -> i128 {
        self.num.div_euclid(self.den)
    }

    /// `self - floor(self)`, always in `[0, 1)`.
    pub fn fract(&self) -> Ratio {
        let r = self.num.rem_euclid(self.den);
        if r == 0 { Ratio::ZERO } else { Ratio { num: r, den: self.den } }
    }

    pub fn checked_add(self, other: Ratio) -> Result<Ratio, CoreError> {
        let g = gcd_i128(self.den, other.den);
        let lhs_scale = other.den / g;
        let rhs_scale = self.den / g;
        let den = self.den.checked_mul(lhs_scale).ok_or(CoreError::Overflow)?;
        let a = self.num.checked_mul(lhs_scale).ok_or(CoreError::Overflow)?;
        let b = other.num.checked_mul(rhs_scale).ok_or(CoreError::Overflow)?;
        Ratio::new(a.checked_add(b).ok_or(CoreError::Overflow)?, den)
    }

    pub fn checked_sub(self, other: Ratio) -> Result<Ratio, CoreError> {
        let neg = Ratio { num: other.num.checked_neg().ok_or(CoreError::Overflow)?, den: other.den };
        self.checked_add(neg)
    }

    pub fn checked_mul(self, other: Ratio) -> Result<Ratio, CoreError> {
        // Cross-reduce first so intermediate products stay small.
        let g1 = gcd_i128(self.num, other.den);
        let g2 = gcd_i128(other.num, self.den);
        let num = (self.num / g1).checked_mul(other.num / g2).ok_or(CoreError::Overflow)?;
        let den = (self.den / g2).checked_mul(other.den / g1).ok_or(CoreError::Overflow)?;
        Ratio::new(num, den)
    }

    pub fn checked_div(self, other: Ratio) -> Result<Ratio, CoreError> {
        self.checked_mul(other.recip()?)
    }

    pub fn recip(self) -> Result<Ratio, CoreError> {
        Ratio::new(self.den, self.num)
    }
}

/// Compare `a/b` with `c/d` for non-negative numerators and positive denominators.
fn cmp_non_negative(mut a: u128, mut b: u128, mut c: u128, mut d: u128) -> Ordering {
    let mut flipped = false;
    loop {
        let (q1, r1) = (a / b, a % b);
        let (q2, r2) = (c / d, c % d);
        let ord = if q1 != q2 {
            Some(q1.cmp(&q2))
        } else {
            match (r1 == 0, r2 == 0) {
                (true, true) => Some(Ordering::Equal),
                (true, false) => Some(Ordering::Less),
                (false, true) => Some(Ordering::Greater),
                (false, false) => None,
            }
        };
        if let Some(o) = ord {
            return if flipped { o.reverse() } else { o };
        }
        // r1/b ? r2/d  <=>  d/r2 ? b/r1
        (a, b, c, d) = (b, r1, d, r2);
        flipped = !flipped;
    }
}

impl Ord for Ratio {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.num < 0, other.num < 0) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => cmp_non_negative(
                self.num.unsigned_abs(),
                self.den.unsigned_abs(),
                other.num.unsigned_abs(),
                other.den.unsigned_abs(),
            ),
            (true, true) => cmp_non_negative(
                other.num.unsigned_abs(),
                other.den.unsigned_abs(),
                self.num.unsigned_abs(),
                self.den.unsigned_abs(),
            ),
        }
    }
}

impl PartialOrd for Ratio {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<u64> for Ratio {
    fn from(v: u64) -> Self {
        Ratio::from_int(v as i128)
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

impl FromStr for Ratio {
    type Err = CoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |p: &str| p.trim().parse::<i128>().map_err(|_| CoreError::InvalidRatio);
        match s.split_once('/') {
            Some((n, d)) => Ratio::new(parse(n)?, parse(d)?),
            None => Ok(Ratio::from_int(parse(s)?)),
        }
    }
}

impl TryFrom<String> for Ratio {
    type Error = CoreError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Ratio> for String {
    fn from(r: Ratio) -> String {
        r.to_string()
    }
}

/// The rational with the smallest denominator strictly inside `(lo, hi)`;
/// among those, the smallest numerator. Requires `0 <= lo < hi`.
///
/// Used to pick a readable divisor from an interval of equally valid ones.
pub fn simplest_between(lo: Ratio, hi: Ratio) -> Result<Ratio, CoreError> {
    if lo.is_negative() || lo >= hi {
        return Err(CoreError::DomainOutOfRange("simplest_between"));
    }
    simplest_in_open(lo, Some(hi))
}

// `hi == None` stands for +infinity.
fn simplest_in_open(lo: Ratio, hi: Option<Ratio>) -> Result<Ratio, CoreError> {
    let k = lo.floor();
    let next = Ratio::from_int(k.checked_add(1).ok_or(CoreError::Overflow)?);
    let h = match hi {
        None => return Ok(next),
        Some(h) if next < h => return Ok(next),
        Some(h) => h,
    };

    // Both bounds sit in [k, k + 1]; recurse on the reciprocals of the fractional parts.
    let lo_f = lo.fract();
    let hi_f = h.checked_sub(Ratio::from_int(k))?;
    let inner_lo = hi_f.recip()?;
    let inner_hi = if lo_f.is_zero() { None } else { Some(lo_f.recip()?) };
    let y = simplest_in_open(inner_lo, inner_hi)?;
    Ratio::from_int(k).checked_add(y.recip()?)
}
