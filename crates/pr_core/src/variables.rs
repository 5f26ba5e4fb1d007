//! variables.rs
//! Settings domains: mandate algorithm, quorum, result phase, contest settings,
//! solver bounds. Wire tokens are explicit; percentages are validated on deserialize.

#[cfg(feature = "serde")]
use serde::{de::Error as DeError, de::Unexpected, Deserialize, Deserializer, Serialize};

// ------------ Macros ------------

/// Define an enum with explicit wire tokens (serde derives remain feature-aware).
macro_rules! serde_enum {
    ($(#[$m:meta])* $name:ident => { $($variant:ident = $token:literal),+ $(,)? }) => {
        $(#[$m])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        pub enum $name {
            $(
                #[cfg_attr(feature = "serde", serde(rename = $token))]
                $variant,
            )+
        }

        impl $name {
            pub fn as_token(&self) -> &'static str {
                match self { $(Self::$variant => $token,)+ }
            }
            pub fn from_token(s: &str) -> Option<Self> {
                match s { $($token => Some(Self::$variant),)+ _ => None }
            }
        }
    };
}

// ------------ Newtypes with invariants ------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Pct(u8); // 0..=100

impl Pct {
    pub fn new(v: u8) -> Result<Self, String> {
        if v <= 100 { Ok(Self(v)) } else { Err(format!("pct out of range: {v}")) }
    }
    pub fn as_u8(self) -> u8 { self.0 }
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for Pct {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let v = u8::deserialize(d)?;
        if v <= 100 { Ok(Pct(v)) }
        else { Err(D::Error::invalid_value(Unexpected::Unsigned(v as u64), &"0..=100")) }
    }
}

// ------------ Canonical enums (wire tokens explicit) ------------

serde_enum!(
    /// How an election turns list votes into list mandates.
    MandateAlgorithm => {
        HagenbachBischoff        = "hagenbach_bischoff",
        DoubleProportionalSingle = "double_proportional_single",
        DoubleProportionalUnion  = "double_proportional_union"
    }
);

impl MandateAlgorithm {
    pub fn is_double_proportional(&self) -> bool {
        matches!(self, Self::DoubleProportionalSingle | Self::DoubleProportionalUnion)
    }
    /// Union algorithms are driven by the union aggregate, never per election.
    pub fn is_union(&self) -> bool {
        matches!(self, Self::DoubleProportionalUnion)
    }
}

serde_enum!(
    /// Testing and live results are separate logical end results of one election.
    ResultPhase => {
        Testing = "testing",
        Live    = "live"
    }
);

// ------------ Complex shapes ------------

/// A column passes if it reaches `district_pct` of the votes in at least one row,
/// OR `total_pct` of the total voter number. No threshold configured: everyone passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct QuorumRule {
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub district_pct: Option<Pct>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub total_pct: Option<Pct>,
}

impl QuorumRule {
    pub fn is_configured(&self) -> bool {
        self.district_pct.is_some() || self.total_pct.is_some()
    }
}

/// Jurisdiction-level switches for the contest the end results belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ContestSettings {
    /// Locked or archived contests reject every command.
    pub locked: bool,
    /// Manual finalize is disabled; end results finalize as soon as they can.
    pub end_result_finalize_disabled: bool,
    pub second_factor_required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SolverOptions {
    /// Alternating-scaling rounds (one row step + one column step each).
    pub max_iterations: u32,
    /// Upper bound on enumerated tie resolutions per apportionment phase.
    pub max_lot_decision_variants: usize,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self { max_iterations: 1000, max_lot_decision_variants: 1000 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_round_trip() {
        for a in [
            MandateAlgorithm::HagenbachBischoff,
            MandateAlgorithm::DoubleProportionalSingle,
            MandateAlgorithm::DoubleProportionalUnion,
        ] {
            assert_eq!(MandateAlgorithm::from_token(a.as_token()), Some(a));
        }
        assert_eq!(ResultPhase::from_token("live"), Some(ResultPhase::Live));
        assert_eq!(ResultPhase::from_token("final"), None);
        assert!(MandateAlgorithm::DoubleProportionalUnion.is_union());
        assert!(!MandateAlgorithm::HagenbachBischoff.is_double_proportional());
    }

    #[test]
    fn pct_bounds() {
        assert!(Pct::new(100).is_ok());
        assert!(Pct::new(101).is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn settings_default_missing_fields() {
        let s: ContestSettings = serde_json::from_str(r#"{"locked":true}"#).unwrap();
        assert!(s.locked);
        assert!(!s.second_factor_required);
        let q: QuorumRule = serde_json::from_str(r#"{"total_pct":3}"#).unwrap();
        assert_eq!(q.total_pct, Some(Pct::new(3).unwrap()));
        assert!(serde_json::from_str::<QuorumRule>(r#"{"district_pct":120}"#).is_err());
        let o: SolverOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(o, SolverOptions::default());
    }
}
