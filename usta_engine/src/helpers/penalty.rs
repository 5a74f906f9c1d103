//! Penalty arithmetic for the timeout escalations.
//!
//! The customer and artisan paths compound differently, so each has its own named constants:
//!
//! * customer, card receipt not accepted in time: `price × 1.5`
//! * artisan, cash commission not settled in time: `commission × 1.15 × 1.5`
//!
//! The artisan product is taken in one step (`× 1.725`) so there is only one rounding.
use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use usta_common::{mul_div_round, Azn};

const PER_MILLE: i64 = 1000;

pub const CUSTOMER_PENALTY_FACTOR: PenaltyFactor = PenaltyFactor(1500);
pub const ARTISAN_LATE_FACTOR: PenaltyFactor = PenaltyFactor(1150);
pub const ARTISAN_PENALTY_FACTOR: PenaltyFactor = PenaltyFactor(1500);

/// A multiplier held in thousandths, e.g. 1.15 is `PenaltyFactor(1150)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PenaltyFactor(i64);

impl PenaltyFactor {
    pub fn from_per_mille(per_mille: i64) -> Self {
        Self(per_mille)
    }

    pub fn per_mille(&self) -> i64 {
        self.0
    }

    pub fn apply(&self, amount: Azn) -> Azn {
        amount.scale(self.0, PER_MILLE)
    }

    /// The single factor equivalent to applying `self` then `other`, without intermediate rounding.
    pub fn compound(&self, other: PenaltyFactor) -> CompoundFactor {
        CompoundFactor { numerator: self.0 * other.0, denominator: PER_MILLE * PER_MILLE }
    }
}

impl Display for PenaltyFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "×{}.{:03}", self.0 / PER_MILLE, self.0 % PER_MILLE)
    }
}

/// Parses `1.5` or `1.15`. At most three decimals.
impl FromStr for PenaltyFactor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
        if whole.is_empty() || frac.len() > 3 || !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
            return Err(format!("'{s}' is not a valid multiplier"));
        }
        let whole = whole.parse::<i64>().map_err(|e| e.to_string())?;
        let frac = format!("{frac:0<3}").parse::<i64>().map_err(|e| e.to_string())?;
        whole
            .checked_mul(PER_MILLE)
            .and_then(|w| w.checked_add(frac))
            .map(Self)
            .ok_or_else(|| format!("'{s}' is too large for a multiplier"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompoundFactor {
    numerator: i64,
    denominator: i64,
}

impl CompoundFactor {
    pub fn apply(&self, amount: Azn) -> Azn {
        Azn::from_qepik(mul_div_round(amount.value(), self.numerator, self.denominator))
    }
}

/// What a customer owes after failing to get a card receipt accepted in time.
pub fn customer_penalty(price: Azn, factor: PenaltyFactor) -> Azn {
    factor.apply(price)
}

/// What an artisan owes after failing to settle the commission for a cash order in time.
pub fn artisan_penalty(commission: Azn, late: PenaltyFactor, penalty: PenaltyFactor) -> Azn {
    late.compound(penalty).apply(commission)
}
