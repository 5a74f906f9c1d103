//! Tiered platform commission.
//!
//! A schedule is an ordered list of `{threshold, rate}` tiers. The first tier whose threshold is at or above the price
//! sets the rate. Tiers are scanned in the order they were declared, which is why [`CommissionSchedule::new`] refuses
//! schedules whose thresholds are not ascending. Prices above every threshold use the fallback rate.
use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use usta_common::{helpers::parse_pairs, mul_div_round, Azn};

/// Basis points in one percent
const BPS_PER_PERCENT: i64 = 100;
const MAX_RATE_BPS: i64 = 100 * BPS_PER_PERCENT;
/// Applied when a price exceeds the threshold of every tier: 10%.
pub const DEFAULT_FALLBACK_RATE: CommissionRate = CommissionRate(10 * BPS_PER_PERCENT);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommissionScheduleError {
    #[error("Commission rate {0} is outside 0-100%")]
    RateOutOfRange(String),
    #[error("Tier thresholds must be ascending, but {next} follows {prev}")]
    ThresholdsNotAscending { prev: Azn, next: Azn },
    #[error("Invalid commission schedule: {0}")]
    Malformed(String),
}

/// A commission rate, held in basis points (1/100 of a percent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommissionRate(i64);

impl CommissionRate {
    pub fn from_percent(percent: i64) -> Result<Self, CommissionScheduleError> {
        Self::from_bps(percent * BPS_PER_PERCENT)
    }

    pub fn from_bps(bps: i64) -> Result<Self, CommissionScheduleError> {
        if (0..=MAX_RATE_BPS).contains(&bps) {
            Ok(Self(bps))
        } else {
            Err(CommissionScheduleError::RateOutOfRange(format!("{bps}bps")))
        }
    }

    pub fn bps(&self) -> i64 {
        self.0
    }

    /// `amount * rate`, rounded half away from zero to the nearest qəpik.
    pub fn apply(&self, amount: Azn) -> Azn {
        Azn::from_qepik(mul_div_round(amount.value(), self.0, MAX_RATE_BPS))
    }
}

impl Display for CommissionRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (whole, frac) = (self.0 / BPS_PER_PERCENT, self.0 % BPS_PER_PERCENT);
        if frac == 0 {
            write!(f, "{whole}%")
        } else {
            write!(f, "{whole}.{frac:02}%")
        }
    }
}

/// Parses a percentage such as `12`, `7.5` or `12%`.
impl FromStr for CommissionRate {
    type Err = CommissionScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().trim_end_matches('%');
        // A percentage has the same shape as a money amount with two decimals, so reuse that parser
        let as_hundredths =
            s.parse::<Azn>().map_err(|e| CommissionScheduleError::RateOutOfRange(format!("{s}: {e}")))?;
        Self::from_bps(as_hundredths.value())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionTier {
    pub threshold: Azn,
    pub rate: CommissionRate,
}

impl CommissionTier {
    pub fn new(threshold: Azn, rate: CommissionRate) -> Self {
        Self { threshold, rate }
    }
}

/// The result of splitting a price between the platform and the artisan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commission {
    pub amount: Azn,
    pub rate: CommissionRate,
    pub admin_fee: Azn,
    pub artisan_amount: Azn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionSchedule {
    tiers: Vec<CommissionTier>,
    fallback: CommissionRate,
}

impl Default for CommissionSchedule {
    /// 12% up to 100 AZN, 8% up to 9999 AZN, 10% above that.
    fn default() -> Self {
        Self {
            tiers: vec![
                CommissionTier::new(Azn::from_manat(100), CommissionRate(12 * BPS_PER_PERCENT)),
                CommissionTier::new(Azn::from_manat(9999), CommissionRate(8 * BPS_PER_PERCENT)),
            ],
            fallback: DEFAULT_FALLBACK_RATE,
        }
    }
}

impl CommissionSchedule {
    pub fn new(tiers: Vec<CommissionTier>, fallback: CommissionRate) -> Result<Self, CommissionScheduleError> {
        for pair in tiers.windows(2) {
            if pair[1].threshold <= pair[0].threshold {
                return Err(CommissionScheduleError::ThresholdsNotAscending {
                    prev: pair[0].threshold,
                    next: pair[1].threshold,
                });
            }
        }
        Ok(Self { tiers, fallback })
    }

    /// Parses `"100:12,9999:8"`: thresholds in AZN, rates in percent.
    pub fn parse(tiers: &str, fallback: CommissionRate) -> Result<Self, CommissionScheduleError> {
        let pairs = parse_pairs::<Azn, CommissionRate>(tiers).map_err(CommissionScheduleError::Malformed)?;
        let tiers = pairs.into_iter().map(|(threshold, rate)| CommissionTier::new(threshold, rate)).collect();
        Self::new(tiers, fallback)
    }

    pub fn tiers(&self) -> &[CommissionTier] {
        &self.tiers
    }

    pub fn fallback(&self) -> CommissionRate {
        self.fallback
    }

    pub fn rate_for(&self, price: Azn) -> CommissionRate {
        self.tiers.iter().find(|t| t.threshold >= price).map(|t| t.rate).unwrap_or(self.fallback)
    }

    /// Splits `price` into the platform fee and the artisan's share. The two parts always sum to the price exactly,
    /// since the artisan amount is derived by subtraction.
    pub fn compute_commission(&self, price: Azn) -> Commission {
        let rate = self.rate_for(price);
        let admin_fee = rate.apply(price);
        Commission { amount: price, rate, admin_fee, artisan_amount: price - admin_fee }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fifty_manat_at_twelve_percent() {
        let c = CommissionSchedule::default().compute_commission(Azn::from_manat(50));
        assert_eq!(c.admin_fee, Azn::from_manat(6));
        assert_eq!(c.artisan_amount, Azn::from_manat(44));
        assert_eq!(c.rate.to_string(), "12%");
    }

    #[test]
    fn tier_boundaries_are_inclusive() {
        let s = CommissionSchedule::default();
        assert_eq!(s.rate_for(Azn::from_manat(100)).bps(), 1200);
        assert_eq!(s.rate_for(Azn::from_qepik(10_001)).bps(), 800);
        assert_eq!(s.rate_for(Azn::from_manat(9999)).bps(), 800);
        assert_eq!(s.rate_for(Azn::from_qepik(999_901)), DEFAULT_FALLBACK_RATE);
    }

    #[test]
    fn parts_always_sum_to_price() {
        let s = CommissionSchedule::parse("10:7.5,100:12.25", CommissionRate::from_percent(9).unwrap()).unwrap();
        for qepik in [1, 3, 33, 999, 1001, 4_999, 10_000, 12_345, 77_777, 1_000_003] {
            let price = Azn::from_qepik(qepik);
            let c = s.compute_commission(price);
            assert_eq!(c.admin_fee + c.artisan_amount, price, "at {price}");
            assert!(!c.admin_fee.value().is_negative());
        }
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        // 12% of 0.04 = 0.0048 -> 0.00; 12% of 0.05 = 0.006 -> 0.01
        let s = CommissionSchedule::default();
        assert_eq!(s.compute_commission(Azn::from_qepik(4)).admin_fee, Azn::from_qepik(0));
        assert_eq!(s.compute_commission(Azn::from_qepik(5)).admin_fee, Azn::from_qepik(1));
    }

    #[test]
    fn misordered_tiers_are_a_config_error() {
        let err = CommissionSchedule::parse("9999:8,100:12", DEFAULT_FALLBACK_RATE).unwrap_err();
        assert!(matches!(err, CommissionScheduleError::ThresholdsNotAscending { .. }));
        assert!(CommissionSchedule::parse("100:120", DEFAULT_FALLBACK_RATE).is_err());
        assert!(CommissionSchedule::parse("100", DEFAULT_FALLBACK_RATE).is_err());
    }
}
