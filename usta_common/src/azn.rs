use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const AZN_CURRENCY_CODE: &str = "AZN";
pub const QEPIK_PER_MANAT: i64 = 100;

//--------------------------------------        Azn          ---------------------------------------------------------
/// An amount of Azerbaijani manat, held as an integer number of qəpik (1/100 AZN).
///
/// Keeping the value integral means every commission, penalty and refund is exact to the cent and rounding only
/// happens at the explicit points where a rate is applied (see [`mul_div_round`]).
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Azn(i64);

op!(binary Azn, Add, add);
op!(binary Azn, Sub, sub);
op!(inplace Azn, AddAssign, add_assign);
op!(inplace Azn, SubAssign, sub_assign);
op!(unary Azn, Neg, neg);

impl Mul<i64> for Azn {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Sum for Azn {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl From<i64> for Azn {
    fn from(qepik: i64) -> Self {
        Self(qepik)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Value cannot be represented as an AZN amount: {0}")]
pub struct AznConversionError(String);

impl Display for Azn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per = QEPIK_PER_MANAT.unsigned_abs();
        write!(f, "{sign}{}.{:02} {AZN_CURRENCY_CODE}", abs / per, abs % per)
    }
}

/// Parses human input such as `50`, `49.9`, `49,90` or `120.5 AZN`. Negative amounts and more than two decimal
/// places are rejected rather than rounded.
impl FromStr for Azn {
    type Err = AznConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let trimmed = trimmed
            .strip_suffix(AZN_CURRENCY_CODE)
            .or_else(|| trimmed.strip_suffix("azn"))
            .unwrap_or(trimmed)
            .trim()
            .replace(',', ".");
        if trimmed.is_empty() {
            return Err(AznConversionError("empty amount".into()));
        }
        let (whole, frac) = match trimmed.split_once('.') {
            Some((w, f)) => (w, f),
            None => (trimmed.as_str(), ""),
        };
        let valid_digits = |v: &str| v.chars().all(|c| c.is_ascii_digit());
        if whole.is_empty() || !valid_digits(whole) || !valid_digits(frac) {
            return Err(AznConversionError(format!("'{s}' is not a number")));
        }
        if frac.len() > 2 {
            return Err(AznConversionError(format!("'{s}' has more than two decimal places")));
        }
        let manat = whole.parse::<i64>().map_err(|e| AznConversionError(format!("'{s}': {e}")))?;
        let qepik = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|e| AznConversionError(e.to_string()))? * 10,
            _ => frac.parse::<i64>().map_err(|e| AznConversionError(e.to_string()))?,
        };
        manat
            .checked_mul(QEPIK_PER_MANAT)
            .and_then(|v| v.checked_add(qepik))
            .map(Self)
            .ok_or_else(|| AznConversionError(format!("'{s}' is too large")))
    }
}

impl Azn {
    pub fn from_manat(manat: i64) -> Self {
        Self(manat * QEPIK_PER_MANAT)
    }

    pub fn from_qepik(qepik: i64) -> Self {
        Self(qepik)
    }

    /// The amount in qəpik
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Multiplies the amount by `numerator / denominator`, rounding half away from zero to the nearest qəpik.
    pub fn scale(&self, numerator: i64, denominator: i64) -> Self {
        Self(mul_div_round(self.0, numerator, denominator))
    }
}

/// Computes `value * numerator / denominator` in 128-bit space, rounding half away from zero.
///
/// All percentage and multiplier arithmetic in the marketplace goes through this one function so that commission
/// computed at price-set time and at receipt time can never disagree.
pub fn mul_div_round(value: i64, numerator: i64, denominator: i64) -> i64 {
    if denominator == 0 {
        return 0;
    }
    let product = i128::from(value) * i128::from(numerator);
    let den = i128::from(denominator);
    let negative = (product < 0) != (den < 0);
    let (p, d) = (product.abs(), den.abs());
    let rounded = (p + d / 2) / d;
    let signed = if negative { -rounded } else { rounded };
    #[allow(clippy::cast_possible_truncation)]
    let result = signed.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64;
    result
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(Azn::from_manat(50).to_string(), "50.00 AZN");
        assert_eq!(Azn::from_qepik(4405).to_string(), "44.05 AZN");
        assert_eq!(Azn::from_qepik(-5).to_string(), "-0.05 AZN");
    }

    #[test]
    fn parse() {
        assert_eq!("50".parse::<Azn>().unwrap(), Azn::from_manat(50));
        assert_eq!("49.9".parse::<Azn>().unwrap(), Azn::from_qepik(4990));
        assert_eq!("49,95".parse::<Azn>().unwrap(), Azn::from_qepik(4995));
        assert_eq!(" 120.5 AZN ".parse::<Azn>().unwrap(), Azn::from_qepik(12050));
        assert!("".parse::<Azn>().is_err());
        assert!("-5".parse::<Azn>().is_err());
        assert!("5.001".parse::<Azn>().is_err());
        assert!("abc".parse::<Azn>().is_err());
        assert!(".5".parse::<Azn>().is_err());
    }

    #[test]
    fn rounding() {
        assert_eq!(mul_div_round(5000, 1200, 10_000), 600);
        assert_eq!(mul_div_round(1, 1, 2), 1);
        assert_eq!(mul_div_round(-1, 1, 2), -1);
        assert_eq!(mul_div_round(333, 1, 3), 111);
        assert_eq!(mul_div_round(10, 1, 0), 0);
        assert_eq!(Azn::from_manat(50).scale(1500, 1000), Azn::from_manat(75));
    }

    #[test]
    fn serde_is_plain_integer() {
        let json = serde_json::to_string(&Azn::from_qepik(4400)).unwrap();
        assert_eq!(json, "4400");
    }
}
