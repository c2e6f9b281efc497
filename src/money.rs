//! Fixed-point currency amounts.
//!
//! Stored records carry amounts as JSON numbers with two fraction digits.
//! They are decoded once into whole minor units (cents) so every sum in the
//! crate is an integer sum and two reports over the same orders print the
//! same figures.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A currency amount in minor units (cents).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Convert a major-unit amount, rounding half away from zero to the
    /// nearest cent. Returns `None` for NaN or infinite input.
    pub fn from_major(amount: f64) -> Option<Self> {
        if !amount.is_finite() {
            return None;
        }
        let cents = (amount * 100.0).round();
        if cents.abs() > i64::MAX as f64 {
            return None;
        }
        Some(Money(cents as i64))
    }

    pub fn to_major(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Divide by a count, rounding half away from zero. Zero for `n == 0`.
    pub fn div_round(self, n: u64) -> Money {
        if n == 0 {
            return Money::ZERO;
        }
        let n = i128::from(n);
        let v = i128::from(self.0);
        let q = (v.abs() * 2 + n) / (n * 2);
        let q = if v < 0 { -q } else { q };
        Money(q as i64)
    }

    /// `self * quantity`, used to check line totals against unit prices.
    pub fn times(self, quantity: u32) -> Money {
        Money(self.0.saturating_mul(i64::from(quantity)))
    }

    /// `self / whole * 100`, one fraction digit. `0.0` when `whole` is zero.
    pub fn percent_of(self, whole: Money) -> f64 {
        if whole.0 == 0 {
            return 0.0;
        }
        let tenths = (i128::from(self.0) * 1000 * 2 + i128::from(whole.0)) / (i128::from(whole.0) * 2);
        tenths as f64 / 10.0
    }

    pub fn abs(self) -> Money {
        Money(self.0.abs())
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        f.pad(&format!("{sign}{}.{:02}", abs / 100, abs % 100))
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.copied().sum()
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_major())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MoneyVisitor)
    }
}

struct MoneyVisitor;

impl<'de> Visitor<'de> for MoneyVisitor {
    type Value = Money;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a currency amount as a number or numeric string")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Money, E> {
        v.checked_mul(100)
            .map(Money)
            .ok_or_else(|| E::custom("amount out of range"))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Money, E> {
        i64::try_from(v)
            .ok()
            .and_then(|v| v.checked_mul(100))
            .map(Money)
            .ok_or_else(|| E::custom("amount out of range"))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Money, E> {
        Money::from_major(v).ok_or_else(|| E::custom("amount is not finite"))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Money, E> {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            return Ok(Money::ZERO);
        }
        trimmed
            .parse::<f64>()
            .ok()
            .and_then(Money::from_major)
            .ok_or_else(|| E::custom(format!("invalid amount: {v:?}")))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Money, E> {
        Ok(Money::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_major_rounds_to_cents() {
        assert_eq!(Money::from_major(10.0), Some(Money::from_cents(1000)));
        assert_eq!(Money::from_major(0.1 + 0.2), Some(Money::from_cents(30)));
        assert_eq!(Money::from_major(-1.005), Some(Money::from_cents(-100)));
        assert_eq!(Money::from_major(f64::NAN), None);
    }

    #[test]
    fn test_display_two_fraction_digits() {
        assert_eq!(Money::from_cents(17500).to_string(), "175.00");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-250).to_string(), "-2.50");
        assert_eq!(format!("{:>8}", Money::from_cents(1999)), "   19.99");
    }

    #[test]
    fn test_div_round_half_away_from_zero() {
        assert_eq!(Money::from_cents(1000).div_round(3), Money::from_cents(333));
        assert_eq!(Money::from_cents(1001).div_round(2), Money::from_cents(501));
        assert_eq!(Money::from_cents(-1001).div_round(2), Money::from_cents(-501));
        assert_eq!(Money::from_cents(1000).div_round(0), Money::ZERO);
    }

    #[test]
    fn test_percent_of() {
        let part = Money::from_cents(12500);
        let whole = Money::from_cents(17500);
        assert_eq!(part.percent_of(whole), 71.4);
        assert_eq!(part.percent_of(Money::ZERO), 0.0);
    }

    #[test]
    fn test_deserialize_numbers_and_strings() {
        let v: Vec<Money> = serde_json::from_str(r#"[12, 12.5, "7.25", "", null]"#).unwrap();
        assert_eq!(
            v,
            vec![
                Money::from_cents(1200),
                Money::from_cents(1250),
                Money::from_cents(725),
                Money::ZERO,
                Money::ZERO,
            ]
        );
        assert!(serde_json::from_str::<Money>(r#""abc""#).is_err());
    }

    #[test]
    fn test_sum_of_many_small_amounts_has_no_drift() {
        let amounts: Vec<Money> = (0..200).map(|_| Money::from_major(0.1).unwrap()).collect();
        let total: Money = amounts.iter().sum();
        assert_eq!(total, Money::from_cents(2000));
        assert_eq!(total.to_string(), "20.00");
    }
}
