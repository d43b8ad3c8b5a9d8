//! Fixed-point monetary amounts.

use serde::{Deserialize, Serialize};

use crate::value_object::ValueObject;

/// Minor units per major unit (cents per peso/dollar).
pub const MINOR_PER_MAJOR: i64 = 100;

/// Signed amount in the smallest currency unit (e.g. cents).
///
/// Positive values are inflows to the drawer, negative values outflows.
///
/// No arithmetic operators: every combination goes through a `checked_*`
/// method and the caller decides what overflow means.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl ValueObject for Money {}

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Saturates at the `i64` bounds rather than overflowing.
    pub const fn from_major(major: i64) -> Self {
        Self(major.saturating_mul(MINOR_PER_MAJOR))
    }

    pub const fn minor_units(self) -> i64 {
        self.0
    }

    /// `None` for `i64::MIN`, whose magnitude is not representable.
    pub const fn checked_abs(self) -> Option<Self> {
        match self.0.checked_abs() {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    pub const fn checked_neg(self) -> Option<Self> {
        match self.0.checked_neg() {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    pub const fn checked_add(self, rhs: Money) -> Option<Self> {
        match self.0.checked_add(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    pub const fn checked_sub(self, rhs: Money) -> Option<Self> {
        match self.0.checked_sub(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    pub const fn checked_mul(self, factor: i64) -> Option<Self> {
        match self.0.checked_mul(factor) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Sum of all amounts, or `None` as soon as a partial sum overflows.
    pub fn checked_sum<I>(amounts: I) -> Option<Self>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |acc, m| acc.checked_add(m))
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Divide evenly across `parts`, rounding half away from zero.
    ///
    /// Returns zero when `parts` is zero.
    pub fn average_over(self, parts: u64) -> Self {
        if parts == 0 {
            return Self::ZERO;
        }
        let parts = parts as i128;
        let total = self.0 as i128;
        let half = parts / 2;
        let rounded = if total >= 0 {
            (total + half) / parts
        } else {
            (total - half) / parts
        };
        Self(rounded as i64)
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per = MINOR_PER_MAJOR as u64;
        write!(f, "{sign}{}.{:02}", abs / per, abs % per)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_two_decimals_with_sign() {
        assert_eq!(Money::from_minor(14_000).to_string(), "140.00");
        assert_eq!(Money::from_minor(-500).to_string(), "-5.00");
        assert_eq!(Money::from_minor(7_550).to_string(), "75.50");
        assert_eq!(Money::from_minor(-5).to_string(), "-0.05");
    }

    #[test]
    fn average_rounds_half_away_from_zero() {
        assert_eq!(Money::from_major(100).average_over(2), Money::from_major(50));
        assert_eq!(Money::from_minor(5).average_over(2), Money::from_minor(3));
        assert_eq!(Money::from_minor(-5).average_over(2), Money::from_minor(-3));
        assert_eq!(Money::from_major(10).average_over(0), Money::ZERO);
    }

    #[test]
    fn checked_sum_adds_signed_amounts() {
        let amounts = [Money::from_major(1), Money::from_major(2), Money::from_minor(-50)];
        assert_eq!(Money::checked_sum(amounts), Some(Money::from_minor(250)));
        assert_eq!(Money::checked_sum([]), Some(Money::ZERO));
    }

    #[test]
    fn overflow_is_reported_not_wrapped() {
        let max = Money::from_minor(i64::MAX);
        let min = Money::from_minor(i64::MIN);

        assert_eq!(max.checked_add(Money::from_minor(1)), None);
        assert_eq!(min.checked_sub(Money::from_minor(1)), None);
        assert_eq!(min.checked_abs(), None);
        assert_eq!(min.checked_neg(), None);
        assert_eq!(max.checked_mul(2), None);
        assert_eq!(Money::checked_sum([max, Money::from_minor(1)]), None);
        assert_eq!(Money::from_minor(-7).checked_abs(), Some(Money::from_minor(7)));
    }

    #[test]
    fn from_major_saturates() {
        assert_eq!(Money::from_major(i64::MAX), Money::from_minor(i64::MAX));
        assert_eq!(Money::from_major(3), Money::from_minor(300));
    }
}
