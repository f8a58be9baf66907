//! Amounts and power-of-two denomination decomposition.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A non-negative credit amount in the wallet's configured unit.
///
/// Canonically a proof's amount is a power of two; `Amount` itself places
/// no such restriction so it can also represent sums (balances, targets).
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    /// The zero amount.
    pub const ZERO: Amount = Amount(0);

    /// Create an amount from a raw integer value.
    pub fn from_u64(value: u64) -> Self {
        Self(value)
    }

    /// The raw integer value.
    pub fn to_u64(self) -> u64 {
        self.0
    }

    /// Decompose into the greedy power-of-two sum `a = Σ 2^k_i`,
    /// largest denomination first.
    ///
    /// `Amount::from_u64(11).split() == [8, 2, 1]` (8+2+1=11).
    pub fn split(&self) -> Vec<Amount> {
        let value = self.0;
        (0_u32..64)
            .rev()
            .filter_map(|bit| {
                let denomination = 1_u64 << bit;
                ((value & denomination) == denomination).then_some(Amount(denomination))
            })
            .collect()
    }

    /// Checked addition, `None` on overflow.
    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    /// Checked subtraction, `None` on underflow.
    pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_sub(rhs.0).map(Amount)
    }

    /// Sum an iterator of amounts, failing on overflow rather than
    /// wrapping or panicking.
    pub fn try_sum<I: IntoIterator<Item = Amount>>(iter: I) -> Result<Amount, Error> {
        iter.into_iter()
            .try_fold(Amount::ZERO, |acc, a| acc.checked_add(a))
            .ok_or(Error::AmountOverflow)
    }

    /// `true` if this amount is a power of two (or zero).
    pub fn is_power_of_two(&self) -> bool {
        self.0 == 0 || self.0.is_power_of_two()
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Amount(value)
    }
}

impl From<Amount> for u64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Amount) {
        self.0 += rhs.0;
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Amount) -> Amount {
        Amount(self.0 - rhs.0)
    }
}

impl SubAssign for Amount {
    fn sub_assign(&mut self, rhs: Amount) {
        self.0 -= rhs.0;
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, |acc, a| acc + a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_matches_binary_decomposition() {
        assert_eq!(
            Amount::from_u64(11).split(),
            vec![Amount::from_u64(8), Amount::from_u64(2), Amount::from_u64(1)]
        );
        assert_eq!(Amount::from_u64(0).split(), Vec::<Amount>::new());
        assert_eq!(Amount::from_u64(1).split(), vec![Amount::from_u64(1)]);
        assert_eq!(
            Amount::from_u64(255).split(),
            vec![128, 64, 32, 16, 8, 4, 2, 1]
                .into_iter()
                .map(Amount::from_u64)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn split_round_trips_through_sum() {
        for value in [0_u64, 1, 2, 3, 15, 16, 17, 1000, 65535] {
            let amount = Amount::from_u64(value);
            let total: u64 = amount.split().into_iter().map(Amount::to_u64).sum();
            assert_eq!(total, value);
        }
    }

    #[test]
    fn checked_add_overflows() {
        let max = Amount::from_u64(u64::MAX);
        assert_eq!(max.checked_add(Amount::from_u64(1)), None);
    }

    #[test]
    fn is_power_of_two() {
        assert!(Amount::from_u64(8).is_power_of_two());
        assert!(!Amount::from_u64(7).is_power_of_two());
    }
}
