//! Arbitrary-precision monetary amounts.
//!
//! Every quantity that participates in a journal balance check is a `Money`
//! value: a [`rust_decimal::Decimal`] tagged with its [`Currency`]. Amounts
//! are never represented as floats anywhere in the kernel.

use std::fmt;
use std::ops::{Add, Neg, Sub};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::currency::Currency;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: Decimal,
    pub currency: Currency,
}

impl Money {
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self { amount, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Self::new(Decimal::ZERO, currency)
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }

    /// Absolute value, same currency.
    pub fn abs(&self) -> Self {
        Self::new(self.amount.abs(), self.currency)
    }

    /// Round to the currency's conventional minor-unit scale (banker's rounding).
    pub fn rounded(&self) -> Self {
        Self::new(
            self.amount.round_dp(self.currency.scale()),
            self.currency,
        )
    }

    /// Checked addition; `None` on currency mismatch.
    pub fn checked_add(&self, other: &Money) -> Option<Money> {
        if self.currency != other.currency {
            return None;
        }
        Some(Self::new(self.amount + other.amount, self.currency))
    }

    /// Checked subtraction; `None` on currency mismatch.
    pub fn checked_sub(&self, other: &Money) -> Option<Money> {
        if self.currency != other.currency {
            return None;
        }
        Some(Self::new(self.amount - other.amount, self.currency))
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        self.checked_add(&rhs)
            .expect("Money addition requires matching currencies")
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        self.checked_sub(&rhs)
            .expect("Money subtraction requires matching currencies")
    }
}

impl Neg for Money {
    type Output = Money;
    fn neg(self) -> Money {
        Money::new(-self.amount, self.currency)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount.round_dp(self.currency.scale()), self.currency)
    }
}
