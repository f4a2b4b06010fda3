//! Currency registry for the interpretation kernel.
//!
//! Every ledger entry carries a currency so the journal writer can group
//! journal lines by `(ledger_id, currency)` for balance checking.

use serde::{Deserialize, Serialize};
use std::fmt;

/// ISO 4217-ish currency code plus the minor-unit scale the kernel uses for
/// rounding-line insertion and decimal formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    USD,
    EUR,
    GBP,
    JPY,
    CHF,
    CAD,
    AUD,
}

impl Currency {
    /// Number of decimal places conventionally used for this currency.
    pub fn scale(&self) -> u32 {
        match self {
            Self::JPY => 0,
            _ => 2,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
            Self::JPY => "JPY",
            Self::CHF => "CHF",
            Self::CAD => "CAD",
            Self::AUD => "AUD",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "USD" => Some(Self::USD),
            "EUR" => Some(Self::EUR),
            "GBP" => Some(Self::GBP),
            "JPY" => Some(Self::JPY),
            "CHF" => Some(Self::CHF),
            "CAD" => Some(Self::CAD),
            "AUD" => Some(Self::AUD),
            _ => None,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jpy_has_zero_scale() {
        assert_eq!(Currency::JPY.scale(), 0);
        assert_eq!(Currency::USD.scale(), 2);
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Currency::parse("usd"), Some(Currency::USD));
        assert_eq!(Currency::parse("XYZ"), None);
    }
}
