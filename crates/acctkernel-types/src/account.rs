//! Chart-of-accounts value objects: account codes, roles, and the economic
//! classification a role belongs to.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A chart-of-accounts code, e.g. `"1000"` or `"4010-rebates"`. Opaque to the
/// kernel beyond equality and ordering — the ledger registry maps codes to
/// accounts, not the other way around.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountCode(pub String);

impl AccountCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }
}

impl fmt::Display for AccountCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountCode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The functional role a journal line plays, independent of which concrete
/// account code ends up posted. Policies reference roles; the ledger
/// registry resolves a role to a concrete [`AccountCode`] for a given ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountRole {
    Cash,
    AccountsReceivable,
    AccountsPayable,
    Revenue,
    RevenueContra,
    ExpenseCogs,
    ExpenseOperating,
    Inventory,
    TaxLiability,
    RoundingDifference,
    Other(&'static str),
}

impl fmt::Display for AccountRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cash => write!(f, "cash"),
            Self::AccountsReceivable => write!(f, "accounts_receivable"),
            Self::AccountsPayable => write!(f, "accounts_payable"),
            Self::Revenue => write!(f, "revenue"),
            Self::RevenueContra => write!(f, "revenue_contra"),
            Self::ExpenseCogs => write!(f, "expense_cogs"),
            Self::ExpenseOperating => write!(f, "expense_operating"),
            Self::Inventory => write!(f, "inventory"),
            Self::TaxLiability => write!(f, "tax_liability"),
            Self::RoundingDifference => write!(f, "rounding_difference"),
            Self::Other(name) => write!(f, "{}", name),
        }
    }
}

/// The economic direction of a role's normal balance, used to decide which
/// side (debit/credit) a positive amount maps to when the intent builder
/// doesn't carry an explicit side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EconomicType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl EconomicType {
    /// `true` if this type's normal balance is a debit.
    pub fn normal_balance_is_debit(&self) -> bool {
        matches!(self, Self::Asset | Self::Expense)
    }
}

/// Debit or credit side of a journal line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Debit,
    Credit,
}

impl Side {
    pub fn flip(self) -> Side {
        match self {
            Side::Debit => Side::Credit,
            Side::Credit => Side::Debit,
        }
    }

    /// Sign multiplier used when summing a ledger's lines for a balance check:
    /// debits positive, credits negative.
    pub fn sign(self) -> i8 {
        match self {
            Side::Debit => 1,
            Side::Credit => -1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Debit => write!(f, "debit"),
            Side::Credit => write!(f, "credit"),
        }
    }
}
