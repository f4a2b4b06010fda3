//! Role Resolver — maps an abstract role to a concrete [`AccountCode`] for a
//! given ledger, honoring the effective-dated binding that was live in the
//! config pack at posting time (§4.7).

use acctkernel_types::AccountCode;
use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleBinding {
    pub ledger_id: String,
    pub role: String,
    pub account_code: AccountCode,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
    pub config_version: String,
}

impl RoleBinding {
    fn covers(&self, date: NaiveDate) -> bool {
        date >= self.effective_from && self.effective_to.map(|to| date <= to).unwrap_or(true)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoleResolver {
    bindings: Vec<RoleBinding>,
}

/// The binding used to resolve a role, recorded in the decision log so a
/// trace can show exactly which account_code/config_version backed a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRole {
    pub account_code: AccountCode,
    pub config_version: String,
}

impl RoleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, binding: RoleBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Resolves `role` on `ledger_id` as of `effective_date`. When more than
    /// one binding covers the date (a config pack update mid-range), the
    /// binding with the latest `effective_from` wins.
    pub fn resolve(&self, ledger_id: &str, role: &str, effective_date: NaiveDate) -> Option<ResolvedRole> {
        self.bindings
            .iter()
            .filter(|b| b.ledger_id == ledger_id && b.role == role && b.covers(effective_date))
            .max_by_key(|b| b.effective_from)
            .map(|b| ResolvedRole { account_code: b.account_code.clone(), config_version: b.config_version.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(role: &str, from: NaiveDate, to: Option<NaiveDate>, code: &str, version: &str) -> RoleBinding {
        RoleBinding {
            ledger_id: "GL".into(),
            role: role.into(),
            account_code: AccountCode::new(code),
            effective_from: from,
            effective_to: to,
            config_version: version.into(),
        }
    }

    #[test]
    fn resolves_role_active_on_date() {
        let resolver = RoleResolver::new().bind(binding(
            "Inventory",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            None,
            "1200",
            "v1",
        ));
        let resolved = resolver.resolve("GL", "Inventory", NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()).unwrap();
        assert_eq!(resolved.account_code, AccountCode::new("1200"));
    }

    #[test]
    fn unbound_role_resolves_to_none() {
        let resolver = RoleResolver::new();
        assert!(resolver.resolve("GL", "Inventory", NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()).is_none());
    }

    #[test]
    fn later_binding_wins_when_ranges_overlap() {
        let resolver = RoleResolver::new()
            .bind(binding("Cash", NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(), None, "1000", "v1"))
            .bind(binding("Cash", NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), None, "1001", "v2"));
        let resolved = resolver.resolve("GL", "Cash", NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()).unwrap();
        assert_eq!(resolved.account_code, AccountCode::new("1001"));
        assert_eq!(resolved.config_version, "v2");
    }

    #[test]
    fn date_outside_range_does_not_resolve() {
        let resolver = RoleResolver::new().bind(binding(
            "Cash",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            Some(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()),
            "1000",
            "v1",
        ));
        assert!(resolver.resolve("GL", "Cash", NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()).is_none());
    }
}
