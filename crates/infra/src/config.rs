//! Configuration loading and representation.

use serde::{Deserialize, Serialize};

use cashdrawer_core::{DomainResult, Money};
use cashdrawer_ledger::{Denomination, DenominationTable};

/// One `(label, face_value)` row as written in configuration.
///
/// `face_value` is in minor units (cents).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenominationSpec {
    pub label: String,
    pub face_value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CashDrawerConfig {
    /// ISO currency code; selects a built-in table when `denominations` is empty.
    pub currency: String,
    /// Custom denomination table, ordered as the drawer is counted.
    pub denominations: Vec<DenominationSpec>,
    /// Postgres URL; `None` runs against the in-memory store.
    pub database_url: Option<String>,
    pub default_page_size: u32,
}

impl Default for CashDrawerConfig {
    fn default() -> Self {
        Self {
            currency: "MXN".to_string(),
            denominations: Vec::new(),
            database_url: None,
            default_page_size: 50,
        }
    }
}

impl CashDrawerConfig {
    /// Read `CASHDRAWER_CURRENCY`, `CASHDRAWER_DENOMINATIONS` (JSON array),
    /// `DATABASE_URL` and `CASHDRAWER_PAGE_SIZE`. Malformed values fall back
    /// to the defaults with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`CashDrawerConfig::from_env`] over an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(currency) = lookup("CASHDRAWER_CURRENCY").filter(|c| !c.trim().is_empty()) {
            config.currency = currency.trim().to_ascii_uppercase();
        }

        if let Some(raw) = lookup("CASHDRAWER_DENOMINATIONS") {
            match serde_json::from_str::<Vec<DenominationSpec>>(&raw) {
                Ok(specs) => config.denominations = specs,
                Err(e) => {
                    tracing::warn!(error = %e, "CASHDRAWER_DENOMINATIONS is not valid JSON; using built-in table");
                }
            }
        }

        config.database_url = lookup("DATABASE_URL").filter(|u| !u.trim().is_empty());

        if let Some(raw) = lookup("CASHDRAWER_PAGE_SIZE") {
            match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => config.default_page_size = n,
                _ => {
                    tracing::warn!(value = %raw, "CASHDRAWER_PAGE_SIZE is not a positive integer; using default");
                }
            }
        }

        config
    }

    /// The denomination table to count drawers with.
    ///
    /// A configured list wins; otherwise the built-in table for `currency`.
    /// Unknown currencies without a configured list fall back to MXN.
    pub fn denomination_table(&self) -> DomainResult<DenominationTable> {
        if !self.denominations.is_empty() {
            let rows = self
                .denominations
                .iter()
                .map(|d| Denomination::new(d.label.clone(), Money::from_minor(d.face_value)))
                .collect();
            return DenominationTable::new(self.currency.clone(), rows);
        }

        Ok(match self.currency.as_str() {
            "USD" => DenominationTable::usd(),
            "MXN" => DenominationTable::mxn(),
            other => {
                tracing::warn!(currency = other, "no built-in denomination table; using MXN");
                DenominationTable::mxn()
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = CashDrawerConfig::from_lookup(lookup(&[]));
        assert_eq!(config, CashDrawerConfig::default());
        assert_eq!(config.denomination_table().unwrap(), DenominationTable::mxn());
    }

    #[test]
    fn reads_currency_and_page_size() {
        let config = CashDrawerConfig::from_lookup(lookup(&[
            ("CASHDRAWER_CURRENCY", "usd"),
            ("CASHDRAWER_PAGE_SIZE", "20"),
            ("DATABASE_URL", "postgres://localhost/cash"),
        ]));
        assert_eq!(config.currency, "USD");
        assert_eq!(config.default_page_size, 20);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/cash"));
        assert_eq!(config.denomination_table().unwrap(), DenominationTable::usd());
    }

    #[test]
    fn malformed_values_fall_back() {
        let config = CashDrawerConfig::from_lookup(lookup(&[
            ("CASHDRAWER_DENOMINATIONS", "not json"),
            ("CASHDRAWER_PAGE_SIZE", "0"),
        ]));
        assert!(config.denominations.is_empty());
        assert_eq!(config.default_page_size, 50);
    }

    #[test]
    fn custom_table_is_validated() {
        let config = CashDrawerConfig::from_lookup(lookup(&[(
            "CASHDRAWER_DENOMINATIONS",
            r#"[{"label":"big","face_value":1000},{"label":"big","face_value":500}]"#,
        )]));
        assert_eq!(config.denominations.len(), 2);
        assert!(config.denomination_table().is_err());
    }
}
