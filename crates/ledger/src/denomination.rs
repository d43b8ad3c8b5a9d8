//! Bills and coins of the operating currency, used to count a drawer at close.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use cashdrawer_core::{DomainError, DomainResult, Money};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Denomination {
    pub label: String,
    pub face_value: Money,
}

impl Denomination {
    pub fn new(label: impl Into<String>, face_value: Money) -> Self {
        Self {
            label: label.into(),
            face_value,
        }
    }
}

/// How many pieces of one denomination were counted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenominationCount {
    pub label: String,
    pub count: u32,
}

impl DenominationCount {
    pub fn new(label: impl Into<String>, count: u32) -> Self {
        Self {
            label: label.into(),
            count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountedLine {
    pub label: String,
    pub count: u32,
    pub face_value: Money,
    pub subtotal: Money,
}

/// Result of counting a drawer against a [`DenominationTable`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountedCash {
    pub total: Money,
    /// Non-zero lines in table order.
    pub lines: Vec<CountedLine>,
}

impl CountedCash {
    /// Human-readable breakdown appended to the session notes at close.
    pub fn audit_note(&self) -> String {
        let mut note = String::from("Denomination count:");
        for line in &self.lines {
            note.push_str(&format!(
                "\n  {} x {} = {}",
                line.count, line.label, line.subtotal
            ));
        }
        note.push_str(&format!("\n  total = {}", self.total));
        note
    }
}

/// Ordered list of `(label, face_value)` pairs for one currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenominationTable {
    currency: String,
    denominations: Vec<Denomination>,
}

impl DenominationTable {
    pub fn new(currency: impl Into<String>, denominations: Vec<Denomination>) -> DomainResult<Self> {
        let currency = currency.into();
        if currency.trim().is_empty() {
            return Err(DomainError::validation("currency code cannot be empty"));
        }
        if denominations.is_empty() {
            return Err(DomainError::validation("denomination table cannot be empty"));
        }

        let mut seen = HashSet::new();
        for d in &denominations {
            if d.label.trim().is_empty() {
                return Err(DomainError::validation("denomination label cannot be empty"));
            }
            if !d.face_value.is_positive() {
                return Err(DomainError::validation(format!(
                    "denomination {} must have a positive face value",
                    d.label
                )));
            }
            if !seen.insert(d.label.as_str()) {
                return Err(DomainError::validation(format!(
                    "duplicate denomination label: {}",
                    d.label
                )));
            }
        }

        Ok(Self {
            currency,
            denominations,
        })
    }

    /// Mexican peso bills and coins.
    pub fn mxn() -> Self {
        Self::builtin(
            "MXN",
            &[
                ("bill_1000", 100_000),
                ("bill_500", 50_000),
                ("bill_200", 20_000),
                ("bill_100", 10_000),
                ("bill_50", 5_000),
                ("bill_20", 2_000),
                ("coin_20", 2_000),
                ("coin_10", 1_000),
                ("coin_5", 500),
                ("coin_2", 200),
                ("coin_1", 100),
                ("coin_0_50", 50),
            ],
        )
    }

    pub fn usd() -> Self {
        Self::builtin(
            "USD",
            &[
                ("bill_100", 10_000),
                ("bill_50", 5_000),
                ("bill_20", 2_000),
                ("bill_10", 1_000),
                ("bill_5", 500),
                ("bill_1", 100),
                ("coin_0_25", 25),
                ("coin_0_10", 10),
                ("coin_0_05", 5),
                ("coin_0_01", 1),
            ],
        )
    }

    // Built-in tables are valid by construction, so they skip `new`.
    fn builtin(currency: &str, rows: &[(&str, i64)]) -> Self {
        Self {
            currency: currency.to_string(),
            denominations: rows
                .iter()
                .map(|(label, minor)| Denomination::new(*label, Money::from_minor(*minor)))
                .collect(),
        }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn denominations(&self) -> &[Denomination] {
        &self.denominations
    }

    pub fn face_value(&self, label: &str) -> Option<Money> {
        self.denominations
            .iter()
            .find(|d| d.label == label)
            .map(|d| d.face_value)
    }

    /// Sum `count × face_value` over the supplied counts.
    ///
    /// Unknown labels are rejected; repeated labels accumulate.
    pub fn count(&self, counts: &[DenominationCount]) -> DomainResult<CountedCash> {
        let mut per_label = vec![0u32; self.denominations.len()];

        for c in counts {
            let idx = self
                .denominations
                .iter()
                .position(|d| d.label == c.label)
                .ok_or_else(|| {
                    DomainError::validation(format!(
                        "unknown {} denomination: {}",
                        self.currency, c.label
                    ))
                })?;
            per_label[idx] = per_label[idx].checked_add(c.count).ok_or_else(|| {
                DomainError::validation(format!("count overflow for denomination {}", c.label))
            })?;
        }

        let lines = self
            .denominations
            .iter()
            .zip(per_label)
            .filter(|(_, count)| *count > 0)
            .map(|(d, count)| {
                let subtotal = d.face_value.checked_mul(i64::from(count)).ok_or_else(|| {
                    DomainError::validation(format!("subtotal overflow for denomination {}", d.label))
                })?;
                Ok(CountedLine {
                    label: d.label.clone(),
                    count,
                    face_value: d.face_value,
                    subtotal,
                })
            })
            .collect::<DomainResult<Vec<CountedLine>>>()?;
        let total = Money::checked_sum(lines.iter().map(|l| l.subtotal))
            .ok_or_else(|| DomainError::validation("counted drawer total overflow"))?;

        Ok(CountedCash { total, lines })
    }
}

impl Default for DenominationTable {
    fn default() -> Self {
        Self::mxn()
    }
}
