//! Calculation engine.
//!
//! Pure functions over an already-materialised transaction set. Nothing in
//! here performs IO or reads the clock; every sign rule comes from
//! [`crate::transaction::TransactionType`] so call sites never flip signs.
//!
//! All sums are checked. An overflow surfaces as an invariant violation
//! instead of a wrapped total.

use serde::{Deserialize, Serialize};

use cashdrawer_core::{DomainError, DomainResult, Money};

use crate::transaction::{PaymentMethod, TotalsBucket, Transaction};

fn overflow(what: &str) -> DomainError {
    DomainError::invariant(format!("{what} overflow"))
}

fn sum(a: Money, b: Money, what: &str) -> DomainResult<Money> {
    a.checked_add(b).ok_or_else(|| overflow(what))
}

/// Positive inflows grouped by payment method.
///
/// Every field defaults to zero so partially-populated historical payloads
/// still deserialize.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentBreakdown {
    pub cash: Money,
    pub card: Money,
    pub digital: Money,
    pub other: Money,
}

impl PaymentBreakdown {
    pub fn get(&self, method: PaymentMethod) -> Money {
        match method {
            PaymentMethod::Cash => self.cash,
            PaymentMethod::Card => self.card,
            PaymentMethod::Digital => self.digital,
            PaymentMethod::Other => self.other,
        }
    }

    fn slot_mut(&mut self, method: PaymentMethod) -> &mut Money {
        match method {
            PaymentMethod::Cash => &mut self.cash,
            PaymentMethod::Card => &mut self.card,
            PaymentMethod::Digital => &mut self.digital,
            PaymentMethod::Other => &mut self.other,
        }
    }

    /// Add `amount` to the slot for `method`.
    pub fn credit(&mut self, method: PaymentMethod, amount: Money) -> DomainResult<()> {
        let slot = self.slot_mut(method);
        *slot = sum(*slot, amount, "payment breakdown")?;
        Ok(())
    }

    pub fn total(&self) -> DomainResult<Money> {
        Money::checked_sum(PaymentMethod::ALL.into_iter().map(|m| self.get(m)))
            .ok_or_else(|| overflow("payment breakdown total"))
    }

    /// Slot-by-slot sum of two breakdowns.
    pub fn merge(mut self, rhs: &PaymentBreakdown) -> DomainResult<PaymentBreakdown> {
        for method in PaymentMethod::ALL {
            self.credit(method, rhs.get(method))?;
        }
        Ok(self)
    }
}

/// Per-session totals (also the shape of multi-session rollups).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionTotals {
    pub total_sales: Money,
    /// Positive magnitude of refunds and cancellations.
    pub total_refunds: Money,
    pub total_tips: Money,
    /// Positive magnitude of expenses.
    pub total_expenses: Money,
    pub net_cash_flow: Money,
    pub payment_breakdown: PaymentBreakdown,
    pub transaction_count: u64,
}

impl SessionTotals {
    /// Field-by-field sum of two totals.
    pub fn merge(self, rhs: &SessionTotals) -> DomainResult<SessionTotals> {
        Ok(SessionTotals {
            total_sales: sum(self.total_sales, rhs.total_sales, "total sales")?,
            total_refunds: sum(self.total_refunds, rhs.total_refunds, "total refunds")?,
            total_tips: sum(self.total_tips, rhs.total_tips, "total tips")?,
            total_expenses: sum(self.total_expenses, rhs.total_expenses, "total expenses")?,
            net_cash_flow: sum(self.net_cash_flow, rhs.net_cash_flow, "net cash flow")?,
            payment_breakdown: self.payment_breakdown.merge(&rhs.payment_breakdown)?,
            transaction_count: self
                .transaction_count
                .checked_add(rhs.transaction_count)
                .ok_or_else(|| overflow("transaction count"))?,
        })
    }
}

/// Compute the per-type totals and payment breakdown of one transaction set.
pub fn compute_totals(transactions: &[Transaction]) -> DomainResult<SessionTotals> {
    let mut totals = SessionTotals::default();

    for tx in transactions {
        let reported = tx.kind.reported_amount(tx.amount)?;
        match tx.kind.bucket() {
            Some(TotalsBucket::Sales) => {
                totals.total_sales = sum(totals.total_sales, reported, "total sales")?
            }
            Some(TotalsBucket::Refunds) => {
                totals.total_refunds = sum(totals.total_refunds, reported, "total refunds")?
            }
            Some(TotalsBucket::Tips) => {
                totals.total_tips = sum(totals.total_tips, reported, "total tips")?
            }
            Some(TotalsBucket::Expenses) => {
                totals.total_expenses = sum(totals.total_expenses, reported, "total expenses")?
            }
            None => {}
        }
        totals.transaction_count += 1;
    }

    totals.net_cash_flow = net_cash_flow(&totals)?;
    totals.payment_breakdown = payment_breakdown(transactions)?;
    Ok(totals)
}

/// `sales - refunds + tips - expenses`.
pub fn net_cash_flow(totals: &SessionTotals) -> DomainResult<Money> {
    totals
        .total_sales
        .checked_sub(totals.total_refunds)
        .and_then(|m| m.checked_add(totals.total_tips))
        .and_then(|m| m.checked_sub(totals.total_expenses))
        .ok_or_else(|| overflow("net cash flow"))
}

/// Initial balance plus the raw signed sum of every transaction.
///
/// This deliberately sums all types (not just the bucketed ones) so a new
/// movement type changes the prediction without touching this function.
pub fn expected_balance(initial_balance: Money, transactions: &[Transaction]) -> DomainResult<Money> {
    Money::checked_sum(transactions.iter().map(|tx| tx.amount))
        .and_then(|moved| initial_balance.checked_add(moved))
        .ok_or_else(|| overflow("expected balance"))
}

/// Sum of positive amounts per payment method. Outflows never appear here,
/// even when they carry a method.
pub fn payment_breakdown(transactions: &[Transaction]) -> DomainResult<PaymentBreakdown> {
    let mut breakdown = PaymentBreakdown::default();
    for tx in transactions {
        if !tx.amount.is_positive() {
            continue;
        }
        if let Some(method) = tx.payment_method {
            breakdown.credit(method, tx.amount)?;
        }
    }
    Ok(breakdown)
}

/// Positive = surplus, negative = shortage.
pub fn cash_difference(actual_balance: Money, expected_balance: Money) -> DomainResult<Money> {
    actual_balance
        .checked_sub(expected_balance)
        .ok_or_else(|| overflow("cash difference"))
}

/// Element-wise sum of any number of per-session totals.
pub fn aggregate<'a, I>(totals: I) -> DomainResult<SessionTotals>
where
    I: IntoIterator<Item = &'a SessionTotals>,
{
    totals
        .into_iter()
        .try_fold(SessionTotals::default(), |acc, t| acc.merge(t))
}

/// The counted balance of a session: `actual_balance`, else `final_balance`.
///
/// Older records only carry `final_balance`; newer ones set both.
pub fn resolve_counted_balance(
    actual_balance: Option<Money>,
    final_balance: Option<Money>,
) -> Option<Money> {
    match actual_balance {
        Some(actual) => Some(actual),
        None => final_balance,
    }
}

/// Classification of a cash difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifferenceOutcome {
    Surplus,
    Shortage,
    Balanced,
}

impl DifferenceOutcome {
    pub fn of(difference: Money) -> Self {
        if difference.is_positive() {
            DifferenceOutcome::Surplus
        } else if difference.is_negative() {
            DifferenceOutcome::Shortage
        } else {
            DifferenceOutcome::Balanced
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    use cashdrawer_core::{SessionId, TenantId, TransactionId, UserId};

    use crate::transaction::TransactionType;

    fn tx(kind: TransactionType, minor: i64, method: Option<PaymentMethod>) -> Transaction {
        Transaction {
            id: TransactionId::new(),
            tenant_id: TenantId::new(),
            session_id: SessionId::new(),
            kind,
            amount: kind.signed_amount(Money::from_minor(minor)).unwrap(),
            description: String::new(),
            order_id: None,
            payment_method: method,
            created_by: UserId::new(),
            created_at: Utc::now(),
        }
    }

    fn kind_strategy() -> impl Strategy<Value = TransactionType> {
        prop::sample::select(TransactionType::ALL.to_vec())
    }

    fn method_strategy() -> impl Strategy<Value = Option<PaymentMethod>> {
        prop::option::of(prop::sample::select(PaymentMethod::ALL.to_vec()))
    }

    fn totals_strategy() -> impl Strategy<Value = SessionTotals> {
        prop::collection::vec((kind_strategy(), 1i64..1_000_000, method_strategy()), 0..20).prop_map(
            |rows| {
                let txs: Vec<_> = rows.into_iter().map(|(k, a, m)| tx(k, a, m)).collect();
                compute_totals(&txs).unwrap()
            },
        )
    }

    #[test]
    fn shift_with_sale_tip_and_expense() {
        let txs = vec![
            tx(TransactionType::Sale, 5_000, Some(PaymentMethod::Cash)),
            tx(TransactionType::Tip, 1_000, Some(PaymentMethod::Cash)),
            tx(TransactionType::Expense, 2_000, None),
        ];

        let totals = compute_totals(&txs).unwrap();
        assert_eq!(totals.total_sales, Money::from_major(50));
        assert_eq!(totals.total_tips, Money::from_major(10));
        assert_eq!(totals.total_expenses, Money::from_major(20));
        assert_eq!(totals.net_cash_flow, Money::from_major(40));
        assert_eq!(totals.payment_breakdown.cash, Money::from_major(60));
        assert_eq!(totals.transaction_count, 3);
        assert_eq!(expected_balance(Money::from_major(100), &txs).unwrap(), Money::from_major(140));
    }

    #[test]
    fn empty_session_expects_initial_balance() {
        let totals = compute_totals(&[]).unwrap();
        assert_eq!(totals, SessionTotals::default());
        assert_eq!(totals.net_cash_flow, Money::ZERO);
        assert_eq!(expected_balance(Money::from_major(100), &[]).unwrap(), Money::from_major(100));
    }

    #[test]
    fn manual_movements_change_expected_but_not_net() {
        let txs = vec![
            tx(TransactionType::ManualAdd, 3_000, None),
            tx(TransactionType::ManualWithdraw, 1_000, None),
        ];
        let totals = compute_totals(&txs).unwrap();
        assert_eq!(totals.net_cash_flow, Money::ZERO);
        assert_eq!(expected_balance(Money::ZERO, &txs).unwrap(), Money::from_major(20));
    }

    #[test]
    fn refunds_with_method_stay_out_of_breakdown() {
        let txs = vec![
            tx(TransactionType::Sale, 4_000, Some(PaymentMethod::Card)),
            tx(TransactionType::Refund, 1_500, Some(PaymentMethod::Card)),
            tx(TransactionType::Expense, 500, Some(PaymentMethod::Cash)),
        ];
        let breakdown = payment_breakdown(&txs).unwrap();
        assert_eq!(breakdown.card, Money::from_major(40));
        assert_eq!(breakdown.cash, Money::ZERO);

        let totals = compute_totals(&txs).unwrap();
        assert_eq!(totals.total_refunds, Money::from_minor(1_500));
        assert_eq!(totals.net_cash_flow, Money::from_minor(4_000 - 1_500 - 500));
    }

    #[test]
    fn difference_sign_marks_shortage() {
        let diff = cash_difference(Money::from_major(135), Money::from_major(140)).unwrap();
        assert_eq!(diff, Money::from_major(-5));
        assert_eq!(DifferenceOutcome::of(diff), DifferenceOutcome::Shortage);
        assert_eq!(DifferenceOutcome::of(Money::ZERO), DifferenceOutcome::Balanced);
    }

    #[test]
    fn counted_balance_falls_back_to_final() {
        let a = Money::from_major(10);
        let f = Money::from_major(20);
        assert_eq!(resolve_counted_balance(Some(a), Some(f)), Some(a));
        assert_eq!(resolve_counted_balance(None, Some(f)), Some(f));
        assert_eq!(resolve_counted_balance(None, None), None);
    }

    #[test]
    fn aggregate_tolerates_sparse_historical_payloads() {
        let sparse: SessionTotals =
            serde_json::from_value(serde_json::json!({ "total_sales": 1000 })).unwrap();
        let full: SessionTotals = serde_json::from_value(serde_json::json!({
            "total_sales": 500,
            "net_cash_flow": 500,
            "payment_breakdown": { "card": 500 },
            "transaction_count": 1
        }))
        .unwrap();

        let rolled = aggregate([&sparse, &full, &SessionTotals::default()]).unwrap();
        assert_eq!(rolled.total_sales, Money::from_minor(1_500));
        assert_eq!(rolled.net_cash_flow, Money::from_minor(500));
        assert_eq!(rolled.payment_breakdown.card, Money::from_minor(500));
        assert_eq!(rolled.payment_breakdown.cash, Money::ZERO);
        assert_eq!(rolled.transaction_count, 1);
    }

    #[test]
    fn breakdown_credit_accumulates_per_method() {
        let mut breakdown = PaymentBreakdown::default();
        breakdown.credit(PaymentMethod::Card, Money::from_major(12)).unwrap();
        breakdown.credit(PaymentMethod::Card, Money::from_major(3)).unwrap();
        breakdown.credit(PaymentMethod::Digital, Money::from_major(5)).unwrap();

        assert_eq!(breakdown.card, Money::from_major(15));
        assert_eq!(breakdown.digital, Money::from_major(5));
        assert_eq!(breakdown.total().unwrap(), Money::from_major(20));
        assert_eq!(
            breakdown.merge(&breakdown).unwrap().total().unwrap(),
            Money::from_major(40)
        );
    }

    #[test]
    fn overflowing_sums_are_invariant_violations() {
        let half = i64::MAX / 2 + 1;
        let txs = vec![
            tx(TransactionType::Sale, half, Some(PaymentMethod::Cash)),
            tx(TransactionType::Sale, half, Some(PaymentMethod::Cash)),
        ];

        assert!(matches!(
            expected_balance(Money::ZERO, &txs),
            Err(DomainError::InvariantViolation(_))
        ));
        assert!(matches!(compute_totals(&txs), Err(DomainError::InvariantViolation(_))));
        assert!(matches!(
            cash_difference(Money::from_minor(i64::MIN), Money::from_major(1)),
            Err(DomainError::InvariantViolation(_))
        ));

        let big = SessionTotals {
            total_sales: Money::from_minor(half),
            ..SessionTotals::default()
        };
        assert!(matches!(
            aggregate([&big, &big]),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: expected balance is initial + raw sum for any mix of types.
        #[test]
        fn expected_balance_is_initial_plus_signed_sum(
            initial in 0i64..10_000_000,
            rows in prop::collection::vec((kind_strategy(), 1i64..1_000_000, method_strategy()), 0..40)
        ) {
            let txs: Vec<_> = rows.into_iter().map(|(k, a, m)| tx(k, a, m)).collect();
            let raw: i64 = txs.iter().map(|t| t.amount.minor_units()).sum();
            prop_assert_eq!(
                expected_balance(Money::from_minor(initial), &txs).unwrap(),
                Money::from_minor(initial + raw)
            );
        }

        /// Property: no breakdown slot is ever negative.
        #[test]
        fn breakdown_is_never_negative(
            rows in prop::collection::vec((kind_strategy(), 1i64..1_000_000, method_strategy()), 0..40)
        ) {
            let txs: Vec<_> = rows.into_iter().map(|(k, a, m)| tx(k, a, m)).collect();
            let breakdown = payment_breakdown(&txs).unwrap();
            for method in PaymentMethod::ALL {
                prop_assert!(!breakdown.get(method).is_negative());
            }
        }

        /// Property: aggregate equals the element-wise sum of its inputs.
        #[test]
        fn aggregate_is_element_wise_sum(
            sessions in prop::collection::vec(totals_strategy(), 0..6)
        ) {
            let rolled = aggregate(&sessions).unwrap();
            let sum = |f: fn(&SessionTotals) -> Money| Money::checked_sum(sessions.iter().map(f)).unwrap();

            prop_assert_eq!(rolled.total_sales, sum(|t| t.total_sales));
            prop_assert_eq!(rolled.total_refunds, sum(|t| t.total_refunds));
            prop_assert_eq!(rolled.total_tips, sum(|t| t.total_tips));
            prop_assert_eq!(rolled.total_expenses, sum(|t| t.total_expenses));
            prop_assert_eq!(rolled.net_cash_flow, sum(|t| t.net_cash_flow));
            for method in PaymentMethod::ALL {
                let expected =
                    Money::checked_sum(sessions.iter().map(|t| t.payment_breakdown.get(method))).unwrap();
                prop_assert_eq!(rolled.payment_breakdown.get(method), expected);
            }
            prop_assert_eq!(
                rolled.transaction_count,
                sessions.iter().map(|t| t.transaction_count).sum::<u64>()
            );
        }
    }
}
