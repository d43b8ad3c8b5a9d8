//! Report snapshots and the typed views built from them.
//!
//! A [`Report`] row is an append-only JSON snapshot. The typed report structs
//! below are what services return; the same structs are the snapshot payloads.

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use cashdrawer_core::{DomainError, DomainResult, Entity, Money, ReportId, SessionId, TenantId, UserId};

use crate::calculation::{
    self, DifferenceOutcome, PaymentBreakdown, SessionTotals, compute_totals,
};
use crate::session::{Session, SessionStatus};
use crate::transaction::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportKind {
    DailySummary,
    CashDifference,
    PaymentBreakdown,
}

impl ReportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportKind::DailySummary => "DAILY_SUMMARY",
            ReportKind::CashDifference => "CASH_DIFFERENCE",
            ReportKind::PaymentBreakdown => "PAYMENT_BREAKDOWN",
        }
    }
}

impl core::str::FromStr for ReportKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DAILY_SUMMARY" => Ok(ReportKind::DailySummary),
            "CASH_DIFFERENCE" => Ok(ReportKind::CashDifference),
            "PAYMENT_BREAKDOWN" => Ok(ReportKind::PaymentBreakdown),
            other => Err(DomainError::validation(format!("unknown report type: {other}"))),
        }
    }
}

/// An immutable, persisted snapshot of computed totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    pub tenant_id: TenantId,
    pub session_id: SessionId,
    #[serde(rename = "type")]
    pub kind: ReportKind,
    pub payload: JsonValue,
    pub generated_at: DateTime<Utc>,
}

impl Entity for Report {
    type Id = ReportId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

impl Report {
    pub fn snapshot<T: Serialize>(
        tenant_id: TenantId,
        session_id: SessionId,
        kind: ReportKind,
        payload: &T,
        generated_at: DateTime<Utc>,
    ) -> DomainResult<Report> {
        let payload = serde_json::to_value(payload)
            .map_err(|e| DomainError::invariant(format!("report payload not serializable: {e}")))?;
        Ok(Report {
            id: ReportId::new(),
            tenant_id,
            session_id,
            kind,
            payload,
            generated_at,
        })
    }

    pub fn decode<T: DeserializeOwned>(&self) -> DomainResult<T> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            DomainError::invariant(format!(
                "{} report {} has an unreadable payload: {e}",
                self.kind.as_str(),
                self.id
            ))
        })
    }
}

/// Totals of one session at a point in time.
///
/// Returned by cuts (persisted) and by the on-the-fly daily summaries
/// (never persisted, `report_id` is `None`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySummaryReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_id: Option<ReportId>,
    pub session_id: SessionId,
    pub session_number: u64,
    pub status: SessionStatus,
    pub opened_by: UserId,
    pub cashier_id: Option<UserId>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub initial_balance: Money,
    /// Live prediction at generation time.
    pub expected_balance: Money,
    pub actual_balance: Option<Money>,
    #[serde(default)]
    pub totals: SessionTotals,
    /// Breakdown the cashier declared when taking the cut, if any.
    #[serde(default)]
    pub declared_breakdown: Option<PaymentBreakdown>,
    pub generated_at: DateTime<Utc>,
}

impl DailySummaryReport {
    pub fn build(
        session: &Session,
        transactions: &[Transaction],
        declared_breakdown: Option<PaymentBreakdown>,
        generated_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        Ok(Self {
            report_id: None,
            session_id: session.id,
            session_number: session.session_number,
            status: session.status,
            opened_by: session.opened_by,
            cashier_id: session.cashier_id,
            opened_at: session.opened_at,
            closed_at: session.closed_at,
            initial_balance: session.initial_balance,
            expected_balance: calculation::expected_balance(session.initial_balance, transactions)?,
            actual_balance: session.counted_balance(),
            totals: compute_totals(transactions)?,
            declared_breakdown,
            generated_at,
        })
    }

    /// Decode a persisted DAILY_SUMMARY row, attaching the row's identity.
    pub fn from_report(report: &Report) -> DomainResult<Self> {
        if report.kind != ReportKind::DailySummary {
            return Err(DomainError::invariant(format!(
                "expected DAILY_SUMMARY report, got {}",
                report.kind.as_str()
            )));
        }
        let mut summary: DailySummaryReport = report.decode()?;
        summary.report_id = Some(report.id);
        summary.generated_at = report.generated_at;
        Ok(summary)
    }
}

/// Rollup of every session opened within a date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklySummaryReport {
    pub tenant_id: TenantId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_sessions: u64,
    pub totals: SessionTotals,
    /// `net_cash_flow / total_sessions`, zero when there are no sessions.
    pub average_session_value: Money,
}

impl WeeklySummaryReport {
    pub fn build(
        tenant_id: TenantId,
        start_date: NaiveDate,
        end_date: NaiveDate,
        per_session: &[SessionTotals],
    ) -> DomainResult<Self> {
        let totals = calculation::aggregate(per_session)?;
        let total_sessions = per_session.len() as u64;
        Ok(Self {
            tenant_id,
            start_date,
            end_date,
            total_sessions,
            totals,
            average_session_value: totals.net_cash_flow.average_over(total_sessions),
        })
    }
}

/// Live expected balance paired with the counted balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashDifferenceReport {
    pub session_id: SessionId,
    pub session_number: u64,
    pub status: SessionStatus,
    /// Recomputed from the transactions present now.
    pub expected_balance: Money,
    /// Value frozen on the session at close.
    pub expected_balance_at_close: Option<Money>,
    pub actual_balance: Option<Money>,
    pub difference: Option<Money>,
    pub outcome: Option<DifferenceOutcome>,
    pub generated_at: DateTime<Utc>,
}

impl CashDifferenceReport {
    pub fn build(
        session: &Session,
        transactions: &[Transaction],
        generated_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let expected = calculation::expected_balance(session.initial_balance, transactions)?;
        let actual = session.counted_balance();
        let difference = actual
            .map(|a| calculation::cash_difference(a, expected))
            .transpose()?;
        Ok(Self {
            session_id: session.id,
            session_number: session.session_number,
            status: session.status,
            expected_balance: expected,
            expected_balance_at_close: session.expected_balance,
            actual_balance: actual,
            difference,
            outcome: difference.map(DifferenceOutcome::of),
            generated_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentBreakdownReport {
    pub session_id: SessionId,
    pub session_number: u64,
    pub breakdown: PaymentBreakdown,
    pub total: Money,
    pub generated_at: DateTime<Utc>,
}

impl PaymentBreakdownReport {
    pub fn build(
        session: &Session,
        transactions: &[Transaction],
        generated_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let breakdown = calculation::payment_breakdown(transactions)?;
        Ok(Self {
            session_id: session.id,
            session_number: session.session_number,
            total: breakdown.total()?,
            breakdown,
            generated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use cashdrawer_core::TransactionId;

    use crate::session::OpenSession;
    use crate::transaction::{PaymentMethod, TransactionType};

    fn session(initial_major: i64) -> Session {
        let cmd = OpenSession {
            tenant_id: TenantId::new(),
            opened_by: UserId::new(),
            cashier_id: None,
            initial_balance: Money::from_major(initial_major),
        };
        Session::open(&cmd, 1, Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()).unwrap()
    }

    fn tx(s: &Session, kind: TransactionType, major: i64, method: Option<PaymentMethod>) -> Transaction {
        Transaction {
            id: TransactionId::new(),
            tenant_id: s.tenant_id,
            session_id: s.id,
            kind,
            amount: kind.signed_amount(Money::from_major(major)).unwrap(),
            description: String::new(),
            order_id: None,
            payment_method: method,
            created_by: s.opened_by,
            created_at: s.opened_at,
        }
    }

    #[test]
    fn cut_payload_round_trips_through_a_report_row() {
        let s = session(100);
        let txs = vec![tx(&s, TransactionType::Sale, 50, Some(PaymentMethod::Cash))];
        let summary = DailySummaryReport::build(&s, &txs, None, Utc::now()).unwrap();

        let row = Report::snapshot(s.tenant_id, s.id, ReportKind::DailySummary, &summary, summary.generated_at)
            .unwrap();
        let decoded = DailySummaryReport::from_report(&row).unwrap();

        assert_eq!(decoded.report_id, Some(row.id));
        assert_eq!(decoded.expected_balance, Money::from_major(150));
        assert_eq!(decoded.totals, summary.totals);
    }

    #[test]
    fn from_report_rejects_other_kinds() {
        let s = session(0);
        let row = Report::snapshot(
            s.tenant_id,
            s.id,
            ReportKind::PaymentBreakdown,
            &PaymentBreakdownReport::build(&s, &[], Utc::now()).unwrap(),
            Utc::now(),
        )
        .unwrap();
        assert!(DailySummaryReport::from_report(&row).is_err());
    }

    #[test]
    fn difference_uses_live_transactions_not_frozen_value() {
        let mut s = session(100);
        let closing = s
            .prepare_close(Money::from_major(140), Money::from_major(135), None, Utc::now())
            .unwrap();
        s.apply_closing(&closing);

        // A late correction the frozen value knows nothing about.
        let txs = vec![
            tx(&s, TransactionType::Sale, 50, Some(PaymentMethod::Cash)),
            tx(&s, TransactionType::Tip, 10, Some(PaymentMethod::Cash)),
            tx(&s, TransactionType::Expense, 20, None),
            tx(&s, TransactionType::Refund, 5, None),
        ];
        let report = CashDifferenceReport::build(&s, &txs, Utc::now()).unwrap();

        assert_eq!(report.expected_balance, Money::from_major(135));
        assert_eq!(report.expected_balance_at_close, Some(Money::from_major(140)));
        assert_eq!(report.difference, Some(Money::ZERO));
        assert_eq!(report.outcome, Some(DifferenceOutcome::Balanced));
    }

    #[test]
    fn open_session_has_no_difference_yet() {
        let s = session(100);
        let report = CashDifferenceReport::build(&s, &[], Utc::now()).unwrap();
        assert_eq!(report.actual_balance, None);
        assert_eq!(report.difference, None);
    }

    #[test]
    fn weekly_average_is_net_over_sessions() {
        let a = SessionTotals {
            net_cash_flow: Money::from_major(40),
            ..SessionTotals::default()
        };
        let b = SessionTotals {
            net_cash_flow: Money::from_major(60),
            ..SessionTotals::default()
        };
        let day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let weekly = WeeklySummaryReport::build(TenantId::new(), day, day, &[a, b]).unwrap();
        assert_eq!(weekly.total_sessions, 2);
        assert_eq!(weekly.average_session_value, Money::from_major(50));

        let empty = WeeklySummaryReport::build(TenantId::new(), day, day, &[]).unwrap();
        assert_eq!(empty.average_session_value, Money::ZERO);
    }

    #[test]
    fn report_kind_names_match_storage() {
        for kind in [ReportKind::DailySummary, ReportKind::CashDifference, ReportKind::PaymentBreakdown] {
            assert_eq!(kind.as_str().parse::<ReportKind>().unwrap(), kind);
        }
    }
}
