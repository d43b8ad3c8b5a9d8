//! Cuts, summaries and difference reports.
//!
//! Two kinds of expected balance coexist and both are intentional:
//!
//! - the value frozen on the session at close (audit record of what the
//!   ledger predicted when the drawer was counted)
//! - a live recomputation from the current transaction set, used by every
//!   report here so late corrections show up
//!
//! `daily_summaries` and `weekly_summary` are always computed on the fly
//! from transactions; only cuts and single-session reports are persisted.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument};

use cashdrawer_core::{ReportId, SessionId, TenantId, UserId};
use cashdrawer_ledger::calculation::compute_totals;
use cashdrawer_ledger::events::ReportGenerated;
use cashdrawer_ledger::{
    CashDifferenceReport, CashDrawerEvent, DailySummaryReport, PaymentBreakdown,
    PaymentBreakdownReport, Report, ReportKind, Session, SessionStatus, Transaction,
    WeeklySummaryReport,
};

use super::error::{CashDrawerError, CashDrawerResult};
use crate::publisher::EventPublisher;
use crate::store::{LedgerStore, Pagination, SessionFilter, SessionOrder};

#[derive(Debug, Clone)]
pub struct ReportAggregator<S> {
    store: S,
    publisher: EventPublisher,
    default_page_size: u32,
}

impl<S> ReportAggregator<S> {
    pub fn new(store: S, publisher: EventPublisher, default_page_size: u32) -> Self {
        Self {
            store,
            publisher,
            default_page_size,
        }
    }
}

impl<S> ReportAggregator<S>
where
    S: LedgerStore,
{
    /// Checkpoint a session's totals without closing it.
    #[instrument(skip(self, declared_breakdown), fields(tenant_id = %tenant_id, session_id = %session_id), err)]
    pub async fn cut(
        &self,
        tenant_id: TenantId,
        session_id: SessionId,
        declared_breakdown: Option<PaymentBreakdown>,
    ) -> CashDrawerResult<DailySummaryReport> {
        let (session, transactions) = self.load(tenant_id, session_id).await?;
        let mut summary =
            DailySummaryReport::build(&session, &transactions, declared_breakdown, Utc::now())?;

        let report_id = self
            .persist(&session, ReportKind::DailySummary, &summary, summary.generated_at)
            .await?;
        summary.report_id = Some(report_id);

        info!(
            %report_id,
            net_cash_flow = %summary.totals.net_cash_flow,
            transaction_count = summary.totals.transaction_count,
            "cut generated"
        );
        Ok(summary)
    }

    pub async fn last_cut(
        &self,
        tenant_id: TenantId,
        session_id: SessionId,
    ) -> CashDrawerResult<Option<DailySummaryReport>> {
        self.session(tenant_id, session_id).await?;
        let Some(row) = self
            .store
            .latest_report(tenant_id, session_id, ReportKind::DailySummary)
            .await?
        else {
            return Ok(None);
        };
        Ok(Some(DailySummaryReport::from_report(&row)?))
    }

    /// One summary per CLOSED session, newest close first, recomputed now.
    ///
    /// Dates bound `closed_at` in UTC, both ends inclusive.
    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    pub async fn daily_summaries(
        &self,
        tenant_id: TenantId,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        cashier_id: Option<UserId>,
        pagination: Option<Pagination>,
    ) -> CashDrawerResult<Vec<DailySummaryReport>> {
        if let (Some(start), Some(end)) = (start_date, end_date) {
            ensure_ordered(start, end)?;
        }

        let filter = SessionFilter {
            status: Some(SessionStatus::Closed),
            cashier_id,
            closed_from: start_date.map(day_start),
            closed_until: end_date.map(day_after).transpose()?,
            order: SessionOrder::ClosedAtDesc,
            ..SessionFilter::default()
        };
        let pagination =
            pagination.unwrap_or_else(|| Pagination::new(Some(self.default_page_size), None));
        let sessions = self
            .store
            .list_sessions(tenant_id, &filter, Some(pagination))
            .await?;

        let generated_at = Utc::now();
        let mut summaries = Vec::with_capacity(sessions.len());
        for session in &sessions {
            let transactions = self.store.list_transactions(tenant_id, session.id).await?;
            summaries.push(DailySummaryReport::build(
                session,
                &transactions,
                None,
                generated_at,
            )?);
        }

        debug!(count = summaries.len(), "daily summaries computed");
        Ok(summaries)
    }

    /// Roll up every session (open or closed) opened within the date range.
    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    pub async fn weekly_summary(
        &self,
        tenant_id: TenantId,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> CashDrawerResult<WeeklySummaryReport> {
        ensure_ordered(start_date, end_date)?;

        let filter = SessionFilter {
            opened_from: Some(day_start(start_date)),
            opened_until: Some(day_after(end_date)?),
            ..SessionFilter::default()
        };
        let sessions = self.store.list_sessions(tenant_id, &filter, None).await?;

        let mut per_session = Vec::with_capacity(sessions.len());
        for session in &sessions {
            let transactions = self.store.list_transactions(tenant_id, session.id).await?;
            per_session.push(compute_totals(&transactions)?);
        }

        let weekly = WeeklySummaryReport::build(tenant_id, start_date, end_date, &per_session)?;
        info!(
            total_sessions = weekly.total_sessions,
            net_cash_flow = %weekly.totals.net_cash_flow,
            average_session_value = %weekly.average_session_value,
            "weekly summary computed"
        );
        Ok(weekly)
    }

    /// Live expected balance against the counted balance, persisted as a
    /// CASH_DIFFERENCE snapshot.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, session_id = %session_id), err)]
    pub async fn cash_difference_report(
        &self,
        tenant_id: TenantId,
        session_id: SessionId,
    ) -> CashDrawerResult<CashDifferenceReport> {
        let (session, transactions) = self.load(tenant_id, session_id).await?;
        let report = CashDifferenceReport::build(&session, &transactions, Utc::now())?;
        self.persist(&session, ReportKind::CashDifference, &report, report.generated_at)
            .await?;
        Ok(report)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, session_id = %session_id), err)]
    pub async fn payment_breakdown_report(
        &self,
        tenant_id: TenantId,
        session_id: SessionId,
    ) -> CashDrawerResult<PaymentBreakdownReport> {
        let (session, transactions) = self.load(tenant_id, session_id).await?;
        let report = PaymentBreakdownReport::build(&session, &transactions, Utc::now())?;
        self.persist(&session, ReportKind::PaymentBreakdown, &report, report.generated_at)
            .await?;
        Ok(report)
    }

    /// Persisted snapshots for a session, newest first.
    pub async fn history(
        &self,
        tenant_id: TenantId,
        session_id: SessionId,
        kind: Option<ReportKind>,
    ) -> CashDrawerResult<Vec<Report>> {
        self.session(tenant_id, session_id).await?;
        Ok(self.store.list_reports(tenant_id, session_id, kind).await?)
    }

    async fn persist<T: Serialize>(
        &self,
        session: &Session,
        kind: ReportKind,
        payload: &T,
        generated_at: DateTime<Utc>,
    ) -> CashDrawerResult<ReportId> {
        let row = Report::snapshot(session.tenant_id, session.id, kind, payload, generated_at)?;
        self.store.insert_report(&row).await?;

        self.publisher
            .publish(CashDrawerEvent::ReportGenerated(ReportGenerated {
                tenant_id: session.tenant_id,
                session_id: session.id,
                report_id: row.id,
                kind,
                occurred_at: generated_at,
            }));
        Ok(row.id)
    }

    async fn session(&self, tenant_id: TenantId, session_id: SessionId) -> CashDrawerResult<Session> {
        self.store
            .get_session(tenant_id, session_id)
            .await?
            .ok_or_else(|| CashDrawerError::not_found(format!("session {session_id}")))
    }

    async fn load(
        &self,
        tenant_id: TenantId,
        session_id: SessionId,
    ) -> CashDrawerResult<(Session, Vec<Transaction>)> {
        let session = self.session(tenant_id, session_id).await?;
        let transactions = self.store.list_transactions(tenant_id, session_id).await?;
        Ok((session, transactions))
    }
}

fn ensure_ordered(start: NaiveDate, end: NaiveDate) -> CashDrawerResult<()> {
    if end < start {
        return Err(CashDrawerError::validation(format!(
            "end date {end} is before start date {start}"
        )));
    }
    Ok(())
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Exclusive upper bound for an inclusive end date.
fn day_after(date: NaiveDate) -> CashDrawerResult<DateTime<Utc>> {
    date.succ_opt()
        .map(day_start)
        .ok_or_else(|| CashDrawerError::validation(format!("date {date} is out of range")))
}
