//! Session lifecycle: open, look up, close.

use chrono::Utc;
use tracing::{info, instrument, warn};

use cashdrawer_core::{Money, SessionId, TenantId, UserId};
use cashdrawer_ledger::calculation::{self, cash_difference};
use cashdrawer_ledger::events::{ReportGenerated, SessionClosed, SessionOpened};
use cashdrawer_ledger::session::merge_notes;
use cashdrawer_ledger::{
    CashDifferenceReport, CashDrawerEvent, DenominationCount, DenominationTable, OpenSession,
    Report, ReportKind, Session, Transaction,
};

use super::error::{CashDrawerError, CashDrawerResult};
use crate::publisher::EventPublisher;
use crate::store::{LedgerStore, Pagination, SessionFilter, StoreError};

/// Owns the `OPEN → CLOSED` lifecycle and the one-open-session rule.
///
/// The store's uniqueness constraint is the authoritative guard against
/// concurrent opens; the pre-check here only produces a clearer message.
#[derive(Debug, Clone)]
pub struct SessionManager<S> {
    store: S,
    denominations: DenominationTable,
    publisher: EventPublisher,
}

impl<S> SessionManager<S> {
    pub fn new(store: S, denominations: DenominationTable, publisher: EventPublisher) -> Self {
        Self {
            store,
            denominations,
            publisher,
        }
    }

    pub fn denominations(&self) -> &DenominationTable {
        &self.denominations
    }
}

impl<S> SessionManager<S>
where
    S: LedgerStore,
{
    #[instrument(skip(self), fields(tenant_id = %tenant_id, opened_by = %opened_by), err)]
    pub async fn open(
        &self,
        tenant_id: TenantId,
        opened_by: UserId,
        cashier_id: Option<UserId>,
        initial_balance: Money,
    ) -> CashDrawerResult<Session> {
        if let Some(existing) = self.store.find_open_session(tenant_id).await? {
            warn!(open_session = existing.session_number, "rejected second open session");
            return Err(CashDrawerError::conflict(format!(
                "session {} is already open for this tenant",
                existing.session_number
            )));
        }

        let latest = self.store.latest_session_number(tenant_id).await?;
        let cmd = OpenSession {
            tenant_id,
            opened_by,
            cashier_id,
            initial_balance,
        };
        let session = Session::open(&cmd, Session::next_number(latest), Utc::now())?;

        // Lost a race with a concurrent open: the store's constraint decides.
        if let Err(err) = self.store.insert_session(&session).await {
            if matches!(err, StoreError::Conflict(_)) {
                warn!(error = %err, "concurrent open rejected by store");
            }
            return Err(err.into());
        }

        info!(
            session_id = %session.id,
            session_number = session.session_number,
            initial_balance = %session.initial_balance,
            "session opened"
        );
        self.publisher.publish(CashDrawerEvent::SessionOpened(SessionOpened {
            tenant_id,
            session_id: session.id,
            session_number: session.session_number,
            opened_by,
            initial_balance: session.initial_balance,
            occurred_at: session.opened_at,
        }));

        Ok(session)
    }

    pub async fn get(&self, tenant_id: TenantId, session_id: SessionId) -> CashDrawerResult<Session> {
        self.store
            .get_session(tenant_id, session_id)
            .await?
            .ok_or_else(|| CashDrawerError::not_found(format!("session {session_id}")))
    }

    /// The user's active shift, if any. No match is not an error.
    pub async fn get_current(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> CashDrawerResult<Option<Session>> {
        Ok(self
            .store
            .find_open_session_for_user(tenant_id, user_id)
            .await?)
    }

    pub async fn list(
        &self,
        tenant_id: TenantId,
        filter: &SessionFilter,
        pagination: Pagination,
    ) -> CashDrawerResult<Vec<Session>> {
        Ok(self
            .store
            .list_sessions(tenant_id, filter, Some(pagination))
            .await?)
    }

    /// Close with a directly supplied counted balance.
    #[instrument(skip(self, notes), fields(tenant_id = %tenant_id, session_id = %session_id), err)]
    pub async fn close(
        &self,
        tenant_id: TenantId,
        session_id: SessionId,
        final_balance: Money,
        notes: Option<String>,
    ) -> CashDrawerResult<Session> {
        self.close_counted(tenant_id, session_id, final_balance, notes)
            .await
    }

    /// Close with the counted balance derived from bill and coin counts.
    /// The per-denomination breakdown is appended to the notes.
    #[instrument(skip(self, counts, notes), fields(tenant_id = %tenant_id, session_id = %session_id), err)]
    pub async fn close_with_denominations(
        &self,
        tenant_id: TenantId,
        session_id: SessionId,
        counts: &[DenominationCount],
        notes: Option<String>,
    ) -> CashDrawerResult<Session> {
        let counted = self.denominations.count(counts)?;
        let notes = merge_notes(notes.as_deref(), Some(counted.audit_note().as_str()));
        self.close_counted(tenant_id, session_id, counted.total, notes)
            .await
    }

    async fn close_counted(
        &self,
        tenant_id: TenantId,
        session_id: SessionId,
        counted: Money,
        notes: Option<String>,
    ) -> CashDrawerResult<Session> {
        let session = self
            .store
            .get_session(tenant_id, session_id)
            .await?
            .ok_or_else(|| CashDrawerError::validation(format!("session {session_id} not found")))?;
        if let Err(err) = session.ensure_open() {
            warn!(session_number = session.session_number, "rejected close of a closed session");
            return Err(err.into());
        }

        let transactions = self.store.list_transactions(tenant_id, session_id).await?;
        let expected = calculation::expected_balance(session.initial_balance, &transactions)?;
        let closing = session.prepare_close(expected, counted, notes, Utc::now())?;
        let difference = cash_difference(closing.actual_balance, closing.expected_balance)?;

        let closed = self
            .store
            .close_session(tenant_id, session_id, &closing)
            .await?
            .ok_or_else(|| {
                CashDrawerError::validation(format!("session {session_id} is no longer open"))
            })?;

        info!(
            session_number = closed.session_number,
            expected_balance = %closing.expected_balance,
            actual_balance = %closing.actual_balance,
            difference = %difference,
            "session closed"
        );
        self.publisher.publish(CashDrawerEvent::SessionClosed(SessionClosed {
            tenant_id,
            session_id,
            session_number: closed.session_number,
            expected_balance: closing.expected_balance,
            actual_balance: closing.actual_balance,
            cash_difference: difference,
            occurred_at: closing.closed_at,
        }));

        self.record_close_snapshot(&closed, &transactions).await;
        Ok(closed)
    }

    /// Persist the CASH_DIFFERENCE snapshot taken at close.
    ///
    /// The close itself has already committed; a failure here is logged and
    /// the snapshot can be regenerated from the closed session.
    async fn record_close_snapshot(&self, closed: &Session, transactions: &[Transaction]) {
        let generated_at = closed.closed_at.unwrap_or_else(Utc::now);
        let row = match CashDifferenceReport::build(closed, transactions, generated_at).and_then(
            |report| {
                Report::snapshot(
                    closed.tenant_id,
                    closed.id,
                    ReportKind::CashDifference,
                    &report,
                    generated_at,
                )
            },
        ) {
            Ok(row) => row,
            Err(err) => {
                warn!(error = %err, "could not build close snapshot");
                return;
            }
        };

        match self.store.insert_report(&row).await {
            Ok(()) => self.publisher.publish(CashDrawerEvent::ReportGenerated(ReportGenerated {
                tenant_id: closed.tenant_id,
                session_id: closed.id,
                report_id: row.id,
                kind: ReportKind::CashDifference,
                occurred_at: generated_at,
            })),
            Err(err) => warn!(error = %err, session_id = %closed.id, "could not persist close snapshot"),
        }
    }
}
