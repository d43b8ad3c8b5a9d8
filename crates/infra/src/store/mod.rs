//! Ledger Store boundary.
//!
//! Durable storage for sessions, transactions and reports. Every method is
//! tenant-scoped; implementations must never return or touch another
//! tenant's rows.
//!
//! The store is the authoritative guard for the uniqueness rules that are
//! check-then-act races at the service level:
//!
//! - at most one `OPEN` session per tenant
//! - `session_number` unique per tenant
//! - at most one `SALE` per `(session_id, order_id)`
//!
//! Violations surface as [`StoreError::Conflict`]. Services still pre-check
//! so callers get a clearer message in the common case.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use cashdrawer_core::{OrderId, SessionId, TenantId, TransactionId, UserId};
use cashdrawer_ledger::{Report, ReportKind, Session, SessionClosing, SessionStatus, Transaction};

pub use in_memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness rule was violated by a concurrent or duplicate write.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("stored row could not be decoded: {0}")]
    Serialization(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Pagination parameters for listing queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    /// 0-based.
    pub offset: u32,
}

impl Pagination {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const MAX_LIMIT: u32 = 500;

    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, Self::MAX_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }

    /// 1-based page helper.
    pub fn page(page: u32, per_page: u32) -> Self {
        let per_page = per_page.clamp(1, Self::MAX_LIMIT);
        Self {
            limit: per_page,
            offset: page.saturating_sub(1).saturating_mul(per_page),
        }
    }

    pub(crate) fn apply<T>(&self, rows: Vec<T>) -> Vec<T> {
        rows.into_iter()
            .skip(self.offset as usize)
            .take(self.limit as usize)
            .collect()
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Sort order for session listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionOrder {
    /// Newest session first.
    #[default]
    NumberDesc,
    /// Most recently closed first; open sessions sort last.
    ClosedAtDesc,
}

/// Filter criteria for session listings. All fields are optional and ANDed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFilter {
    pub status: Option<SessionStatus>,
    pub cashier_id: Option<UserId>,
    /// Inclusive lower bound on `opened_at`.
    pub opened_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `opened_at`.
    pub opened_until: Option<DateTime<Utc>>,
    /// Inclusive lower bound on `closed_at`.
    pub closed_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `closed_at`.
    pub closed_until: Option<DateTime<Utc>>,
    pub order: SessionOrder,
}

impl SessionFilter {
    pub fn matches(&self, session: &Session) -> bool {
        fn within(
            at: Option<DateTime<Utc>>,
            from: Option<DateTime<Utc>>,
            until: Option<DateTime<Utc>>,
        ) -> bool {
            if from.is_none() && until.is_none() {
                return true;
            }
            let Some(at) = at else {
                return false;
            };
            from.is_none_or(|f| at >= f) && until.is_none_or(|u| at < u)
        }

        self.status.is_none_or(|s| session.status == s)
            && self.cashier_id.is_none_or(|c| session.cashier_id == Some(c))
            && within(Some(session.opened_at), self.opened_from, self.opened_until)
            && within(session.closed_at, self.closed_from, self.closed_until)
    }
}

/// Tenant-scoped persistence for the cash-drawer ledger.
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert a freshly opened session.
    ///
    /// Fails with `Conflict` if the tenant already has an `OPEN` session or
    /// the session number is taken.
    async fn insert_session(&self, session: &Session) -> StoreResult<()>;

    async fn get_session(&self, tenant_id: TenantId, id: SessionId) -> StoreResult<Option<Session>>;

    /// Highest session number ever assigned for the tenant.
    async fn latest_session_number(&self, tenant_id: TenantId) -> StoreResult<Option<u64>>;

    async fn find_open_session(&self, tenant_id: TenantId) -> StoreResult<Option<Session>>;

    /// Most recently opened `OPEN` session opened by `user_id`.
    async fn find_open_session_for_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> StoreResult<Option<Session>>;

    /// Write the close-time fields in one update, only if the session is
    /// still `OPEN`. Returns `None` when no open session matched.
    async fn close_session(
        &self,
        tenant_id: TenantId,
        id: SessionId,
        closing: &SessionClosing,
    ) -> StoreResult<Option<Session>>;

    /// `None` pagination returns every match.
    async fn list_sessions(
        &self,
        tenant_id: TenantId,
        filter: &SessionFilter,
        pagination: Option<Pagination>,
    ) -> StoreResult<Vec<Session>>;

    /// Fails with `Conflict` on a second `SALE` for the same order in a session.
    async fn insert_transaction(&self, transaction: &Transaction) -> StoreResult<()>;

    async fn get_transaction(
        &self,
        tenant_id: TenantId,
        id: TransactionId,
    ) -> StoreResult<Option<Transaction>>;

    /// Newest first, by insertion order.
    async fn list_transactions(
        &self,
        tenant_id: TenantId,
        session_id: SessionId,
    ) -> StoreResult<Vec<Transaction>>;

    async fn find_sale_for_order(
        &self,
        tenant_id: TenantId,
        session_id: SessionId,
        order_id: OrderId,
    ) -> StoreResult<Option<Transaction>>;

    /// Hard-delete a transaction, only while its session is `OPEN`.
    /// Returns `false` when nothing was deleted.
    async fn delete_transaction(&self, tenant_id: TenantId, id: TransactionId) -> StoreResult<bool>;

    async fn insert_report(&self, report: &Report) -> StoreResult<()>;

    /// Most recent report of `kind` for a session, by `generated_at`.
    async fn latest_report(
        &self,
        tenant_id: TenantId,
        session_id: SessionId,
        kind: ReportKind,
    ) -> StoreResult<Option<Report>>;

    /// Newest first.
    async fn list_reports(
        &self,
        tenant_id: TenantId,
        session_id: SessionId,
        kind: Option<ReportKind>,
    ) -> StoreResult<Vec<Report>>;
}

#[async_trait::async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn insert_session(&self, session: &Session) -> StoreResult<()> {
        (**self).insert_session(session).await
    }

    async fn get_session(&self, tenant_id: TenantId, id: SessionId) -> StoreResult<Option<Session>> {
        (**self).get_session(tenant_id, id).await
    }

    async fn latest_session_number(&self, tenant_id: TenantId) -> StoreResult<Option<u64>> {
        (**self).latest_session_number(tenant_id).await
    }

    async fn find_open_session(&self, tenant_id: TenantId) -> StoreResult<Option<Session>> {
        (**self).find_open_session(tenant_id).await
    }

    async fn find_open_session_for_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> StoreResult<Option<Session>> {
        (**self).find_open_session_for_user(tenant_id, user_id).await
    }

    async fn close_session(
        &self,
        tenant_id: TenantId,
        id: SessionId,
        closing: &SessionClosing,
    ) -> StoreResult<Option<Session>> {
        (**self).close_session(tenant_id, id, closing).await
    }

    async fn list_sessions(
        &self,
        tenant_id: TenantId,
        filter: &SessionFilter,
        pagination: Option<Pagination>,
    ) -> StoreResult<Vec<Session>> {
        (**self).list_sessions(tenant_id, filter, pagination).await
    }

    async fn insert_transaction(&self, transaction: &Transaction) -> StoreResult<()> {
        (**self).insert_transaction(transaction).await
    }

    async fn get_transaction(
        &self,
        tenant_id: TenantId,
        id: TransactionId,
    ) -> StoreResult<Option<Transaction>> {
        (**self).get_transaction(tenant_id, id).await
    }

    async fn list_transactions(
        &self,
        tenant_id: TenantId,
        session_id: SessionId,
    ) -> StoreResult<Vec<Transaction>> {
        (**self).list_transactions(tenant_id, session_id).await
    }

    async fn find_sale_for_order(
        &self,
        tenant_id: TenantId,
        session_id: SessionId,
        order_id: OrderId,
    ) -> StoreResult<Option<Transaction>> {
        (**self).find_sale_for_order(tenant_id, session_id, order_id).await
    }

    async fn delete_transaction(&self, tenant_id: TenantId, id: TransactionId) -> StoreResult<bool> {
        (**self).delete_transaction(tenant_id, id).await
    }

    async fn insert_report(&self, report: &Report) -> StoreResult<()> {
        (**self).insert_report(report).await
    }

    async fn latest_report(
        &self,
        tenant_id: TenantId,
        session_id: SessionId,
        kind: ReportKind,
    ) -> StoreResult<Option<Report>> {
        (**self).latest_report(tenant_id, session_id, kind).await
    }

    async fn list_reports(
        &self,
        tenant_id: TenantId,
        session_id: SessionId,
        kind: Option<ReportKind>,
    ) -> StoreResult<Vec<Report>> {
        (**self).list_reports(tenant_id, session_id, kind).await
    }
}
