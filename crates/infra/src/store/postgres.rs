//! Postgres-backed ledger store.
//!
//! The uniqueness rules are enforced by indexes declared in
//! `migrations/0001_cash_drawer.sql`:
//!
//! | Index | Rule |
//! |-------|------|
//! | `cash_sessions_one_open_per_tenant` | at most one `OPEN` session per tenant |
//! | `cash_sessions_tenant_number` | session numbers unique per tenant |
//! | `cash_transactions_one_sale_per_order` | one `SALE` per `(session_id, order_id)` |
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (foreign key violation) | `23503` | `TenantIsolation` |
//! | Database (other) | Any other | `Storage` |
//! | PoolClosed / other | N/A | `Storage` |
//!
//! Listing order never relies on id ordering: transactions and reports carry
//! a `BIGSERIAL seq` column that records insertion order.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::instrument;

use cashdrawer_core::{Money, OrderId, ReportId, SessionId, TenantId, TransactionId, UserId};
use cashdrawer_ledger::{
    PaymentMethod, Report, ReportKind, Session, SessionClosing, SessionStatus, Transaction,
    TransactionType,
};

use super::{LedgerStore, Pagination, SessionFilter, SessionOrder, StoreError, StoreResult};

const SESSION_COLUMNS: &str = "id, tenant_id, session_number, opened_by, cashier_id, opened_at, \
     closed_at, initial_balance, expected_balance, actual_balance, final_balance, status, notes";

const TRANSACTION_COLUMNS: &str = "id, tenant_id, session_id, kind, amount, description, \
     order_id, payment_method, created_by, created_at";

const REPORT_COLUMNS: &str = "id, tenant_id, session_id, kind, payload, generated_at";

/// Postgres-backed ledger store.
///
/// Every query filters by `tenant_id`. `PgPool` is `Send + Sync` and cheap to
/// clone; the store can be shared behind an `Arc` across services.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&*self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("migration failed: {e}")))
    }
}

#[async_trait::async_trait]
impl LedgerStore for PostgresLedgerStore {
    #[instrument(skip(self, session), fields(tenant_id = %session.tenant_id, session_id = %session.id), err)]
    async fn insert_session(&self, session: &Session) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO cash_sessions (
                id, tenant_id, session_number, opened_by, cashier_id, opened_at,
                closed_at, initial_balance, expected_balance, actual_balance,
                final_balance, status, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(session.id.as_uuid())
        .bind(session.tenant_id.as_uuid())
        .bind(session.session_number as i64)
        .bind(session.opened_by.as_uuid())
        .bind(session.cashier_id.map(|c| *c.as_uuid()))
        .bind(session.opened_at)
        .bind(session.closed_at)
        .bind(session.initial_balance.minor_units())
        .bind(session.expected_balance.map(Money::minor_units))
        .bind(session.actual_balance.map(Money::minor_units))
        .bind(session.final_balance.map(Money::minor_units))
        .bind(session.status.as_str())
        .bind(session.notes.as_deref())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_session", e))?;

        Ok(())
    }

    async fn get_session(&self, tenant_id: TenantId, id: SessionId) -> StoreResult<Option<Session>> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM cash_sessions WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant_id.as_uuid())
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_session", e))?;

        row.as_ref().map(decode_session).transpose()
    }

    async fn latest_session_number(&self, tenant_id: TenantId) -> StoreResult<Option<u64>> {
        let row = sqlx::query(
            "SELECT MAX(session_number) AS latest FROM cash_sessions WHERE tenant_id = $1",
        )
        .bind(tenant_id.as_uuid())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("latest_session_number", e))?;

        let latest: Option<i64> = row
            .try_get("latest")
            .map_err(|e| StoreError::Serialization(format!("failed to read latest: {e}")))?;
        Ok(latest.map(|n| n as u64))
    }

    async fn find_open_session(&self, tenant_id: TenantId) -> StoreResult<Option<Session>> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM cash_sessions WHERE tenant_id = $1 AND status = 'OPEN'"
        ))
        .bind(tenant_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_open_session", e))?;

        row.as_ref().map(decode_session).transpose()
    }

    async fn find_open_session_for_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> StoreResult<Option<Session>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {SESSION_COLUMNS} FROM cash_sessions
            WHERE tenant_id = $1 AND opened_by = $2 AND status = 'OPEN'
            ORDER BY opened_at DESC, session_number DESC
            LIMIT 1
            "#
        ))
        .bind(tenant_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_open_session_for_user", e))?;

        row.as_ref().map(decode_session).transpose()
    }

    #[instrument(skip(self, closing), fields(tenant_id = %tenant_id, session_id = %id), err)]
    async fn close_session(
        &self,
        tenant_id: TenantId,
        id: SessionId,
        closing: &SessionClosing,
    ) -> StoreResult<Option<Session>> {
        // Single conditional update: the balance fields land together or not at all.
        let row = sqlx::query(&format!(
            r#"
            UPDATE cash_sessions
            SET status = 'CLOSED',
                closed_at = $3,
                expected_balance = $4,
                actual_balance = $5,
                final_balance = $5,
                notes = $6
            WHERE tenant_id = $1 AND id = $2 AND status = 'OPEN'
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(tenant_id.as_uuid())
        .bind(id.as_uuid())
        .bind(closing.closed_at)
        .bind(closing.expected_balance.minor_units())
        .bind(closing.actual_balance.minor_units())
        .bind(closing.notes.as_deref())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("close_session", e))?;

        row.as_ref().map(decode_session).transpose()
    }

    async fn list_sessions(
        &self,
        tenant_id: TenantId,
        filter: &SessionFilter,
        pagination: Option<Pagination>,
    ) -> StoreResult<Vec<Session>> {
        let order_by = match filter.order {
            SessionOrder::NumberDesc => "session_number DESC",
            SessionOrder::ClosedAtDesc => "closed_at DESC NULLS LAST, session_number DESC",
        };

        // LIMIT NULL is LIMIT ALL in Postgres.
        let rows = sqlx::query(&format!(
            r#"
            SELECT {SESSION_COLUMNS} FROM cash_sessions
            WHERE tenant_id = $1
                AND ($2::text IS NULL OR status = $2)
                AND ($3::uuid IS NULL OR cashier_id = $3)
                AND ($4::timestamptz IS NULL OR opened_at >= $4)
                AND ($5::timestamptz IS NULL OR opened_at < $5)
                AND ($6::timestamptz IS NULL OR closed_at >= $6)
                AND ($7::timestamptz IS NULL OR closed_at < $7)
            ORDER BY {order_by}
            LIMIT $8 OFFSET $9
            "#
        ))
        .bind(tenant_id.as_uuid())
        .bind(filter.status.map(SessionStatus::as_str))
        .bind(filter.cashier_id.map(|c| *c.as_uuid()))
        .bind(filter.opened_from)
        .bind(filter.opened_until)
        .bind(filter.closed_from)
        .bind(filter.closed_until)
        .bind(pagination.map(|p| i64::from(p.limit)))
        .bind(pagination.map_or(0, |p| i64::from(p.offset)))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_sessions", e))?;

        rows.iter().map(decode_session).collect()
    }

    #[instrument(
        skip(self, transaction),
        fields(tenant_id = %transaction.tenant_id, session_id = %transaction.session_id, kind = %transaction.kind),
        err
    )]
    async fn insert_transaction(&self, transaction: &Transaction) -> StoreResult<()> {
        // The EXISTS guard keeps a transaction from landing on another tenant's session.
        let result = sqlx::query(
            r#"
            INSERT INTO cash_transactions (
                id, tenant_id, session_id, kind, amount, description,
                order_id, payment_method, created_by, created_at
            )
            SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9, $10
            WHERE EXISTS (SELECT 1 FROM cash_sessions WHERE id = $3 AND tenant_id = $2)
            "#,
        )
        .bind(transaction.id.as_uuid())
        .bind(transaction.tenant_id.as_uuid())
        .bind(transaction.session_id.as_uuid())
        .bind(transaction.kind.as_str())
        .bind(transaction.amount.minor_units())
        .bind(&transaction.description)
        .bind(transaction.order_id.map(|o| *o.as_uuid()))
        .bind(transaction.payment_method.map(PaymentMethod::as_str))
        .bind(transaction.created_by.as_uuid())
        .bind(transaction.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_transaction", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::TenantIsolation(format!(
                "tenant {} has no session {}",
                transaction.tenant_id, transaction.session_id
            )));
        }
        Ok(())
    }

    async fn get_transaction(
        &self,
        tenant_id: TenantId,
        id: TransactionId,
    ) -> StoreResult<Option<Transaction>> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM cash_transactions WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant_id.as_uuid())
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_transaction", e))?;

        row.as_ref().map(decode_transaction).transpose()
    }

    async fn list_transactions(
        &self,
        tenant_id: TenantId,
        session_id: SessionId,
    ) -> StoreResult<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS} FROM cash_transactions
            WHERE tenant_id = $1 AND session_id = $2
            ORDER BY seq DESC
            "#
        ))
        .bind(tenant_id.as_uuid())
        .bind(session_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_transactions", e))?;

        rows.iter().map(decode_transaction).collect()
    }

    async fn find_sale_for_order(
        &self,
        tenant_id: TenantId,
        session_id: SessionId,
        order_id: OrderId,
    ) -> StoreResult<Option<Transaction>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS} FROM cash_transactions
            WHERE tenant_id = $1 AND session_id = $2 AND order_id = $3 AND kind = 'SALE'
            LIMIT 1
            "#
        ))
        .bind(tenant_id.as_uuid())
        .bind(session_id.as_uuid())
        .bind(order_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_sale_for_order", e))?;

        row.as_ref().map(decode_transaction).transpose()
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, transaction_id = %id), err)]
    async fn delete_transaction(&self, tenant_id: TenantId, id: TransactionId) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM cash_transactions t
            USING cash_sessions s
            WHERE t.tenant_id = $1
                AND t.id = $2
                AND s.id = t.session_id
                AND s.tenant_id = $1
                AND s.status = 'OPEN'
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(id.as_uuid())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("delete_transaction", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_report(&self, report: &Report) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO cash_reports (id, tenant_id, session_id, kind, payload, generated_at)
            SELECT $1, $2, $3, $4, $5, $6
            WHERE EXISTS (SELECT 1 FROM cash_sessions WHERE id = $3 AND tenant_id = $2)
            "#,
        )
        .bind(report.id.as_uuid())
        .bind(report.tenant_id.as_uuid())
        .bind(report.session_id.as_uuid())
        .bind(report.kind.as_str())
        .bind(&report.payload)
        .bind(report.generated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_report", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::TenantIsolation(format!(
                "tenant {} has no session {}",
                report.tenant_id, report.session_id
            )));
        }
        Ok(())
    }

    async fn latest_report(
        &self,
        tenant_id: TenantId,
        session_id: SessionId,
        kind: ReportKind,
    ) -> StoreResult<Option<Report>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {REPORT_COLUMNS} FROM cash_reports
            WHERE tenant_id = $1 AND session_id = $2 AND kind = $3
            ORDER BY generated_at DESC, seq DESC
            LIMIT 1
            "#
        ))
        .bind(tenant_id.as_uuid())
        .bind(session_id.as_uuid())
        .bind(kind.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("latest_report", e))?;

        row.as_ref().map(decode_report).transpose()
    }

    async fn list_reports(
        &self,
        tenant_id: TenantId,
        session_id: SessionId,
        kind: Option<ReportKind>,
    ) -> StoreResult<Vec<Report>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {REPORT_COLUMNS} FROM cash_reports
            WHERE tenant_id = $1 AND session_id = $2 AND ($3::text IS NULL OR kind = $3)
            ORDER BY generated_at DESC, seq DESC
            "#
        ))
        .bind(tenant_id.as_uuid())
        .bind(session_id.as_uuid())
        .bind(kind.map(ReportKind::as_str))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_reports", e))?;

        rows.iter().map(decode_report).collect()
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                Some("23503") => StoreError::TenantIsolation(msg),
                _ => StoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn column<'r, T>(row: &'r sqlx::postgres::PgRow, name: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Serialization(format!("failed to read {name}: {e}")))
}

fn parse<T>(raw: &str) -> StoreResult<T>
where
    T: core::str::FromStr<Err = cashdrawer_core::DomainError>,
{
    raw.parse()
        .map_err(|e: cashdrawer_core::DomainError| StoreError::Serialization(e.to_string()))
}

fn money(minor: Option<i64>) -> Option<Money> {
    minor.map(Money::from_minor)
}

fn decode_session(row: &sqlx::postgres::PgRow) -> StoreResult<Session> {
    let status: String = column(row, "status")?;
    let cashier_id: Option<uuid::Uuid> = column(row, "cashier_id")?;
    let session_number: i64 = column(row, "session_number")?;

    Ok(Session {
        id: SessionId::from_uuid(column(row, "id")?),
        tenant_id: TenantId::from_uuid(column(row, "tenant_id")?),
        session_number: session_number as u64,
        opened_by: UserId::from_uuid(column(row, "opened_by")?),
        cashier_id: cashier_id.map(UserId::from_uuid),
        opened_at: column::<DateTime<Utc>>(row, "opened_at")?,
        closed_at: column::<Option<DateTime<Utc>>>(row, "closed_at")?,
        initial_balance: Money::from_minor(column(row, "initial_balance")?),
        expected_balance: money(column(row, "expected_balance")?),
        actual_balance: money(column(row, "actual_balance")?),
        final_balance: money(column(row, "final_balance")?),
        status: parse::<SessionStatus>(&status)?,
        notes: column(row, "notes")?,
    })
}

fn decode_transaction(row: &sqlx::postgres::PgRow) -> StoreResult<Transaction> {
    let kind: String = column(row, "kind")?;
    let payment_method: Option<String> = column(row, "payment_method")?;
    let order_id: Option<uuid::Uuid> = column(row, "order_id")?;

    Ok(Transaction {
        id: TransactionId::from_uuid(column(row, "id")?),
        tenant_id: TenantId::from_uuid(column(row, "tenant_id")?),
        session_id: SessionId::from_uuid(column(row, "session_id")?),
        kind: parse::<TransactionType>(&kind)?,
        amount: Money::from_minor(column(row, "amount")?),
        description: column(row, "description")?,
        order_id: order_id.map(OrderId::from_uuid),
        payment_method: payment_method
            .as_deref()
            .map(parse::<PaymentMethod>)
            .transpose()?,
        created_by: UserId::from_uuid(column(row, "created_by")?),
        created_at: column(row, "created_at")?,
    })
}

fn decode_report(row: &sqlx::postgres::PgRow) -> StoreResult<Report> {
    let kind: String = column(row, "kind")?;

    Ok(Report {
        id: ReportId::from_uuid(column(row, "id")?),
        tenant_id: TenantId::from_uuid(column(row, "tenant_id")?),
        session_id: SessionId::from_uuid(column(row, "session_id")?),
        kind: parse::<ReportKind>(&kind)?,
        payload: column(row, "payload")?,
        generated_at: column(row, "generated_at")?,
    })
}
