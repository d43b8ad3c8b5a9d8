use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use cashdrawer_core::{Entity, OrderId, SessionId, TenantId, TransactionId, UserId};
use cashdrawer_ledger::{Report, ReportKind, Session, SessionClosing, Transaction, TransactionType};

use super::{LedgerStore, Pagination, SessionFilter, SessionOrder, StoreError, StoreResult};

#[derive(Debug, Default)]
struct LedgerState {
    sessions: HashMap<SessionId, Session>,
    /// Insertion order; listings read it backwards.
    transactions: Vec<Transaction>,
    reports: Vec<Report>,
}

/// In-memory ledger store.
///
/// Intended for tests/dev. One lock guards all three tables, so every
/// method is a single atomic step and the uniqueness rules hold under
/// concurrent callers.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<LedgerState>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, LedgerState>> {
        self.state
            .read()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, LedgerState>> {
        self.state
            .write()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))
    }
}

fn owned_by<E: Entity>(row: &E, tenant_id: TenantId) -> bool {
    row.tenant_id() == tenant_id
}

impl LedgerState {
    fn session(&self, tenant_id: TenantId, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id).filter(|s| owned_by(*s, tenant_id))
    }

    fn tenant_sessions(&self, tenant_id: TenantId) -> impl Iterator<Item = &Session> {
        self.sessions.values().filter(move |s| owned_by(*s, tenant_id))
    }
}

#[async_trait::async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn insert_session(&self, session: &Session) -> StoreResult<()> {
        let mut state = self.write()?;

        if session.is_open() && state.tenant_sessions(session.tenant_id).any(Session::is_open) {
            return Err(StoreError::Conflict(
                "tenant already has an open session".to_string(),
            ));
        }
        if state
            .tenant_sessions(session.tenant_id)
            .any(|s| s.session_number == session.session_number)
        {
            return Err(StoreError::Conflict(format!(
                "session number {} already assigned",
                session.session_number
            )));
        }
        if state.sessions.contains_key(&session.id) {
            return Err(StoreError::Conflict(format!("session {} already exists", session.id)));
        }

        state.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn get_session(&self, tenant_id: TenantId, id: SessionId) -> StoreResult<Option<Session>> {
        Ok(self.read()?.session(tenant_id, id).cloned())
    }

    async fn latest_session_number(&self, tenant_id: TenantId) -> StoreResult<Option<u64>> {
        Ok(self
            .read()?
            .tenant_sessions(tenant_id)
            .map(|s| s.session_number)
            .max())
    }

    async fn find_open_session(&self, tenant_id: TenantId) -> StoreResult<Option<Session>> {
        Ok(self
            .read()?
            .tenant_sessions(tenant_id)
            .find(|s| s.is_open())
            .cloned())
    }

    async fn find_open_session_for_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> StoreResult<Option<Session>> {
        Ok(self
            .read()?
            .tenant_sessions(tenant_id)
            .filter(|s| s.is_open() && s.opened_by == user_id)
            .max_by_key(|s| (s.opened_at, s.session_number))
            .cloned())
    }

    async fn close_session(
        &self,
        tenant_id: TenantId,
        id: SessionId,
        closing: &SessionClosing,
    ) -> StoreResult<Option<Session>> {
        let mut state = self.write()?;
        let Some(session) = state
            .sessions
            .get_mut(&id)
            .filter(|s| s.tenant_id == tenant_id && s.is_open())
        else {
            return Ok(None);
        };

        session.apply_closing(closing);
        Ok(Some(session.clone()))
    }

    async fn list_sessions(
        &self,
        tenant_id: TenantId,
        filter: &SessionFilter,
        pagination: Option<Pagination>,
    ) -> StoreResult<Vec<Session>> {
        let state = self.read()?;
        let mut rows: Vec<Session> = state
            .tenant_sessions(tenant_id)
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();

        match filter.order {
            SessionOrder::NumberDesc => rows.sort_by(|a, b| b.session_number.cmp(&a.session_number)),
            // `None < Some`, so open sessions land at the end.
            SessionOrder::ClosedAtDesc => rows.sort_by(|a, b| {
                b.closed_at
                    .cmp(&a.closed_at)
                    .then(b.session_number.cmp(&a.session_number))
            }),
        }

        Ok(match pagination {
            Some(page) => page.apply(rows),
            None => rows,
        })
    }

    async fn insert_transaction(&self, transaction: &Transaction) -> StoreResult<()> {
        let mut state = self.write()?;

        let Some(session) = state.sessions.get(&transaction.session_id) else {
            return Err(StoreError::Storage(format!(
                "session {} does not exist",
                transaction.session_id
            )));
        };
        if session.tenant_id != transaction.tenant_id {
            return Err(StoreError::TenantIsolation(format!(
                "transaction tenant {} does not own session {}",
                transaction.tenant_id, transaction.session_id
            )));
        }
        if let (TransactionType::Sale, Some(order_id)) = (transaction.kind, transaction.order_id) {
            let duplicate = state
                .transactions
                .iter()
                .any(|t| t.session_id == transaction.session_id && t.is_sale_for(order_id));
            if duplicate {
                return Err(StoreError::Conflict(format!(
                    "order {order_id} already has a sale in session {}",
                    transaction.session_id
                )));
            }
        }

        state.transactions.push(transaction.clone());
        Ok(())
    }

    async fn get_transaction(
        &self,
        tenant_id: TenantId,
        id: TransactionId,
    ) -> StoreResult<Option<Transaction>> {
        Ok(self
            .read()?
            .transactions
            .iter()
            .find(|t| t.id == id && owned_by(*t, tenant_id))
            .cloned())
    }

    async fn list_transactions(
        &self,
        tenant_id: TenantId,
        session_id: SessionId,
    ) -> StoreResult<Vec<Transaction>> {
        Ok(self
            .read()?
            .transactions
            .iter()
            .rev()
            .filter(|t| t.tenant_id == tenant_id && t.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn find_sale_for_order(
        &self,
        tenant_id: TenantId,
        session_id: SessionId,
        order_id: OrderId,
    ) -> StoreResult<Option<Transaction>> {
        Ok(self
            .read()?
            .transactions
            .iter()
            .find(|t| t.tenant_id == tenant_id && t.session_id == session_id && t.is_sale_for(order_id))
            .cloned())
    }

    async fn delete_transaction(&self, tenant_id: TenantId, id: TransactionId) -> StoreResult<bool> {
        let mut state = self.write()?;

        let Some(pos) = state
            .transactions
            .iter()
            .position(|t| t.id == id && owned_by(t, tenant_id))
        else {
            return Ok(false);
        };
        let session_id = state.transactions[pos].session_id;
        let session_open = state
            .session(tenant_id, session_id)
            .is_some_and(Session::is_open);
        if !session_open {
            return Ok(false);
        }

        state.transactions.remove(pos);
        Ok(true)
    }

    async fn insert_report(&self, report: &Report) -> StoreResult<()> {
        let mut state = self.write()?;
        if state.session(report.tenant_id, report.session_id).is_none() {
            return Err(StoreError::TenantIsolation(format!(
                "report tenant {} does not own session {}",
                report.tenant_id, report.session_id
            )));
        }
        state.reports.push(report.clone());
        Ok(())
    }

    async fn latest_report(
        &self,
        tenant_id: TenantId,
        session_id: SessionId,
        kind: ReportKind,
    ) -> StoreResult<Option<Report>> {
        // Ties on `generated_at` go to the later insert.
        Ok(self
            .read()?
            .reports
            .iter()
            .enumerate()
            .filter(|(_, r)| r.tenant_id == tenant_id && r.session_id == session_id && r.kind == kind)
            .max_by_key(|(seq, r)| (r.generated_at, *seq))
            .map(|(_, r)| r.clone()))
    }

    async fn list_reports(
        &self,
        tenant_id: TenantId,
        session_id: SessionId,
        kind: Option<ReportKind>,
    ) -> StoreResult<Vec<Report>> {
        let state = self.read()?;
        let mut rows: Vec<(usize, Report)> = state
            .reports
            .iter()
            .enumerate()
            .filter(|(_, r)| {
                r.tenant_id == tenant_id
                    && r.session_id == session_id
                    && kind.is_none_or(|k| r.kind == k)
            })
            .map(|(seq, r)| (seq, r.clone()))
            .collect();
        rows.sort_by(|(sa, a), (sb, b)| b.generated_at.cmp(&a.generated_at).then(sb.cmp(sa)));
        Ok(rows.into_iter().map(|(_, r)| r).collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use cashdrawer_core::Money;
    use cashdrawer_ledger::{NewTransaction, OpenSession, PaymentMethod};

    use super::*;

    fn open(store_tenant: TenantId, number: u64) -> Session {
        let cmd = OpenSession {
            tenant_id: store_tenant,
            opened_by: UserId::new(),
            cashier_id: None,
            initial_balance: Money::ZERO,
        };
        Session::open(&cmd, number, Utc::now()).unwrap()
    }

    fn sale(session: &Session, order_id: Option<OrderId>) -> Transaction {
        Transaction::record(
            session.tenant_id,
            NewTransaction {
                session_id: session.id,
                kind: TransactionType::Sale,
                amount: Money::from_major(10),
                description: "sale".into(),
                order_id,
                payment_method: Some(PaymentMethod::Cash),
                created_by: session.opened_by,
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn second_open_session_is_a_conflict() {
        let store = InMemoryLedgerStore::new();
        let tenant = TenantId::new();
        store.insert_session(&open(tenant, 1)).await.unwrap();

        let err = store.insert_session(&open(tenant, 2)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        // Other tenants are unaffected.
        store.insert_session(&open(TenantId::new(), 1)).await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_sale_for_order_is_a_conflict() {
        let store = InMemoryLedgerStore::new();
        let session = open(TenantId::new(), 1);
        store.insert_session(&session).await.unwrap();
        let order = OrderId::new();

        store.insert_transaction(&sale(&session, Some(order))).await.unwrap();
        let err = store
            .insert_transaction(&sale(&session, Some(order)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(
            store
                .list_transactions(session.tenant_id, session.id)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn transactions_list_newest_first() {
        let store = InMemoryLedgerStore::new();
        let session = open(TenantId::new(), 1);
        store.insert_session(&session).await.unwrap();

        let first = sale(&session, None);
        let second = sale(&session, None);
        store.insert_transaction(&first).await.unwrap();
        store.insert_transaction(&second).await.unwrap();

        let listed = store
            .list_transactions(session.tenant_id, session.id)
            .await
            .unwrap();
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
    }

    #[tokio::test]
    async fn reads_are_tenant_scoped() {
        let store = InMemoryLedgerStore::new();
        let session = open(TenantId::new(), 1);
        store.insert_session(&session).await.unwrap();
        let tx = sale(&session, None);
        store.insert_transaction(&tx).await.unwrap();

        let other = TenantId::new();
        assert!(store.get_session(other, session.id).await.unwrap().is_none());
        assert!(store.get_transaction(other, tx.id).await.unwrap().is_none());
        assert!(!store.delete_transaction(other, tx.id).await.unwrap());
    }

    #[tokio::test]
    async fn close_only_applies_to_open_sessions() {
        let store = InMemoryLedgerStore::new();
        let session = open(TenantId::new(), 1);
        store.insert_session(&session).await.unwrap();
        let closing = session
            .prepare_close(Money::ZERO, Money::ZERO, None, Utc::now())
            .unwrap();

        let closed = store
            .close_session(session.tenant_id, session.id, &closing)
            .await
            .unwrap();
        assert!(closed.is_some_and(|s| !s.is_open()));

        let again = store
            .close_session(session.tenant_id, session.id, &closing)
            .await
            .unwrap();
        assert!(again.is_none());
    }

    #[test]
    fn pagination_slices_and_caps() {
        let page = Pagination::page(2, 3);
        assert_eq!(page.apply((1..=10).collect()), vec![4, 5, 6]);
        assert_eq!(Pagination::new(Some(10_000), None).limit, Pagination::MAX_LIMIT);
        assert_eq!(Pagination::page(0, 5).offset, 0);
    }
}
