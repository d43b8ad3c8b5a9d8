use chrono::Utc;
use tracing::{info, instrument, warn};

use cashdrawer_core::{OrderId, SessionId, TenantId, TransactionId, UserId};
use cashdrawer_ledger::calculation;
use cashdrawer_ledger::events::{TransactionDeleted, TransactionRecorded};
use cashdrawer_ledger::{CashDrawerEvent, NewTransaction, Session, Transaction, TransactionType};

use super::error::{CashDrawerError, CashDrawerResult};
use crate::publisher::EventPublisher;
use crate::store::{LedgerStore, StoreError};

/// The sole writer of movement records.
#[derive(Debug, Clone)]
pub struct TransactionLedger<S> {
    store: S,
    publisher: EventPublisher,
}

impl<S> TransactionLedger<S> {
    pub fn new(store: S, publisher: EventPublisher) -> Self {
        Self { store, publisher }
    }
}

impl<S> TransactionLedger<S>
where
    S: LedgerStore,
{
    /// Record a movement against a session.
    ///
    /// The session's status is not checked: corrections may land after
    /// close and are picked up by the live cash-difference report. Cash
    /// taken out of the drawer (expenses, withdrawals) may not push the
    /// expected balance below zero.
    #[instrument(
        skip(self, new),
        fields(tenant_id = %tenant_id, session_id = %new.session_id, kind = %new.kind),
        err
    )]
    pub async fn create(&self, tenant_id: TenantId, new: NewTransaction) -> CashDrawerResult<Transaction> {
        let session = self.session(tenant_id, new.session_id).await?;
        let transaction = Transaction::record(tenant_id, new, Utc::now())?;

        if matches!(
            transaction.kind,
            TransactionType::Expense | TransactionType::ManualWithdraw
        ) {
            let existing = self
                .store
                .list_transactions(tenant_id, session.id)
                .await?;
            let after = calculation::expected_balance(session.initial_balance, &existing)?
                .checked_add(transaction.amount)
                .ok_or_else(|| CashDrawerError::validation("expected balance overflow"))?;
            if after.is_negative() {
                warn!(expected_after = %after, "rejected withdrawal beyond drawer balance");
                return Err(CashDrawerError::validation(format!(
                    "{} of {} would leave the drawer at {after}",
                    transaction.kind, transaction.amount
                )));
            }
        }

        if let Err(err) = self.store.insert_transaction(&transaction).await {
            if matches!(err, StoreError::Conflict(_)) {
                warn!(error = %err, "duplicate sale rejected by store");
            }
            return Err(err.into());
        }

        info!(
            transaction_id = %transaction.id,
            amount = %transaction.amount,
            "transaction recorded"
        );
        self.publisher
            .publish(CashDrawerEvent::TransactionRecorded(TransactionRecorded {
                tenant_id,
                session_id: transaction.session_id,
                transaction_id: transaction.id,
                kind: transaction.kind,
                amount: transaction.amount,
                order_id: transaction.order_id,
                occurred_at: transaction.created_at,
            }));

        Ok(transaction)
    }

    pub async fn get(&self, tenant_id: TenantId, id: TransactionId) -> CashDrawerResult<Transaction> {
        self.store
            .get_transaction(tenant_id, id)
            .await?
            .ok_or_else(|| CashDrawerError::not_found(format!("transaction {id}")))
    }

    /// All transactions of a session, newest first.
    pub async fn list_by_session(
        &self,
        tenant_id: TenantId,
        session_id: SessionId,
    ) -> CashDrawerResult<Vec<Transaction>> {
        self.session(tenant_id, session_id).await?;
        Ok(self.store.list_transactions(tenant_id, session_id).await?)
    }

    pub async fn find_sale_for_order(
        &self,
        tenant_id: TenantId,
        session_id: SessionId,
        order_id: OrderId,
    ) -> CashDrawerResult<Option<Transaction>> {
        Ok(self
            .store
            .find_sale_for_order(tenant_id, session_id, order_id)
            .await?)
    }

    /// Hard-delete a transaction from an open session.
    ///
    /// Callers holding cached totals for the session must recompute them.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, transaction_id = %id), err)]
    pub async fn delete(
        &self,
        tenant_id: TenantId,
        id: TransactionId,
        acting_user_id: UserId,
    ) -> CashDrawerResult<bool> {
        let transaction = self.get(tenant_id, id).await?;
        let session = self.session(tenant_id, transaction.session_id).await?;
        if !session.is_open() {
            warn!(session_number = session.session_number, "rejected delete on closed session");
            return Err(CashDrawerError::validation(format!(
                "session {} is closed; its transactions are immutable",
                session.session_number
            )));
        }

        // The store re-checks OPEN in the same statement; a concurrent close wins.
        if !self.store.delete_transaction(tenant_id, id).await? {
            return Err(CashDrawerError::validation(format!(
                "session {} closed before transaction {id} could be deleted",
                session.session_number
            )));
        }

        info!(deleted_by = %acting_user_id, kind = %transaction.kind, "transaction deleted");
        self.publisher
            .publish(CashDrawerEvent::TransactionDeleted(TransactionDeleted {
                tenant_id,
                session_id: transaction.session_id,
                transaction_id: id,
                deleted_by: acting_user_id,
                occurred_at: Utc::now(),
            }));

        Ok(true)
    }

    async fn session(&self, tenant_id: TenantId, session_id: SessionId) -> CashDrawerResult<Session> {
        self.store
            .get_session(tenant_id, session_id)
            .await?
            .ok_or_else(|| CashDrawerError::not_found(format!("session {session_id}")))
    }
}
