//! Order settlement into the cash ledger.
//!
//! ```text
//! order paid → PaymentBridge::settle_order → TransactionLedger::create (SALE)
//! ```
//!
//! This is the only path by which order payments enter the ledger. Order
//! handling must not write SALE rows directly or the one-sale-per-order guard
//! is bypassed.

use tracing::{instrument, warn};

use cashdrawer_core::{OrderId, TenantId, UserId};
use cashdrawer_ledger::{NewTransaction, PaymentMethod, Transaction, TransactionType};

use super::error::{CashDrawerError, CashDrawerResult};
use super::session_manager::SessionManager;
use super::transaction_ledger::TransactionLedger;
use crate::orders::OrderService;
use crate::store::LedgerStore;

#[derive(Debug, Clone)]
pub struct PaymentBridge<S, O> {
    sessions: SessionManager<S>,
    ledger: TransactionLedger<S>,
    orders: O,
}

impl<S, O> PaymentBridge<S, O> {
    pub fn new(sessions: SessionManager<S>, ledger: TransactionLedger<S>, orders: O) -> Self {
        Self {
            sessions,
            ledger,
            orders,
        }
    }
}

impl<S, O> PaymentBridge<S, O>
where
    S: LedgerStore,
    O: OrderService,
{
    /// Record exactly one SALE for a paid order in the payer's open session.
    ///
    /// An explicit `payment_method` wins over the order's own; unknown or
    /// missing names settle as cash. Retrying after success fails with
    /// `Conflict` and leaves the single existing sale in place.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, order_id = %order_id), err)]
    pub async fn settle_order(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
        created_by: UserId,
        payment_method: Option<&str>,
    ) -> CashDrawerResult<Transaction> {
        let order = self
            .orders
            .get_order(tenant_id, order_id)
            .await?
            .ok_or_else(|| CashDrawerError::not_found(format!("order {order_id}")))?;
        if order.is_paid {
            return Err(CashDrawerError::validation(format!(
                "order {order_id} is already paid"
            )));
        }

        let session = self
            .sessions
            .get_current(tenant_id, created_by)
            .await?
            .ok_or_else(|| {
                CashDrawerError::validation("no open session: open a shift before recording sales")
            })?;

        if let Some(existing) = self
            .ledger
            .find_sale_for_order(tenant_id, session.id, order_id)
            .await?
        {
            warn!(existing_transaction = %existing.id, "duplicate settlement rejected");
            return Err(CashDrawerError::conflict(format!(
                "order {order_id} was already settled in session {}",
                session.session_number
            )));
        }

        let method = PaymentMethod::parse_lenient(payment_method.or(order.payment_method.as_deref()));

        self.ledger
            .create(
                tenant_id,
                NewTransaction {
                    session_id: session.id,
                    kind: TransactionType::Sale,
                    amount: order.total_amount,
                    description: format!("Order {order_id}"),
                    order_id: Some(order_id),
                    payment_method: Some(method),
                    created_by,
                },
            )
            .await
    }
}
