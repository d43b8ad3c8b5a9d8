//! Application services over a [`LedgerStore`](crate::store::LedgerStore).
//!
//! ```text
//! SessionManager ─┐
//! PaymentBridge ──┼─> TransactionLedger ─> LedgerStore
//! ReportAggregator┘                        └─> EventPublisher (after commit)
//! ```
//!
//! Every service is cheap to clone and generic over the store, so the same
//! code runs against Postgres in production and the in-memory store in tests.

pub mod error;
pub mod payment_bridge;
pub mod report_aggregator;
pub mod session_manager;
pub mod transaction_ledger;

pub use error::{CashDrawerError, CashDrawerResult};
pub use payment_bridge::PaymentBridge;
pub use report_aggregator::ReportAggregator;
pub use session_manager::SessionManager;
pub use transaction_ledger::TransactionLedger;

use crate::config::CashDrawerConfig;
use crate::publisher::EventPublisher;

/// All four services wired to one store and one publisher.
#[derive(Debug, Clone)]
pub struct CashDrawer<S, O> {
    pub sessions: SessionManager<S>,
    pub transactions: TransactionLedger<S>,
    pub payments: PaymentBridge<S, O>,
    pub reports: ReportAggregator<S>,
}

impl<S, O> CashDrawer<S, O>
where
    S: Clone,
{
    /// Fails only when the configured denomination table is invalid.
    pub fn new(
        store: S,
        orders: O,
        config: &CashDrawerConfig,
        publisher: EventPublisher,
    ) -> CashDrawerResult<Self> {
        let denominations = config.denomination_table()?;

        let sessions = SessionManager::new(store.clone(), denominations, publisher.clone());
        let transactions = TransactionLedger::new(store.clone(), publisher.clone());
        let payments = PaymentBridge::new(sessions.clone(), transactions.clone(), orders);
        let reports = ReportAggregator::new(store, publisher, config.default_page_size);

        Ok(Self {
            sessions,
            transactions,
            payments,
            reports,
        })
    }
}
