//! Infrastructure layer for the cash drawer: storage adapters, configuration,
//! event publishing and the application services built on them.

pub mod config;
pub mod orders;
pub mod publisher;
pub mod services;
pub mod store;


pub use config::CashDrawerConfig;
pub use orders::{InMemoryOrderBook, OrderService, OrderServiceError, OrderSnapshot};
pub use publisher::{CashDrawerEnvelope, EventPublisher};
pub use services::{
    CashDrawer, CashDrawerError, CashDrawerResult, PaymentBridge, ReportAggregator,
    SessionManager, TransactionLedger,
};
pub use store::{
    InMemoryLedgerStore, LedgerStore, Pagination, PostgresLedgerStore, SessionFilter,
    SessionOrder, StoreError,
};
