//! Cash-drawer domain: sessions, transactions, reports, and the pure
//! calculation engine over them.
//!
//! Nothing in this crate performs IO. Services in `cashdrawer-infra` load
//! records from a store, call into these types, and persist the results.

pub mod calculation;
pub mod denomination;
pub mod events;
pub mod report;
pub mod session;
pub mod transaction;

pub use calculation::{DifferenceOutcome, PaymentBreakdown, SessionTotals};
pub use denomination::{CountedCash, Denomination, DenominationCount, DenominationTable};
pub use events::CashDrawerEvent;
pub use report::{
    CashDifferenceReport, DailySummaryReport, PaymentBreakdownReport, Report, ReportKind,
    WeeklySummaryReport,
};
pub use session::{OpenSession, Session, SessionClosing, SessionStatus};
pub use transaction::{NewTransaction, PaymentMethod, Transaction, TransactionType};
