use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cashdrawer_core::{Money, OrderId, ReportId, SessionId, TenantId, TransactionId, UserId};
use cashdrawer_events::Event;

use crate::report::ReportKind;
use crate::transaction::TransactionType;

/// Event: SessionOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOpened {
    pub tenant_id: TenantId,
    pub session_id: SessionId,
    pub session_number: u64,
    pub opened_by: UserId,
    pub initial_balance: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SessionClosed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClosed {
    pub tenant_id: TenantId,
    pub session_id: SessionId,
    pub session_number: u64,
    pub expected_balance: Money,
    pub actual_balance: Money,
    pub cash_difference: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransactionRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecorded {
    pub tenant_id: TenantId,
    pub session_id: SessionId,
    pub transaction_id: TransactionId,
    pub kind: TransactionType,
    pub amount: Money,
    pub order_id: Option<OrderId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransactionDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDeleted {
    pub tenant_id: TenantId,
    pub session_id: SessionId,
    pub transaction_id: TransactionId,
    pub deleted_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReportGenerated (cuts, difference and breakdown snapshots).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportGenerated {
    pub tenant_id: TenantId,
    pub session_id: SessionId,
    pub report_id: ReportId,
    pub kind: ReportKind,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CashDrawerEvent {
    SessionOpened(SessionOpened),
    SessionClosed(SessionClosed),
    TransactionRecorded(TransactionRecorded),
    TransactionDeleted(TransactionDeleted),
    ReportGenerated(ReportGenerated),
}

impl CashDrawerEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            CashDrawerEvent::SessionOpened(e) => e.tenant_id,
            CashDrawerEvent::SessionClosed(e) => e.tenant_id,
            CashDrawerEvent::TransactionRecorded(e) => e.tenant_id,
            CashDrawerEvent::TransactionDeleted(e) => e.tenant_id,
            CashDrawerEvent::ReportGenerated(e) => e.tenant_id,
        }
    }

    /// Every event belongs to one session's stream.
    pub fn session_id(&self) -> SessionId {
        match self {
            CashDrawerEvent::SessionOpened(e) => e.session_id,
            CashDrawerEvent::SessionClosed(e) => e.session_id,
            CashDrawerEvent::TransactionRecorded(e) => e.session_id,
            CashDrawerEvent::TransactionDeleted(e) => e.session_id,
            CashDrawerEvent::ReportGenerated(e) => e.session_id,
        }
    }
}

impl Event for CashDrawerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CashDrawerEvent::SessionOpened(_) => "cashdrawer.session.opened",
            CashDrawerEvent::SessionClosed(_) => "cashdrawer.session.closed",
            CashDrawerEvent::TransactionRecorded(_) => "cashdrawer.transaction.recorded",
            CashDrawerEvent::TransactionDeleted(_) => "cashdrawer.transaction.deleted",
            CashDrawerEvent::ReportGenerated(_) => "cashdrawer.report.generated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CashDrawerEvent::SessionOpened(e) => e.occurred_at,
            CashDrawerEvent::SessionClosed(e) => e.occurred_at,
            CashDrawerEvent::TransactionRecorded(e) => e.occurred_at,
            CashDrawerEvent::TransactionDeleted(e) => e.occurred_at,
            CashDrawerEvent::ReportGenerated(e) => e.occurred_at,
        }
    }
}
