use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cashdrawer_core::{DomainError, DomainResult, Entity, Money, SessionId, TenantId, UserId};

use crate::calculation::resolve_counted_balance;

/// Session status lifecycle. `Open → Closed` is the only transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Open,
    Closed,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Open => "OPEN",
            SessionStatus::Closed => "CLOSED",
        }
    }
}

impl core::str::FromStr for SessionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(SessionStatus::Open),
            "CLOSED" => Ok(SessionStatus::Closed),
            other => Err(DomainError::validation(format!("unknown session status: {other}"))),
        }
    }
}

/// One cash-drawer shift for one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub tenant_id: TenantId,
    /// Unique and strictly increasing per tenant, starting at 1.
    pub session_number: u64,
    pub opened_by: UserId,
    pub cashier_id: Option<UserId>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub initial_balance: Money,
    /// Ledger prediction frozen at close.
    pub expected_balance: Option<Money>,
    /// Counted amount recorded at close.
    pub actual_balance: Option<Money>,
    /// Legacy counted amount; read only through [`Session::counted_balance`].
    pub final_balance: Option<Money>,
    pub status: SessionStatus,
    pub notes: Option<String>,
}

impl Entity for Session {
    type Id = SessionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Command: open a new shift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenSession {
    pub tenant_id: TenantId,
    pub opened_by: UserId,
    pub cashier_id: Option<UserId>,
    pub initial_balance: Money,
}

/// The close-time fields, written together in a single store update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClosing {
    pub closed_at: DateTime<Utc>,
    pub expected_balance: Money,
    pub actual_balance: Money,
    pub notes: Option<String>,
}

impl Session {
    /// Number for the next session given the tenant's highest existing one.
    pub fn next_number(latest: Option<u64>) -> u64 {
        latest.map_or(1, |n| n + 1)
    }

    pub fn open(cmd: &OpenSession, session_number: u64, opened_at: DateTime<Utc>) -> DomainResult<Session> {
        if cmd.initial_balance.is_negative() {
            return Err(DomainError::validation(format!(
                "initial balance cannot be negative: {}",
                cmd.initial_balance
            )));
        }
        if session_number == 0 {
            return Err(DomainError::invariant("session numbers start at 1"));
        }

        Ok(Session {
            id: SessionId::new(),
            tenant_id: cmd.tenant_id,
            session_number,
            opened_by: cmd.opened_by,
            cashier_id: cmd.cashier_id,
            opened_at,
            closed_at: None,
            initial_balance: cmd.initial_balance,
            expected_balance: None,
            actual_balance: None,
            final_balance: None,
            status: SessionStatus::Open,
            notes: None,
        })
    }

    pub fn is_open(&self) -> bool {
        matches!(self.status, SessionStatus::Open)
    }

    pub fn ensure_open(&self) -> DomainResult<()> {
        if !self.is_open() {
            return Err(DomainError::validation(format!(
                "session {} is not open",
                self.session_number
            )));
        }
        Ok(())
    }

    /// Decide the close-time fields. Does not mutate; see [`Session::apply_closing`].
    pub fn prepare_close(
        &self,
        expected_balance: Money,
        counted_balance: Money,
        notes: Option<String>,
        closed_at: DateTime<Utc>,
    ) -> DomainResult<SessionClosing> {
        self.ensure_open()?;

        if counted_balance.is_negative() {
            return Err(DomainError::validation(format!(
                "counted balance cannot be negative: {counted_balance}"
            )));
        }

        Ok(SessionClosing {
            closed_at: closed_at.max(self.opened_at),
            expected_balance,
            actual_balance: counted_balance,
            notes: merge_notes(self.notes.as_deref(), notes.as_deref()),
        })
    }

    pub fn apply_closing(&mut self, closing: &SessionClosing) {
        self.closed_at = Some(closing.closed_at);
        self.expected_balance = Some(closing.expected_balance);
        self.actual_balance = Some(closing.actual_balance);
        self.final_balance = Some(closing.actual_balance);
        self.notes = closing.notes.clone();
        self.status = SessionStatus::Closed;
    }

    pub fn counted_balance(&self) -> Option<Money> {
        resolve_counted_balance(self.actual_balance, self.final_balance)
    }
}

/// Append new close notes to whatever the session already carries.
pub fn merge_notes(existing: Option<&str>, added: Option<&str>) -> Option<String> {
    let existing = existing.map(str::trim).filter(|s| !s.is_empty());
    let added = added.map(str::trim).filter(|s| !s.is_empty());
    match (existing, added) {
        (Some(a), Some(b)) => Some(format!("{a}\n{b}")),
        (Some(a), None) => Some(a.to_string()),
        (None, Some(b)) => Some(b.to_string()),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_cmd(initial: i64) -> OpenSession {
        OpenSession {
            tenant_id: TenantId::new(),
            opened_by: UserId::new(),
            cashier_id: None,
            initial_balance: Money::from_minor(initial),
        }
    }

    #[test]
    fn numbering_starts_at_one_and_increments() {
        assert_eq!(Session::next_number(None), 1);
        assert_eq!(Session::next_number(Some(41)), 42);
    }

    #[test]
    fn negative_initial_balance_is_rejected() {
        let err = Session::open(&open_cmd(-1), 1, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn close_sets_balance_fields_together() {
        let mut session = Session::open(&open_cmd(10_000), 1, Utc::now()).unwrap();
        let closing = session
            .prepare_close(
                Money::from_major(140),
                Money::from_major(135),
                Some("short".into()),
                Utc::now(),
            )
            .unwrap();
        session.apply_closing(&closing);

        assert_eq!(session.status, SessionStatus::Closed);
        assert!(session.closed_at.is_some());
        assert_eq!(session.expected_balance, Some(Money::from_major(140)));
        assert_eq!(session.actual_balance, Some(Money::from_major(135)));
        assert_eq!(session.counted_balance(), Some(Money::from_major(135)));
        assert_eq!(session.notes.as_deref(), Some("short"));
    }

    #[test]
    fn closed_session_cannot_close_again() {
        let mut session = Session::open(&open_cmd(0), 1, Utc::now()).unwrap();
        let closing = session
            .prepare_close(Money::ZERO, Money::ZERO, None, Utc::now())
            .unwrap();
        session.apply_closing(&closing);

        let err = session
            .prepare_close(Money::ZERO, Money::ZERO, None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn notes_are_appended() {
        assert_eq!(merge_notes(Some("a"), Some("b")).as_deref(), Some("a\nb"));
        assert_eq!(merge_notes(None, Some("  ")), None);
        assert_eq!(merge_notes(Some("a"), None).as_deref(), Some("a"));
    }
}
