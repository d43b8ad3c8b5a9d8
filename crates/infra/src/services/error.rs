use thiserror::Error;

use cashdrawer_core::DomainError;

use crate::orders::OrderServiceError;
use crate::store::StoreError;

/// Error returned by every cash-drawer service operation.
#[derive(Debug, Error)]
pub enum CashDrawerError {
    /// Second open session for a tenant, or a duplicate sale for an order.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Wrong state or bad input (session not open, no open shift, order
    /// already paid, delete on a closed session).
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    /// A stored record broke a domain invariant (e.g. an unreadable report payload).
    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Order(#[from] OrderServiceError),
}

pub type CashDrawerResult<T> = Result<T, CashDrawerError>;

impl CashDrawerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Client errors map to 4xx-style responses in the transport layer;
    /// everything else is an infrastructure failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CashDrawerError::Conflict(_)
                | CashDrawerError::Validation(_)
                | CashDrawerError::NotFound(_)
        )
    }
}

impl From<DomainError> for CashDrawerError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                CashDrawerError::Validation(msg)
            }
            DomainError::Conflict(msg) => CashDrawerError::Conflict(msg),
            DomainError::NotFound(msg) => CashDrawerError::NotFound(msg),
            DomainError::InvariantViolation(msg) => CashDrawerError::Invariant(msg),
        }
    }
}

impl From<StoreError> for CashDrawerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => CashDrawerError::Conflict(msg),
            StoreError::TenantIsolation(msg) => CashDrawerError::TenantIsolation(msg),
            other => CashDrawerError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_conflicts_surface_as_conflicts() {
        let err: CashDrawerError = StoreError::Conflict("dup".into()).into();
        assert!(matches!(err, CashDrawerError::Conflict(_)));
        assert!(err.is_client_error());
    }

    #[test]
    fn storage_failures_are_not_client_errors() {
        let err: CashDrawerError = StoreError::Storage("down".into()).into();
        assert!(!err.is_client_error());
    }

    #[test]
    fn domain_errors_keep_their_category() {
        let err: CashDrawerError = DomainError::validation("bad").into();
        assert!(matches!(err, CashDrawerError::Validation(_)));
        let err: CashDrawerError = DomainError::not_found("session").into();
        assert!(matches!(err, CashDrawerError::NotFound(_)));
    }
}
