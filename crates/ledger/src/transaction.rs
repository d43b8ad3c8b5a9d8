use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cashdrawer_core::{
    DomainError, DomainResult, Entity, Money, OrderId, SessionId, TenantId, TransactionId, UserId,
};

/// Kind of monetary movement recorded against a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Sale,
    Refund,
    Cancellation,
    Tip,
    ManualAdd,
    ManualWithdraw,
    Expense,
}

/// Direction of cash relative to the drawer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Inflow,
    Outflow,
}

/// Which per-type total a movement contributes to.
///
/// Manual adds/withdrawals have no bucket: they move the expected balance but
/// are not part of the net cash flow of the shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotalsBucket {
    Sales,
    Refunds,
    Tips,
    Expenses,
}

impl TransactionType {
    pub const ALL: [TransactionType; 7] = [
        TransactionType::Sale,
        TransactionType::Refund,
        TransactionType::Cancellation,
        TransactionType::Tip,
        TransactionType::ManualAdd,
        TransactionType::ManualWithdraw,
        TransactionType::Expense,
    ];

    pub fn flow(self) -> Flow {
        match self {
            TransactionType::Sale | TransactionType::Tip | TransactionType::ManualAdd => Flow::Inflow,
            TransactionType::Refund
            | TransactionType::Cancellation
            | TransactionType::ManualWithdraw
            | TransactionType::Expense => Flow::Outflow,
        }
    }

    pub fn bucket(self) -> Option<TotalsBucket> {
        match self {
            TransactionType::Sale => Some(TotalsBucket::Sales),
            TransactionType::Refund | TransactionType::Cancellation => Some(TotalsBucket::Refunds),
            TransactionType::Tip => Some(TotalsBucket::Tips),
            TransactionType::Expense => Some(TotalsBucket::Expenses),
            TransactionType::ManualAdd | TransactionType::ManualWithdraw => None,
        }
    }

    /// The stored amount for a movement of this type: inflows positive,
    /// outflows negative, whatever sign the caller supplied.
    pub fn signed_amount(self, amount: Money) -> DomainResult<Money> {
        let magnitude = amount
            .checked_abs()
            .ok_or_else(|| DomainError::validation(format!("amount {amount} is out of range")))?;
        match self.flow() {
            Flow::Inflow => Ok(magnitude),
            // A non-negative magnitude always negates.
            Flow::Outflow => magnitude
                .checked_neg()
                .ok_or_else(|| DomainError::validation(format!("amount {amount} is out of range"))),
        }
    }

    /// What a stored amount contributes to its bucket's reported total.
    ///
    /// Sales and tips report the raw sum; refunds and expenses report a
    /// positive magnitude that is subtracted downstream.
    pub fn reported_amount(self, stored: Money) -> DomainResult<Money> {
        match self.bucket() {
            Some(TotalsBucket::Sales) | Some(TotalsBucket::Tips) => Ok(stored),
            Some(TotalsBucket::Refunds) | Some(TotalsBucket::Expenses) => stored
                .checked_abs()
                .ok_or_else(|| DomainError::invariant(format!("stored {self} amount {stored} overflows"))),
            None => Ok(Money::ZERO),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Sale => "SALE",
            TransactionType::Refund => "REFUND",
            TransactionType::Cancellation => "CANCELLATION",
            TransactionType::Tip => "TIP",
            TransactionType::ManualAdd => "MANUAL_ADD",
            TransactionType::ManualWithdraw => "MANUAL_WITHDRAW",
            TransactionType::Expense => "EXPENSE",
        }
    }
}

impl core::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::validation(format!("unknown transaction type: {s}")))
    }
}

/// How a movement was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Card,
    Digital,
    Other,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 4] = [
        PaymentMethod::Cash,
        PaymentMethod::Card,
        PaymentMethod::Digital,
        PaymentMethod::Other,
    ];

    /// Map a client-supplied method name onto the internal set.
    ///
    /// Missing or unrecognised values settle as cash: mis-categorising a
    /// payment for reporting is preferable to rejecting it.
    pub fn parse_lenient(raw: Option<&str>) -> PaymentMethod {
        let Some(raw) = raw else {
            return PaymentMethod::Cash;
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "card" | "credit_card" | "debit_card" | "credit" | "debit" | "tarjeta" => {
                PaymentMethod::Card
            }
            "digital" | "transfer" | "bank_transfer" | "transferencia" | "wallet" | "qr" => {
                PaymentMethod::Digital
            }
            "other" | "otro" => PaymentMethod::Other,
            _ => PaymentMethod::Cash,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Digital => "digital",
            PaymentMethod::Other => "other",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = DomainError;

    /// Strict parse, used when decoding stored rows.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown payment method: {s}")))
    }
}

/// One signed monetary movement within a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub tenant_id: TenantId,
    pub session_id: SessionId,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: Money,
    pub description: String,
    pub order_id: Option<OrderId>,
    pub payment_method: Option<PaymentMethod>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl Entity for Transaction {
    type Id = TransactionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Request to record a movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub session_id: SessionId,
    pub kind: TransactionType,
    /// Magnitude or signed amount; the stored sign comes from `kind`.
    pub amount: Money,
    pub description: String,
    pub order_id: Option<OrderId>,
    pub payment_method: Option<PaymentMethod>,
    pub created_by: UserId,
}

impl Transaction {
    /// Largest magnitude a single movement may carry (ten trillion major units).
    pub const MAX_AMOUNT: Money = Money::from_minor(1_000_000_000_000_000);

    /// Build a transaction row from a request, normalising the sign.
    ///
    /// Zero is only accepted on SALE rows: a fully comped order still has to
    /// be settled exactly once.
    pub fn record(
        tenant_id: TenantId,
        new: NewTransaction,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Transaction> {
        if new.amount.is_zero() && new.kind != TransactionType::Sale {
            return Err(DomainError::validation(format!(
                "{} amount must be non-zero",
                new.kind
            )));
        }
        let amount = new.kind.signed_amount(new.amount)?;
        if amount.checked_abs().is_none_or(|m| m > Self::MAX_AMOUNT) {
            return Err(DomainError::validation(format!(
                "amount {} exceeds the per-movement limit of {}",
                new.amount,
                Self::MAX_AMOUNT
            )));
        }
        if new.order_id.is_some() && new.kind != TransactionType::Sale {
            return Err(DomainError::validation(format!(
                "order reference is only allowed on SALE transactions, got {}",
                new.kind
            )));
        }

        Ok(Transaction {
            id: TransactionId::new(),
            tenant_id,
            session_id: new.session_id,
            kind: new.kind,
            amount,
            description: new.description,
            order_id: new.order_id,
            payment_method: new.payment_method,
            created_by: new.created_by,
            created_at,
        })
    }

    pub fn is_sale_for(&self, order_id: OrderId) -> bool {
        self.kind == TransactionType::Sale && self.order_id == Some(order_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(kind: TransactionType, minor: i64) -> NewTransaction {
        NewTransaction {
            session_id: SessionId::new(),
            kind,
            amount: Money::from_minor(minor),
            description: "test".to_string(),
            order_id: None,
            payment_method: Some(PaymentMethod::Cash),
            created_by: UserId::new(),
        }
    }

    #[test]
    fn outflows_are_stored_negative_regardless_of_input_sign() {
        for minor in [2_000, -2_000] {
            let tx = Transaction::record(TenantId::new(), request(TransactionType::Expense, minor), Utc::now())
                .unwrap();
            assert_eq!(tx.amount, Money::from_minor(-2_000));
        }
    }

    #[test]
    fn inflows_are_stored_positive() {
        let tx = Transaction::record(TenantId::new(), request(TransactionType::Tip, -1_000), Utc::now())
            .unwrap();
        assert_eq!(tx.amount, Money::from_minor(1_000));
    }

    #[test]
    fn zero_amount_is_rejected_except_on_sales() {
        for kind in TransactionType::ALL.into_iter().filter(|k| *k != TransactionType::Sale) {
            let err = Transaction::record(TenantId::new(), request(kind, 0), Utc::now()).unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)), "{kind}");
        }

        let comped = Transaction::record(TenantId::new(), request(TransactionType::Sale, 0), Utc::now())
            .unwrap();
        assert_eq!(comped.amount, Money::ZERO);
    }

    #[test]
    fn out_of_range_amounts_are_rejected() {
        for minor in [i64::MIN, i64::MAX, Transaction::MAX_AMOUNT.minor_units() + 1] {
            for kind in [TransactionType::Sale, TransactionType::Expense] {
                let err = Transaction::record(TenantId::new(), request(kind, minor), Utc::now())
                    .unwrap_err();
                assert!(matches!(err, DomainError::Validation(_)), "{kind} {minor}");
            }
        }

        let at_limit = Transaction::record(
            TenantId::new(),
            request(TransactionType::Refund, Transaction::MAX_AMOUNT.minor_units()),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(at_limit.amount.checked_abs(), Some(Transaction::MAX_AMOUNT));
    }

    #[test]
    fn order_reference_only_on_sales() {
        let mut req = request(TransactionType::Refund, 500);
        req.order_id = Some(OrderId::new());
        let err = Transaction::record(TenantId::new(), req, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn reported_amount_flips_refunds_and_expenses_only() {
        let out = Money::from_minor(-300);
        assert_eq!(TransactionType::Refund.reported_amount(out), Ok(Money::from_minor(300)));
        assert_eq!(TransactionType::Cancellation.reported_amount(out), Ok(Money::from_minor(300)));
        assert_eq!(TransactionType::Expense.reported_amount(out), Ok(Money::from_minor(300)));
        assert_eq!(TransactionType::ManualWithdraw.reported_amount(out), Ok(Money::ZERO));
        assert_eq!(
            TransactionType::Sale.reported_amount(Money::from_minor(300)),
            Ok(Money::from_minor(300))
        );
        assert!(TransactionType::Refund.reported_amount(Money::from_minor(i64::MIN)).is_err());
    }

    #[test]
    fn lenient_payment_method_defaults_to_cash() {
        assert_eq!(PaymentMethod::parse_lenient(None), PaymentMethod::Cash);
        assert_eq!(PaymentMethod::parse_lenient(Some("bitcoin")), PaymentMethod::Cash);
        assert_eq!(PaymentMethod::parse_lenient(Some(" Credit_Card ")), PaymentMethod::Card);
        assert_eq!(PaymentMethod::parse_lenient(Some("transfer")), PaymentMethod::Digital);
        assert_eq!(PaymentMethod::parse_lenient(Some("other")), PaymentMethod::Other);
    }

    #[test]
    fn transaction_type_parses_its_own_names() {
        for kind in TransactionType::ALL {
            assert_eq!(kind.as_str().parse::<TransactionType>().unwrap(), kind);
        }
        assert!("LOAN".parse::<TransactionType>().is_err());
    }
}
