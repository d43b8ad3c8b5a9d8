//! Order-service port.
//!
//! The order service is an external collaborator. The Payment Bridge only
//! reads orders; marking an order paid happens on the order side after a
//! settlement succeeds (typically by reacting to `TransactionRecorded`).

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use cashdrawer_core::{Money, OrderId, TenantId};

/// What the ledger needs to know about an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub id: OrderId,
    pub total_amount: Money,
    pub is_paid: bool,
    /// Free-form method name as the order service stores it.
    pub payment_method: Option<String>,
}

#[derive(Debug, Error)]
pub enum OrderServiceError {
    #[error("order service unavailable: {0}")]
    Unavailable(String),
}

#[async_trait::async_trait]
pub trait OrderService: Send + Sync {
    async fn get_order(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
    ) -> Result<Option<OrderSnapshot>, OrderServiceError>;
}

#[async_trait::async_trait]
impl<O> OrderService for std::sync::Arc<O>
where
    O: OrderService + ?Sized,
{
    async fn get_order(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
    ) -> Result<Option<OrderSnapshot>, OrderServiceError> {
        (**self).get_order(tenant_id, order_id).await
    }
}

/// In-memory order book for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryOrderBook {
    orders: RwLock<HashMap<(TenantId, OrderId), OrderSnapshot>>,
}

impl InMemoryOrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tenant_id: TenantId, order: OrderSnapshot) -> Result<(), OrderServiceError> {
        let mut orders = self
            .orders
            .write()
            .map_err(|_| OrderServiceError::Unavailable("lock poisoned".to_string()))?;
        orders.insert((tenant_id, order.id), order);
        Ok(())
    }

    /// The order-side "mark paid" mutation. Returns `false` for unknown orders.
    pub fn mark_paid(&self, tenant_id: TenantId, order_id: OrderId) -> Result<bool, OrderServiceError> {
        let mut orders = self
            .orders
            .write()
            .map_err(|_| OrderServiceError::Unavailable("lock poisoned".to_string()))?;
        Ok(match orders.get_mut(&(tenant_id, order_id)) {
            Some(order) => {
                order.is_paid = true;
                true
            }
            None => false,
        })
    }
}

#[async_trait::async_trait]
impl OrderService for InMemoryOrderBook {
    async fn get_order(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
    ) -> Result<Option<OrderSnapshot>, OrderServiceError> {
        let orders = self
            .orders
            .read()
            .map_err(|_| OrderServiceError::Unavailable("lock poisoned".to_string()))?;
        Ok(orders.get(&(tenant_id, order_id)).cloned())
    }
}
