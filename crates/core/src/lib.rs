//! `cashdrawer-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, fixed-point money and the error taxonomy shared by every layer.

pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{OrderId, ReportId, SessionId, TenantId, TransactionId, UserId};
pub use money::Money;
pub use value_object::ValueObject;
