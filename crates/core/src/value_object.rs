//! Value object trait: equality by value, not identity.
//!
//! Value objects have **no identity**: two values with the same attributes are
//! the same value. `Money` is the canonical example in this workspace; two
//! amounts of 100 minor units are interchangeable regardless of where they came
//! from, whereas two sessions with identical balances are still different shifts.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by value. To "modify" one, build a
/// new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
