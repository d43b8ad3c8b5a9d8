//! Process-wide tracing setup shared by binaries and tests.

pub mod subscriber;

pub use subscriber::{init, init_for_tests};
