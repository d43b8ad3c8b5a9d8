//! Subscriber installation.
//!
//! Filtering follows `RUST_LOG`; without it the cash-drawer crates log at
//! `info`. Both entry points are safe to call repeatedly: only the first
//! installation wins and later calls are no-ops.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";
const TEST_FILTER: &str = "cashdrawer_infra=debug,cashdrawer_ledger=debug,warn";

fn filter_or(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// JSON logs with timestamps, one object per line.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_or(DEFAULT_FILTER))
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}

/// Compact human-readable output routed through the test harness so it is
/// captured per test and only shown on failure.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_or(TEST_FILTER))
        .compact()
        .with_test_writer()
        .try_init();
}
