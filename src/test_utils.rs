//! Shared helpers for unit tests.
//!
//! Every test module calls [`init_test_logging`] once per test and then
//! brackets its body with [`test_phase!`](crate::test_phase) and
//! [`test_complete!`](crate::test_complete). Set `RUST_LOG=paceline=trace`
//! to see scheduler and trampoline activity.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Installs a test-writer `tracing` subscriber once per test binary.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Logs the start of a test.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(test = $name, "=== TEST START ===");
    };
}

/// Logs a named section inside a test.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = $name, "--- section ---");
    };
}

/// Logs the successful end of a test.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = $name, "=== TEST COMPLETE ===");
    };
}

/// Assertion that logs expected and actual values before failing.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        if !$cond {
            tracing::error!(
                message = $msg,
                expected = ?$expected,
                actual = ?$actual,
                "Assertion failed"
            );
        }
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}
