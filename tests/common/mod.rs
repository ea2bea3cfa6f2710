//! Shared helpers for integration tests.

#![allow(dead_code, unused_macros)]

use paceline::lab::RecordingSink;
use paceline::{Signal, VirtualTime};
use proptest::test_runner::Config as ProptestConfig;
use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Installs a test-writer subscriber once per test binary.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Proptest configuration with `cases` cases and no persistence files.
pub fn test_proptest_config(cases: u32) -> ProptestConfig {
    ProptestConfig {
        cases,
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

/// Shorthand for a virtual instant.
pub fn t(ticks: i64) -> VirtualTime {
    VirtualTime::new(ticks)
}

/// A recording flattened to `(ticks, signal)` pairs.
pub fn timeline<T: Clone, E: Clone>(
    sink: &RecordingSink<T, E>,
) -> Vec<(i64, Signal<T, E>)> {
    sink.recorded_output()
        .into_iter()
        .map(|(time, signal)| (time.ticks(), signal))
        .collect()
}

macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(test = $name, "=== TEST START ===");
    };
}

macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = $name, "--- section ---");
    };
}

macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = $name, "=== TEST COMPLETE ===");
    };
}

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
