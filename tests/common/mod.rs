//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use std::time::{Duration, Instant};

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_secs(3)
}

/// Poll `cond` every millisecond until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    cond()
}

/// Assert that `count` is within `tolerance` (relative) of `expected`
pub fn assert_count_near(count: usize, expected: usize, tolerance: f64) {
    let allowed = (expected as f64 * tolerance).max(1.0);
    assert!(
        (count as f64 - expected as f64).abs() <= allowed,
        "Expected {} to be within {:.0}% of {}",
        count,
        tolerance * 100.0,
        expected
    );
}
