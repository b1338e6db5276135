//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use frameflow::pipeline::{KernelState, LifecycleState, Notifier};
use std::time::{Duration, Instant};

/// Upper bound on how long a test waits for the kernel worker
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Wait for a published state satisfying `done`, panicking on timeout.
pub fn wait_until(
    notifier: &Notifier<KernelState>,
    done: impl Fn(&KernelState) -> bool,
) -> KernelState {
    let deadline = Instant::now() + test_timeout();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let state = notifier
            .wait_notification_timeout(remaining)
            .unwrap_or_else(|| panic!("no matching kernel state within {:?}", test_timeout()));
        if done(&state) {
            return state;
        }
    }
}

/// Wait until the kernel publishes `target`.
pub fn wait_for_state(notifier: &Notifier<KernelState>, target: LifecycleState) -> KernelState {
    wait_until(notifier, |s| s.state == target)
}
