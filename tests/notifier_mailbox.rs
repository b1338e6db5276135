//! Notifier delivery guarantees across threads.

use frameflow::pipeline::{KernelState, LifecycleState, Notifier};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_delayed_notification_delivered_once() {
    let notifier = Arc::new(Notifier::new());
    let producer = notifier.clone();
    let handle = std::thread::spawn(move || {
        producer.notify(KernelState::new(LifecycleState::Started, 4, 0));
    });
    handle.join().unwrap();

    // Posted before anyone waited: retained, not dropped.
    std::thread::sleep(Duration::from_millis(20));
    let state = notifier.wait_notification();
    assert_eq!(state.state, LifecycleState::Started);
    assert_eq!(state.frame, 4);

    // No stale redelivery.
    assert!(notifier
        .wait_notification_timeout(Duration::from_millis(50))
        .is_none());
}

#[test]
fn test_many_waiters_wake_on_notify() {
    let notifier = Arc::new(Notifier::<u32>::new());
    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let n = notifier.clone();
            std::thread::spawn(move || n.wait_notification_timeout(Duration::from_secs(5)))
        })
        .collect();

    std::thread::sleep(Duration::from_millis(20));
    // Each wait consumes the pending flag, so keep posting until all waiters are done.
    let mut delivered = 0;
    for handle in waiters {
        while !handle.is_finished() {
            notifier.notify(9);
            std::thread::sleep(Duration::from_millis(5));
        }
        if handle.join().unwrap() == Some(9) {
            delivered += 1;
        }
    }
    assert_eq!(delivered, 3);
}

#[test]
fn test_locked_sequence_is_atomic() {
    let notifier = Notifier::new();
    notifier.notify(KernelState::default());
    let mut guard = notifier.lock();
    let current = guard.wait();
    let next = KernelState::new(LifecycleState::Initialized, current.frame, 0);
    guard.notify(next);
    assert_eq!(guard.peek().map(|s| s.state), Some(LifecycleState::Initialized));
    drop(guard);
    assert_eq!(notifier.try_take().map(|s| s.state), Some(LifecycleState::Initialized));
}
