//! Single-slot mailbox for handing values from one thread to waiting threads.
//!
//! A value posted while nobody waits is kept until the next wait call. Each
//! posted value is delivered to waiters once: after a wait has consumed it,
//! the next wait blocks until a fresh `notify`.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug)]
struct Mailbox<T> {
    value: Option<T>,
    pending: bool,
}

/// Condition-variable mailbox carrying the latest value of type `T`.
#[derive(Debug)]
pub struct Notifier<T> {
    mailbox: Mutex<Mailbox<T>>,
    cond: Condvar,
}

impl<T: Clone> Notifier<T> {
    pub fn new() -> Self {
        Self {
            mailbox: Mutex::new(Mailbox {
                value: None,
                pending: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Post `value` and wake every waiter.
    pub fn notify(&self, value: T) {
        self.lock().notify(value);
    }

    /// Block until a value is pending, consume the pending flag and return it.
    pub fn wait_notification(&self) -> T {
        self.lock().wait()
    }

    /// Like [`wait_notification`](Self::wait_notification) but gives up after
    /// `timeout`.
    pub fn wait_notification_timeout(&self, timeout: Duration) -> Option<T> {
        self.lock().wait_timeout(timeout)
    }

    /// Consume a pending value without blocking.
    pub fn try_take(&self) -> Option<T> {
        let mut mailbox = self.mailbox.lock();
        take_pending(&mut mailbox)
    }

    /// Most recently posted value, pending or not.
    pub fn latest(&self) -> Option<T> {
        self.mailbox.lock().value.clone()
    }

    /// Hold the notifier's mutex to combine several operations in one
    /// critical section.
    pub fn lock(&self) -> NotifierGuard<'_, T> {
        NotifierGuard {
            mailbox: self.mailbox.lock(),
            cond: &self.cond,
        }
    }
}

impl<T: Clone> Default for Notifier<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn take_pending<T: Clone>(mailbox: &mut Mailbox<T>) -> Option<T> {
    if !mailbox.pending {
        return None;
    }
    mailbox.pending = false;
    mailbox.value.clone()
}

/// Locked view of a [`Notifier`].
pub struct NotifierGuard<'a, T> {
    mailbox: MutexGuard<'a, Mailbox<T>>,
    cond: &'a Condvar,
}

impl<'a, T: Clone> NotifierGuard<'a, T> {
    pub fn notify(&mut self, value: T) {
        self.mailbox.value = Some(value);
        self.mailbox.pending = true;
        self.cond.notify_all();
    }

    /// Wait for a pending value, releasing the mutex while blocked.
    pub fn wait(&mut self) -> T {
        loop {
            if let Some(value) = take_pending(&mut self.mailbox) {
                return value;
            }
            self.cond.wait(&mut self.mailbox);
        }
    }

    pub fn wait_timeout(&mut self, timeout: Duration) -> Option<T> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if let Some(value) = take_pending(&mut self.mailbox) {
                return Some(value);
            }
            if self.cond.wait_until(&mut self.mailbox, deadline).timed_out() {
                return take_pending(&mut self.mailbox);
            }
        }
    }

    /// Current value without consuming the pending flag.
    pub fn peek(&self) -> Option<&T> {
        self.mailbox.value.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        self.mailbox.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_notify_before_wait_is_retained() {
        let n = Notifier::new();
        n.notify(7u32);
        assert_eq!(n.wait_notification(), 7);
    }

    #[test]
    fn test_second_wait_does_not_return_stale_value() {
        let n = Notifier::new();
        n.notify(1u32);
        assert_eq!(n.wait_notification(), 1);
        assert_eq!(n.wait_notification_timeout(Duration::from_millis(20)), None);
        assert_eq!(n.latest(), Some(1));
    }

    #[test]
    fn test_latest_value_wins() {
        let n = Notifier::new();
        n.notify(1u32);
        n.notify(2u32);
        assert_eq!(n.try_take(), Some(2));
        assert_eq!(n.try_take(), None);
    }

    #[test]
    fn test_cross_thread_delivery() {
        let n = Arc::new(Notifier::new());
        let producer = n.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            producer.notify(String::from("ready"));
        });
        assert_eq!(n.wait_notification(), "ready");
        handle.join().unwrap();
    }

    #[test]
    fn test_locked_variants() {
        let n = Notifier::new();
        {
            let mut guard = n.lock();
            assert!(guard.peek().is_none());
            guard.notify(3u8);
            assert!(guard.is_pending());
            assert_eq!(guard.peek(), Some(&3));
            assert_eq!(guard.wait(), 3);
            assert!(!guard.is_pending());
        }
        assert_eq!(n.try_take(), None);
    }
}
