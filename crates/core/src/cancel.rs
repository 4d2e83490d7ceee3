//! Cancellation signal threaded through compiled queries.
//!
//! One token is supplied per compiled-query invocation and bound to the
//! synthetic parameters, so the same token reaches every resolved source
//! invocation in the tree. Clones share state; [`CancelToken::same`]
//! observes that sharing, which the synthetic-parameter contract tests
//! rely on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// A cloneable cancellation token.
#[derive(Debug, Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Request cancellation. Idempotent; wakes all waiters.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Suspend until this token is cancelled.
    ///
    /// `notify_waiters` stores no permit, so the waiter must be
    /// registered (`enable`) before the flag is re-checked; otherwise a
    /// cancel landing between the check and the first poll would never
    /// wake us. Cancellation is monotonic, so one registered wait is
    /// enough.
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }

    /// True iff `other` is a clone of the same token.
    pub fn same(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        CancelToken::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let t = CancelToken::new();
        let c = t.clone();
        assert!(t.same(&c));
        assert!(!t.is_cancelled());
        c.cancel();
        assert!(t.is_cancelled());
    }

    #[test]
    fn distinct_tokens_are_not_same() {
        assert!(!CancelToken::new().same(&CancelToken::new()));
    }

    #[tokio::test]
    async fn cancelled_wakes_waiter() {
        let t = CancelToken::new();
        let waiter = t.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        t.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_returns_for_already_cancelled_token() {
        let t = CancelToken::new();
        t.cancel();
        t.cancelled().await;
    }

    #[tokio::test]
    async fn cancel_racing_with_wait_never_hangs() {
        for _ in 0..200 {
            let t = CancelToken::new();
            let waiter = t.clone();
            let handle = tokio::spawn(async move {
                waiter.cancelled().await;
            });
            t.cancel();
            tokio::time::timeout(std::time::Duration::from_secs(5), handle)
                .await
                .expect("waiter missed the cancellation")
                .unwrap();
        }
    }
}
