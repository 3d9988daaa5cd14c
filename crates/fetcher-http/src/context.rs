//! Cancellation and deadlines for dispatch.

use crate::error::ContextError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

struct Inner {
    cancelled: AtomicBool,
    notify: watch::Sender<bool>,
    deadline: Option<Instant>,
}

/// Carries a cancellation signal and an optional deadline into
/// [`HttpClient::execute`](crate::HttpClient::execute).
///
/// Clones share state: cancelling one clone cancels them all.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Context {
    fn with_optional_deadline(deadline: Option<Instant>) -> Self {
        let (notify, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                notify,
                deadline,
            }),
        }
    }

    /// A context with no deadline that only ends when cancelled.
    pub fn new() -> Self {
        Self::with_optional_deadline(None)
    }

    /// A context that expires after `timeout`.
    ///
    /// A timeout too large to represent as an instant means no deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_optional_deadline(Instant::now().checked_add(timeout))
    }

    /// A context that expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self::with_optional_deadline(Some(deadline))
    }

    /// Cancel the context and wake every waiter.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.send_replace(true);
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Why the context is done, or `None` while it is still live.
    pub fn err(&self) -> Option<ContextError> {
        if self.inner.cancelled.load(Ordering::SeqCst) {
            return Some(ContextError::Cancelled);
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Check if the context is cancelled or expired.
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Wait until the context is cancelled or its deadline passes.
    pub async fn done(&self) -> ContextError {
        let mut rx = self.inner.notify.subscribe();
        let cancelled = async move {
            // The sender lives in `self`, so the channel cannot close here.
            let _ = rx.wait_for(|cancelled| *cancelled).await;
        };

        match self.inner.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = cancelled => ContextError::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => ContextError::DeadlineExceeded,
                }
            }
            None => {
                cancelled.await;
                ContextError::Cancelled
            }
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("deadline", &self.inner.deadline)
            .field("err", &self.err())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[test]
    fn test_new_context_is_live() {
        let ctx = Context::new();
        assert!(!ctx.is_done());
        assert_eq!(ctx.err(), None);
        assert!(ctx.deadline().is_none());
    }

    #[test]
    fn test_cancel_is_shared_by_clones() {
        let ctx = Context::new();
        let clone = ctx.clone();
        clone.cancel();
        assert_eq!(ctx.err(), Some(ContextError::Cancelled));
    }

    #[tokio::test]
    async fn test_elapsed_deadline() {
        let ctx = Context::with_timeout(Duration::ZERO);
        assert_eq!(ctx.err(), Some(ContextError::DeadlineExceeded));
        assert_eq!(ctx.done().await, ContextError::DeadlineExceeded);
    }

    #[tokio::test]
    async fn test_huge_timeout_has_no_deadline() {
        let ctx = Context::with_timeout(Duration::MAX);
        assert!(!ctx.is_done());
        assert!(ctx.deadline().is_none());
    }

    #[tokio::test]
    async fn test_cancel_wins_over_elapsed_deadline() {
        let ctx = Context::with_timeout(Duration::ZERO);
        ctx.cancel();
        assert_eq!(ctx.err(), Some(ContextError::Cancelled));
        assert_eq!(ctx.done().await, ContextError::Cancelled);
    }

    #[tokio::test]
    async fn test_done_wakes_on_cancel() {
        let ctx = Context::new();

        tokio::spawn({
            let ctx = ctx.clone();
            async move {
                sleep(Duration::from_millis(10)).await;
                ctx.cancel();
            }
        });

        assert_eq!(ctx.done().await, ContextError::Cancelled);
    }

    #[tokio::test]
    async fn test_done_wakes_on_deadline() {
        let ctx = Context::with_timeout(Duration::from_millis(20));
        assert!(!ctx.is_done());
        assert_eq!(ctx.done().await, ContextError::DeadlineExceeded);
        assert!(ctx.is_done());
    }

    #[tokio::test]
    async fn test_done_after_cancel_returns_immediately() {
        let ctx = Context::new();
        ctx.cancel();
        let result = tokio::time::timeout(Duration::from_secs(1), ctx.done()).await;
        assert_eq!(result.unwrap(), ContextError::Cancelled);
    }
}
