//! Cancellation and deadline context
//!
//! A [`Context`] travels with every blocking lock operation. It carries an
//! optional deadline and any number of cancellation signals inherited from
//! its ancestors. Deriving a child never loosens the parent: the child keeps
//! every parent signal and the earlier of the two deadlines.

use std::time::Duration;

use futures::future::select_all;
use tokio::sync::watch;
use tokio::time::Instant;

/// Reason a context is no longer live
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation and deadline scope for a lock operation
#[derive(Clone, Debug, Default)]
pub struct Context {
    deadline: Option<Instant>,
    signals: Vec<watch::Receiver<bool>>,
}

/// Cancels the context returned alongside it by [`Context::with_cancel`]
///
/// Dropping the handle does not cancel the context.
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    /// Cancel the associated context and every context derived from it
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Check if `cancel` has been called
    pub fn is_canceled(&self) -> bool {
        *self.sender.borrow()
    }
}

impl Context {
    /// A context that is never canceled and has no deadline
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a child that expires after `timeout`
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a child that expires at `deadline` (or at the parent's deadline if earlier)
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };
        Self {
            deadline: Some(deadline),
            signals: self.signals.clone(),
        }
    }

    /// Derive a child that can be canceled through the returned handle
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let (sender, receiver) = watch::channel(false);
        let mut signals = self.signals.clone();
        signals.push(receiver);
        (
            Self {
                deadline: self.deadline,
                signals,
            },
            CancelHandle { sender },
        )
    }

    /// The deadline, if one was set
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline; zero once it has passed
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Non-blocking check; `None` while the context is still live
    ///
    /// Cancellation is reported in preference to an expired deadline.
    pub fn err(&self) -> Option<ContextError> {
        if self.signals.iter().any(|signal| *signal.borrow()) {
            return Some(ContextError::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Wait until the context is canceled or its deadline passes
    ///
    /// Never resolves for a background context.
    pub async fn done(&self) -> ContextError {
        if let Some(err) = self.err() {
            return err;
        }

        let canceled = async {
            if self.signals.is_empty() {
                return std::future::pending::<()>().await;
            }
            let waits = self
                .signals
                .iter()
                .cloned()
                .map(|signal| Box::pin(wait_canceled(signal)));
            select_all(waits).await;
        };

        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = canceled => ContextError::Canceled,
            _ = expired => ContextError::DeadlineExceeded,
        }
    }
}

async fn wait_canceled(mut signal: watch::Receiver<bool>) {
    let result = signal.wait_for(|canceled| *canceled).await.map(|_| ());
    if result.is_err() {
        // handle dropped without canceling
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_context() {
        let ctx = Context::background();
        assert!(ctx.deadline().is_none());
        assert!(ctx.remaining().is_none());
        assert!(ctx.err().is_none());
    }

    #[tokio::test]
    async fn test_cancel_propagates_to_children() {
        let (parent, cancel) = Context::background().with_cancel();
        let child = parent.with_timeout(Duration::from_secs(60));
        let (grandchild, _grandchild_cancel) = child.with_cancel();

        assert!(grandchild.err().is_none());
        cancel.cancel();

        assert!(cancel.is_canceled());
        assert_eq!(parent.err(), Some(ContextError::Canceled));
        assert_eq!(child.err(), Some(ContextError::Canceled));
        assert_eq!(grandchild.err(), Some(ContextError::Canceled));
        assert_eq!(grandchild.done().await, ContextError::Canceled);
    }

    #[tokio::test]
    async fn test_child_cancel_does_not_reach_parent() {
        let parent = Context::background();
        let (child, cancel) = parent.with_cancel();
        cancel.cancel();

        assert_eq!(child.err(), Some(ContextError::Canceled));
        assert!(parent.err().is_none());
    }

    #[tokio::test]
    async fn test_child_keeps_earlier_deadline() {
        let parent = Context::background().with_timeout(Duration::from_secs(1));
        let child = parent.with_timeout(Duration::from_secs(30));
        assert_eq!(child.deadline(), parent.deadline());

        let tighter = parent.with_timeout(Duration::from_millis(10));
        assert!(tighter.deadline() < parent.deadline());
    }

    #[tokio::test(start_paused = true)]
    async fn test_done_on_deadline() {
        let ctx = Context::background().with_timeout(Duration::from_secs(5));
        assert_eq!(ctx.done().await, ContextError::DeadlineExceeded);
        assert_eq!(ctx.err(), Some(ContextError::DeadlineExceeded));
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }

    #[tokio::test]
    async fn test_done_wakes_on_cancel() {
        let (ctx, cancel) = Context::background().with_cancel();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel.cancel();
        });

        let result = tokio::time::timeout(Duration::from_secs(1), ctx.done()).await;
        assert_eq!(result.unwrap(), ContextError::Canceled);
    }

    #[tokio::test]
    async fn test_dropped_handle_does_not_cancel() {
        let (ctx, cancel) = Context::background().with_cancel();
        drop(cancel);

        assert!(ctx.err().is_none());
        let result = tokio::time::timeout(Duration::from_millis(20), ctx.done()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_cancel_reported_before_deadline() {
        let (ctx, cancel) = Context::background()
            .with_timeout(Duration::ZERO)
            .with_cancel();
        cancel.cancel();
        assert_eq!(ctx.err(), Some(ContextError::Canceled));
    }
}
