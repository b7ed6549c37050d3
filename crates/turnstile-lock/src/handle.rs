//! Lock handle: one acquisition of one resource
//!
//! State machine: `Idle -> Waiting -> Held -> Released`, with
//! `Idle | Waiting -> Canceled` when the attempt is abandoned. `Held` never
//! times out on its own.

use std::time::Instant;

use tracing::{debug, info, trace, warn};
use turnstile_common::Context;
use turnstile_store::{StoreError, Subscription};

use crate::error::LockError;
use crate::lease::check_lease;
use crate::locker::Locker;
use crate::model::{LockState, ReleaseEvent};
use crate::watcher::ReleaseWatcher;

/// Client-side handle for one lock acquisition
///
/// Created by [`Locker::new_lock`], which subscribes to the resource's
/// release channel before any claim is attempted.
pub struct LockHandle {
    id: String,
    resource: String,
    locker: Locker,
    subscription: Option<Subscription>,
    state: LockState,
    acquired_at: Option<Instant>,
}

impl LockHandle {
    pub(crate) fn new(
        locker: Locker,
        id: String,
        resource: String,
        subscription: Subscription,
    ) -> Self {
        Self {
            id,
            resource,
            locker,
            subscription: Some(subscription),
            state: LockState::Idle,
            acquired_at: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    pub fn is_held(&self) -> bool {
        self.state == LockState::Held
    }

    /// Block until this handle holds the claim on its resource
    ///
    /// Contention is retried each time a release notification arrives.
    /// Cancellation of `ctx` is checked before every claim attempt and raced
    /// against every wait. A context whose deadline lies further out than
    /// the maximum lease is rejected before the store is contacted, and the
    /// handle stays `Idle`.
    ///
    /// Store failures are returned immediately. Any failure other than the
    /// lease check leaves the handle `Canceled` with its subscription closed.
    pub async fn acquire(&mut self, ctx: &Context) -> Result<(), LockError> {
        if self.state != LockState::Idle {
            return Err(LockError::InvalidState {
                resource: self.resource.clone(),
                state: self.state,
            });
        }

        if let Err(err) = check_lease(ctx.remaining(), self.locker.max_lease()) {
            self.locker.collector().lease_rejected();
            debug!(resource = %self.resource, handle = %self.id, error = %err, "Lease guard rejected acquire");
            return Err(err);
        }

        let started = Instant::now();
        let mut contended = false;

        loop {
            if let Some(err) = ctx.err() {
                return Err(self.abandon(err.into()));
            }

            match self
                .locker
                .store()
                .add_member(self.locker.claim_set(), &self.resource)
                .await
            {
                Ok(true) => {
                    let waited = started.elapsed();
                    self.state = LockState::Held;
                    self.acquired_at = Some(Instant::now());
                    self.locker.collector().acquired(waited);
                    info!(
                        resource = %self.resource,
                        handle = %self.id,
                        waited_ms = waited.as_millis() as u64,
                        "Lock acquired"
                    );
                    return Ok(());
                }
                Ok(false) => {
                    if !contended {
                        contended = true;
                        self.locker.collector().contended();
                        debug!(resource = %self.resource, handle = %self.id, "Lock contended, waiting for release");
                    }
                    self.state = LockState::Waiting;
                }
                Err(err) => {
                    self.locker.collector().store_error("add_member");
                    warn!(resource = %self.resource, handle = %self.id, error = %err, "Claim attempt failed");
                    return Err(self.abandon(err.into()));
                }
            }

            let Some(subscription) = self.subscription.as_mut() else {
                let err = StoreError::SubscriptionClosed(self.resource.clone());
                return Err(self.abandon(err.into()));
            };

            let woken = tokio::select! {
                biased;
                err = ctx.done() => Err(LockError::from(err)),
                message = subscription.recv() => message.map(|_| ()).map_err(LockError::from),
            };

            match woken {
                Ok(()) => {
                    trace!(resource = %self.resource, handle = %self.id, "Release notification received, retrying claim");
                }
                Err(err) => {
                    if let LockError::Store(_) = err {
                        self.locker.collector().store_error("subscribe");
                    }
                    return Err(self.abandon(err));
                }
            }
        }
    }

    /// Remove this handle's claim and wake waiters with one notification
    ///
    /// Returns `NotHeld` without contacting the store unless the handle is
    /// `Held`, and also when the store finds the claim already gone (for
    /// example after a forced release); no notification is published then.
    /// A store failure leaves the handle `Held` so the release can be
    /// retried.
    pub async fn release(&mut self, ctx: &Context) -> Result<(), LockError> {
        if self.state != LockState::Held {
            self.locker.collector().not_held();
            return Err(LockError::NotHeld {
                resource: self.resource.clone(),
            });
        }

        if let Some(err) = ctx.err() {
            return Err(err.into());
        }

        let payload = ReleaseEvent::released_by(&self.resource, &self.id).to_payload()?;
        let removed = match self
            .locker
            .store()
            .remove_member_and_publish(
                self.locker.claim_set(),
                &self.resource,
                &self.resource,
                &payload,
            )
            .await
        {
            Ok(removed) => removed,
            Err(err) => {
                self.locker
                    .collector()
                    .store_error("remove_member_and_publish");
                warn!(resource = %self.resource, handle = %self.id, error = %err, "Release failed");
                return Err(err.into());
            }
        };

        let held_for = self
            .acquired_at
            .take()
            .map(|at| at.elapsed())
            .unwrap_or_default();
        self.state = LockState::Released;
        self.subscription = None;

        if !removed {
            self.locker.collector().not_held();
            warn!(resource = %self.resource, handle = %self.id, "Claim was already gone at release");
            return Err(LockError::NotHeld {
                resource: self.resource.clone(),
            });
        }

        self.locker.collector().released(held_for);
        info!(
            resource = %self.resource,
            handle = %self.id,
            held_ms = held_for.as_millis() as u64,
            "Lock released"
        );
        Ok(())
    }

    /// Stream of release notifications for this handle's resource
    ///
    /// Backed by its own subscription, independent of the handle's state;
    /// it yields one event per release until dropped.
    pub async fn released(&self) -> Result<ReleaseWatcher, LockError> {
        self.locker.watch_releases(&self.resource).await
    }

    fn abandon(&mut self, err: LockError) -> LockError {
        self.subscription = None;
        self.state = LockState::Canceled;
        if err.is_cancellation() {
            self.locker.collector().canceled();
        }
        debug!(resource = %self.resource, handle = %self.id, error = %err, "Lock acquisition abandoned");
        err
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if self.state == LockState::Held {
            warn!(
                resource = %self.resource,
                handle = %self.id,
                "Lock handle dropped while held; claim remains until released"
            );
        }
    }
}

impl std::fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockHandle")
            .field("id", &self.id)
            .field("resource", &self.resource)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use turnstile_store::MemoryCoordinationStore;

    use super::*;
    use crate::model::LockerConfig;

    fn locker_with(store: Arc<MemoryCoordinationStore>) -> Locker {
        Locker::new(
            store,
            LockerConfig::default().with_max_lease(Duration::from_secs(10)),
        )
    }

    #[tokio::test]
    async fn test_contended_acquire_waits_for_release() {
        let store = Arc::new(MemoryCoordinationStore::new());
        let p1 = locker_with(store.clone());
        let p2 = locker_with(store.clone());
        let ctx = Context::background();

        let mut first = p1.new_lock("accounts:42").await.unwrap();
        first.acquire(&ctx).await.unwrap();

        let mut second = p2.new_lock("accounts:42").await.unwrap();
        let waiter = tokio::spawn(async move {
            second.acquire(&Context::background()).await.map(|_| second)
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        first.release(&ctx).await.unwrap();

        let mut second = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(second.is_held());
        assert_eq!(p2.stats().contentions, 1);
        second.release(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_acquire_requires_idle_state() {
        let locker = locker_with(Arc::new(MemoryCoordinationStore::new()));
        let ctx = Context::background();

        let mut handle = locker.new_lock("r").await.unwrap();
        handle.acquire(&ctx).await.unwrap();

        let err = handle.acquire(&ctx).await.unwrap_err();
        assert!(matches!(
            err,
            LockError::InvalidState {
                state: LockState::Held,
                ..
            }
        ));

        handle.release(&ctx).await.unwrap();
        let err = handle.acquire(&ctx).await.unwrap_err();
        assert!(matches!(
            err,
            LockError::InvalidState {
                state: LockState::Released,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_release_without_acquire_is_not_held() {
        let store = Arc::new(MemoryCoordinationStore::new());
        let owner = locker_with(store.clone());
        let stranger = locker_with(store);
        let ctx = Context::background();

        let mut held = owner.new_lock("r").await.unwrap();
        held.acquire(&ctx).await.unwrap();

        // A handle that never acquired must not remove someone else's claim
        let mut idle = stranger.new_lock("r").await.unwrap();
        let err = idle.release(&ctx).await.unwrap_err();
        assert!(matches!(err, LockError::NotHeld { .. }));
        assert!(owner.is_locked("r").await.unwrap());

        held.release(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_canceled_context_is_checked_before_first_claim() {
        let store = Arc::new(MemoryCoordinationStore::new());
        let locker = locker_with(store.clone());
        let (ctx, cancel) = Context::background().with_cancel();
        cancel.cancel();

        let mut handle = locker.new_lock("r").await.unwrap();
        let err = handle.acquire(&ctx).await.unwrap_err();
        assert!(matches!(err, LockError::Canceled));
        assert_eq!(handle.state(), LockState::Canceled);
        assert!(!locker.is_locked("r").await.unwrap());
        assert_eq!(store.subscriber_count("r"), 0);
        assert_eq!(locker.stats().cancellations, 1);
    }

    #[tokio::test]
    async fn test_lease_rejection_keeps_handle_idle() {
        let locker = locker_with(Arc::new(MemoryCoordinationStore::new()));
        let mut handle = locker.new_lock("r").await.unwrap();

        let too_long = Context::background().with_timeout(Duration::from_secs(60));
        let err = handle.acquire(&too_long).await.unwrap_err();
        assert!(matches!(err, LockError::LeaseTimeExceeded { .. }));
        assert_eq!(handle.state(), LockState::Idle);

        let within = Context::background().with_timeout(Duration::from_secs(5));
        handle.acquire(&within).await.unwrap();
        assert!(handle.is_held());
        assert_eq!(locker.stats().lease_rejections, 1);
        handle.release(&within).await.unwrap();
    }

    #[tokio::test]
    async fn test_release_closes_subscription() {
        let store = Arc::new(MemoryCoordinationStore::new());
        let locker = locker_with(store.clone());
        let ctx = Context::background();

        let mut handle = locker.new_lock("r").await.unwrap();
        assert_eq!(store.subscriber_count("r"), 1);
        handle.acquire(&ctx).await.unwrap();
        handle.release(&ctx).await.unwrap();
        assert_eq!(store.subscriber_count("r"), 0);
    }

    #[tokio::test]
    async fn test_release_with_canceled_context_keeps_claim() {
        let locker = locker_with(Arc::new(MemoryCoordinationStore::new()));
        let mut handle = locker.new_lock("r").await.unwrap();
        handle.acquire(&Context::background()).await.unwrap();

        let (ctx, cancel) = Context::background().with_cancel();
        cancel.cancel();
        let err = handle.release(&ctx).await.unwrap_err();
        assert!(matches!(err, LockError::Canceled));
        assert!(handle.is_held());

        handle.release(&Context::background()).await.unwrap();
    }
}
