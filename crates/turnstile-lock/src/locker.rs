//! Locker: per-process entry point to the lock protocol
//!
//! A `Locker` binds a coordination store to a configuration. It is cheap to
//! clone; clones share statistics. Separate lockers over the same store
//! compete exactly like separate processes.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, info, warn};
use turnstile_common::Context;
use turnstile_store::CoordinationStore;
use uuid::Uuid;

use crate::error::LockError;
use crate::handle::LockHandle;
use crate::metrics;
use crate::model::{LockStats, LockerConfig, ReleaseEvent};
use crate::watcher::ReleaseWatcher;

/// Distributed lock factory bound to one coordination store
#[derive(Clone)]
pub struct Locker {
    inner: Arc<LockerInner>,
}

struct LockerInner {
    store: Arc<dyn CoordinationStore>,
    config: LockerConfig,
    stats: LockStatsCollector,
}

#[derive(Default)]
pub(crate) struct LockStatsCollector {
    acquisitions: AtomicU64,
    releases: AtomicU64,
    contentions: AtomicU64,
    cancellations: AtomicU64,
    lease_rejections: AtomicU64,
    store_errors: AtomicU64,
    not_held_releases: AtomicU64,
    forced_releases: AtomicU64,
    total_wait_ms: AtomicU64,
    total_hold_ms: AtomicU64,
}

impl LockStatsCollector {
    pub(crate) fn acquired(&self, waited: Duration) {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        self.total_wait_ms
            .fetch_add(waited.as_millis() as u64, Ordering::Relaxed);
        metrics::record_acquisition(waited);
    }

    pub(crate) fn released(&self, held_for: Duration) {
        self.releases.fetch_add(1, Ordering::Relaxed);
        self.total_hold_ms
            .fetch_add(held_for.as_millis() as u64, Ordering::Relaxed);
        metrics::record_release();
    }

    pub(crate) fn contended(&self) {
        self.contentions.fetch_add(1, Ordering::Relaxed);
        metrics::record_contention();
    }

    pub(crate) fn canceled(&self) {
        self.cancellations.fetch_add(1, Ordering::Relaxed);
        metrics::record_cancellation();
    }

    pub(crate) fn lease_rejected(&self) {
        self.lease_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn store_error(&self, operation: &'static str) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
        metrics::record_store_error(operation);
    }

    pub(crate) fn not_held(&self) {
        self.not_held_releases.fetch_add(1, Ordering::Relaxed);
    }

    fn forced(&self) {
        self.forced_releases.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> LockStats {
        LockStats {
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            contentions: self.contentions.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
            lease_rejections: self.lease_rejections.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            not_held_releases: self.not_held_releases.load(Ordering::Relaxed),
            forced_releases: self.forced_releases.load(Ordering::Relaxed),
            total_wait_ms: self.total_wait_ms.load(Ordering::Relaxed),
            total_hold_ms: self.total_hold_ms.load(Ordering::Relaxed),
        }
    }
}

impl Locker {
    pub fn new(store: Arc<dyn CoordinationStore>, config: LockerConfig) -> Self {
        Self {
            inner: Arc::new(LockerInner {
                store,
                config,
                stats: LockStatsCollector::default(),
            }),
        }
    }

    /// Create a locker with the default configuration (10s maximum lease)
    pub fn with_defaults(store: Arc<dyn CoordinationStore>) -> Self {
        Self::new(store, LockerConfig::default())
    }

    pub fn config(&self) -> &LockerConfig {
        &self.inner.config
    }

    /// Request a lock on `resource`
    ///
    /// The returned handle is already subscribed to the resource's release
    /// channel, so a release that happens before its first claim attempt is
    /// still observed.
    pub async fn new_lock(&self, resource: impl Into<String>) -> Result<LockHandle, LockError> {
        let resource = resource.into();
        if resource.is_empty() {
            return Err(LockError::InvalidResource);
        }

        let subscription = self
            .inner
            .store
            .subscribe(&resource, self.inner.config.subscription_buffer)
            .await
            .map_err(|e| {
                self.inner.stats.store_error("subscribe");
                e
            })?;

        let id = Uuid::new_v4().to_string();
        debug!(resource = %resource, handle = %id, "Lock handle created");
        Ok(LockHandle::new(self.clone(), id, resource, subscription))
    }

    /// Observe releases of `resource` without competing for it
    pub async fn watch_releases(&self, resource: &str) -> Result<ReleaseWatcher, LockError> {
        if resource.is_empty() {
            return Err(LockError::InvalidResource);
        }

        let subscription = self
            .inner
            .store
            .subscribe(resource, self.inner.config.subscription_buffer)
            .await
            .map_err(|e| {
                self.inner.stats.store_error("subscribe");
                e
            })?;
        Ok(ReleaseWatcher::new(resource, subscription))
    }

    /// Run `critical_section` while holding the lock on `resource`
    ///
    /// The lock is released with a background context once the section
    /// completes, so an expired `ctx` cannot strand the claim. If the release
    /// fails, the section has still run to completion but its value is
    /// dropped and the release error is returned. A panicking section
    /// releases the claim before the panic resumes.
    pub async fn with_lock<F, Fut, T>(
        &self,
        ctx: &Context,
        resource: &str,
        critical_section: F,
    ) -> Result<T, LockError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut handle = self.new_lock(resource).await?;
        handle.acquire(ctx).await?;

        let outcome = AssertUnwindSafe(critical_section()).catch_unwind().await;
        let released = handle.release(&Context::background()).await;

        match outcome {
            Ok(value) => released.map(|()| value),
            Err(panic) => {
                if let Err(e) = released {
                    warn!(resource, error = %e, "Release after panicking critical section failed");
                }
                std::panic::resume_unwind(panic)
            }
        }
    }

    /// Whether any process currently holds the claim on `resource`
    pub async fn is_locked(&self, resource: &str) -> Result<bool, LockError> {
        Ok(self
            .inner
            .store
            .is_member(&self.inner.config.claim_set, resource)
            .await?)
    }

    /// All resources currently claimed in this locker's claim set
    pub async fn held_resources(&self) -> Result<Vec<String>, LockError> {
        Ok(self.inner.store.members(&self.inner.config.claim_set).await?)
    }

    /// Remove a claim left behind by a holder that will never release it
    ///
    /// Publishes a release notification so waiters retry. Returns whether a
    /// claim existed.
    pub async fn force_release(&self, resource: &str) -> Result<bool, LockError> {
        let payload = ReleaseEvent::forced(resource).to_payload()?;
        let removed = self
            .inner
            .store
            .remove_member_and_publish(&self.inner.config.claim_set, resource, resource, &payload)
            .await
            .map_err(|e| {
                self.inner.stats.store_error("remove_member_and_publish");
                e
            })?;

        if removed {
            self.inner.stats.forced();
            warn!(resource, "Claim force-released");
        } else {
            info!(resource, "Force release found no claim");
        }
        Ok(removed)
    }

    /// Snapshot of this locker's statistics
    pub fn stats(&self) -> LockStats {
        self.inner.stats.snapshot()
    }

    pub(crate) fn store(&self) -> &dyn CoordinationStore {
        self.inner.store.as_ref()
    }

    pub(crate) fn claim_set(&self) -> &str {
        &self.inner.config.claim_set
    }

    pub(crate) fn max_lease(&self) -> Duration {
        self.inner.config.max_lease()
    }

    pub(crate) fn collector(&self) -> &LockStatsCollector {
        &self.inner.stats
    }
}

impl std::fmt::Debug for Locker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Locker")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}
