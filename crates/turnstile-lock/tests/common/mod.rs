// Common test utilities for lock protocol tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use turnstile_lock::{
    CoordinationStore, Locker, LockerConfig, MemoryCoordinationStore, StoreError,
};
use turnstile_store::Subscription;

/// Store wrapper that counts calls, injects failures, and can pause a
/// caller right after a contended claim
#[derive(Default)]
pub struct TestStore {
    inner: MemoryCoordinationStore,
    claims: AtomicU64,
    removals: AtomicU64,
    reads: AtomicU64,
    subscribes: AtomicU64,
    fail_claims: AtomicBool,
    fail_removals: AtomicBool,
    fail_subscribes: AtomicBool,
    pause_after_contended_claim: AtomicBool,
    claim_contended: Notify,
    resume: Notify,
}

impl TestStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn memory(&self) -> &MemoryCoordinationStore {
        &self.inner
    }

    pub fn claims(&self) -> u64 {
        self.claims.load(Ordering::SeqCst)
    }

    pub fn removals(&self) -> u64 {
        self.removals.load(Ordering::SeqCst)
    }

    pub fn subscribes(&self) -> u64 {
        self.subscribes.load(Ordering::SeqCst)
    }

    /// Every store call of any kind
    pub fn total_calls(&self) -> u64 {
        self.claims() + self.removals() + self.subscribes() + self.reads.load(Ordering::SeqCst)
    }

    pub fn fail_claims(&self, fail: bool) {
        self.fail_claims.store(fail, Ordering::SeqCst);
    }

    pub fn fail_removals(&self, fail: bool) {
        self.fail_removals.store(fail, Ordering::SeqCst);
    }

    pub fn fail_subscribes(&self, fail: bool) {
        self.fail_subscribes.store(fail, Ordering::SeqCst);
    }

    /// Pause the next caller whose claim finds the resource taken
    pub fn pause_next_contended_claim(&self) {
        self.pause_after_contended_claim.store(true, Ordering::SeqCst);
    }

    /// Wait until a paused caller has seen its claim fail
    pub async fn wait_for_contended_claim(&self) {
        self.claim_contended.notified().await;
    }

    /// Let the paused caller continue
    pub fn resume(&self) {
        self.resume.notify_one();
    }
}

#[async_trait]
impl CoordinationStore for TestStore {
    async fn add_member(&self, set: &str, member: &str) -> Result<bool, StoreError> {
        self.claims.fetch_add(1, Ordering::SeqCst);
        if self.fail_claims.load(Ordering::SeqCst) {
            return Err(StoreError::operation("add_member", "injected failure"));
        }

        let added = self.inner.add_member(set, member).await?;
        if !added && self.pause_after_contended_claim.swap(false, Ordering::SeqCst) {
            self.claim_contended.notify_one();
            self.resume.notified().await;
        }
        Ok(added)
    }

    async fn remove_member_and_publish(
        &self,
        set: &str,
        member: &str,
        channel: &str,
        payload: &str,
    ) -> Result<bool, StoreError> {
        self.removals.fetch_add(1, Ordering::SeqCst);
        if self.fail_removals.load(Ordering::SeqCst) {
            return Err(StoreError::operation(
                "remove_member_and_publish",
                "injected failure",
            ));
        }
        self.inner
            .remove_member_and_publish(set, member, channel, payload)
            .await
    }

    async fn is_member(&self, set: &str, member: &str) -> Result<bool, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.is_member(set, member).await
    }

    async fn members(&self, set: &str) -> Result<Vec<String>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.members(set).await
    }

    async fn subscribe(&self, channel: &str, buffer: usize) -> Result<Subscription, StoreError> {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        if self.fail_subscribes.load(Ordering::SeqCst) {
            return Err(StoreError::operation("subscribe", "injected failure"));
        }
        self.inner.subscribe(channel, buffer).await
    }
}

/// A locker standing in for one independent process
pub fn process(store: &Arc<TestStore>) -> Locker {
    Locker::new(
        store.clone(),
        LockerConfig::default().with_max_lease(Duration::from_secs(10)),
    )
}
