//! Lock data model

use std::time::Duration;

use serde::{Deserialize, Serialize};
use turnstile_common::{
    DEFAULT_CLAIM_SET, DEFAULT_MAX_LEASE_MS, DEFAULT_SUBSCRIPTION_BUFFER, current_timestamp,
};
use turnstile_store::StoreError;

/// Lock handle state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    /// Subscribed, no claim attempted yet
    #[default]
    Idle,
    /// Claim contended, waiting for a release notification
    Waiting,
    /// This handle owns the claim
    Held,
    /// Claim released (terminal)
    Released,
    /// Attempt abandoned without a claim (terminal)
    Canceled,
}

impl LockState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockState::Idle => "idle",
            LockState::Waiting => "waiting",
            LockState::Held => "held",
            LockState::Released => "released",
            LockState::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LockState::Released | LockState::Canceled)
    }
}

impl std::fmt::Display for LockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Notification published on a resource's channel when its claim is removed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseEvent {
    /// Resource whose claim was removed
    pub resource: String,
    /// Handle that released the claim (absent for forced releases)
    #[serde(default)]
    pub holder: Option<String>,
    /// Whether an operator removed the claim
    #[serde(default)]
    pub forced: bool,
    /// Release timestamp (Unix millis)
    pub released_at: i64,
}

impl ReleaseEvent {
    pub fn released_by(resource: impl Into<String>, holder: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            holder: Some(holder.into()),
            forced: false,
            released_at: current_timestamp(),
        }
    }

    pub fn forced(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            holder: None,
            forced: true,
            released_at: current_timestamp(),
        }
    }

    pub fn to_payload(&self) -> Result<String, StoreError> {
        serde_json::to_string(self).map_err(|e| StoreError::Payload(e.to_string()))
    }

    pub fn from_payload(payload: &str) -> Result<Self, StoreError> {
        serde_json::from_str(payload).map_err(|e| StoreError::Payload(e.to_string()))
    }
}

/// Locker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockerConfig {
    /// Maximum lease a caller may declare through its context deadline
    #[serde(default = "default_max_lease_ms")]
    pub max_lease_ms: u64,
    /// Name of the shared set holding claimed resource ids
    #[serde(default = "default_claim_set")]
    pub claim_set: String,
    /// Buffered notifications per subscription
    #[serde(default = "default_subscription_buffer")]
    pub subscription_buffer: usize,
}

fn default_max_lease_ms() -> u64 {
    DEFAULT_MAX_LEASE_MS
}

fn default_claim_set() -> String {
    DEFAULT_CLAIM_SET.to_string()
}

fn default_subscription_buffer() -> usize {
    DEFAULT_SUBSCRIPTION_BUFFER
}

impl Default for LockerConfig {
    fn default() -> Self {
        Self {
            max_lease_ms: DEFAULT_MAX_LEASE_MS,
            claim_set: DEFAULT_CLAIM_SET.to_string(),
            subscription_buffer: DEFAULT_SUBSCRIPTION_BUFFER,
        }
    }
}

impl LockerConfig {
    pub fn max_lease(&self) -> Duration {
        Duration::from_millis(self.max_lease_ms)
    }

    pub fn with_max_lease(mut self, max_lease: Duration) -> Self {
        self.max_lease_ms = max_lease.as_millis() as u64;
        self
    }

    pub fn with_claim_set(mut self, claim_set: impl Into<String>) -> Self {
        self.claim_set = claim_set.into();
        self
    }
}

/// Lock statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStats {
    /// Successful acquisitions
    pub acquisitions: u64,
    /// Successful releases
    pub releases: u64,
    /// Acquisitions that had to wait at least once
    pub contentions: u64,
    /// Attempts abandoned because the context was canceled or expired
    pub cancellations: u64,
    /// Attempts rejected by the lease guard
    pub lease_rejections: u64,
    /// Store failures surfaced to callers
    pub store_errors: u64,
    /// Releases of a lock that was not held
    pub not_held_releases: u64,
    /// Claims removed by `force_release`
    pub forced_releases: u64,
    /// Total time spent between acquire start and claim
    pub total_wait_ms: u64,
    /// Total time between claim and release
    pub total_hold_ms: u64,
}

impl LockStats {
    pub fn avg_wait_ms(&self) -> u64 {
        if self.acquisitions > 0 {
            self.total_wait_ms / self.acquisitions
        } else {
            0
        }
    }

    pub fn avg_hold_ms(&self) -> u64 {
        if self.releases > 0 {
            self.total_hold_ms / self.releases
        } else {
            0
        }
    }

    /// Fold another locker's statistics into this one
    pub fn merge(&mut self, other: &LockStats) {
        self.acquisitions += other.acquisitions;
        self.releases += other.releases;
        self.contentions += other.contentions;
        self.cancellations += other.cancellations;
        self.lease_rejections += other.lease_rejections;
        self.store_errors += other.store_errors;
        self.not_held_releases += other.not_held_releases;
        self.forced_releases += other.forced_releases;
        self.total_wait_ms += other.total_wait_ms;
        self.total_hold_ms += other.total_hold_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_state() {
        assert_eq!(LockState::default(), LockState::Idle);
        assert_eq!(LockState::Held.to_string(), "held");
        assert!(LockState::Released.is_terminal());
        assert!(LockState::Canceled.is_terminal());
        assert!(!LockState::Waiting.is_terminal());
        assert_eq!(
            serde_json::to_string(&LockState::Waiting).unwrap(),
            "\"waiting\""
        );
    }

    #[test]
    fn test_release_event_payload() {
        let event = ReleaseEvent::released_by("accounts:42", "handle-1");
        let payload = event.to_payload().unwrap();
        assert!(payload.contains("\"resource\":\"accounts:42\""));
        assert_eq!(ReleaseEvent::from_payload(&payload).unwrap(), event);

        let forced = ReleaseEvent::forced("accounts:42");
        assert!(forced.forced);
        assert!(forced.holder.is_none());
    }

    #[test]
    fn test_release_event_rejects_garbage() {
        let err = ReleaseEvent::from_payload("not json").unwrap_err();
        assert!(matches!(err, StoreError::Payload(_)));
    }

    #[test]
    fn test_release_event_defaults() {
        let event =
            ReleaseEvent::from_payload(r#"{"resource":"r","released_at":1700000000000}"#).unwrap();
        assert_eq!(event.holder, None);
        assert!(!event.forced);
    }

    #[test]
    fn test_locker_config_defaults() {
        let config = LockerConfig::default();
        assert_eq!(config.max_lease(), Duration::from_secs(10));
        assert_eq!(config.claim_set, "turnstile:claims");
        assert_eq!(config.subscription_buffer, 16);

        let parsed: LockerConfig = serde_json::from_str(r#"{"max_lease_ms": 2500}"#).unwrap();
        assert_eq!(parsed.max_lease(), Duration::from_millis(2500));
        assert_eq!(parsed.claim_set, "turnstile:claims");

        let custom = LockerConfig::default()
            .with_max_lease(Duration::from_secs(3))
            .with_claim_set("billing:claims");
        assert_eq!(custom.max_lease_ms, 3000);
        assert_eq!(custom.claim_set, "billing:claims");
    }

    #[test]
    fn test_stats_averages_and_merge() {
        let mut stats = LockStats {
            acquisitions: 2,
            releases: 2,
            total_wait_ms: 10,
            total_hold_ms: 40,
            ..Default::default()
        };
        assert_eq!(stats.avg_wait_ms(), 5);
        assert_eq!(stats.avg_hold_ms(), 20);
        assert_eq!(LockStats::default().avg_wait_ms(), 0);

        let other = LockStats {
            acquisitions: 1,
            contentions: 1,
            cancellations: 3,
            total_wait_ms: 20,
            ..Default::default()
        };
        stats.merge(&other);
        assert_eq!(stats.acquisitions, 3);
        assert_eq!(stats.contentions, 1);
        assert_eq!(stats.cancellations, 3);
        assert_eq!(stats.avg_wait_ms(), 10);
    }
}
