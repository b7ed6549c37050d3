//! Turnstile Lock - Distributed mutual exclusion over a coordination store
//!
//! This crate provides:
//! - `Locker`: per-process entry point bound to a shared `CoordinationStore`
//! - `LockHandle`: one acquisition attempt (subscribe, claim, wait, release)
//! - `ReleaseWatcher`: a stream of release notifications for observers
//! - Lease guard, statistics and metrics

pub mod error;
mod handle;
pub mod lease;
mod locker;
pub mod metrics;
pub mod model;
mod watcher;

pub use error::{LockError, LockErrorKind};
pub use handle::LockHandle;
pub use lease::check_lease;
pub use locker::Locker;
pub use model::{LockState, LockStats, LockerConfig, ReleaseEvent};
pub use watcher::ReleaseWatcher;

// Re-export the collaborators callers need to build a locker
pub use turnstile_common::{CancelHandle, Context, ContextError};
pub use turnstile_store::{CoordinationStore, MemoryCoordinationStore, StoreError};
