//! Turnstile Store - Coordination store abstraction
//!
//! This crate provides:
//! - The `CoordinationStore` trait: atomic set-membership claim/remove plus
//!   topic-based publish/subscribe
//! - `Subscription`, the receiving end of a topic subscription
//! - `MemoryCoordinationStore`, an in-process store shared by every locker
//!   holding the same `Arc`

mod error;
mod memory;
mod traits;

pub use error::StoreError;
pub use memory::MemoryCoordinationStore;
pub use traits::{CoordinationStore, Message, Subscription, SubscriptionStream};
