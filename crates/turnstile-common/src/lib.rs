//! Turnstile Common - Shared types and utilities
//!
//! This crate provides the foundational pieces used across all Turnstile components:
//! - Cancellation/deadline context passed to every blocking lock operation
//! - Context error types
//! - Utility functions
//! - Common constants

pub mod context;
pub mod utils;

// Re-exports for convenience
pub use context::{CancelHandle, Context, ContextError};
pub use utils::current_timestamp;

/// Default maximum lease a caller may declare when acquiring a lock (10 seconds)
pub const DEFAULT_MAX_LEASE_MS: u64 = 10_000;

/// Default name of the shared set whose members are the currently claimed resources
pub const DEFAULT_CLAIM_SET: &str = "turnstile:claims";

/// Default number of undelivered notifications buffered per subscription
pub const DEFAULT_SUBSCRIPTION_BUFFER: usize = 16;
