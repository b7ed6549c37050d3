//! Lease guard
//!
//! The maximum lease bounds how long a single caller may plan to hold a
//! resource. It is enforced once, up front, from the acquire context's
//! deadline; nothing expires a claim afterwards.

use std::time::Duration;

use crate::error::LockError;

/// Check the time remaining on an acquire context against the maximum lease
///
/// `remaining` is `None` for contexts without a deadline, which are always
/// allowed.
pub fn check_lease(remaining: Option<Duration>, max_lease: Duration) -> Result<(), LockError> {
    match remaining {
        Some(requested) if requested > max_lease => Err(LockError::LeaseTimeExceeded {
            requested,
            max: max_lease,
        }),
        _ => Ok(()),
    }
}
