//! Lock error types

use std::time::Duration;

use turnstile_common::ContextError;
use turnstile_store::StoreError;

use crate::model::LockState;

/// Errors returned by `Locker` and `LockHandle` operations
#[derive(thiserror::Error, Debug)]
pub enum LockError {
    #[error("requested lease of {requested:?} exceeds the maximum lease of {max:?}")]
    LeaseTimeExceeded { requested: Duration, max: Duration },

    #[error("lock acquisition canceled")]
    Canceled,

    #[error("lock acquisition deadline exceeded")]
    DeadlineExceeded,

    #[error("lock on '{resource}' is not held")]
    NotHeld { resource: String },

    #[error("lock handle for '{resource}' is {state} and cannot acquire")]
    InvalidState { resource: String, state: LockState },

    #[error("resource id must not be empty")]
    InvalidResource,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Broad class of a `LockError`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockErrorKind {
    /// Caller asked for more than policy allows; detected before any store call
    Configuration,
    /// The caller's context was canceled or expired while waiting
    Cancellation,
    /// The coordination store failed
    Store,
    /// The handle was used out of order
    Protocol,
}

impl LockError {
    pub fn kind(&self) -> LockErrorKind {
        match self {
            LockError::LeaseTimeExceeded { .. } | LockError::InvalidResource => {
                LockErrorKind::Configuration
            }
            LockError::Canceled | LockError::DeadlineExceeded => LockErrorKind::Cancellation,
            LockError::Store(_) => LockErrorKind::Store,
            LockError::NotHeld { .. } | LockError::InvalidState { .. } => LockErrorKind::Protocol,
        }
    }

    pub fn is_cancellation(&self) -> bool {
        self.kind() == LockErrorKind::Cancellation
    }
}

impl From<ContextError> for LockError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::Canceled => LockError::Canceled,
            ContextError::DeadlineExceeded => LockError::DeadlineExceeded,
        }
    }
}
