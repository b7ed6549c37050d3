//! Coordination store error types

/// Failure reported by a coordination store
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("coordination store operation '{operation}' failed: {message}")]
    Operation {
        operation: &'static str,
        message: String,
    },

    #[error("subscription to channel '{0}' closed")]
    SubscriptionClosed(String),

    #[error("invalid notification payload: {0}")]
    Payload(String),
}

impl StoreError {
    pub fn operation(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Operation {
            operation,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::operation("add_member", "connection reset");
        assert_eq!(
            err.to_string(),
            "coordination store operation 'add_member' failed: connection reset"
        );

        let err = StoreError::SubscriptionClosed("accounts:42".to_string());
        assert_eq!(err.to_string(), "subscription to channel 'accounts:42' closed");
    }
}
