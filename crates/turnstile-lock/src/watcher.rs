//! Release notifications for observers that do not compete for a lock

use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures::{Stream, StreamExt};
use tracing::warn;
use turnstile_store::{Subscription, SubscriptionStream};

use crate::model::ReleaseEvent;

/// Stream of release notifications for one resource
///
/// Yields an event every time the resource's claim is removed, for as long
/// as the watcher lives. Observing does not compete for the lock.
pub struct ReleaseWatcher {
    resource: String,
    messages: SubscriptionStream,
}

impl ReleaseWatcher {
    pub(crate) fn new(resource: impl Into<String>, subscription: Subscription) -> Self {
        Self {
            resource: resource.into(),
            messages: subscription.into_stream(),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Wait for the next release; `None` once the store closes the subscription
    pub async fn next_release(&mut self) -> Option<ReleaseEvent> {
        self.next().await
    }
}

impl Stream for ReleaseWatcher {
    type Item = ReleaseEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match ready!(Pin::new(&mut self.messages).poll_next(cx)) {
                Some(message) => match ReleaseEvent::from_payload(&message.payload) {
                    Ok(event) => return Poll::Ready(Some(event)),
                    Err(err) => {
                        warn!(resource = %self.resource, error = %err, "Skipping malformed release notification");
                    }
                },
                None => return Poll::Ready(None),
            }
        }
    }
}

impl std::fmt::Debug for ReleaseWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseWatcher")
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}
