//! Coordination store trait and subscription handle

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::StoreError;

/// A message delivered on a pub/sub channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Channel the message was published on
    pub channel: String,
    /// Opaque payload
    pub payload: String,
}

/// Shared coordination substrate
///
/// Implementations must make `add_member` and `remove_member_and_publish`
/// linearizable with respect to every caller; mutual exclusion built on top
/// of a store holds only as far as this does.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Add `member` to `set` if absent
    ///
    /// Returns `true` if this call added the member, `false` if it was
    /// already present.
    async fn add_member(&self, set: &str, member: &str) -> Result<bool, StoreError>;

    /// Remove `member` from `set` and, in the same round-trip, publish
    /// `payload` on `channel`
    ///
    /// The payload is published only when the member was present. Returns
    /// whether the member was removed.
    async fn remove_member_and_publish(
        &self,
        set: &str,
        member: &str,
        channel: &str,
        payload: &str,
    ) -> Result<bool, StoreError>;

    /// Check membership without modifying the set
    async fn is_member(&self, set: &str, member: &str) -> Result<bool, StoreError>;

    /// List all members of `set`
    async fn members(&self, set: &str) -> Result<Vec<String>, StoreError>;

    /// Subscribe to `channel`, buffering up to `buffer` undelivered messages
    async fn subscribe(&self, channel: &str, buffer: usize) -> Result<Subscription, StoreError>;
}

/// Receiving end of a channel subscription
///
/// Dropping the subscription unsubscribes. A store may attach a cleanup hook
/// with [`Subscription::on_drop`]; it runs after the receiver is closed.
#[derive(Debug)]
pub struct Subscription {
    channel: String,
    receiver: mpsc::Receiver<Message>,
    unsubscribe: Option<Unsubscribe>,
}

impl Subscription {
    pub fn new(channel: impl Into<String>, receiver: mpsc::Receiver<Message>) -> Self {
        Self {
            channel: channel.into(),
            receiver,
            unsubscribe: None,
        }
    }

    /// Run `cleanup` once this subscription, or the stream made from it, is dropped
    pub fn on_drop(mut self, cleanup: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.unsubscribe = Some(Unsubscribe(Some(Box::new(cleanup))));
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Wait for the next message
    pub async fn recv(&mut self) -> Result<Message, StoreError> {
        self.receiver
            .recv()
            .await
            .ok_or_else(|| StoreError::SubscriptionClosed(self.channel.clone()))
    }

    /// Convert into a `Stream` of messages
    pub fn into_stream(self) -> SubscriptionStream {
        SubscriptionStream {
            messages: ReceiverStream::new(self.receiver),
            _unsubscribe: self.unsubscribe,
        }
    }
}

/// Message stream over a subscription; unsubscribes when dropped
#[derive(Debug)]
pub struct SubscriptionStream {
    messages: ReceiverStream<Message>,
    _unsubscribe: Option<Unsubscribe>,
}

impl Stream for SubscriptionStream {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Message>> {
        Pin::new(&mut self.messages).poll_next(cx)
    }
}

/// Cleanup hook; declared after the receiver so it runs once the receiver is closed
struct Unsubscribe(Option<Box<dyn FnOnce() + Send + Sync>>);

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        if let Some(cleanup) = self.0.take() {
            cleanup();
        }
    }
}

impl std::fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Unsubscribe")
    }
}
