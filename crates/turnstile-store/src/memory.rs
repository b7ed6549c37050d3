//! In-memory coordination store
//!
//! Set operations run under the owning DashMap shard lock, which makes each
//! claim and removal linearizable for every task sharing the store.
//! Subscriptions are bounded mpsc queues; a publish to a full queue is
//! dropped for that subscriber because it already has a wakeup pending.
//! A channel entry lives only as long as it has open subscribers.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace};

use crate::error::StoreError;
use crate::traits::{CoordinationStore, Message, Subscription};

/// In-process coordination store
#[derive(Debug, Default)]
pub struct MemoryCoordinationStore {
    /// Set name -> members
    sets: DashMap<String, HashSet<String>>,
    /// Channel name -> subscriber queues
    channels: Arc<Channels>,
}

type Channels = DashMap<String, Vec<mpsc::Sender<Message>>>;

/// Drop closed subscribers of `channel`, and the channel once it has none
fn prune_closed(channels: &Channels, channel: &str) {
    if let Some(mut senders) = channels.get_mut(channel) {
        senders.retain(|sender| !sender.is_closed());
    }
    channels.remove_if(channel, |_, senders| senders.is_empty());
}

impl MemoryCoordinationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `payload` on `channel`, returning the number of live subscribers reached
    pub fn publish(&self, channel: &str, payload: &str) -> usize {
        let Some(mut senders) = self.channels.get_mut(channel) else {
            return 0;
        };

        let message = Message {
            channel: channel.to_string(),
            payload: payload.to_string(),
        };

        let mut delivered = 0;
        senders.retain(|sender| match sender.try_send(message.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
        let empty = senders.is_empty();
        drop(senders);

        if empty {
            self.channels
                .remove_if(channel, |_, senders| senders.is_empty());
        }

        trace!(channel, delivered, "Published message");
        delivered
    }

    /// Number of open subscriptions on `channel`
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .get(channel)
            .map(|senders| senders.iter().filter(|s| !s.is_closed()).count())
            .unwrap_or(0)
    }

    /// Number of channels with at least one subscriber entry
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

#[async_trait]
impl CoordinationStore for MemoryCoordinationStore {
    async fn add_member(&self, set: &str, member: &str) -> Result<bool, StoreError> {
        let added = self
            .sets
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string());
        trace!(set, member, added, "add_member");
        Ok(added)
    }

    async fn remove_member_and_publish(
        &self,
        set: &str,
        member: &str,
        channel: &str,
        payload: &str,
    ) -> Result<bool, StoreError> {
        let removed = match self.sets.get_mut(set) {
            Some(mut members) => members.remove(member),
            None => false,
        };

        if !removed {
            trace!(set, member, "remove_member found no entry");
            return Ok(false);
        }

        self.sets.remove_if(set, |_, members| members.is_empty());
        let delivered = self.publish(channel, payload);
        debug!(set, member, channel, delivered, "Removed member and published");
        Ok(true)
    }

    async fn is_member(&self, set: &str, member: &str) -> Result<bool, StoreError> {
        Ok(self
            .sets
            .get(set)
            .map(|members| members.contains(member))
            .unwrap_or(false))
    }

    async fn members(&self, set: &str) -> Result<Vec<String>, StoreError> {
        let mut members: Vec<String> = self
            .sets
            .get(set)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        Ok(members)
    }

    async fn subscribe(&self, channel: &str, buffer: usize) -> Result<Subscription, StoreError> {
        if buffer == 0 {
            return Err(StoreError::operation(
                "subscribe",
                "subscription buffer must hold at least one message",
            ));
        }

        let (sender, receiver) = mpsc::channel(buffer);
        self.channels
            .entry(channel.to_string())
            .or_default()
            .push(sender);
        debug!(channel, "Subscribed");

        let channels = self.channels.clone();
        let name = channel.to_string();
        Ok(Subscription::new(channel, receiver).on_drop(move || {
            prune_closed(&channels, &name);
            trace!(channel = %name, "Unsubscribed");
        }))
    }
}
