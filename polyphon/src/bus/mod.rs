//! Publish/subscribe message bus.
//!
//! The bus guarantees at-least-once delivery per subscription and nothing
//! about ordering. Stages must therefore be idempotent and must never rely
//! on sibling branches arriving in any particular order.

mod memory;
mod redelivery;

pub use memory::{InMemoryBus, InMemorySubscription, PublishedRecord};
pub use redelivery::{BackoffStrategy, JitterStrategy, RedeliveryDecision, RedeliveryPolicy};

use crate::core::{Event, Message, Topic};
use crate::errors::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Bus-assigned message identifier.
pub type MessageId = Uuid;

/// Trait for publish/subscribe channels keyed by topic name.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publishes a message and waits for the bus to acknowledge it.
    ///
    /// Returning `Ok` means every current subscription of the topic will
    /// see the message at least once.
    async fn publish(&self, topic: &Topic, message: Message) -> Result<MessageId>;

    /// Attaches a named subscription to a topic.
    ///
    /// Only messages published after the subscription exists are delivered.
    async fn subscribe(&self, topic: &Topic, subscription: &str) -> Result<Box<dyn Subscription>>;
}

/// A pull handle on one subscription.
#[async_trait]
pub trait Subscription: Send + Sync {
    /// Subscription name.
    fn name(&self) -> &str;

    /// Topic the subscription is attached to.
    fn topic(&self) -> &Topic;

    /// Waits for the next delivery. `None` once the bus is gone.
    async fn recv(&mut self) -> Option<Delivery>;

    /// Returns a delivery if one is ready right now.
    fn try_recv(&mut self) -> Option<Delivery>;

    /// Acknowledges a delivery; it will not come back.
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// Negatively acknowledges a delivery; the bus schedules redelivery or
    /// dead-letters it once attempts are exhausted.
    async fn nack(&self, delivery: &Delivery) -> Result<()>;

    /// Drops a delivery that can never succeed, keeping a dead-letter record.
    async fn reject(&self, delivery: &Delivery, reason: &str) -> Result<()>;

    /// Deliveries queued, in flight or waiting for redelivery.
    fn backlog(&self) -> usize;
}

/// One delivery of a message to one subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    /// Id assigned at publish time; stable across redeliveries.
    pub message_id: MessageId,
    /// Topic the message was published on.
    pub topic: Topic,
    /// Receiving subscription.
    pub subscription: String,
    /// Message body.
    pub message: Message,
    /// Delivery attempt, starting at 1.
    pub attempt: u32,
    /// When the message was published.
    pub published_at: DateTime<Utc>,
}

impl Delivery {
    /// The stage trigger for this delivery.
    #[must_use]
    pub fn to_event(&self) -> Event {
        Event::bus_message(self.topic.clone(), self.message.clone())
    }

    /// Returns true if this is a redelivery.
    #[must_use]
    pub fn is_redelivery(&self) -> bool {
        self.attempt > 1
    }
}

/// A delivery the bus gave up on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    /// The last delivery attempt.
    pub delivery: Delivery,
    /// Why it was parked.
    pub reason: String,
    /// When it was parked.
    pub parked_at: DateTime<Utc>,
}
